//! Events published to dashboard views.

use crate::{
    jobs::JobView,
    map::Selection,
    notify::Notification,
    query::QueryPhase,
};

#[derive(Debug, Clone)]
pub enum DashboardEvent {
    Notification(Notification),
    /// Full job list after one status message was applied.
    JobsUpdated(Vec<JobView>),
    /// The status stream failed; job state has been discarded.
    JobStreamClosed {
        reason: String,
    },
    SelectionChanged(Selection),
    /// Layer ids in draw order, bottom first.
    LayersChanged(Vec<String>),
    QueryStateChanged(QueryPhase),
}
