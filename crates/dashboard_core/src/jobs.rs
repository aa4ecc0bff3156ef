//! Pipeline job status: an immutable catalog of jobs, the runtime status map
//! and the task that feeds it from the backend's status stream.

use std::{collections::HashMap, sync::Arc};

use futures::StreamExt;
use reqwest::{header, Client};
use shared::{
    domain::{JobId, JobStatus},
    error::ApiError,
    protocol::StatusMessage,
};
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::{FetchError, StreamError},
    events::DashboardEvent,
    notify::{EventBus, Notification, Notifier},
    sse::{SseDecoder, SseEvent},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationCard {
    pub title: String,
    pub description: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDefinition {
    pub id: JobId,
    pub title: String,
    pub cards: Vec<NavigationCard>,
}

impl JobDefinition {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: JobId::new(id),
            title: title.to_string(),
            cards: Vec::new(),
        }
    }

    pub fn with_card(mut self, title: &str, description: &str, link: &str) -> Self {
        self.cards.push(NavigationCard {
            title: title.to_string(),
            description: description.to_string(),
            link: link.to_string(),
        });
        self
    }
}

/// The jobs shown on the overview page, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCatalog {
    jobs: Vec<JobDefinition>,
}

impl JobCatalog {
    pub fn new(jobs: Vec<JobDefinition>) -> Self {
        Self { jobs }
    }

    /// The backend's preprocessing pipeline.
    pub fn pipeline() -> Self {
        Self::new(vec![
            JobDefinition::new("HarvestData", "Harvesting data"),
            JobDefinition::new("ImportData", "Importing data"),
            JobDefinition::new("ValidateData", "Validating data"),
            JobDefinition::new("PreprocessingClustering", "Clustering").with_card(
                "Clustered stops",
                "Explore the calculated clustering",
                "map",
            ),
            JobDefinition::new(
                "PreprocessingLocalTransferPatterns",
                "Pre-calculating local connections",
            ),
            JobDefinition::new(
                "PreprocessingLongDistanceTransferPatterns",
                "Pre-calculating long-distance connections",
            ),
        ])
    }

    pub fn jobs(&self) -> &[JobDefinition] {
        &self.jobs
    }

    pub fn get(&self, id: &JobId) -> Option<&JobDefinition> {
        self.jobs.iter().find(|job| &job.id == id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusIndicator {
    Pending,
    Spinner,
    Check,
    Cross,
}

impl From<JobStatus> for StatusIndicator {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Queued => Self::Pending,
            JobStatus::Running => Self::Spinner,
            JobStatus::Succeeded => Self::Check,
            JobStatus::Failed => Self::Cross,
        }
    }
}

/// Render-ready projection of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobView {
    pub id: JobId,
    pub title: String,
    pub status: JobStatus,
    pub indicator: StatusIndicator,
    pub cards: Vec<NavigationCard>,
}

#[derive(Debug, Clone)]
pub struct JobTracker {
    catalog: Arc<JobCatalog>,
    statuses: HashMap<JobId, JobStatus>,
}

impl JobTracker {
    pub fn new(catalog: Arc<JobCatalog>) -> Self {
        let statuses = catalog
            .jobs()
            .iter()
            .map(|job| (job.id.clone(), JobStatus::Queued))
            .collect();
        Self { catalog, statuses }
    }

    pub fn status(&self, id: &JobId) -> Option<JobStatus> {
        self.statuses.get(id).copied()
    }

    /// Applies every entry of `message` by id and returns the ids whose status
    /// changed. Unknown ids and unknown status names are skipped.
    pub fn apply(&mut self, message: &StatusMessage) -> Vec<JobId> {
        let mut changed = Vec::new();
        for (raw_id, raw_status) in message {
            let id = JobId::new(raw_id.as_str());
            let Some(current) = self.statuses.get_mut(&id) else {
                debug!(job = %raw_id, "ignoring status for unknown job");
                continue;
            };
            let Some(status) = JobStatus::from_name(raw_status) else {
                warn!(job = %raw_id, status = %raw_status, "ignoring unknown job status");
                continue;
            };
            if *current == status {
                continue;
            }
            if status.rank() < current.rank() {
                warn!(job = %raw_id, from = %current, to = %status, "job status moved backwards");
            }
            *current = status;
            changed.push(id);
        }
        changed
    }

    /// Drops all job state; the job list renders empty afterwards.
    pub fn discard(&mut self) {
        self.statuses.clear();
    }

    pub fn is_discarded(&self) -> bool {
        self.statuses.is_empty() && !self.catalog.is_empty()
    }

    pub fn jobs(&self) -> Vec<JobView> {
        self.catalog
            .jobs()
            .iter()
            .filter_map(|job| {
                let status = self.status(&job.id)?;
                Some(JobView {
                    id: job.id.clone(),
                    title: job.title.clone(),
                    status,
                    indicator: status.into(),
                    cards: job.cards.clone(),
                })
            })
            .collect()
    }
}

/// Keeps the status subscription alive; dropping it closes the stream.
pub struct WatchHandle {
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// A handle with no subscription behind it.
    pub(crate) fn idle() -> Self {
        Self { task: None }
    }

    pub fn close(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits until the stream has ended on its own.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Snapshots go to `bus`; the closing notification goes to `notifier`.
pub fn spawn_status_watcher(
    http: Client,
    url: Url,
    tracker: Arc<RwLock<JobTracker>>,
    bus: EventBus,
    notifier: Arc<dyn Notifier>,
) -> WatchHandle {
    let task = tokio::spawn(async move {
        let err = run_status_stream(&http, &url, &tracker, &bus).await;
        warn!(%url, "status stream closed: {err}");
        tracker.write().await.discard();
        report_stream_closed(&bus, notifier.as_ref(), &err);
    });
    WatchHandle { task: Some(task) }
}

pub(crate) fn report_stream_closed(bus: &EventBus, notifier: &dyn Notifier, err: &StreamError) {
    bus.emit(DashboardEvent::JobStreamClosed {
        reason: err.to_string(),
    });
    notifier.notify(Notification::from_stream_error(err));
}

/// Runs until the stream fails; the returned error says why it stopped.
async fn run_status_stream(
    http: &Client,
    url: &Url,
    tracker: &RwLock<JobTracker>,
    bus: &EventBus,
) -> StreamError {
    let res = match http
        .get(url.clone())
        .header(header::ACCEPT, "text/event-stream")
        .send()
        .await
    {
        Ok(res) => res,
        Err(source) => {
            return StreamError::Connect(FetchError::Transport {
                url: url.to_string(),
                source,
            })
        }
    };
    if !res.status().is_success() {
        let status = res.status().as_u16();
        let body = res.text().await.unwrap_or_default();
        return StreamError::Connect(FetchError::Status {
            url: url.to_string(),
            source: ApiError::from_response(status, body),
        });
    }
    info!(%url, "subscribed to job status stream");

    let mut decoder = SseDecoder::new();
    let mut body = res.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => return StreamError::Interrupted(err),
        };
        let events = match decoder.push(&chunk) {
            Ok(events) => events,
            Err(err) => return err,
        };
        for event in events {
            if let Err(err) = apply_status_event(tracker, bus, &event).await {
                return err;
            }
        }
    }
    StreamError::Ended
}

/// Applies one stream frame atomically and publishes the resulting snapshot.
pub(crate) async fn apply_status_event(
    tracker: &RwLock<JobTracker>,
    bus: &EventBus,
    event: &SseEvent,
) -> Result<(), StreamError> {
    let message: StatusMessage =
        serde_json::from_str(&event.data).map_err(StreamError::Malformed)?;
    let snapshot = {
        let mut guard = tracker.write().await;
        let changed = guard.apply(&message);
        debug!(changed = changed.len(), "applied status message");
        guard.jobs()
    };
    bus.emit(DashboardEvent::JobsUpdated(snapshot));
    Ok(())
}

#[cfg(test)]
#[path = "tests/jobs_tests.rs"]
mod tests;
