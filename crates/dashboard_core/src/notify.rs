//! User-visible notifications and the dashboard event bus.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::{
    error::{FailureCategory, FetchError, StreamError, TabularError},
    events::DashboardEvent,
};

pub const REQUEST_FAILED_TITLE: &str = "Error while sending request";
pub const STREAM_CLOSED_TITLE: &str = "Lost connection to status stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub category: Option<FailureCategory>,
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            category: None,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn from_fetch_error(err: &FetchError) -> Self {
        Self {
            level: NotificationLevel::Error,
            category: Some(err.category()),
            title: REQUEST_FAILED_TITLE.to_string(),
            description: err.to_string(),
        }
    }

    pub fn from_tabular_error(err: &TabularError) -> Self {
        match err {
            TabularError::Fetch(fetch_err) => Self::from_fetch_error(fetch_err),
            TabularError::Row { .. } => Self {
                level: NotificationLevel::Error,
                category: Some(FailureCategory::Decode),
                title: REQUEST_FAILED_TITLE.to_string(),
                description: err.to_string(),
            },
        }
    }

    pub fn from_stream_error(err: &StreamError) -> Self {
        Self {
            level: NotificationLevel::Warning,
            category: Some(FailureCategory::Stream),
            title: STREAM_CLOSED_TITLE.to_string(),
            description: err.to_string(),
        }
    }

    /// Short remediation hint shown next to the description.
    pub fn hint(&self) -> Option<&'static str> {
        match self.category? {
            FailureCategory::Transport => {
                Some("Backend unreachable; check the API URL and network, then reload.")
            }
            FailureCategory::Status => Some("The backend rejected the request or is not ready yet."),
            FailureCategory::Decode => Some("The backend answered with an unexpected payload."),
            FailureCategory::Validation => Some("Check the configured dashboard URLs."),
            FailureCategory::Stream => Some("Job status is no longer live; reload to reconnect."),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Keeps every notification in memory, in order.
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    seen: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        self.seen
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().map(|seen| seen.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(notification);
        }
    }
}

/// Fan-out of dashboard events to every subscribed view.
#[derive(Clone)]
pub struct EventBus {
    events: broadcast::Sender<DashboardEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self { events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.events.subscribe()
    }

    /// Publishing with no subscriber is not an error: nobody is looking.
    pub fn emit(&self, event: DashboardEvent) {
        let _ = self.events.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for EventBus {
    fn notify(&self, notification: Notification) {
        tracing::debug!(title = %notification.title, "publishing notification");
        self.emit(DashboardEvent::Notification(notification));
    }
}
