use std::sync::Arc;

use reqwest::Client;
use shared::protocol::{ConfigResponse, Dataset, DatasetGroup, StatsResponse};
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

pub mod config;
pub mod error;
pub mod events;
pub mod fetch;
pub mod jobs;
pub mod map;
pub mod notify;
pub mod query;
pub mod sse;
pub mod tabular;

pub use config::{load_settings, DashboardSettings};
pub use events::DashboardEvent;
pub use fetch::{FetchAdapter, HttpFetcher, ResourceFetcher};
pub use jobs::{JobCatalog, JobTracker, JobView, WatchHandle};
pub use map::MapSession;
pub use notify::{EventBus, Notification, Notifier};
pub use query::{QueryPlayground, QueryState, RoutingQuery};
pub use tabular::PartialLoadPolicy;

use crate::{
    error::StreamError,
    jobs::{report_stream_closed, spawn_status_watcher},
};

/// Datasets and groups as listed by `/api/v1/config`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetInventory {
    pub datasets: Vec<Dataset>,
    pub groups: Vec<DatasetGroup>,
}

impl DatasetInventory {
    /// Datasets whose `groups` list names `group_id`. Computed on every call.
    pub fn datasets_in_group(&self, group_id: &str) -> Vec<&Dataset> {
        self.datasets
            .iter()
            .filter(|dataset| dataset.belongs_to(group_id))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty() && self.groups.is_empty()
    }
}

impl From<ConfigResponse> for DatasetInventory {
    fn from(config: ConfigResponse) -> Self {
        Self {
            datasets: config.datasets,
            groups: config.dataset_groups,
        }
    }
}

/// Entry point for every dashboard page. Cheap to clone; all clones share
/// one HTTP client and one event bus.
#[derive(Clone)]
pub struct DashboardClient {
    settings: Arc<DashboardSettings>,
    http: Client,
    fetch: FetchAdapter,
    events: EventBus,
}

impl DashboardClient {
    /// Notifications are published on the client's event bus.
    pub fn new(settings: DashboardSettings) -> Self {
        let events = EventBus::default();
        Self::with_notifier(settings, events.clone(), Arc::new(events))
    }

    pub fn with_notifier(
        settings: DashboardSettings,
        events: EventBus,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let http = Client::new();
        let fetch = FetchAdapter::new(
            Arc::new(HttpFetcher::with_client(http.clone())),
            notifier,
        );
        Self {
            settings: Arc::new(settings),
            http,
            fetch,
            events,
        }
    }

    pub fn settings(&self) -> &DashboardSettings {
        &self.settings
    }

    pub fn fetch(&self) -> &FetchAdapter {
        &self.fetch
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.events.subscribe()
    }

    /// Dataset inventory; empty when the backend could not be asked.
    pub async fn load_config(&self) -> DatasetInventory {
        let url = match self.settings.config_url() {
            Ok(url) => url,
            Err(err) => {
                self.fetch.report(&err);
                return DatasetInventory::default();
            }
        };
        let inventory: DatasetInventory = self
            .fetch
            .get_json::<ConfigResponse>(&url)
            .await
            .map(Into::into)
            .unwrap_or_default();
        info!(
            datasets = inventory.datasets.len(),
            groups = inventory.groups.len(),
            "dataset inventory loaded"
        );
        inventory
    }

    pub async fn load_stats(&self) -> Option<StatsResponse> {
        match self.settings.stats_url() {
            Ok(url) => self.fetch.get_json(&url).await,
            Err(err) => {
                self.fetch.report(&err);
                None
            }
        }
    }

    /// Subscribes to the status stream. The tracker is written only by the
    /// returned watcher; dropping the handle ends the subscription.
    pub fn watch_jobs(&self, catalog: JobCatalog) -> (Arc<RwLock<JobTracker>>, WatchHandle) {
        let mut tracker = JobTracker::new(Arc::new(catalog));
        let url = match self.settings.status_url() {
            Ok(url) => url,
            Err(err) => {
                warn!("job status stream not started: {err}");
                let err = StreamError::Connect(err);
                tracker.discard();
                report_stream_closed(&self.events, self.fetch.notifier().as_ref(), &err);
                return (Arc::new(RwLock::new(tracker)), WatchHandle::idle());
            }
        };
        let tracker = Arc::new(RwLock::new(tracker));
        let handle = spawn_status_watcher(
            self.http.clone(),
            url,
            Arc::clone(&tracker),
            self.events.clone(),
            Arc::clone(self.fetch.notifier()),
        );
        (tracker, handle)
    }

    pub fn map_session(&self) -> MapSession {
        MapSession::new(self.fetch.clone(), Arc::clone(&self.settings))
            .with_events(self.events.clone())
    }

    pub fn query_playground(&self) -> QueryPlayground {
        QueryPlayground::new(self.fetch.clone(), Arc::clone(&self.settings))
            .with_events(self.events.clone())
    }
}

/// `1234567` → `1,234,567`, as shown on the overview cards.
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(digit);
    }
    out
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
