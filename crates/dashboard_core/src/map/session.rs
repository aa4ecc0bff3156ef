//! Map page flow: owns a [`MapLayerController`] and loads the tabular
//! resources its selection asks for.

use std::sync::Arc;

use shared::{
    domain::{ClusterId, StopId},
    protocol::{ClusteredStop, TransferPattern},
};
use tracing::{info, warn};

use super::{
    controller::{MapLayerController, SelectionChange},
    layer::{MapLayer, ALL_TRANSFER_PATTERNS_LAYER},
};
use crate::{
    config::DashboardSettings,
    events::DashboardEvent,
    fetch::FetchAdapter,
    notify::EventBus,
    tabular::{load_per_cluster, load_rows, BulkLoadOutcome},
};

pub struct MapSession {
    fetch: FetchAdapter,
    settings: Arc<DashboardSettings>,
    controller: MapLayerController,
    bus: Option<EventBus>,
}

impl MapSession {
    pub fn new(fetch: FetchAdapter, settings: Arc<DashboardSettings>) -> Self {
        Self {
            fetch,
            settings,
            controller: MapLayerController::default(),
            bus: None,
        }
    }

    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn controller(&self) -> &MapLayerController {
        &self.controller
    }

    /// Loads `stops_clustered.csv` into the base layer. Returns the number of
    /// stops, zero when the resource could not be loaded.
    pub async fn load(&mut self) -> usize {
        let rows: Vec<ClusteredStop> = match self.settings.clustered_stops_url() {
            Ok(url) => load_rows(&self.fetch, &url).await.unwrap_or_default(),
            Err(err) => {
                self.fetch.report(&err);
                Vec::new()
            }
        };
        info!(stops = rows.len(), "clustered stops loaded");
        let count = rows.len();
        self.controller.set_clustered_stops(rows);
        self.publish_layers();
        count
    }

    pub async fn click_point(&mut self, point: &ClusteredStop) -> SelectionChange {
        let change = self.controller.click_point(point);
        self.after_change(change).await;
        change
    }

    /// Clicks the stop with this id, if the base layer has it.
    pub async fn click_stop(&mut self, stop_id: StopId) -> Option<SelectionChange> {
        let Some(point) = self.controller.find_stop(stop_id) else {
            warn!(stop = %stop_id, "clicked stop is not on the map");
            return None;
        };
        Some(self.click_point(&point).await)
    }

    pub fn clear_cluster_filter(&mut self) -> SelectionChange {
        let change = self.controller.clear_cluster_filter();
        self.publish_change(&change);
        change
    }

    pub fn clear_stop_filter(&mut self) -> SelectionChange {
        let change = self.controller.clear_stop_filter();
        self.publish_change(&change);
        change
    }

    pub fn set_layer_visible(&mut self, id: &str, visible: bool) -> bool {
        let found = self.controller.set_layer_visible(id, visible);
        if found {
            self.publish_layers();
        }
        found
    }

    /// Loads `tp_vis.csv` of every cluster into one overview layer, one page
    /// at a time, honoring the configured partial load policy.
    pub async fn load_all_transfer_patterns(
        &mut self,
        num_clusters: u32,
    ) -> BulkLoadOutcome<TransferPattern> {
        let settings = Arc::clone(&self.settings);
        let outcome = load_per_cluster(
            &self.fetch,
            num_clusters,
            settings.partial_load_policy,
            |cluster| settings.transfer_patterns_url(cluster),
        )
        .await;
        info!(
            rows = outcome.rows.len(),
            pages = outcome.pages_loaded,
            total = outcome.pages_total,
            "bulk transfer pattern load finished"
        );
        self.controller.upsert_layer(MapLayer::paths(
            ALL_TRANSFER_PATTERNS_LAYER,
            outcome.rows.clone(),
        ));
        self.publish_layers();
        outcome
    }

    /// Fetches a per-cluster resource as opaque bytes (`lines_geo.arrow`,
    /// `transfer_patterns.arrow`).
    pub async fn fetch_cluster_resource(&self, cluster: ClusterId, name: &str) -> Option<Vec<u8>> {
        match self.settings.cluster_resource_url(cluster, name) {
            Ok(url) => self.fetch.get_bytes(&url).await,
            Err(err) => {
                self.fetch.report(&err);
                None
            }
        }
    }

    async fn after_change(&mut self, change: SelectionChange) {
        self.publish_change(&change);
        let Some(cluster) = change.needs_patterns() else {
            return;
        };
        let rows = match self.settings.transfer_patterns_url(cluster) {
            Ok(url) => load_rows::<TransferPattern>(&self.fetch, &url).await,
            Err(err) => {
                self.fetch.report(&err);
                None
            }
        };
        if let Some(rows) = rows {
            if self.controller.set_transfer_patterns(cluster, rows) {
                self.publish_layers();
            }
        }
    }

    fn publish_change(&self, change: &SelectionChange) {
        if !change.changed() {
            return;
        }
        if let Some(bus) = &self.bus {
            bus.emit(DashboardEvent::SelectionChanged(change.current));
        }
        if change.cluster_changed() {
            self.publish_layers();
        }
    }

    fn publish_layers(&self) {
        if let Some(bus) = &self.bus {
            bus.emit(DashboardEvent::LayersChanged(self.controller.layer_ids()));
        }
    }
}
