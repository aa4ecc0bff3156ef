use shared::{
    domain::{ClusterId, StopId},
    protocol::{ClusteredStop, TransferPattern},
};
use tracing::debug;

use super::{
    layer::{LayerData, LayerFilter, MapLayer, CLUSTERED_STOPS_LAYER, TRANSFER_PATTERNS_LAYER},
    selection::Selection,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionChange {
    pub previous: Selection,
    pub current: Selection,
}

impl SelectionChange {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }

    pub fn cluster_changed(&self) -> bool {
        self.previous.cluster() != self.current.cluster()
    }

    /// The cluster whose transfer patterns must be loaded after this change.
    pub fn needs_patterns(&self) -> Option<ClusterId> {
        if self.cluster_changed() {
            self.current.cluster()
        } else {
            None
        }
    }
}

/// Ordered map layers, bottom first, plus the selection that filters them.
#[derive(Debug, Clone)]
pub struct MapLayerController {
    layers: Vec<MapLayer>,
    selection: Selection,
}

impl Default for MapLayerController {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MapLayerController {
    pub fn new(stops: Vec<ClusteredStop>) -> Self {
        Self {
            layers: vec![MapLayer::points(CLUSTERED_STOPS_LAYER, stops)],
            selection: Selection::NoSelection,
        }
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn layers(&self) -> &[MapLayer] {
        &self.layers
    }

    pub fn layer(&self, id: &str) -> Option<&MapLayer> {
        self.layers.iter().find(|layer| layer.id == id)
    }

    pub fn layer_ids(&self) -> Vec<String> {
        self.layers.iter().map(|layer| layer.id.clone()).collect()
    }

    pub fn set_clustered_stops(&mut self, stops: Vec<ClusteredStop>) {
        match self.layer_mut(CLUSTERED_STOPS_LAYER) {
            Some(layer) => layer.data = LayerData::Points(stops),
            None => self.layers.push(MapLayer::points(CLUSTERED_STOPS_LAYER, stops)),
        }
        self.rebuild_filters();
    }

    pub fn find_stop(&self, stop_id: StopId) -> Option<ClusteredStop> {
        match &self.layer(CLUSTERED_STOPS_LAYER)?.data {
            LayerData::Points(rows) => rows.iter().find(|stop| stop.stop_id == stop_id).copied(),
            LayerData::Paths(_) => None,
        }
    }

    pub fn click_point(&mut self, point: &ClusteredStop) -> SelectionChange {
        self.apply_selection(self.selection.select_point(point))
    }

    /// Resets cluster and stop together.
    pub fn clear_cluster_filter(&mut self) -> SelectionChange {
        self.apply_selection(self.selection.clear_all())
    }

    /// Resets the stop only; the cluster stays selected.
    pub fn clear_stop_filter(&mut self) -> SelectionChange {
        self.apply_selection(self.selection.clear_stop())
    }

    /// Fills the derived pattern layer. Rows for a cluster that is no longer
    /// selected are dropped and `false` is returned.
    pub fn set_transfer_patterns(&mut self, cluster: ClusterId, rows: Vec<TransferPattern>) -> bool {
        if self.selection.cluster() != Some(cluster) {
            debug!(%cluster, "dropping transfer patterns for deselected cluster");
            return false;
        }
        match self.layer_mut(TRANSFER_PATTERNS_LAYER) {
            Some(layer) => layer.data = LayerData::Paths(rows),
            None => self
                .layers
                .insert(0, MapLayer::paths(TRANSFER_PATTERNS_LAYER, rows)),
        }
        self.rebuild_filters();
        true
    }

    /// Adds a layer on top, or replaces the data of the layer with that id.
    pub fn upsert_layer(&mut self, layer: MapLayer) {
        match self.layers.iter_mut().find(|existing| existing.id == layer.id) {
            Some(existing) => existing.data = layer.data,
            None => self.layers.push(layer),
        }
        self.rebuild_filters();
    }

    pub fn set_layer_visible(&mut self, id: &str, visible: bool) -> bool {
        match self.layer_mut(id) {
            Some(layer) => {
                layer.visible = visible;
                true
            }
            None => false,
        }
    }

    fn apply_selection(&mut self, next: Selection) -> SelectionChange {
        let change = SelectionChange {
            previous: self.selection,
            current: next,
        };
        self.selection = next;

        if change.cluster_changed() {
            self.layers.retain(|layer| layer.id != TRANSFER_PATTERNS_LAYER);
            if next.cluster().is_some() {
                // Drawn below the stops; rows arrive once loaded.
                self.layers
                    .insert(0, MapLayer::paths(TRANSFER_PATTERNS_LAYER, Vec::new()));
            }
        }
        self.rebuild_filters();

        if change.changed() {
            debug!(from = ?change.previous, to = ?change.current, "map selection changed");
        }
        change
    }

    fn rebuild_filters(&mut self) {
        let cluster = self.selection.cluster();
        let stop = self.selection.stop();
        for layer in &mut self.layers {
            layer.filter = match layer.id.as_str() {
                CLUSTERED_STOPS_LAYER => cluster.map(LayerFilter::Cluster),
                TRANSFER_PATTERNS_LAYER => stop.map(LayerFilter::StartStop),
                _ => None,
            };
        }
    }

    fn layer_mut(&mut self, id: &str) -> Option<&mut MapLayer> {
        self.layers.iter_mut().find(|layer| layer.id == id)
    }
}

pub fn stop_tooltip(stop: &ClusteredStop) -> String {
    format!(
        "Internal Stop ID: {}\nCluster: {}",
        stop.stop_id, stop.cluster_id
    )
}

#[cfg(test)]
#[path = "../tests/map_controller_tests.rs"]
mod tests;
