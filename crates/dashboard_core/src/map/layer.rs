use shared::{
    domain::{ClusterId, StopId},
    protocol::{ClusteredStop, TransferPattern},
};

use super::palette::{cluster_color, Rgb, Rgba, STOP_OUTLINE_COLOR};

pub const CLUSTERED_STOPS_LAYER: &str = "clustered-stops";
pub const TRANSFER_PATTERNS_LAYER: &str = "transfer-patterns";
pub const ALL_TRANSFER_PATTERNS_LAYER: &str = "all-transfer-patterns";

#[derive(Debug, Clone, PartialEq)]
pub enum LayerData {
    Points(Vec<ClusteredStop>),
    Paths(Vec<TransferPattern>),
}

impl LayerData {
    pub fn len(&self) -> usize {
        match self {
            Self::Points(rows) => rows.len(),
            Self::Paths(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exact-match predicate restricting which rows of a layer are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerFilter {
    /// Points whose `cluster_id` equals the value.
    Cluster(ClusterId),
    /// Paths whose `start` stop equals the value.
    StartStop(StopId),
}

impl LayerFilter {
    fn keeps_point(&self, stop: &ClusteredStop) -> bool {
        match self {
            Self::Cluster(cluster) => stop.cluster_id == *cluster,
            Self::StartStop(_) => true,
        }
    }

    fn keeps_path(&self, pattern: &TransferPattern) -> bool {
        match self {
            Self::StartStop(stop) => pattern.start == *stop,
            Self::Cluster(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointFeature {
    pub stop_id: StopId,
    pub cluster_id: ClusterId,
    /// `(lon, lat)`
    pub position: (f64, f64),
    pub fill: Rgb,
    pub outline: Rgba,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathFeature {
    pub start: StopId,
    pub target: StopId,
    pub source_position: (f64, f64),
    pub target_position: (f64, f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapLayer {
    pub id: String,
    pub data: LayerData,
    pub filter: Option<LayerFilter>,
    pub visible: bool,
}

impl MapLayer {
    pub fn points(id: impl Into<String>, rows: Vec<ClusteredStop>) -> Self {
        Self {
            id: id.into(),
            data: LayerData::Points(rows),
            filter: None,
            visible: true,
        }
    }

    pub fn paths(id: impl Into<String>, rows: Vec<TransferPattern>) -> Self {
        Self {
            id: id.into(),
            data: LayerData::Paths(rows),
            filter: None,
            visible: true,
        }
    }

    pub fn visible_points(&self) -> Vec<&ClusteredStop> {
        match &self.data {
            LayerData::Points(rows) if self.visible => rows
                .iter()
                .filter(|stop| self.filter.map_or(true, |f| f.keeps_point(stop)))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn visible_paths(&self) -> Vec<&TransferPattern> {
        match &self.data {
            LayerData::Paths(rows) if self.visible => rows
                .iter()
                .filter(|pattern| self.filter.map_or(true, |f| f.keeps_path(pattern)))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn visible_count(&self) -> usize {
        match &self.data {
            LayerData::Points(_) => self.visible_points().len(),
            LayerData::Paths(_) => self.visible_paths().len(),
        }
    }

    /// Points ready for a scatterplot renderer, colored by cluster.
    pub fn point_features(&self) -> Vec<PointFeature> {
        self.visible_points()
            .into_iter()
            .map(|stop| PointFeature {
                stop_id: stop.stop_id,
                cluster_id: stop.cluster_id,
                position: (stop.lon, stop.lat),
                fill: cluster_color(stop.cluster_id),
                outline: STOP_OUTLINE_COLOR,
            })
            .collect()
    }

    /// Line segments for patterns that carry both endpoints' coordinates.
    pub fn path_features(&self) -> Vec<PathFeature> {
        self.visible_paths()
            .into_iter()
            .filter_map(|pattern| {
                let (source_position, target_position) = pattern.segment()?;
                Some(PathFeature {
                    start: pattern.start,
                    target: pattern.target,
                    source_position,
                    target_position,
                })
            })
            .collect()
    }
}
