//! Map page state: layers handed to the renderer, the cluster/stop drill-down
//! selection, and the session that loads tabular data for them.

mod controller;
mod layer;
mod palette;
mod selection;
mod session;

pub use controller::{stop_tooltip, MapLayerController, SelectionChange};
pub use layer::{
    LayerData, LayerFilter, MapLayer, PathFeature, PointFeature, ALL_TRANSFER_PATTERNS_LAYER,
    CLUSTERED_STOPS_LAYER, TRANSFER_PATTERNS_LAYER,
};
pub use palette::{cluster_color, Rgb, Rgba, STOP_CLUSTER_COLORS, STOP_OUTLINE_COLOR};
pub use selection::Selection;
pub use session::MapSession;
