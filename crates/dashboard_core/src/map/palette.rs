use shared::domain::ClusterId;

pub type Rgb = [u8; 3];
pub type Rgba = [u8; 4];

pub const STOP_CLUSTER_COLORS: [Rgb; 6] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [255, 200, 0],
    [0, 255, 255],
    [255, 0, 255],
];

pub const STOP_OUTLINE_COLOR: Rgba = [0, 0, 0, 100];

/// Clusters past the palette size wrap around and share colors.
pub fn cluster_color(cluster: ClusterId) -> Rgb {
    STOP_CLUSTER_COLORS[cluster.0 as usize % STOP_CLUSTER_COLORS.len()]
}
