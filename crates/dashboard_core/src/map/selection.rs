use shared::{
    domain::{ClusterId, StopId},
    protocol::ClusteredStop,
};

/// Two-stage drill-down: the first pick chooses a cluster, later picks choose
/// a stop inside it. A stop is never selected without its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    NoSelection,
    ClusterSelected {
        cluster: ClusterId,
    },
    ClusterAndStopSelected {
        cluster: ClusterId,
        stop: StopId,
    },
}

impl Selection {
    pub fn cluster(&self) -> Option<ClusterId> {
        match *self {
            Self::NoSelection => None,
            Self::ClusterSelected { cluster } | Self::ClusterAndStopSelected { cluster, .. } => {
                Some(cluster)
            }
        }
    }

    pub fn stop(&self) -> Option<StopId> {
        match *self {
            Self::ClusterAndStopSelected { stop, .. } => Some(stop),
            _ => None,
        }
    }

    pub fn select_point(self, point: &ClusteredStop) -> Self {
        match self {
            Self::NoSelection => Self::ClusterSelected {
                cluster: point.cluster_id,
            },
            Self::ClusterSelected { cluster } | Self::ClusterAndStopSelected { cluster, .. } => {
                Self::ClusterAndStopSelected {
                    cluster,
                    stop: point.stop_id,
                }
            }
        }
    }

    pub fn clear_all(self) -> Self {
        Self::NoSelection
    }

    /// Drops the stop and keeps the cluster. Without a cluster there is no
    /// stop to clear and the selection stays as it is.
    pub fn clear_stop(self) -> Self {
        match self {
            Self::ClusterAndStopSelected { cluster, .. } => Self::ClusterSelected { cluster },
            other => other,
        }
    }
}
