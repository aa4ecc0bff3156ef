use std::collections::BTreeMap;

use chrono::{serde::ts_seconds, DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ClusterId, StopId, TripId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub format: String,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl Dataset {
    pub fn belongs_to(&self, group_id: &str) -> bool {
        self.groups.iter().any(|group| group == group_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetGroup {
    pub id: String,
}

/// Body of `GET /api/v1/config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigResponse {
    #[serde(default)]
    pub datasets: Vec<Dataset>,
    #[serde(default)]
    pub dataset_groups: Vec<DatasetGroup>,
}

/// Body of `GET /api/v1/stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub num_stops: u64,
    pub num_trips: u64,
    pub num_clusters: u64,
}

/// One `data:` payload of the `/api/v1/status` stream: job id to status name.
pub type StatusMessage = BTreeMap<String, String>;

/// Row of `stops_clustered.csv`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusteredStop {
    pub stop_id: StopId,
    pub lat: f64,
    pub lon: f64,
    pub cluster_id: ClusterId,
}

/// Row of `clusters/{id}/tp_vis.csv`. Geo endpoints are absent in files that
/// only carry the stop pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransferPattern {
    pub start: StopId,
    pub target: StopId,
    #[serde(default)]
    pub start_lat: Option<f64>,
    #[serde(default)]
    pub start_lon: Option<f64>,
    #[serde(default)]
    pub target_lat: Option<f64>,
    #[serde(default)]
    pub target_lon: Option<f64>,
}

impl TransferPattern {
    /// Source and target positions as `(lon, lat)`, when both are present.
    pub fn segment(&self) -> Option<((f64, f64), (f64, f64))> {
        Some((
            (self.start_lon?, self.start_lat?),
            (self.target_lon?, self.target_lat?),
        ))
    }
}

/// Body of `GET /api/v1/routing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingResponse {
    #[serde(default)]
    pub journeys: Vec<Journey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Leg {
    #[serde(rename = "ride")]
    Ride {
        trip: TripId,
        boarding_stop: StopId,
        alight_stop: StopId,
        #[serde(with = "ts_seconds")]
        boarding_time: DateTime<Utc>,
        #[serde(with = "ts_seconds")]
        alight_time: DateTime<Utc>,
    },
    #[serde(rename = "transfer")]
    Transfer {
        start: StopId,
        end: StopId,
        #[serde(rename = "duration")]
        duration_secs: i64,
    },
}

impl Leg {
    pub fn start(&self) -> StopId {
        match self {
            Leg::Ride { boarding_stop, .. } => *boarding_stop,
            Leg::Transfer { start, .. } => *start,
        }
    }

    pub fn end(&self) -> StopId {
        match self {
            Leg::Ride { alight_stop, .. } => *alight_stop,
            Leg::Transfer { end, .. } => *end,
        }
    }
}

/// Total walking time of the transfers at the head of `legs`. `None` when a
/// duration does not fit a `TimeDelta` or the sum overflows.
fn leading_walk<'a>(legs: impl Iterator<Item = &'a Leg>) -> Option<TimeDelta> {
    legs.map_while(|leg| match leg {
        Leg::Transfer { duration_secs, .. } => Some(*duration_secs),
        Leg::Ride { .. } => None,
    })
    .try_fold(TimeDelta::zero(), |total, secs| {
        total.checked_add(&TimeDelta::try_seconds(secs)?)
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journey {
    pub legs: Vec<Leg>,
}

impl Journey {
    pub fn ride_count(&self) -> usize {
        self.legs
            .iter()
            .filter(|leg| matches!(leg, Leg::Ride { .. }))
            .count()
    }

    pub fn transfer_count(&self) -> usize {
        self.legs.len() - self.ride_count()
    }

    /// Boarding time of the first ride minus any walking done before it.
    /// `None` for journeys made only of transfers, or when the walking time
    /// is out of range.
    pub fn departure(&self) -> Option<DateTime<Utc>> {
        let boarding = self.legs.iter().find_map(|leg| match leg {
            Leg::Ride { boarding_time, .. } => Some(*boarding_time),
            Leg::Transfer { .. } => None,
        })?;
        boarding.checked_sub_signed(leading_walk(self.legs.iter())?)
    }

    /// Alighting time of the last ride plus any walking done after it.
    pub fn arrival(&self) -> Option<DateTime<Utc>> {
        let alighting = self.legs.iter().rev().find_map(|leg| match leg {
            Leg::Ride { alight_time, .. } => Some(*alight_time),
            Leg::Transfer { .. } => None,
        })?;
        alighting.checked_add_signed(leading_walk(self.legs.iter().rev())?)
    }

    pub fn origin(&self) -> Option<StopId> {
        self.legs.first().map(Leg::start)
    }

    pub fn destination(&self) -> Option<StopId> {
        self.legs.last().map(Leg::end)
    }
}
