//! Routing playground: the query form, one request per submission, and the
//! journeys that came back.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use shared::{
    domain::{QueryMode, StopId},
    protocol::{Journey, RoutingResponse},
};
use tracing::{debug, info};
use url::Url;

use crate::{
    config::DashboardSettings, error::FetchError, events::DashboardEvent, fetch::FetchAdapter,
    notify::EventBus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingQuery {
    pub origin: StopId,
    pub destination: StopId,
    pub datetime: DateTime<Utc>,
    pub mode: QueryMode,
}

impl RoutingQuery {
    pub fn new(origin: StopId, destination: StopId, datetime: DateTime<Utc>) -> Self {
        Self {
            origin,
            destination,
            datetime,
            mode: QueryMode::DepartAt,
        }
    }

    pub fn arriving(mut self) -> Self {
        self.mode = QueryMode::ArriveAt;
        self
    }

    /// Query string of the backend's range query.
    pub fn to_params(&self, range_secs: i64) -> Vec<(&'static str, String)> {
        vec![
            ("start", self.origin.to_string()),
            ("target", self.destination.to_string()),
            (
                "earliest_departure",
                self.datetime.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            ("range", range_secs.to_string()),
            ("target_type", "single".to_string()),
            ("mode", self.mode.as_param().to_string()),
        ]
    }

    pub fn url(&self, settings: &DashboardSettings) -> Result<Url, FetchError> {
        let mut url = settings.routing_url()?;
        url.query_pairs_mut()
            .extend_pairs(self.to_params(settings.routing_range_secs));
        Ok(url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QueryState {
    #[default]
    EnteringQuery,
    Loading,
    Result(RoutingResponse),
}

impl QueryState {
    pub fn phase(&self) -> QueryPhase {
        match self {
            Self::EnteringQuery => QueryPhase::EnteringQuery,
            Self::Loading => QueryPhase::Loading,
            Self::Result(_) => QueryPhase::Result,
        }
    }

    pub fn response(&self) -> Option<&RoutingResponse> {
        match self {
            Self::Result(response) => Some(response),
            _ => None,
        }
    }
}

/// [`QueryState`] without its payload, for event subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPhase {
    EnteringQuery,
    Loading,
    Result,
}

/// A submission in flight. Only the most recent one may finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub seq: u64,
    pub url: Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JourneySummary {
    pub origin: Option<StopId>,
    pub destination: Option<StopId>,
    pub departure: Option<DateTime<Utc>>,
    pub arrival: Option<DateTime<Utc>>,
    pub rides: usize,
    pub transfers: usize,
}

impl From<&Journey> for JourneySummary {
    fn from(journey: &Journey) -> Self {
        Self {
            origin: journey.origin(),
            destination: journey.destination(),
            departure: journey.departure(),
            arrival: journey.arrival(),
            rides: journey.ride_count(),
            transfers: journey.transfer_count(),
        }
    }
}

pub struct QueryPlayground {
    fetch: FetchAdapter,
    settings: Arc<DashboardSettings>,
    state: QueryState,
    last_query: Option<RoutingQuery>,
    next_seq: u64,
    pending: Option<u64>,
    bus: Option<EventBus>,
}

impl QueryPlayground {
    pub fn new(fetch: FetchAdapter, settings: Arc<DashboardSettings>) -> Self {
        Self {
            fetch,
            settings,
            state: QueryState::EnteringQuery,
            last_query: None,
            next_seq: 0,
            pending: None,
            bus: None,
        }
    }

    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    /// The last submitted query, kept to prefill the form.
    pub fn last_query(&self) -> Option<&RoutingQuery> {
        self.last_query.as_ref()
    }

    /// Submits `query` and waits for the backend. The state is `Loading`
    /// until the response is in, then `Result`, or `EnteringQuery` when the
    /// request failed.
    pub async fn submit(&mut self, query: RoutingQuery) -> &QueryState {
        let Some(submission) = self.begin(query) else {
            return &self.state;
        };
        let response = self
            .fetch
            .get_json::<RoutingResponse>(&submission.url)
            .await;
        self.finish(submission.seq, response);
        &self.state
    }

    /// Moves to `Loading` and returns the request to issue. A URL that cannot
    /// be built is reported and sends the form back to `EnteringQuery`.
    pub fn begin(&mut self, query: RoutingQuery) -> Option<Submission> {
        self.last_query = Some(query);
        self.next_seq += 1;
        let seq = self.next_seq;
        self.pending = Some(seq);
        self.set_state(QueryState::Loading);

        match query.url(&self.settings) {
            Ok(url) => {
                debug!(seq, %url, "routing query submitted");
                Some(Submission { seq, url })
            }
            Err(err) => {
                self.fetch.report(&err);
                self.finish(seq, None);
                None
            }
        }
    }

    /// Completes submission `seq`. Returns `false` and changes nothing when a
    /// newer submission superseded it.
    pub fn finish(&mut self, seq: u64, response: Option<RoutingResponse>) -> bool {
        if self.pending != Some(seq) {
            debug!(seq, pending = ?self.pending, "ignoring stale routing response");
            return false;
        }
        self.pending = None;
        match response {
            Some(response) => {
                info!(seq, journeys = response.journeys.len(), "routing query answered");
                self.set_state(QueryState::Result(response));
            }
            None => self.set_state(QueryState::EnteringQuery),
        }
        true
    }

    /// Back to the form, e.g. from a result. Any submission in flight is
    /// abandoned.
    pub fn edit_query(&mut self) {
        self.pending = None;
        self.set_state(QueryState::EnteringQuery);
    }

    pub fn summaries(&self) -> Vec<JourneySummary> {
        self.state
            .response()
            .map(|response| response.journeys.iter().map(JourneySummary::from).collect())
            .unwrap_or_default()
    }

    fn set_state(&mut self, state: QueryState) {
        let changed = self.state.phase() != state.phase();
        self.state = state;
        if let (true, Some(bus)) = (changed, &self.bus) {
            bus.emit(DashboardEvent::QueryStateChanged(self.state.phase()));
        }
    }
}

#[cfg(test)]
#[path = "tests/query_tests.rs"]
mod tests;
