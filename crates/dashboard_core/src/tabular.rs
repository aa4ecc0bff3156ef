//! Tabular resources served next to the backend: CSV decoding and the
//! sequential per-cluster bulk loader.

use std::{fmt, str::FromStr};

use serde::de::DeserializeOwned;
use shared::{
    domain::ClusterId,
    protocol::{ClusteredStop, TransferPattern},
};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::{FetchError, TabularError},
    fetch::FetchAdapter,
    notify::{Notification, Notifier},
};

/// What a bulk load returns when one of its pages fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartialLoadPolicy {
    /// Return nothing; the layer stays empty.
    #[default]
    Discard,
    /// Return the rows of every page fetched before the failure.
    KeepPartial,
}

#[derive(Debug, Error)]
#[error("unknown partial load policy '{0}' (expected 'discard' or 'keep_partial')")]
pub struct UnknownPolicy(String);

impl FromStr for PartialLoadPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discard" => Ok(Self::Discard),
            "keep_partial" | "keep-partial" => Ok(Self::KeepPartial),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for PartialLoadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discard => f.write_str("discard"),
            Self::KeepPartial => f.write_str("keep_partial"),
        }
    }
}

pub fn decode_rows<T: DeserializeOwned>(url: &Url, body: &[u8]) -> Result<Vec<T>, TabularError> {
    let mut reader = csv::Reader::from_reader(body);
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|source| TabularError::Row {
            url: url.to_string(),
            source,
        })
}

pub fn decode_clustered_stops(url: &Url, body: &[u8]) -> Result<Vec<ClusteredStop>, TabularError> {
    decode_rows(url, body)
}

pub fn decode_transfer_patterns(
    url: &Url,
    body: &[u8],
) -> Result<Vec<TransferPattern>, TabularError> {
    decode_rows(url, body)
}

/// Fetches and decodes one CSV resource, notifying on failure.
pub async fn load_rows<T: DeserializeOwned>(
    fetch: &FetchAdapter,
    url: &Url,
) -> Option<Vec<T>> {
    let body = fetch.get_bytes(url).await?;
    match decode_rows(url, &body) {
        Ok(rows) => Some(rows),
        Err(err) => {
            report(fetch, &err);
            None
        }
    }
}

fn report(fetch: &FetchAdapter, err: &TabularError) {
    match err {
        TabularError::Fetch(fetch_err) => fetch.report(fetch_err),
        TabularError::Row { url, .. } => {
            warn!(%url, "{err}");
            fetch.notifier().notify(Notification::from_tabular_error(err));
        }
    }
}

#[derive(Debug)]
pub struct BulkLoadOutcome<T> {
    pub rows: Vec<T>,
    pub pages_loaded: usize,
    pub pages_total: usize,
    /// Set when a page failed and the load stopped there.
    pub failed_page: Option<(ClusterId, TabularError)>,
}

impl<T> BulkLoadOutcome<T> {
    pub fn is_complete(&self) -> bool {
        self.failed_page.is_none()
    }
}

/// Loads one page per cluster, strictly one after another, and concatenates
/// the rows. The first failing page stops the load.
pub async fn load_per_cluster<T, F>(
    fetch: &FetchAdapter,
    num_clusters: u32,
    policy: PartialLoadPolicy,
    page_url: F,
) -> BulkLoadOutcome<T>
where
    T: DeserializeOwned,
    F: Fn(ClusterId) -> Result<Url, FetchError>,
{
    let mut rows = Vec::new();
    let mut pages_loaded = 0;

    for raw in 0..num_clusters {
        let cluster = ClusterId(raw);
        let page = match page_url(cluster) {
            Ok(url) => load_page::<T>(fetch, &url).await,
            Err(err) => Err(err.into()),
        };
        match page {
            Ok(mut page_rows) => {
                debug!(%cluster, rows = page_rows.len(), "loaded cluster page");
                rows.append(&mut page_rows);
                pages_loaded += 1;
            }
            Err(err) => {
                warn!(%cluster, %policy, pages_loaded, "bulk load aborted: {err}");
                report(fetch, &err);
                if policy == PartialLoadPolicy::Discard {
                    rows.clear();
                }
                return BulkLoadOutcome {
                    rows,
                    pages_loaded,
                    pages_total: num_clusters as usize,
                    failed_page: Some((cluster, err)),
                };
            }
        }
    }

    BulkLoadOutcome {
        rows,
        pages_loaded,
        pages_total: num_clusters as usize,
        failed_page: None,
    }
}

async fn load_page<T: DeserializeOwned>(
    fetch: &FetchAdapter,
    url: &Url,
) -> Result<Vec<T>, TabularError> {
    let body = fetch.try_get_bytes(url).await?;
    decode_rows(url, &body)
}

#[cfg(test)]
#[path = "tests/tabular_tests.rs"]
mod tests;
