//! Data fetch adapter: every page reaches the backend through here.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use shared::error::ApiError;
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::FetchError,
    notify::{Notification, Notifier},
};

#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetches the full body of `url`, failing on transport errors and on
    /// non-success statuses.
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError>;
}

#[derive(Clone, Default)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let res = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                url: url.to_string(),
                source: ApiError::from_response(status.as_u16(), body),
            });
        }

        let body = res.bytes().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;
        Ok(body.to_vec())
    }
}

/// Wraps a [`ResourceFetcher`] so that callers get a value or nothing, with
/// one notification per failed call. No retry, caching or deduplication.
#[derive(Clone)]
pub struct FetchAdapter {
    fetcher: Arc<dyn ResourceFetcher>,
    notifier: Arc<dyn Notifier>,
}

impl FetchAdapter {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>, notifier: Arc<dyn Notifier>) -> Self {
        Self { fetcher, notifier }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Option<T> {
        match self.try_get_json(url).await {
            Ok(value) => Some(value),
            Err(err) => {
                self.report(&err);
                None
            }
        }
    }

    pub async fn get_bytes(&self, url: &Url) -> Option<Vec<u8>> {
        match self.try_get_bytes(url).await {
            Ok(body) => Some(body),
            Err(err) => {
                self.report(&err);
                None
            }
        }
    }

    /// Raw variant for callers that aggregate several requests and decide
    /// themselves whether and how to notify.
    pub async fn try_get_bytes(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        debug!(%url, "fetching resource");
        self.fetcher.fetch(url).await
    }

    pub async fn try_get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, FetchError> {
        let body = self.try_get_bytes(url).await?;
        serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }

    pub fn report(&self, err: &FetchError) {
        warn!(
            url = err.url(),
            category = ?err.category(),
            code = ?err.error_code(),
            "request failed: {err}"
        );
        self.notifier.notify(Notification::from_fetch_error(err));
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }
}
