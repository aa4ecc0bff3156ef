use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid resource url '{input}': {source}")]
    InvalidUrl {
        input: String,
        source: url::ParseError,
    },
    #[error("request to {url} failed: {source}")]
    Transport { url: String, source: reqwest::Error },
    #[error("request to {url} was rejected: {source}")]
    Status { url: String, source: ApiError },
    #[error("malformed response body from {url}: {source}")]
    Decode {
        url: String,
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            Self::InvalidUrl { input, .. } => input,
            Self::Transport { url, .. } | Self::Status { url, .. } | Self::Decode { url, .. } => {
                url
            }
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Status { source, .. } => Some(source.code),
            _ => None,
        }
    }

    pub fn category(&self) -> FailureCategory {
        match self {
            Self::InvalidUrl { .. } => FailureCategory::Validation,
            Self::Transport { .. } => FailureCategory::Transport,
            Self::Status { .. } => FailureCategory::Status,
            Self::Decode { .. } => FailureCategory::Decode,
        }
    }
}

/// Coarse failure taxonomy used for notifications and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    Transport,
    Status,
    Decode,
    Validation,
    Stream,
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("status stream could not be opened: {0}")]
    Connect(#[source] FetchError),
    #[error("status stream interrupted: {0}")]
    Interrupted(#[source] reqwest::Error),
    #[error("status stream ended by the server")]
    Ended,
    #[error("malformed status message: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("status stream sent a line or event over {limit} bytes")]
    LineTooLong { limit: usize },
}

#[derive(Debug, Error)]
pub enum TabularError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("malformed row in {url}: {source}")]
    Row { url: String, source: csv::Error },
}
