use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    Unavailable,
    Internal,
    Unexpected,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => Self::Validation,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            502..=504 => Self::Unavailable,
            500..=599 => Self::Internal,
            _ => Self::Unexpected,
        }
    }
}

/// A non-success response from the backend. The backend answers failures
/// with a plain-text reason, which may be empty.
#[derive(Debug, Clone, Error)]
#[error("{code:?} (HTTP {status}){}", reason_suffix(.message))]
pub struct ApiError {
    pub code: ErrorCode,
    pub status: u16,
    pub message: String,
}

fn reason_suffix(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {message}")
    }
}

impl ApiError {
    pub fn from_response(status: u16, body: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::from_status(status),
            status,
            message: body.into().trim().to_string(),
        }
    }
}
