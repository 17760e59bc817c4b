use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Message shown when the backend rejects the session
pub const EXPIRED_SESSION_MESSAGE: &str = "Session expired. Please log in again.";

#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP 401. The session has already been logged out when this is returned.
    #[error("{}", EXPIRED_SESSION_MESSAGE)]
    ExpiredSession,

    #[error("{message}")]
    Api { status: StatusCode, message: String },

    #[error("Error loading media content: {}", .status.as_u16())]
    ContentLoad { status: StatusCode },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

/// Error body returned by the backend: `{"detail": "..."}`.
///
/// `detail` is not always a string (validation failures send a list), so it
/// is kept as raw JSON and only used when it is a non-empty string.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn message(&self) -> Option<&str> {
        self.detail
            .as_ref()
            .and_then(|d| d.as_str())
            .filter(|d| !d.is_empty())
    }
}

impl ApiError {
    /// Build an error for a non-success, non-401 status from its raw body.
    pub fn from_status(status: StatusCode, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.message().map(str::to_string))
            .unwrap_or_else(|| format!("Error {}", status.as_u16()));
        ApiError::Api { status, message }
    }

    /// HTTP status attached to the error, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::ExpiredSession => Some(StatusCode::UNAUTHORIZED),
            ApiError::Api { status, .. } | ApiError::ContentLoad { status } => Some(*status),
            ApiError::Network(e) => e.status(),
            ApiError::InvalidRequest(_)
            | ApiError::InvalidResponse(_)
            | ApiError::InvalidHeader(_) => None,
        }
    }

    pub fn is_expired_session(&self) -> bool {
        matches!(self, ApiError::ExpiredSession)
    }
}
