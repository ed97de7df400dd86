//! Error envelope for SchoolDesk API calls.
//!
//! Every failure a caller can see carries the same three accessors:
//! `status()`, `message()` and `data()`. Callers branch on those rather
//! than on the variant.

use serde_json::Value;
use thiserror::Error;

use super::auth::TokenStoreError;

/// Message attached to [`ApiError::SessionExpired`].
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please log in again.";

static NULL: Value = Value::Null;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend answered with a non-2xx status.
    #[error("{message}")]
    Status {
        status: u16,
        message: String,
        data: Value,
    },

    /// A 401 could not be recovered by refreshing the session.
    #[error("{}", SESSION_EXPIRED_MESSAGE)]
    SessionExpired,

    /// The request never produced a response (DNS, connect, timeout, ...).
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Failed to encode request body: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The response was 2xx but its JSON does not fit the requested type.
    #[error("Failed to decode response body: {source}")]
    Decode {
        status: u16,
        data: Value,
        #[source]
        source: serde_json::Error,
    },

    #[error("Token storage failed: {0}")]
    Storage(#[from] TokenStoreError),
}

impl ApiError {
    /// Build the error for a non-2xx response from its parsed body.
    pub fn from_response(status: u16, data: Value) -> Self {
        let message = error_message(status, &data);
        ApiError::Status {
            status,
            message,
            data,
        }
    }

    /// HTTP status behind this error, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } | ApiError::Decode { status, .. } => Some(*status),
            ApiError::SessionExpired => Some(401),
            _ => None,
        }
    }

    /// Human-readable message suitable for display.
    pub fn message(&self) -> String {
        match self {
            ApiError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Parsed response body, `Null` when there was none.
    pub fn data(&self) -> &Value {
        match self {
            ApiError::Status { data, .. } | ApiError::Decode { data, .. } => data,
            _ => &NULL,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}

/// Pick the message embedded in an error body, falling back to the status.
fn error_message(status: u16, data: &Value) -> String {
    ["message", "error"]
        .iter()
        .find_map(|key| data.get(key).and_then(Value::as_str))
        .filter(|msg| !msg.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Request failed with status {}", status))
}
