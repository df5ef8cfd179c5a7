//! HTTP error mapping utilities

use crate::config::GuestRateLimitSentinel;
use crate::protocol::{ErrorEvent, ErrorKind};
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Failures while opening or reading a stream
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection could not be established (DNS, refused, TLS)
    #[error("Connection failed: {message}")]
    Connect { message: String },

    /// Connecting timed out
    #[error("Request timeout")]
    Timeout,

    /// Backend answered with a non-2xx status
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        message: String,
        /// Parsed JSON body, when the backend sent one
        payload: Option<Value>,
    },

    /// Body read failed mid-stream (reset, truncated chunk)
    #[error("Failed to read response body: {message}")]
    Read { message: String },

    #[error("{message}")]
    Other { message: String },
}

impl TransportError {
    /// How the failure is presented to the caller.
    ///
    /// Only an error body carrying the guest sentinel is special; the status
    /// code alone never decides it.
    pub fn kind(&self, sentinel: &GuestRateLimitSentinel) -> ErrorKind {
        match self {
            Self::Status {
                payload: Some(payload),
                ..
            } if sentinel.matches(payload) => ErrorKind::RateLimitedGuest,
            _ => ErrorKind::Generic,
        }
    }

    /// Convert into the event handed to `on_error`
    pub fn to_error_event(&self, sentinel: &GuestRateLimitSentinel) -> ErrorEvent {
        match self.kind(sentinel) {
            ErrorKind::RateLimitedGuest => match self {
                Self::Status { message, .. } => ErrorEvent::rate_limited_guest(message.clone()),
                other => ErrorEvent::rate_limited_guest(other.to_string()),
            },
            ErrorKind::Generic => ErrorEvent::generic(self.to_string()),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect {
                message: err.to_string(),
            }
        } else if err.is_body() || err.is_decode() {
            TransportError::Read {
                message: err.to_string(),
            }
        } else {
            TransportError::Other {
                message: err.to_string(),
            }
        }
    }
}

/// Map a non-2xx status code and response body to a [`TransportError`]
pub fn map_http_error(status: StatusCode, body: Option<String>, request_id: Uuid) -> TransportError {
    let payload = body
        .as_deref()
        .and_then(|b| serde_json::from_str::<Value>(b).ok());

    let message = payload
        .as_ref()
        .and_then(extract_error_message)
        .or_else(|| body.filter(|b| !b.trim().is_empty()))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

    warn!(
        "HTTP {} error: {} [request_id: {}]",
        status.as_u16(),
        message,
        request_id
    );

    TransportError::Status {
        status: status.as_u16(),
        message,
        payload,
    }
}

/// Extract a human readable message from common error body shapes
fn extract_error_message(json: &Value) -> Option<String> {
    // { "message": "..." }
    if let Some(message) = json.get("message").and_then(|v| v.as_str()) {
        return Some(message.to_string());
    }

    // { "detail": "..." }
    if let Some(detail) = json.get("detail").and_then(|v| v.as_str()) {
        return Some(detail.to_string());
    }

    // { "error": { "message": "..." } } or { "error": "..." }
    match json.get("error") {
        Some(Value::Object(error)) => error
            .get("message")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        Some(Value::String(error)) => Some(error.clone()),
        _ => None,
    }
}
