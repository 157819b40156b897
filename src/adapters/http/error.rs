//! Chat service client error types.

use serde_json::Value;
use thiserror::Error;

/// Errors that can occur while talking to the chat service.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure (connect, TLS, interrupted body).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// 401 or 403. Not retried.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Error reported in-band by the reply stream.
    #[error("{0}")]
    Stream(String),
}

impl ApiError {
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = detail_message(body);
        match status {
            401 | 403 => ApiError::Unauthorized(message),
            404 => ApiError::NotFound(message),
            _ => ApiError::Status { status, message },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }
}

/// Extracts the service's `detail` field, falling back to the raw body.
fn detail_message(body: &str) -> String {
    let trimmed = body.trim();
    let detail = serde_json::from_str::<Value>(trimmed)
        .ok()
        .and_then(|value| value.get("detail").cloned());

    match detail {
        Some(Value::String(message)) => message,
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.get("msg").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("; "),
        _ if trimmed.is_empty() => "empty response body".to_string(),
        _ => trimmed.to_string(),
    }
}
