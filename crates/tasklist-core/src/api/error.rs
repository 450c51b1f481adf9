use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::InvalidHeaderValue;
use serde_json::Value;
use thiserror::Error;

use super::body::ResponseBody;
use super::credentials::InvalidCredential;

/// Errors surfaced by the request executor and the services built on it.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// The session could not be refreshed; credentials have been cleared.
    #[error("Session expired, please sign in again ({0})")]
    AuthExpired(Arc<ApiError>),

    #[error("No refresh credential available")]
    MissingRefreshCredential,

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Server returned an unusable credential: {0}")]
    Credential(#[from] InvalidCredential),

    #[error("Invalid header value: {0}")]
    Header(#[from] InvalidHeaderValue),

    #[error("Invalid API URL '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl ApiError {
    /// HTTP status of a rejected request, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Request(err) => Some(err.status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ApiError::AuthExpired(_))
    }
}

/// A non-2xx response.
///
/// `message` is the server's `detail` (or `message`) field when present,
/// otherwise the status reason phrase.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RequestError {
    pub status: StatusCode,
    pub message: String,
    pub body: ResponseBody,
}

impl RequestError {
    pub fn new(status: StatusCode, body: ResponseBody) -> Self {
        let message = body
            .as_json()
            .and_then(server_message)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            });
        Self {
            status,
            message,
            body,
        }
    }
}

/// Extracts a human-readable message from an error payload.
///
/// Handles both `{"detail": "..."}` and validation errors shaped as
/// `{"detail": [{"msg": "..."}, ...]}`.
fn server_message(payload: &Value) -> Option<String> {
    match payload.get("detail") {
        Some(Value::String(detail)) if !detail.is_empty() => return Some(detail.clone()),
        Some(Value::Array(items)) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            if !messages.is_empty() {
                return Some(messages.join("; "));
            }
        }
        _ => {}
    }

    payload
        .get("message")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}
