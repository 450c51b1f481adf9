use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::query::Query;

/// Outgoing request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Serialized as JSON with `Content-Type: application/json`.
    Json(Value),
    /// Sent as `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
}

/// Everything about a request except its method and path.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Query,
    pub body: Option<RequestBody>,
    pub headers: HeaderMap,
}

impl RequestOptions {
    pub fn with_query(query: Query) -> Self {
        Self {
            query,
            ..Self::default()
        }
    }

    pub fn json(value: Value) -> Self {
        Self {
            body: Some(RequestBody::Json(value)),
            ..Self::default()
        }
    }
}

/// Decoded response payload.
///
/// JSON responses that fail to parse (including empty bodies) decode to
/// `Json(Value::Null)`; anything not declared as JSON is kept as text.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            ResponseBody::Text(_) => None,
        }
    }

    /// # Errors
    /// Returns an error if the payload does not match `T`.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        match self {
            ResponseBody::Json(value) => serde_json::from_value(value),
            ResponseBody::Text(text) => serde_json::from_str(&text),
        }
    }
}
