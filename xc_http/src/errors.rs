use std::fmt;

use bytes::Bytes;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to encode request body: {0}")]
    Encoding(#[source] serde_json::Error),

    #[error("Failed to sign request: {0}")]
    Signature(String),

    #[error("HTTP transport failed: {0}")]
    Transport(#[source] BoxError),

    #[error("Failed to decode response body: {0}")]
    Decoding(#[source] serde_json::Error),

    #[error("API error: {status} - {body}")]
    Api { status: StatusCode, body: ApiErrorBody },

    /// Non-200 response whose body is not a JSON error payload
    #[error("API error: {status} - undecodable body: {source}")]
    UndecodableApiError {
        status: StatusCode,
        body: Bytes,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    /// HTTP status of the response that produced this error, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Api { status, .. } | ClientError::UndecodableApiError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the server answered 429 Too Many Requests
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(StatusCode::TOO_MANY_REQUESTS)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(Box::new(err))
    }
}

/// Error payload returned by the exchange on any non-200 response.
///
/// `message` is the only field the API guarantees; everything else the
/// server sends is kept in `fields`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: String,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ApiErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), fields: Map::new() }
    }

    /// Look up an extra field the server attached to the error
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() { write!(f, "<no message>") } else { write!(f, "{}", self.message) }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_body_keeps_extra_fields() {
        let body: ApiErrorBody = serde_json::from_str(r#"{"message":"insufficient funds","code":"E42","retry":false}"#).unwrap();

        assert_eq!(body.message, "insufficient funds");
        assert_eq!(body.field("code"), Some(&Value::from("E42")));
        assert_eq!(body.field("retry"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_api_error_body_without_message() {
        let body: ApiErrorBody = serde_json::from_str(r#"{"error":"bad"}"#).unwrap();
        assert!(body.message.is_empty());
        assert_eq!(body.to_string(), "<no message>");
    }

    #[test]
    fn test_rate_limited_classification() {
        let err = ClientError::Api { status: StatusCode::TOO_MANY_REQUESTS, body: ApiErrorBody::new("slow down") };
        assert!(err.is_rate_limited());
        assert_eq!(err.status(), Some(StatusCode::TOO_MANY_REQUESTS));

        let err = ClientError::Api { status: StatusCode::NOT_FOUND, body: ApiErrorBody::new("not found") };
        assert!(!err.is_rate_limited());
        assert_eq!(err.to_string(), "API error: 404 Not Found - not found");

        assert_eq!(ClientError::Config("missing".into()).status(), None);
    }

    #[test]
    fn test_undecodable_api_error_keeps_status() {
        let source = serde_json::from_str::<ApiErrorBody>("Too Many Requests").unwrap_err();
        let err = ClientError::UndecodableApiError {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: Bytes::from_static(b"Too Many Requests"),
            source,
        };

        assert!(err.is_rate_limited());
        assert!(err.to_string().starts_with("API error: 429 Too Many Requests - undecodable body"));
    }
}
