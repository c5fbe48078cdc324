use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::FieldSpec;

/// Raised before any request is made when numeric input does not parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{label} must be a number")]
pub struct NumericInputError {
    pub field: String,
    pub label: String,
    pub value: String,
}

impl NumericInputError {
    pub fn new(field: &FieldSpec, value: impl Into<String>) -> Self {
        Self {
            field: field.name.clone(),
            label: field.label.clone(),
            value: value.into(),
        }
    }
}

/// Error body returned by the remote collection, when it sends one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Error)]
#[error("HTTP {status}: {message}")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Prefers the JSON `message`/`error` field and falls back to the raw text.
    pub fn from_body(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<ApiErrorBody>(body)
            .ok()
            .and_then(|body| body.message.or(body.error));
        let message = match parsed {
            Some(message) => message,
            None if body.trim().is_empty() => "empty response body".to_string(),
            None => body.trim().to_string(),
        };
        Self::new(status, message)
    }
}
