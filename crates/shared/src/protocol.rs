use serde::{Deserialize, Serialize};

/// Acknowledgement returned by update and delete calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    #[serde(default)]
    pub message: Option<String>,
}

impl Acknowledgement {
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }

    /// Any JSON body is accepted; only an object with a string `message` carries text.
    pub fn from_value(value: &serde_json::Value) -> Self {
        Self {
            message: value
                .get("message")
                .and_then(|message| message.as_str())
                .map(str::to_string),
        }
    }
}
