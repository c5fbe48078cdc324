use std::{convert::Infallible, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::{FieldSpec, ResourceSchema};

/// Server-assigned record identifier. Integer ids and string ids both
/// round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{id}"),
            RecordId::Text(id) => f.write_str(id),
        }
    }
}

impl FromStr for RecordId {
    type Err = Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        Ok(match raw.parse::<i64>() {
            Ok(id) => RecordId::Int(id),
            Err(_) => RecordId::Text(raw.to_string()),
        })
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        RecordId::Int(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId::Text(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Text shown for `field` in a view: the primary name first, then any alias.
    pub fn display_value(&self, field: &FieldSpec) -> String {
        std::iter::once(field.name.as_str())
            .chain(field.aliases.iter().map(String::as_str))
            .find_map(|name| self.fields.get(name))
            .map(value_as_text)
            .unwrap_or_default()
    }
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Raw user input for a record that does not exist on the server yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingRecord {
    values: Vec<(String, String)>,
}

impl PendingRecord {
    pub fn for_schema(schema: &ResourceSchema) -> Self {
        Self {
            values: schema
                .fields
                .iter()
                .map(|field| (field.name.clone(), String::new()))
                .collect(),
        }
    }

    /// Returns false when `field` is not part of this draft.
    pub fn set(&mut self, field: &str, value: impl Into<String>) -> bool {
        match self.values.iter_mut().find(|(name, _)| name == field) {
            Some((_, slot)) => {
                *slot = value.into();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    pub fn missing_fields(&self) -> Vec<String> {
        self.values
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// True when the draft has fields and none of them is empty. A draft
    /// built without a schema is never complete.
    pub fn is_complete(&self) -> bool {
        !self.values.is_empty() && self.values.iter().all(|(_, value)| !value.is_empty())
    }

    pub fn clear(&mut self) {
        for (_, value) in &mut self.values {
            value.clear();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}
