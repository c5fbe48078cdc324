//! Resource descriptions: where a collection lives and which fields it has.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::{
    domain::{PendingRecord, Record},
    error::NumericInputError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    /// Alternate wire names a view may read the value from.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl FieldSpec {
    pub fn text(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Text,
            aliases: Vec::new(),
        }
    }

    pub fn number(name: &str, label: &str) -> Self {
        Self {
            kind: FieldKind::Number,
            ..Self::text(name, label)
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSchema {
    /// Plural path segment used to list the collection, e.g. `users`.
    pub collection: String,
    /// Singular path segment used for create/update/delete, e.g. `user`.
    pub item: String,
    pub fields: Vec<FieldSpec>,
}

impl ResourceSchema {
    pub fn users() -> Self {
        Self {
            collection: "users".into(),
            item: "user".into(),
            fields: vec![
                FieldSpec::text("name", "Name"),
                FieldSpec::text("email", "Email"),
            ],
        }
    }

    pub fn payments() -> Self {
        Self {
            collection: "payments".into(),
            item: "payment".into(),
            fields: vec![
                FieldSpec::text("name", "Name"),
                FieldSpec::number("paymentAmount", "Payment amount").with_alias("payment_amount"),
            ],
        }
    }

    pub fn builtin(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "users" | "user" => Some(Self::users()),
            "payments" | "payment" => Some(Self::payments()),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Builds the create body from raw draft text, parsing numeric fields.
    pub fn create_body(
        &self,
        pending: &PendingRecord,
    ) -> Result<Map<String, Value>, NumericInputError> {
        let mut body = Map::new();
        for field in &self.fields {
            let raw = pending.get(&field.name).unwrap_or_default();
            let value = match field.kind {
                FieldKind::Text => Value::String(raw.to_string()),
                FieldKind::Number => number_value(field, raw)?,
            };
            body.insert(field.name.clone(), value);
        }
        Ok(body)
    }

    /// Copy of `record` with numeric fields holding JSON numbers under their
    /// primary name.
    ///
    /// Locally edited numeric fields carry raw text; those are parsed here.
    /// When only an alias is present (the payments list reports
    /// `payment_amount`), its value is parsed and written under the primary
    /// name. A numeric field missing under every name fails like empty input.
    pub fn coerce_record(&self, record: &Record) -> Result<Record, NumericInputError> {
        let mut coerced = record.clone();
        for field in self.fields.iter().filter(|f| f.kind == FieldKind::Number) {
            let current = std::iter::once(&field.name)
                .chain(field.aliases.iter())
                .find_map(|name| record.fields.get(name));
            let value = match current {
                Some(Value::Number(number)) => Value::Number(number.clone()),
                Some(Value::String(raw)) => number_value(field, raw)?,
                Some(other) => {
                    return Err(NumericInputError::new(field, other.to_string()));
                }
                None => return Err(NumericInputError::new(field, "")),
            };
            coerced.fields.insert(field.name.clone(), value);
        }
        Ok(coerced)
    }
}

/// Parses the leading number of user-entered text, the way a browser's
/// `parseFloat` does: `"20abc"` and `"20 USD"` give 20. Fails when no
/// prefix is a number, and for non-finite results, which JSON cannot carry.
pub fn parse_number(raw: &str) -> Option<f64> {
    let text = raw.trim_start();
    let bytes = text.as_bytes();
    let digits_from = |mut at: usize| {
        while at < bytes.len() && bytes[at].is_ascii_digit() {
            at += 1;
        }
        at
    };

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let int_end = digits_from(end);
    let mut mantissa_digits = int_end - end;
    end = int_end;
    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - (end + 1);
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_start = end + 1;
        if matches!(bytes.get(exp_start), Some(b'+' | b'-')) {
            exp_start += 1;
        }
        let exp_end = digits_from(exp_start);
        if exp_end > exp_start {
            end = exp_end;
        }
    }

    text[..end]
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

fn number_value(field: &FieldSpec, raw: &str) -> Result<Value, NumericInputError> {
    parse_number(raw)
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| NumericInputError::new(field, raw))
}
