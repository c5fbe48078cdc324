//! Plain-text rendering of the controller state.

use std::fmt::Write as _;

use client_core::SyncSnapshot;
use shared::{domain::Record, schema::ResourceSchema};

pub fn render(snapshot: &SyncSnapshot, schema: &ResourceSchema) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", schema.collection);
    out.push_str(&render_draft(snapshot, schema));
    if let Some(error) = &snapshot.error {
        let _ = writeln!(out, "error: {error}");
    }
    out.push_str(&render_records(&snapshot.records, schema));
    out
}

pub fn render_draft(snapshot: &SyncSnapshot, schema: &ResourceSchema) -> String {
    let fields = schema
        .fields
        .iter()
        .map(|field| {
            let value = snapshot.pending.get(&field.name).unwrap_or_default();
            format!("{}=[{value}]", field.name)
        })
        .collect::<Vec<_>>()
        .join(" ");

    let status = if snapshot.can_create() {
        "ready, use `add`".to_string()
    } else {
        format!("add disabled until filled: {}", snapshot.pending.missing_fields().join(", "))
    };
    format!("new {}: {fields} ({status})\n", schema.item)
}

pub fn render_records(records: &[Record], schema: &ResourceSchema) -> String {
    if records.is_empty() {
        return format!("(no {})\n", schema.collection);
    }

    let mut out = String::new();
    for record in records {
        let cells = schema
            .fields
            .iter()
            .map(|field| format!("{}: {}", field.label, record.display_value(field)))
            .collect::<Vec<_>>()
            .join(" | ");
        let _ = writeln!(out, "#{:<6} {cells}", record.id.to_string());
    }
    out
}
