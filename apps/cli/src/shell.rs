//! Interactive line-oriented front end over a [`ListSyncController`].

use std::sync::Arc;

use anyhow::Result;
use client_core::{ListSyncController, SyncError};
use shared::domain::RecordId;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::view;

pub const HELP: &str = "\
commands:
  load                       re-fetch the list
  set FIELD VALUE            type into the new-record form
  add                        create the new record
  edit ID FIELD VALUE        change a field locally
  commit ID                  send a locally edited record
  delete ID                  delete a record
  show                       print the current state
  help                       this text
  quit                       leave
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Load,
    Set { field: String, value: String },
    Add,
    Edit { id: RecordId, field: String, value: String },
    Commit(RecordId),
    Delete(RecordId),
    Show,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Option<ShellCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = split_word(line);

    let command = match verb.to_ascii_lowercase().as_str() {
        "load" | "reload" => ShellCommand::Load,
        "set" => {
            let (field, value) = split_word(rest);
            if field.is_empty() {
                return Err("usage: set FIELD VALUE".into());
            }
            ShellCommand::Set {
                field: field.to_string(),
                value: value.to_string(),
            }
        }
        "add" => ShellCommand::Add,
        "edit" => {
            let (id, rest) = split_word(rest);
            let (field, value) = split_word(rest);
            if id.is_empty() || field.is_empty() {
                return Err("usage: edit ID FIELD VALUE".into());
            }
            ShellCommand::Edit {
                id: parse_id(id),
                field: field.to_string(),
                value: value.to_string(),
            }
        }
        "commit" | "update" => ShellCommand::Commit(required_id(rest, "commit")?),
        "delete" | "rm" => ShellCommand::Delete(required_id(rest, "delete")?),
        "show" | "ls" => ShellCommand::Show,
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" => ShellCommand::Quit,
        other => return Err(format!("unknown command '{other}'; try `help`")),
    };
    Ok(Some(command))
}

fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(at) => (&input[..at], input[at..].trim_start()),
        None => (input, ""),
    }
}

pub fn parse_id(raw: &str) -> RecordId {
    match raw.parse::<RecordId>() {
        Ok(id) => id,
        Err(never) => match never {},
    }
}

fn required_id(rest: &str, verb: &str) -> Result<RecordId, String> {
    let (id, _) = split_word(rest);
    if id.is_empty() {
        return Err(format!("usage: {verb} ID"));
    }
    Ok(parse_id(id))
}

/// What the loop should print after running one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Render,
    Message(String),
    Quit,
}

pub async fn execute(controller: &ListSyncController, command: ShellCommand) -> Outcome {
    let result = match command {
        ShellCommand::Load => controller.load().await,
        ShellCommand::Set { field, value } => {
            if !controller.start_edit(&field, value).await {
                return Outcome::Message(format!("unknown field '{field}'"));
            }
            Ok(())
        }
        ShellCommand::Add => {
            if !controller.can_create().await {
                let missing = controller.pending().await.missing_fields();
                return Outcome::Message(format!(
                    "add is disabled until every field is filled (missing: {})",
                    missing.join(", ")
                ));
            }
            controller.create().await
        }
        ShellCommand::Edit { id, field, value } => {
            if !controller.edit_field(&id, &field, value).await {
                return Outcome::Message(format!("no editable field '{field}' on record {id}"));
            }
            Ok(())
        }
        ShellCommand::Commit(id) => controller.commit_update(&id).await,
        ShellCommand::Delete(id) => controller.delete_record(&id).await,
        ShellCommand::Show => Ok(()),
        ShellCommand::Help => return Outcome::Message(HELP.to_string()),
        ShellCommand::Quit => return Outcome::Quit,
    };

    match result {
        // the error string is part of the rendered state
        Ok(()) | Err(SyncError::RemoteCallFailed { .. } | SyncError::InvalidNumericInput(_)) => {
            Outcome::Render
        }
        Err(other) => Outcome::Message(other.to_string()),
    }
}

pub async fn run(controller: Arc<ListSyncController>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let _ = controller.load().await;
    stdout
        .write_all(view::render(&controller.snapshot().await, controller.schema()).as_bytes())
        .await?;

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(usage) => {
                stdout.write_all(format!("{usage}\n").as_bytes()).await?;
                continue;
            }
        };

        let text = match execute(&controller, command).await {
            Outcome::Quit => break,
            Outcome::Message(message) if message.ends_with('\n') => message,
            Outcome::Message(message) => format!("{message}\n"),
            Outcome::Render => view::render(&controller.snapshot().await, controller.schema()),
        };
        stdout.write_all(text.as_bytes()).await?;
    }

    Ok(())
}

#[cfg(test)]
#[path = "tests/shell_tests.rs"]
mod tests;
