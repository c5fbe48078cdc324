use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use client_core::{HttpRemoteCollection, ListSyncController};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod shell;
mod view;

use config::load_settings;
use shell::parse_id;

#[derive(Parser, Debug)]
#[command(name = "listsync", about = "Keep a local list in sync with a REST collection")]
struct Cli {
    /// TOML config file; defaults to ./listsync.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    base_url: Option<String>,
    /// `users` or `payments`.
    #[arg(long)]
    resource: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the remote collection.
    List,
    /// Create a record from FIELD=VALUE pairs.
    Add {
        #[arg(value_parser = parse_assignment, required = true)]
        fields: Vec<(String, String)>,
    },
    /// Change fields of an existing record and send it.
    Update {
        id: String,
        #[arg(value_parser = parse_assignment, required = true)]
        fields: Vec<(String, String)>,
    },
    Delete {
        id: String,
    },
    /// Interactive session.
    Shell,
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => {
            Ok((field.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected FIELD=VALUE, got '{raw}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?
        .with_overrides(cli.base_url.clone(), cli.resource.clone())
        .resolve()?;

    let filter = EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    info!(base_url = %settings.base_url, resource = %settings.schema.collection, "starting");

    let remote = HttpRemoteCollection::new(&settings.base_url, settings.schema.clone())?;
    let controller = ListSyncController::new(settings.schema, Arc::new(remote));

    match cli.command {
        Command::List => {
            controller.load().await?;
        }
        Command::Add { fields } => {
            for (field, value) in fields {
                if !controller.start_edit(&field, value).await {
                    bail!("unknown field '{field}' for {}", controller.schema().item);
                }
            }
            controller.create().await?;
        }
        Command::Update { id, fields } => {
            let id = parse_id(&id);
            controller.load().await?;
            for (field, value) in fields {
                if !controller.edit_field(&id, &field, value).await {
                    bail!("cannot set '{field}' on {} {id}", controller.schema().item);
                }
            }
            controller.commit_update(&id).await?;
        }
        Command::Delete { id } => {
            let id = parse_id(&id);
            controller.load().await?;
            controller.delete_record(&id).await?;
        }
        Command::Shell => return shell::run(controller).await,
    }

    print!(
        "{}",
        view::render_records(&controller.records().await, controller.schema())
    );
    Ok(())
}
