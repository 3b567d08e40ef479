//! State subcommands: path-addressed reads and writes against a
//! file-backed local layer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use dyna_store::{DynaManager, FileBackend, LayerKind, LayerStack, PersistConfig, SessionBackend};
use serde_json::Value;

/// Short debounce so a one-shot CLI invocation flushes quickly
const CLI_WRITE_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Args)]
pub struct StateArgs {
    /// Backing file for the durable local layer
    #[arg(long, default_value = ".dyna/state.json")]
    pub store: PathBuf,

    #[command(subcommand)]
    pub command: StateCommand,
}

#[derive(Debug, Subcommand)]
pub enum StateCommand {
    /// Read a path (whole in-process tree when omitted)
    Get { path: Option<String> },
    /// Write a JSON value at a path
    Set { path: String, value: String },
    /// Shallow-merge a JSON object onto a path
    Merge { path: String, value: String },
    /// Reset the tree, re-deriving (or deleting) every persisted entry
    Reset { next: Option<String> },
}

pub async fn execute(args: StateArgs) -> Result<()> {
    let manager = open_manager(&args.store)?;

    match args.command {
        StateCommand::Get { path } => {
            if let Some(path) = &path {
                manager.configure_persist(vec![local_entry(path)]);
            }
            match manager.get(path.as_deref()).await {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => println!("null"),
            }
        }
        StateCommand::Set { path, value } => {
            manager.configure_persist(vec![local_entry(&path)]);
            manager.set(&path, parse_value(&value)?).await;
            wait_for_flush().await;
        }
        StateCommand::Merge { path, value } => {
            manager.configure_persist(vec![local_entry(&path)]);
            manager.merge(&path, parse_value(&value)?).await;
            wait_for_flush().await;
        }
        StateCommand::Reset { next } => {
            // Cover every key already in the durable file so reset can
            // re-derive or delete it
            manager.configure_persist(
                stored_keys(&args.store)?
                    .into_iter()
                    .map(|key| local_entry(&key))
                    .collect(),
            );
            let next = next.as_deref().map(parse_value).transpose()?;
            manager.reset(next).await;
            wait_for_flush().await;
        }
    }

    Ok(())
}

fn open_manager(store: &Path) -> Result<DynaManager> {
    let local = FileBackend::open(store)
        .with_context(|| format!("cannot open state file {}", store.display()))?;
    let stack = LayerStack::new(
        Arc::new(local),
        Arc::new(SessionBackend::new()),
        Arc::new(SessionBackend::new()),
    );
    Ok(DynaManager::builder()
        .with_layers(Arc::new(stack))
        .with_write_delay(CLI_WRITE_DELAY)
        .build())
}

fn local_entry(path: &str) -> PersistConfig {
    PersistConfig::new(path, vec![LayerKind::Local])
}

/// Parse a CLI value argument: JSON when it parses, raw string otherwise
fn parse_value(raw: &str) -> Result<Value> {
    Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
}

/// Storage keys already present in the durable file
fn stored_keys(store: &Path) -> Result<Vec<String>> {
    if !store.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(store)
        .with_context(|| format!("cannot read state file {}", store.display()))?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: serde_json::Map<String, Value> =
        serde_json::from_str(&raw).context("state file is not a JSON object")?;
    Ok(entries.keys().cloned().collect())
}

async fn wait_for_flush() {
    tokio::time::sleep(CLI_WRITE_DELAY * 5).await;
}
