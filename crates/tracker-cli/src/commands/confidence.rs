//! Confidence command handlers

use anyhow::{bail, Context, Result};

use tracker_core::sync::{EntryMetadata, RemoteUpdate, TrackerClient};
use tracker_core::{problem_key, ConfidenceLevel};

use crate::commands::sync::sync_quiet;
use crate::output::{describe_level, Output, OutputFormat};

/// Record a level, mirror it to the server, then auto-sync if enabled
pub async fn set(
    client: &TrackerClient,
    key: String,
    level: String,
    metadata: EntryMetadata,
    auto_sync: bool,
    output: &Output,
) -> Result<()> {
    let level: ConfidenceLevel = level.parse()?;

    let update = client
        .set_level(&key, level, metadata)
        .await?
        .context("Failed to save confidence level")?;

    match &update.remote {
        RemoteUpdate::Updated | RemoteUpdate::Skipped => {}
        RemoteUpdate::Failed(e) => {
            output.warn(&format!("Saved locally; server update failed: {}", e));
        }
    }

    if output.is_json() {
        let remote = match update.remote {
            RemoteUpdate::Skipped => "skipped",
            RemoteUpdate::Updated => "updated",
            RemoteUpdate::Failed(_) => "failed",
        };
        output.json(&serde_json::json!({
            "problemKey": update.problem_key,
            "level": update.level,
            "remote": remote,
        }))?;
    } else {
        output.success(&format!("{} = {}", update.problem_key, update.level.label()));
    }

    if auto_sync {
        if let Err(e) = sync_quiet(client).await {
            output.warn(&format!("Auto-sync failed: {:#}", e));
        }
    }

    Ok(())
}

/// Show one problem's level
pub async fn get(client: &TrackerClient, key: String, output: &Output) -> Result<()> {
    let map = client.get_map().await?;
    let Some(level) = map.get(&key) else {
        bail!("No confidence level recorded for '{}'", key);
    };

    match output.format {
        OutputFormat::Human => println!("{}", describe_level(level)),
        OutputFormat::Json => output.json(&serde_json::json!({
            "problemKey": key,
            "level": level,
        }))?,
        OutputFormat::Quiet => println!("{}", level),
    }
    Ok(())
}

/// List every recorded level, optionally only one level
pub async fn list(
    client: &TrackerClient,
    level: Option<String>,
    output: &Output,
) -> Result<()> {
    let mut map = client.get_map().await?;
    if let Some(level) = level {
        let level: ConfidenceLevel = level.parse()?;
        map.retain(|_, stored| stored == level.as_str());
    }
    output.print_map(&map)
}

/// Show counts from the local map or the server
pub async fn stats(client: &TrackerClient, remote: bool, output: &Output) -> Result<()> {
    if remote {
        let stats = client
            .remote_stats()
            .await?
            .context("Failed to fetch server statistics")?;
        output.print_stats(&stats, "server")
    } else {
        let stats = client.local_stats().await?;
        output.print_stats(&stats, "local")
    }
}

/// Print the key a table row would be stored under
pub fn key(page_url: &str, table: usize, row: usize, name: &str, output: &Output) -> Result<()> {
    let key = problem_key(page_url, table, row, name);
    if output.is_json() {
        output.json(&serde_json::json!({ "problemKey": key }))
    } else {
        println!("{}", key);
        Ok(())
    }
}
