//! Export, import, clear and backup handlers

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;

use tracker_core::storage::MAX_BACKUPS;
use tracker_core::sync::TrackerClient;
use tracker_core::transfer::{self, ExportBundle};
use tracker_core::{LocalStore, Tracker};

use crate::output::{Output, OutputFormat};
use crate::prompt::confirm;

/// Write the local map as an export bundle
///
/// `-` writes to stdout.
pub async fn export(tracker: &Tracker, path: Option<PathBuf>, output: &Output) -> Result<()> {
    let bundle = transfer::export(tracker.local()).await;
    let json = bundle.to_json()?;

    let path = path
        .unwrap_or_else(|| PathBuf::from(ExportBundle::file_name(Local::now().date_naive())));
    if path.as_os_str() == "-" {
        println!("{}", json);
        return Ok(());
    }

    std::fs::write(&path, json).with_context(|| format!("Failed to write {:?}", path))?;
    output.success(&format!(
        "Exported {} entries to {}",
        bundle.data.len(),
        path.display()
    ));
    Ok(())
}

/// Merge an export bundle into the local map, imported values winning
pub async fn import(tracker: &Tracker, path: PathBuf, output: &Output) -> Result<()> {
    let json =
        std::fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;

    backup_before(tracker, "import", output).await;
    let count = transfer::import(tracker.local(), &json)
        .await
        .with_context(|| format!("Failed to import {:?}", path))?;

    output.success(&format!("Imported {} entries", count));
    Ok(())
}

/// Remove every local entry
pub async fn clear(
    tracker: &Tracker,
    client: &TrackerClient,
    yes: bool,
    output: &Output,
) -> Result<()> {
    let entries = client.get_map().await?.len();

    if !yes && output.should_prompt() {
        println!("Clear {} local entries (the server copy is kept)", entries);
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    backup_before(tracker, "clear", output).await;
    client
        .clear()
        .await?
        .context("Failed to clear local data")?;

    output.success(&format!("Cleared {} entries", entries));
    Ok(())
}

/// Snapshot the local map now
pub async fn backup_create(tracker: &Tracker, output: &Output) -> Result<()> {
    let map = tracker.local().get().await;
    let backup = tracker
        .backups()
        .create(&map)
        .context("Failed to write backup")?;

    match output.format {
        OutputFormat::Quiet => println!("{}", backup.path.display()),
        _ => output.success(&format!(
            "Backed up {} entries to {}",
            map.len(),
            backup.path.display()
        )),
    }
    Ok(())
}

/// List backups, newest first
pub fn backup_list(tracker: &Tracker, output: &Output) -> Result<()> {
    let backups = tracker.backups().list().context("Failed to list backups")?;

    match output.format {
        OutputFormat::Human => {
            if backups.is_empty() {
                println!("No backups found.");
                return Ok(());
            }
            for backup in &backups {
                println!("{}", backup.name);
            }
            println!(
                "\n{} backup(s) in {} (newest {} kept)",
                backups.len(),
                tracker.backups().dir().display(),
                MAX_BACKUPS
            );
        }
        OutputFormat::Json => {
            let paths: Vec<_> = backups.iter().map(|b| &b.path).collect();
            output.json(&paths)?;
        }
        OutputFormat::Quiet => {
            for backup in &backups {
                println!("{}", backup.path.display());
            }
        }
    }
    Ok(())
}

/// Back up before a destructive change; failure only warns
async fn backup_before(tracker: &Tracker, action: &str, output: &Output) {
    let map = tracker.local().get().await;
    if map.is_empty() {
        return;
    }
    if let Err(e) = tracker.backups().create(&map) {
        output.warn(&format!("Could not back up before {}: {}", action, e));
    }
}
