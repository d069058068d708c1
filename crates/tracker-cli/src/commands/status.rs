//! Status command handler

use anyhow::Result;
use serde_json::{json, Value};

use tracker_core::sync::{ServiceStatus, TrackerClient};
use tracker_core::{ConfidenceStats, Config, Tracker};

use crate::output::{Output, OutputFormat};

/// Show login state, sync configuration and local data
pub async fn show(tracker: &Tracker, client: &TrackerClient, output: &Output) -> Result<()> {
    let config = tracker.config();
    let status = client.status().await?;
    let stats = client.local_stats().await?;
    let username = status.auth.user().map(|u| u.username.clone());

    match output.format {
        OutputFormat::Json => output.json(&status_json(config, &status, &stats))?,
        OutputFormat::Quiet => {
            println!("{}", status.auth.label());
        }
        OutputFormat::Human => {
            println!("Tracker Status");
            println!("==============");
            println!();
            println!("Account:");
            match &username {
                Some(name) => println!("  Logged in as {}", name),
                None => println!("  Not logged in"),
            }
            if let tracker_core::AuthState::AuthError(message) = &status.auth {
                println!("  Last error: {}", message);
            }
            println!();
            println!("Server:");
            println!("  URL:       {}", config.api_url);
            println!(
                "  Auto-sync: {}",
                if config.sync_enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            println!();
            println!("Local data:");
            println!("  Location: {}", config.data_dir.display());
            println!("  Problems: {}", status.entries);
            println!("  Progress: {}%", stats.progress_percent());
        }
    }

    Ok(())
}

fn status_json(config: &Config, status: &ServiceStatus, stats: &ConfidenceStats) -> Value {
    json!({
        "auth": status.auth.label(),
        "user": status.auth.user().map(|u| u.username.as_str()),
        "apiUrl": config.api_url,
        "syncEnabled": config.sync_enabled,
        "lastSyncAt": status.last_sync_at,
        "dataDir": config.data_dir,
        "entries": status.entries,
        "progressPercent": stats.progress_percent(),
    })
}
