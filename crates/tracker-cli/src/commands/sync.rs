//! Sync command handlers

use anyhow::{bail, Result};

use tracker_core::sync::TrackerClient;
use tracker_core::{RemoteError, SyncError};

use crate::output::Output;

/// Sync with the remote server
pub async fn sync(client: &TrackerClient, output: &Output) -> Result<()> {
    require_login(client).await?;

    output.message("Syncing...");
    match client.sync().await? {
        Ok(report) => output.print_report(&report),
        Err(e) => Err(explain(e)),
    }
}

/// Re-send the local map after a failed push
pub async fn retry(client: &TrackerClient, output: &Output) -> Result<()> {
    require_login(client).await?;

    match client.retry_push().await? {
        Ok(report) => output.print_report(&report),
        Err(e) => Err(explain(e)),
    }
}

/// Sync quietly (for auto-sync) - no output on success
pub async fn sync_quiet(client: &TrackerClient) -> Result<()> {
    if !client.status().await?.auth.is_authenticated() {
        return Ok(());
    }
    client.sync().await?.map(|_| ()).map_err(explain)
}

async fn require_login(client: &TrackerClient) -> Result<()> {
    if !client.status().await?.auth.is_authenticated() {
        bail!("Not logged in. Log in with:\n  tracker login");
    }
    Ok(())
}

/// Attach the next step to a sync failure
fn explain(error: SyncError) -> anyhow::Error {
    let hint = match &error {
        SyncError::NotAuthenticated => Some("Log in with: tracker login"),
        SyncError::PartialSync { .. } => {
            Some("Local data is merged and saved. Push it with: tracker retry")
        }
        SyncError::Fetch(RemoteError::Unauthorized(_)) => {
            Some("Session expired. Log in again with: tracker login")
        }
        SyncError::Fetch(e) if e.is_retryable() => Some("Nothing was changed. Try again later."),
        _ => None,
    };
    match hint {
        Some(hint) => anyhow::Error::new(error).context(hint),
        None => anyhow::Error::new(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_sync_hint() {
        let error = explain(SyncError::PartialSync {
            merged: Default::default(),
            source: RemoteError::Network("timed out".to_string()),
        });
        assert!(error.to_string().contains("tracker retry"));
    }

    #[test]
    fn test_in_progress_has_no_hint() {
        let error = explain(SyncError::InProgress);
        assert_eq!(error.to_string(), SyncError::InProgress.to_string());
    }
}
