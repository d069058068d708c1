//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use tracker_core::Config;

use crate::output::{Output, OutputFormat};

/// Keys accepted by `config set`
const KEYS: &str = "data_dir, api_url, sync_enabled, request_timeout_secs, log_file";

/// Print the effective configuration and where it was read from
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    let file = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);

    match output.format {
        OutputFormat::Json => output.json(&serde_json::json!({
            "configFile": file,
            "dataDir": config.data_dir,
            "apiUrl": config.api_url,
            "syncEnabled": config.sync_enabled,
            "requestTimeoutSecs": config.request_timeout_secs,
            "logFile": config.log_file,
        }))?,
        OutputFormat::Quiet => println!("{}", file.display()),
        OutputFormat::Human => {
            let log_file = match &config.log_file {
                Some(path) => path.display().to_string(),
                None => "stderr".to_string(),
            };
            let rows = [
                ("data_dir", config.data_dir.display().to_string()),
                ("api_url", config.api_url.clone()),
                ("sync_enabled", config.sync_enabled.to_string()),
                ("request_timeout_secs", config.request_timeout_secs.to_string()),
                ("log_file", log_file),
            ];
            println!("{}", file.display());
            for (key, value) in rows {
                println!("  {:<21} {}", key, value);
            }
        }
    }

    Ok(())
}

/// Validate and store one key in the config file
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    let file = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&file)
        .context("Failed to save configuration")?;

    output.success(&format!("{} = {}", key, value));
    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => config.data_dir = value.into(),
        "api_url" => {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                bail!("api_url must start with http:// or https://");
            }
            config.api_url = value.trim_end_matches('/').to_string();
        }
        "sync_enabled" => {
            config.sync_enabled = value
                .parse()
                .context("Invalid value for sync_enabled. Use 'true' or 'false'.")?;
        }
        "request_timeout_secs" => {
            let secs: u64 = value
                .parse()
                .context("Invalid value for request_timeout_secs. Use a whole number of seconds.")?;
            config.request_timeout_secs = secs.max(1);
        }
        "log_file" => {
            config.log_file = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.into())
            };
        }
        _ => bail!("Unknown key '{}' (expected one of: {})", key, KEYS),
    }
    Ok(())
}
