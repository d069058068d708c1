//! Tracker CLI
//!
//! Command-line interface for the confidence tracker: record how well you
//! know each problem, sync with the hosted service and review progress.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tracker_core::sync::{EntryMetadata, ServiceConfig};
use tracker_core::{Config, StorageError, Tracker};

mod commands;
mod output;
mod prompt;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "tracker")]
#[command(about = "Confidence tracker - record and sync how well you know each problem")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file (default: ~/.config/tracker/config.toml)
    #[arg(long, global = true, env = "TRACKER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in to the hosted service
    Login {
        username: Option<String>,
        #[arg(long, env = "TRACKER_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account and log in
    Signup {
        username: Option<String>,
        #[arg(long, env = "TRACKER_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Log out (always succeeds locally)
    Logout,
    /// Show login state and local data
    Status,
    /// Merge local and server data, local winning
    Sync,
    /// Push local data again after a failed sync
    Retry,
    /// Record a confidence level
    Set {
        /// Problem key
        key: String,
        /// none, low, medium, high or expert
        level: String,
        /// Sheet the problem belongs to
        #[arg(long)]
        sheet: Option<String>,
        /// Problem title
        #[arg(long)]
        title: Option<String>,
    },
    /// Show one problem's level
    Get { key: String },
    /// List recorded levels
    #[command(alias = "ls")]
    List {
        /// Only show this level
        #[arg(short, long)]
        level: Option<String>,
    },
    /// Show counts per level
    Stats {
        /// Ask the server instead of counting locally
        #[arg(long)]
        remote: bool,
    },
    /// Print the key for a table row
    Key {
        /// Page URL
        url: String,
        /// Table index on the page
        table: usize,
        /// Row index in the table
        row: usize,
        /// Problem name as shown in the row
        name: String,
    },
    /// Export local data to a JSON file
    Export {
        /// Output file, `-` for stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Merge an exported JSON file into local data
    Import { file: PathBuf },
    /// Remove all local data
    Clear {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Manage local backups
    Backup {
        #[command(subcommand)]
        command: Option<BackupCommands>,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum BackupCommands {
    /// Back up local data now
    Create,
    /// List backups
    #[command(alias = "ls")]
    List,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, api_url, sync_enabled, request_timeout_secs, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

impl Commands {
    /// Whether the command talks to the server and needs the saved session
    fn uses_session(&self) -> bool {
        matches!(
            self,
            Commands::Login { .. }
                | Commands::Signup { .. }
                | Commands::Logout
                | Commands::Status
                | Commands::Sync
                | Commands::Retry
                | Commands::Set { .. }
                | Commands::Stats { remote: true }
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Commands that don't need the store
    match &cli.command {
        Commands::Config { command } => {
            return handle_config_command(command.clone(), cli.config.as_ref(), &output);
        }
        Commands::Key {
            url,
            table,
            row,
            name,
        } => return commands::confidence::key(url, *table, *row, name, &output),
        _ => {}
    }

    let config = Config::load_with_cli_override(cli.config.as_ref())
        .context("Failed to load configuration")?;
    init_logging(&config);

    let tracker = Tracker::open_with_config(config).await?;
    if cli.command.uses_session() && tracker.resume_session().await {
        info!("Resumed saved session");
    }

    let handle = tracker.spawn_service(ServiceConfig::default());
    let client = handle.client.clone();
    let auto_sync = tracker.config().sync_enabled;

    let result = match cli.command {
        Commands::Login { username, password } => {
            commands::account::login(&tracker, &client, username, password, &output).await
        }
        Commands::Signup { username, password } => {
            commands::account::signup(&tracker, &client, username, password, &output).await
        }
        Commands::Logout => commands::account::logout(&client, &output).await,
        Commands::Status => commands::status::show(&tracker, &client, &output).await,
        Commands::Sync => commands::sync::sync(&client, &output).await,
        Commands::Retry => commands::sync::retry(&client, &output).await,
        Commands::Set {
            key,
            level,
            sheet,
            title,
        } => {
            let metadata = EntryMetadata {
                sheet_name: sheet,
                problem_title: title,
            };
            commands::confidence::set(&client, key, level, metadata, auto_sync, &output).await
        }
        Commands::Get { key } => commands::confidence::get(&client, key, &output).await,
        Commands::List { level } => commands::confidence::list(&client, level, &output).await,
        Commands::Stats { remote } => commands::confidence::stats(&client, remote, &output).await,
        Commands::Export { output: path } => {
            commands::data::export(&tracker, path, &output).await
        }
        Commands::Import { file } => commands::data::import(&tracker, file, &output).await,
        Commands::Clear { yes } => commands::data::clear(&tracker, &client, yes, &output).await,
        Commands::Backup { command } => match command {
            Some(BackupCommands::Create) => commands::data::backup_create(&tracker, &output).await,
            Some(BackupCommands::List) | None => commands::data::backup_list(&tracker, &output),
        },
        Commands::Config { .. } | Commands::Key { .. } => Ok(()), // Handled above
    };

    client.shutdown().await;
    result.map_err(with_storage_hint)
}

/// Append what the user can do when the failure came from local storage
fn with_storage_hint(error: anyhow::Error) -> anyhow::Error {
    let hint = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<StorageError>())
        .and_then(StorageError::recovery_suggestion);
    match hint {
        Some(hint) => error.context(hint),
        None => error,
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Initialize logging when TRACKER_LOG is set
///
/// Writes to `log_file` when configured, stderr otherwise.
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("TRACKER_LOG") else {
        return;
    };

    let env_filter = EnvFilter::new(format!(
        "tracker_core={},tracker_cli={}",
        log_level, log_level
    ));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    // Ignore error if already initialized
    match &config.log_file {
        Some(path) => match File::create(path) {
            Ok(file) => {
                let _ = builder.with_ansi(false).with_writer(file).try_init();
            }
            Err(e) => {
                eprintln!("Warning: Could not create log file {:?}: {}", path, e);
                let _ = builder.with_writer(std::io::stderr).try_init();
            }
        },
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}
