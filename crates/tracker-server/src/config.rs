//! Server configuration
//!
//! Parsed from command-line flags, each with an environment fallback.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use chrono::Duration;
use clap::Parser;

/// Hosted confidence tracker API
#[derive(Parser, Debug, Clone)]
#[command(name = "tracker-server")]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 5001)]
    pub port: u16,

    /// Address to bind
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// SQLite database file
    #[arg(long, env = "DATABASE_PATH", default_value = "tracker.db")]
    pub database: PathBuf,

    /// Session lifetime in days
    #[arg(long, env = "SESSION_TTL_DAYS", default_value_t = 7)]
    pub session_ttl_days: u32,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::days(i64::from(self.session_ttl_days.max(1)))
    }
}
