//! Session cookie persistence
//!
//! Keeps the server's session cookie between runs so a login survives
//! process restarts. The file holds the raw cookie value and nothing else.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Persistent session token
#[derive(Debug, Default)]
pub struct SessionState {
    /// Current session cookie value
    token: Option<String>,
    /// Path to persist the token
    path: Option<PathBuf>,
}

impl SessionState {
    /// Create a session state (in-memory only)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session state that persists to disk
    pub fn with_path(path: PathBuf) -> Result<Self> {
        let mut state = Self {
            token: None,
            path: Some(path.clone()),
        };

        if path.exists() {
            state.load()?;
        }

        Ok(state)
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Replace the token and persist it
    pub fn set(&mut self, token: String) -> Result<()> {
        if self.token.as_deref() == Some(token.as_str()) {
            return Ok(());
        }
        self.token = Some(token);
        self.save()
    }

    /// Forget the token and delete the file
    pub fn clear(&mut self) -> Result<()> {
        self.token = None;

        let Some(ref path) = self.path else {
            return Ok(());
        };
        if path.exists() {
            fs::remove_file(path).context("Failed to remove session file")?;
        }
        Ok(())
    }

    fn save(&self) -> Result<()> {
        let (Some(path), Some(token)) = (&self.path, &self.token) else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = open_private(path).context("Failed to open session file")?;
        file.write_all(token.as_bytes()).context("Failed to save session")?;
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        let raw = fs::read_to_string(path).context("Failed to read session")?;
        let token = raw.trim();
        self.token = (!token.is_empty()).then(|| token.to_string());
        Ok(())
    }
}

/// Open for writing, readable by the owner only before any byte is written
#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies on creation; tighten a file left by an older run
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::File::create(path)
}
