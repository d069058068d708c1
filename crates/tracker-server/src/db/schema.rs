//! SQLite schema for accounts, sessions and confidence entries
//!
//! The applied version lives in `PRAGMA user_version`. Each entry of
//! [`MIGRATIONS`] moves the database one version forward.

use rusqlite::{Connection, Result};
use tracing::info;

const MIGRATIONS: &[&str] = &[
    // 1: accounts, cookie sessions and one confidence row per (user, problem).
    // Passwords are only ever stored as Argon2 PHC strings.
    r#"
    CREATE TABLE users (
        id TEXT PRIMARY KEY,
        username TEXT UNIQUE NOT NULL,
        password_hash TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE sessions (
        token TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL
    );
    CREATE INDEX idx_sessions_user_id ON sessions(user_id);
    CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);

    CREATE TABLE confidence (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        problem_key TEXT NOT NULL,
        confidence_level TEXT NOT NULL,
        sheet_name TEXT,
        problem_title TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        UNIQUE (user_id, problem_key)
    );
    CREATE INDEX idx_confidence_user_id ON confidence(user_id);
    "#,
];

/// Version a fully migrated database reports
pub const SCHEMA_VERSION: u32 = MIGRATIONS.len() as u32;

/// Version currently applied to `conn` (0 for a fresh file)
pub fn schema_version(conn: &Connection) -> Result<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

/// Apply every migration newer than the stored version
///
/// Each step runs in its own transaction together with the version bump.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    let current = schema_version(conn)?;

    for (index, sql) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let version = index as u32 + 1;
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        info!(version, "Applied schema migration");
    }

    Ok(())
}
