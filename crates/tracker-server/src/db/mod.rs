//! SQLite persistence for the hosted service
//!
//! ## Tables
//!
//! - `users` - Accounts with Argon2 password hashes
//! - `sessions` - Cookie tokens with an expiry
//! - `confidence` - One row per (user, problem key)
//!
//! Queries are synchronous; handlers reach them through [`Database::run`],
//! which moves the work onto the blocking pool.

pub mod schema;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use thiserror::Error;
use tracing::debug;
use tracker_core::{ConfidenceEntry, ConfidenceMap, User};
use uuid::Uuid;

use schema::migrate;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Username already exists")]
    DuplicateUsername,

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Database task failed: {0}")]
    Task(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Shared handle to the service database
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database file
    pub fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DbError::Corrupt(format!("Cannot create {:?}: {}", parent, e)))?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> DbResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run queries on the blocking pool
    pub async fn run<F, T>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&Database) -> DbResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| DbError::Task(e.to_string()))?
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ==================== Users ====================

    pub fn create_user(&self, username: &str, password_hash: &str) -> DbResult<User> {
        let user = User::new(username);
        let result = self.conn().execute(
            "INSERT INTO users (id, username, password_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id.to_string(),
                user.username,
                password_hash,
                user.created_at.timestamp_millis(),
                user.updated_at.timestamp_millis(),
            ],
        );

        match result {
            Ok(_) => Ok(user),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(DbError::DuplicateUsername)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a user and their password hash
    pub fn find_user(&self, username: &str) -> DbResult<Option<(User, String)>> {
        let row = self
            .conn()
            .query_row(
                "SELECT id, username, created_at, updated_at, password_hash
                 FROM users WHERE username = ?1",
                [username],
                |row| {
                    Ok((
                        UserRow {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            created_at: row.get(2)?,
                            updated_at: row.get(3)?,
                        },
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((user, hash)) => Ok(Some((user.into_user()?, hash))),
            None => Ok(None),
        }
    }

    // ==================== Sessions ====================

    /// Open a session and return its token
    pub fn create_session(&self, user_id: Uuid, ttl: Duration) -> DbResult<String> {
        let token = Uuid::new_v4().to_string();
        let now = Utc::now();
        self.conn().execute(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                token,
                user_id.to_string(),
                now.timestamp_millis(),
                (now + ttl).timestamp_millis(),
            ],
        )?;
        Ok(token)
    }

    /// User owning a live session; expired sessions are deleted
    pub fn session_user(&self, token: &str) -> DbResult<Option<User>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT u.id, u.username, u.created_at, u.updated_at, s.expires_at
                 FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.token = ?1",
                [token],
                |row| {
                    Ok((
                        UserRow {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            created_at: row.get(2)?,
                            updated_at: row.get(3)?,
                        },
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((user, expires_at)) = row else {
            return Ok(None);
        };

        if expires_at <= Utc::now().timestamp_millis() {
            conn.execute("DELETE FROM sessions WHERE token = ?1", [token])?;
            debug!("Expired session removed");
            return Ok(None);
        }

        user.into_user().map(Some)
    }

    pub fn delete_session(&self, token: &str) -> DbResult<()> {
        self.conn()
            .execute("DELETE FROM sessions WHERE token = ?1", [token])?;
        Ok(())
    }

    /// Delete every expired session
    pub fn purge_expired_sessions(&self) -> DbResult<usize> {
        let removed = self.conn().execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            [Utc::now().timestamp_millis()],
        )?;
        Ok(removed)
    }

    // ==================== Confidence ====================

    /// All entries of a user as `problemKey -> level`
    pub fn confidence_map(&self, user_id: Uuid) -> DbResult<ConfidenceMap> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT problem_key, confidence_level FROM confidence WHERE user_id = ?1",
        )?;
        let map = stmt
            .query_map([user_id.to_string()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<ConfidenceMap, _>>()?;
        Ok(map)
    }

    /// Levels of every entry of a user, for statistics
    pub fn confidence_levels(&self, user_id: Uuid) -> DbResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT confidence_level FROM confidence WHERE user_id = ?1")?;
        let levels = stmt
            .query_map([user_id.to_string()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(levels)
    }

    /// Upsert every entry of `map` in one transaction
    ///
    /// Entries absent from `map` are left alone.
    pub fn upsert_confidence(&self, user_id: Uuid, map: &ConfidenceMap) -> DbResult<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = Utc::now().timestamp_millis();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO confidence (user_id, problem_key, confidence_level, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT (user_id, problem_key) DO UPDATE SET
                     confidence_level = excluded.confidence_level,
                     updated_at = excluded.updated_at",
            )?;
            for (key, level) in map {
                stmt.execute(params![user_id.to_string(), key, level, now])?;
            }
        }
        tx.commit()?;
        Ok(map.len())
    }

    /// Upsert a single entry and return it
    ///
    /// Metadata that is not supplied keeps its stored value.
    pub fn upsert_entry(
        &self,
        user_id: Uuid,
        problem_key: &str,
        level: &str,
        sheet_name: Option<&str>,
        problem_title: Option<&str>,
    ) -> DbResult<ConfidenceEntry> {
        let conn = self.conn();
        let now = Utc::now().timestamp_millis();
        conn.execute(
            "INSERT INTO confidence
                 (user_id, problem_key, confidence_level, sheet_name, problem_title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT (user_id, problem_key) DO UPDATE SET
                 confidence_level = excluded.confidence_level,
                 sheet_name = COALESCE(excluded.sheet_name, confidence.sheet_name),
                 problem_title = COALESCE(excluded.problem_title, confidence.problem_title),
                 updated_at = excluded.updated_at",
            params![user_id.to_string(), problem_key, level, sheet_name, problem_title, now],
        )?;

        let (key, level, sheet_name, problem_title, created_at, updated_at) = conn.query_row(
            "SELECT problem_key, confidence_level, sheet_name, problem_title, created_at, updated_at
             FROM confidence WHERE user_id = ?1 AND problem_key = ?2",
            params![user_id.to_string(), problem_key],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            },
        )?;

        Ok(ConfidenceEntry {
            problem_key: key,
            confidence_level: level,
            sheet_name,
            problem_title,
            created_at: from_millis(created_at)?,
            updated_at: from_millis(updated_at)?,
        })
    }
}

/// Raw `users` columns
struct UserRow {
    id: String,
    username: String,
    created_at: i64,
    updated_at: i64,
}

impl UserRow {
    fn into_user(self) -> DbResult<User> {
        Ok(User {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| DbError::Corrupt(format!("user id {}: {}", self.id, e)))?,
            username: self.username,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
        })
    }
}

fn from_millis(ms: i64) -> DbResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| DbError::Corrupt(format!("timestamp {}", ms)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> ConfidenceMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_create_and_find_user() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user("alice", "$argon2id$hash").unwrap();

        let (found, hash) = db.find_user("alice").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(hash, "$argon2id$hash");
        assert!(db.find_user("bob").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_username() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("alice", "h").unwrap();
        assert!(matches!(
            db.create_user("alice", "h2"),
            Err(DbError::DuplicateUsername)
        ));
    }

    #[test]
    fn test_sessions() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user("alice", "h").unwrap();

        let token = db.create_session(user.id, Duration::days(7)).unwrap();
        assert_eq!(db.session_user(&token).unwrap().unwrap().id, user.id);

        db.delete_session(&token).unwrap();
        assert!(db.session_user(&token).unwrap().is_none());
    }

    #[test]
    fn test_expired_session_is_deleted() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user("alice", "h").unwrap();

        let token = db.create_session(user.id, Duration::seconds(-1)).unwrap();
        assert!(db.session_user(&token).unwrap().is_none());
        assert_eq!(db.purge_expired_sessions().unwrap(), 0);
    }

    #[test]
    fn test_upsert_confidence_is_additive() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user("alice", "h").unwrap();

        db.upsert_confidence(user.id, &map(&[("p1", "low"), ("p2", "high")]))
            .unwrap();
        db.upsert_confidence(user.id, &map(&[("p1", "expert")]))
            .unwrap();

        assert_eq!(
            db.confidence_map(user.id).unwrap(),
            map(&[("p1", "expert"), ("p2", "high")])
        );
    }

    #[test]
    fn test_users_are_isolated() {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user("alice", "h").unwrap();
        let bob = db.create_user("bob", "h").unwrap();

        db.upsert_confidence(alice.id, &map(&[("p1", "low")]))
            .unwrap();
        assert!(db.confidence_map(bob.id).unwrap().is_empty());
    }

    #[test]
    fn test_upsert_entry_keeps_metadata() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user("alice", "h").unwrap();

        let first = db
            .upsert_entry(user.id, "p1", "low", Some("NeetCode 150"), Some("Two Sum"))
            .unwrap();
        assert_eq!(first.sheet_name.as_deref(), Some("NeetCode 150"));

        let second = db.upsert_entry(user.id, "p1", "high", None, None).unwrap();
        assert_eq!(second.confidence_level, "high");
        assert_eq!(second.problem_title.as_deref(), Some("Two Sum"));
        assert_eq!(second.created_at, first.created_at);
    }

    #[test]
    fn test_open_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("tracker.db");
        {
            let db = Database::open(&path).unwrap();
            db.create_user("alice", "h").unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert!(db.find_user("alice").unwrap().is_some());
    }
}
