//! peereval-store — SQLite persistence for rosters, rubrics, rounds,
//! tokens, responses, and the outbox.
//!
//! All access goes through [`Database`], which owns a single connection
//! behind a mutex. Multi-row writes run inside a transaction.

pub mod intake;
pub mod outbox;
pub mod report;
pub mod rosters;
pub mod rounds;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{Connection, Transaction};
use thiserror::Error;

use peereval_core::error::InvalidToken;

pub use outbox::OutboxMailer;
pub use rosters::ImportSummary;

/// Store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode scores: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error(transparent)]
    InvalidToken(#[from] InvalidToken),

    #[error("rubric {0} is used by an evaluation round and cannot be deleted")]
    RubricInUse(i64),

    #[error("rubric {0} has no criteria")]
    EmptyRubric(i64),

    #[error("no team has two or more members; nothing to evaluate")]
    NoEvaluationPairs,

    #[error("{0}")]
    Invalid(String),

    #[error("lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Database connection wrapper
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (creating if needed) the database file and its schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// A private in-memory database, for tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::create_tables(&conn)?;
        tracing::debug!(path = ?path, "database ready");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Database file path, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` with the connection.
    pub fn with_connection<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&conn)
    }

    /// Run `f` inside a transaction, committing only if it succeeds.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    {
        let mut conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

/// Default database location in the working directory.
pub fn default_db_path() -> PathBuf {
    PathBuf::from("peereval.sqlite")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_file_and_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("peereval.sqlite");
        let db = Database::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(db.path(), Some(path.as_path()));

        // Re-opening an existing database keeps the schema intact
        drop(db);
        let db = Database::open(&path).unwrap();
        assert!(db.list_students().unwrap().is_empty());
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<(), StoreError> = db.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO students (first_name, last_name, email, team) VALUES ('a', 'b', 'a@b', 't')",
                [],
            )?;
            Err(StoreError::Invalid("boom".into()))
        });
        assert!(result.is_err());
        assert!(db.list_students().unwrap().is_empty());
    }
}
