//! Audit storage for incidents
//!
//! Every processed alert ends up as one row in an append-only incident
//! table. Rows are never updated or deleted by the daemon, and the table
//! survives restarts untouched.

pub mod sqlite_store;

pub use sqlite_store::SqliteAuditStore;

use crate::models::{Incident, StoredIncident};
use thiserror::Error;

/// Errors that can occur during persistence operations
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid data in database: {0}")]
    InvalidData(String),

    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

/// Trait for incident storage backends
pub trait AuditStore: Send + Sync {
    /// Create the incident table if it does not exist yet
    fn init(&self) -> Result<(), PersistenceError>;

    /// Append one incident, returning its generated row id
    fn append(&self, incident: &Incident) -> Result<i64, PersistenceError>;

    /// Most recent incidents, newest first
    fn recent(&self, limit: usize) -> Result<Vec<StoredIncident>, PersistenceError>;

    /// Total number of stored incidents
    fn count(&self) -> Result<usize, PersistenceError>;
}
