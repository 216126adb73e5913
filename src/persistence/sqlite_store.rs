//! SQLite implementation of the AuditStore trait

use super::{AuditStore, PersistenceError};
use crate::models::{Incident, IncidentAction, StoredIncident};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed incident log
///
/// Holds one long-lived connection; the pipeline is the only writer.
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    /// Open (or create) the database at the specified path
    ///
    /// Creates the incident table if it doesn't exist; existing rows are kept.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, PersistenceError> {
        let conn = Connection::open(db_path)?;
        let store = SqliteAuditStore {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (useful for testing)
    pub fn in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteAuditStore {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn.lock().map_err(|_| PersistenceError::LockPoisoned)
    }
}

impl AuditStore for SqliteAuditStore {
    fn init(&self) -> Result<(), PersistenceError> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    fn append(&self, incident: &Incident) -> Result<i64, PersistenceError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO incidents (timestamp, src_ip, alert_signature, action_taken)
             VALUES (?, ?, ?, ?)",
            params![
                incident.timestamp,
                incident.source_address,
                incident.signature,
                incident.action.as_str()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn recent(&self, limit: usize) -> Result<Vec<StoredIncident>, PersistenceError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, src_ip, alert_signature, action_taken
             FROM incidents
             ORDER BY id DESC
             LIMIT ?",
        )?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, timestamp, source_address, signature, action)| -> Result<StoredIncident, PersistenceError> {
                let action = IncidentAction::from_label(&action).ok_or_else(|| {
                    PersistenceError::InvalidData(format!("Unknown action in row {}: {}", id, action))
                })?;
                Ok(StoredIncident {
                    id,
                    incident: Incident {
                        timestamp,
                        source_address,
                        signature,
                        action,
                    },
                })
            })
            .collect()
    }

    fn count(&self) -> Result<usize, PersistenceError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM incidents", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
