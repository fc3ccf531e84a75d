use crate::events::{EventRecord, NewPunch, SyncStatus, schema};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("event field `{0}` must be non-empty")]
    EmptyField(&'static str),
    #[error("create db parent dir {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub struct EventStore {
    conn: Mutex<Connection>,
}

impl EventStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // A poisoned lock only means the other loop panicked; the connection
    // itself is still consistent, every write here is transactional.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn insert_if_absent(&self, punch: &NewPunch) -> Result<bool, StoreError> {
        if punch.subject_id.is_empty() {
            return Err(StoreError::EmptyField("subject_id"));
        }
        if punch.origin_node_id.is_empty() {
            return Err(StoreError::EmptyField("origin_node_id"));
        }
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO events (subject_id, occurred_at, event_type, origin_node_id, sync_status)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![
                punch.subject_id,
                punch.occurred_at,
                punch.event_type,
                punch.origin_node_id
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn fetch_pending(&self, limit: Option<usize>) -> Result<Vec<EventRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT seq, subject_id, occurred_at, event_type, origin_node_id, sync_status
             FROM events WHERE sync_status = 0
             ORDER BY occurred_at ASC, seq ASC LIMIT ?1",
        )?;
        let limit = limit.map_or(-1i64, |n| n as i64);
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(EventRecord {
                    seq: row.get(0)?,
                    subject_id: row.get(1)?,
                    occurred_at: row.get(2)?,
                    event_type: row.get(3)?,
                    origin_node_id: row.get(4)?,
                    sync_status: SyncStatus::from_flag(row.get(5)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn mark_synced(&self, seqs: &[i64]) -> Result<(), StoreError> {
        if seqs.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("UPDATE events SET sync_status = 1 WHERE seq = ?1")?;
            for seq in seqs {
                stmt.execute(params![seq])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn status_counts(&self) -> Result<(u64, u64), StoreError> {
        let conn = self.conn();
        let pending: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE sync_status = 0",
            [],
            |row| row.get(0),
        )?;
        let synced: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE sync_status = 1",
            [],
            |row| row.get(0),
        )?;
        Ok((pending as u64, synced as u64))
    }
}
