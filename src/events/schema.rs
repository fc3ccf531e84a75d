use rusqlite::{Connection, Result};

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS events (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_id TEXT NOT NULL,
            occurred_at TEXT NOT NULL,
            event_type INTEGER NOT NULL,
            origin_node_id TEXT NOT NULL,
            sync_status INTEGER NOT NULL DEFAULT 0,
            UNIQUE(subject_id, occurred_at, event_type, origin_node_id)
        );

        CREATE INDEX IF NOT EXISTS idx_events_pending ON events(sync_status, occurred_at);
        ",
    )?;

    Ok(())
}
