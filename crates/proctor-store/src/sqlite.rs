//! SQLite audit store

use chrono::{DateTime, Local};
use proctor_util::SessionId;
use rusqlite::{Connection, Params, Row, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::{AuditEvent, Store, StoreResult};

/// Audit log backed by a single SQLite connection
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS audit_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        session_id TEXT,
        event_json TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_audit_session ON audit_log(session_id, id);
"#;

impl SqliteStore {
    /// Open the audit database at `path`, creating it if missing
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Throwaway store for tests and dry runs
    pub fn in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        debug!("Audit schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query_audits<P: Params>(&self, sql: &str, params: P) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, read_row)?;

        rows.map(|row| decode_row(row?)).collect()
    }
}

type AuditRow = (i64, String, String);

fn read_row(row: &Row<'_>) -> rusqlite::Result<AuditRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn decode_row((id, timestamp, event_json): AuditRow) -> StoreResult<AuditEvent> {
    // A malformed timestamp should not hide the event itself
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map(|dt| dt.with_timezone(&Local))
        .unwrap_or_else(|_| proctor_util::now());

    Ok(AuditEvent {
        id,
        timestamp,
        event: serde_json::from_str(&event_json)?,
    })
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let event_json = serde_json::to_string(&event.event)?;
        let session_id = event.event.session_id().map(|id| id.to_string());

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO audit_log (timestamp, session_id, event_json) VALUES (?1, ?2, ?3)",
            params![event.timestamp.to_rfc3339(), session_id, event_json],
        )?;
        event.id = conn.last_insert_rowid();

        debug!(event_id = event.id, session_id = ?session_id, "Audit event appended");
        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        self.query_audits(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?1",
            [limit as i64],
        )
    }

    fn get_session_audits(&self, session_id: &SessionId) -> StoreResult<Vec<AuditEvent>> {
        self.query_audits(
            "SELECT id, timestamp, event_json FROM audit_log WHERE session_id = ?1 ORDER BY id",
            [session_id.as_str()],
        )
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Audit store lock poisoned");
                false
            }
        }
    }
}
