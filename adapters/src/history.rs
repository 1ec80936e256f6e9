//! SQLite-backed protection history
//!
//! Reads a snapshot of the replica's `page_restrictions`, `logging` and
//! `actor_logging` tables. The store is read-only; it never writes to the
//! snapshot.

use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use usageguard_engine::{HistoryStore, ProtectAction, ProtectionRecord, Result, UsageGuardError};

const CURRENT_PROTECTIONS_SQL: &str = r#"
    SELECT
      l.log_title,
      CAST(l.log_timestamp AS TEXT),
      a.actor_name
    FROM
      page_restrictions pr
        JOIN logging l ON pr.pr_page = l.log_page
        JOIN actor_logging a ON l.log_actor = a.actor_id
    WHERE
      pr.pr_type = 'edit'
      AND pr.pr_level = 'autoconfirmed'
      AND pr.pr_expiry = 'infinity'
      AND l.log_namespace = 0
      AND l.log_type = 'protect'
      AND l.log_action IN ('protect', 'modify')
"#;

const LATEST_PROTECT_ACTION_SQL: &str = r#"
    SELECT
      l.log_title,
      l.log_id,
      a.actor_name
    FROM
      logging l
        JOIN actor_logging a ON l.log_actor = a.actor_id
    WHERE
      l.log_action = 'protect'
      AND l.log_type = 'protect'
      AND l.log_namespace = 0
      AND l.log_title = ?1
    ORDER BY
      l.log_timestamp DESC
    LIMIT 1
"#;

/// History store over a SQLite snapshot
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    /// Open an existing snapshot read-only
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            UsageGuardError::history_with_source(
                format!("failed to open history snapshot at {}", path.display()),
                e,
            )
        })?;

        tracing::debug!(path = %path.display(), "history snapshot opened");
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already-open connection
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| UsageGuardError::history("history connection lock poisoned"))
    }

    fn query_current_protections(&self) -> Result<Vec<ProtectionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(CURRENT_PROTECTIONS_SQL)
            .map_err(|e| UsageGuardError::history_with_source("failed to prepare query", e))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| UsageGuardError::history_with_source("failed to query protections", e))?;

        let mut records = Vec::new();
        for row in rows {
            let (item_id, timestamp, actor) = row.map_err(|e| {
                UsageGuardError::history_with_source("failed to read protection row", e)
            })?;
            let applied_at = timestamp.trim().parse::<i64>().map_err(|e| {
                UsageGuardError::history_with_source(
                    format!("log timestamp {timestamp:?} for {item_id} is not numeric"),
                    e,
                )
            })?;
            records.push(ProtectionRecord {
                item_id,
                applied_at,
                actor,
            });
        }
        Ok(records)
    }

    fn query_latest_protect_action(&self, item_id: &str) -> Result<Option<ProtectAction>> {
        let conn = self.conn()?;
        conn.query_row(LATEST_PROTECT_ACTION_SQL, params![item_id], |row| {
            Ok(ProtectAction {
                item_id: row.get(0)?,
                log_id: row.get(1)?,
                actor: row.get(2)?,
            })
        })
        .optional()
        .map_err(|e| {
            UsageGuardError::history_with_source(
                format!("failed to query latest protect action for {item_id}"),
                e,
            )
        })
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn current_protections(&self) -> Result<Vec<ProtectionRecord>> {
        self.query_current_protections()
    }

    async fn latest_protect_action(&self, item_id: &str) -> Result<Option<ProtectAction>> {
        self.query_latest_protect_action(item_id)
    }
}
