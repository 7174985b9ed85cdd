// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Best-effort structured log rows.

use rusqlite::params;
use std::time::Duration;

use crate::error::StorageError;
use crate::store::StateStore;

const BUSY_RETRIES: u32 = 3;
const BUSY_BASE_DELAY: Duration = Duration::from_millis(100);

/// A row from the `logs` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: String,
    pub component: String,
    pub level: String,
    pub correlation_id: Option<String>,
    pub message: String,
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::DatabaseBusy
                || e.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

impl StateStore {
    /// Insert one log row, retrying busy errors with exponential backoff
    /// (log writes contend with workflow transactions and must not win).
    pub fn insert_log(
        &self,
        component: &str,
        level: &str,
        correlation_id: Option<&str>,
        message: &str,
    ) -> Result<(), StorageError> {
        let now = self.timestamp();
        let mut delay = BUSY_BASE_DELAY;
        let mut attempt = 0;
        loop {
            let result = self.raw(|conn| {
                conn.execute(
                    "INSERT INTO logs (timestamp, component, level, correlation_id, message)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![now, component, level, correlation_id, message],
                )
                .map(|_| ())
            });
            match result {
                Ok(()) => return Ok(()),
                Err(err) if is_busy(&err) && attempt + 1 < BUSY_RETRIES => {
                    attempt += 1;
                    std::thread::sleep(delay);
                    delay *= 2;
                }
                Err(err) => return Err(StorageError::from(err)),
            }
        }
    }

    /// Most recent log rows, newest first.
    pub fn recent_logs(&self, limit: u32) -> Result<Vec<LogRecord>, StorageError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, component, level, correlation_id, message
                 FROM logs ORDER BY log_id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map([limit], |row| {
                Ok(LogRecord {
                    timestamp: row.get("timestamp")?,
                    component: row.get("component")?,
                    level: row.get("level")?,
                    correlation_id: row.get("correlation_id")?,
                    message: row.get("message")?,
                })
            })?;
            rows.collect()
        })
    }
}
