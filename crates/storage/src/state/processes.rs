// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted PIDs of supervised workers.
//!
//! Seeds the supervisor after a restart so running workers are adopted
//! instead of respawned.

use rusqlite::params;

use crate::error::StorageError;
use crate::store::StateStore;

/// A row from the `process_status` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStatusRecord {
    pub process_name: String,
    pub pid: u32,
    pub is_remote: bool,
    pub host: String,
    pub last_updated: String,
}

impl StateStore {
    pub fn load_process_statuses(&self) -> Result<Vec<ProcessStatusRecord>, StorageError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT process_name, pid, is_remote, host, last_updated
                 FROM process_status ORDER BY process_name",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(ProcessStatusRecord {
                    process_name: row.get("process_name")?,
                    pid: row.get("pid")?,
                    is_remote: row.get("is_remote")?,
                    host: row.get("host")?,
                    last_updated: row.get("last_updated")?,
                })
            })?;
            rows.collect()
        })
    }

    pub fn upsert_process_status(
        &self,
        process_name: &str,
        pid: u32,
        is_remote: bool,
        host: &str,
    ) -> Result<(), StorageError> {
        let now = self.timestamp();
        self.transaction(|tx| {
            tx.execute(
                "INSERT OR REPLACE INTO process_status
                     (process_name, pid, is_remote, host, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![process_name, pid, is_remote, host, now],
            )
            .map_err(StorageError::from)?;
            Ok(())
        })
    }

    pub fn clear_process_status(&self, process_name: &str) -> Result<(), StorageError> {
        self.transaction(|tx| {
            tx.execute("DELETE FROM process_status WHERE process_name = ?1", [process_name])
                .map_err(StorageError::from)?;
            Ok(())
        })
    }
}

#[cfg(test)]
#[path = "../state_tests/processes.rs"]
mod tests;
