// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idempotence records for the case scanner.
//!
//! A row in `scanned_cases`, whether `processed` or `failed`, means the
//! path has been seen and must not be re-emitted. Failed rows stay until
//! an operator removes them.

use rusqlite::params;
use std::collections::HashSet;

use crate::error::StorageError;
use crate::store::StateStore;

impl StateStore {
    /// All recorded paths, regardless of status.
    pub fn seen_case_paths(&self) -> Result<HashSet<String>, StorageError> {
        self.read(|conn| {
            let mut stmt = conn.prepare("SELECT case_path FROM scanned_cases")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect()
        })
    }

    /// Record a scan outcome for a path. `status` is `processed` or
    /// `failed`; a re-scan overwrites the previous row.
    pub fn add_scanned_case(&self, case_path: &str, status: &str) -> Result<(), StorageError> {
        let now = self.timestamp();
        self.transaction(|tx| {
            tx.execute(
                "INSERT OR REPLACE INTO scanned_cases (case_path, status, scanned_at)
                 VALUES (?1, ?2, ?3)",
                params![case_path, status, now],
            )
            .map_err(StorageError::from)?;
            Ok(())
        })
    }

    /// Forget a path so the scanner re-emits it on the next cycle.
    pub fn remove_scanned_case(&self, case_path: &str) -> Result<(), StorageError> {
        self.transaction(|tx| {
            tx.execute("DELETE FROM scanned_cases WHERE case_path = ?1", [case_path])
                .map_err(StorageError::from)?;
            Ok(())
        })
    }
}

#[cfg(test)]
#[path = "../state_tests/scans.rs"]
mod tests;
