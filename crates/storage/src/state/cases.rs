// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Case rows and their audit trail.

use rusqlite::{params, OptionalExtension, Row};

use gantry_core::{CaseHistoryRecord, CaseRecord, CaseStatus};

use super::StepChange;
use crate::error::StorageError;
use crate::store::StateStore;

fn case_from_row(row: &Row<'_>) -> Result<CaseRecord, rusqlite::Error> {
    let status: String = row.get("status")?;
    Ok(CaseRecord {
        case_id: row.get("case_id")?,
        // CHECK constraint guarantees a known value; fall back to FAILED
        // rather than erroring on a hand-edited row.
        status: CaseStatus::parse(&status).unwrap_or(CaseStatus::Failed),
        assigned_gpu_id: row.get("assigned_gpu_id")?,
        workflow_step: row.get("workflow_step")?,
        error_message: row.get("error_message")?,
        created_at: row.get("created_at")?,
        last_updated: row.get("last_updated")?,
    })
}

impl StateStore {
    pub fn case_exists(&self, case_id: &str) -> Result<bool, StorageError> {
        self.read(|conn| {
            conn.query_row("SELECT 1 FROM cases WHERE case_id = ?1", [case_id], |_| Ok(()))
                .optional()
                .map(|found| found.is_some())
        })
    }

    pub fn get_case(&self, case_id: &str) -> Result<Option<CaseRecord>, StorageError> {
        self.read(|conn| {
            conn.query_row("SELECT * FROM cases WHERE case_id = ?1", [case_id], case_from_row)
                .optional()
        })
    }

    pub fn case_status(&self, case_id: &str) -> Result<Option<CaseStatus>, StorageError> {
        Ok(self.get_case(case_id)?.map(|case| case.status))
    }

    /// Current workflow step of a case. `None` if the case does not exist
    /// or has no step in flight.
    pub fn case_workflow_step(&self, case_id: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get_case(case_id)?.and_then(|case| case.workflow_step))
    }

    pub fn list_cases(&self) -> Result<Vec<CaseRecord>, StorageError> {
        self.read(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM cases ORDER BY created_at, case_id")?;
            let rows = stmt.query_map([], case_from_row)?;
            rows.collect()
        })
    }

    /// Move a case to `status`, creating the row if it does not exist,
    /// and append the matching history row in the same transaction.
    ///
    /// A terminal status also clears `assigned_gpu_id` (the GPU row
    /// itself is released separately); a `Failed` status records the
    /// message as the case's `error_message`.
    pub fn update_case_status(
        &self,
        case_id: &str,
        status: CaseStatus,
        message: Option<&str>,
        step: StepChange<'_>,
    ) -> Result<(), StorageError> {
        let now = self.timestamp();
        self.transaction(|tx| {
            let exists = tx
                .query_row("SELECT 1 FROM cases WHERE case_id = ?1", [case_id], |_| Ok(()))
                .optional()
                .map_err(StorageError::from)?
                .is_some();

            if exists {
                match step {
                    StepChange::Keep => tx.execute(
                        "UPDATE cases SET status = ?1, last_updated = ?2 WHERE case_id = ?3",
                        params![status.as_str(), now, case_id],
                    ),
                    StepChange::Set(name) => tx.execute(
                        "UPDATE cases SET status = ?1, workflow_step = ?2, last_updated = ?3
                         WHERE case_id = ?4",
                        params![status.as_str(), name, now, case_id],
                    ),
                    StepChange::Clear => tx.execute(
                        "UPDATE cases SET status = ?1, workflow_step = NULL, last_updated = ?2
                         WHERE case_id = ?3",
                        params![status.as_str(), now, case_id],
                    ),
                }
                .map_err(StorageError::from)?;
            } else {
                let step_value = match step {
                    StepChange::Set(name) => Some(name),
                    StepChange::Keep | StepChange::Clear => None,
                };
                tx.execute(
                    "INSERT INTO cases (case_id, status, workflow_step, created_at, last_updated)
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                    params![case_id, status.as_str(), step_value, now],
                )
                .map_err(StorageError::from)?;
            }

            if status == CaseStatus::Failed {
                tx.execute(
                    "UPDATE cases SET error_message = ?1 WHERE case_id = ?2",
                    params![message, case_id],
                )
                .map_err(StorageError::from)?;
            }
            if status.is_terminal() {
                tx.execute(
                    "UPDATE cases SET assigned_gpu_id = NULL WHERE case_id = ?1",
                    [case_id],
                )
                .map_err(StorageError::from)?;
            }

            let gpu_id: Option<i64> = tx
                .query_row(
                    "SELECT assigned_gpu_id FROM cases WHERE case_id = ?1",
                    [case_id],
                    |row| row.get(0),
                )
                .map_err(StorageError::from)?;
            let step_for_history: Option<String> = tx
                .query_row(
                    "SELECT workflow_step FROM cases WHERE case_id = ?1",
                    [case_id],
                    |row| row.get(0),
                )
                .map_err(StorageError::from)?;
            tx.execute(
                "INSERT INTO case_history (case_id, status, workflow_step, message, gpu_id, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![case_id, status.as_str(), step_for_history, message, gpu_id, now],
            )
            .map_err(StorageError::from)?;
            Ok(())
        })
    }

    /// Full audit trail of a case, oldest first.
    pub fn case_history(&self, case_id: &str) -> Result<Vec<CaseHistoryRecord>, StorageError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT case_id, status, workflow_step, message, gpu_id, timestamp
                 FROM case_history WHERE case_id = ?1 ORDER BY history_id",
            )?;
            let rows = stmt.query_map([case_id], |row| {
                let status: String = row.get("status")?;
                Ok(CaseHistoryRecord {
                    case_id: row.get("case_id")?,
                    status: CaseStatus::parse(&status).unwrap_or(CaseStatus::Failed),
                    workflow_step: row.get("workflow_step")?,
                    message: row.get("message")?,
                    gpu_id: row.get("gpu_id")?,
                    timestamp: row.get("timestamp")?,
                })
            })?;
            rows.collect()
        })
    }
}

#[cfg(test)]
#[path = "../state_tests/cases.rs"]
mod tests;
