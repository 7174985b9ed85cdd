// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! GPU pool: atomic reservation, release, and telemetry upserts.

use rusqlite::{params, OptionalExtension, Row};
use thiserror::Error;

use gantry_core::{GpuRecord, GpuSample, GpuStatus};

use crate::error::StorageError;
use crate::store::StateStore;

/// Outcome of a failed reservation attempt.
#[derive(Debug, Error)]
pub enum ReserveError {
    /// Expected under load: every GPU is reserved or out of service.
    #[error("no GPUs available for reservation")]
    NoResource,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn gpu_from_row(row: &Row<'_>) -> Result<GpuRecord, rusqlite::Error> {
    let status: String = row.get("status")?;
    Ok(GpuRecord {
        gpu_id: row.get("gpu_id")?,
        uuid: row.get("uuid")?,
        status: GpuStatus::parse(&status).unwrap_or(GpuStatus::Error),
        reserved_by_case_id: row.get("reserved_by_case_id")?,
        memory_mb: row.get("memory_mb")?,
        utilization_percent: row.get("utilization_percent")?,
        temperature_celsius: row.get("temperature_celsius")?,
        last_updated: row.get("last_updated")?,
    })
}

impl StateStore {
    /// Register a GPU slot (idempotent; used by setup and telemetry).
    pub fn register_gpu(&self, gpu_id: i64, uuid: Option<&str>) -> Result<(), StorageError> {
        let now = self.timestamp();
        self.transaction(|tx| {
            tx.execute(
                "INSERT INTO gpu_resources (gpu_id, uuid, status, last_updated)
                 VALUES (?1, ?2, 'available', ?3)
                 ON CONFLICT(gpu_id) DO NOTHING",
                params![gpu_id, uuid, now],
            )
            .map_err(StorageError::from)?;
            Ok(())
        })
    }

    pub fn list_gpus(&self) -> Result<Vec<GpuRecord>, StorageError> {
        self.read(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM gpu_resources ORDER BY gpu_id")?;
            let rows = stmt.query_map([], gpu_from_row)?;
            rows.collect()
        })
    }

    pub fn set_gpu_status(&self, gpu_id: i64, status: GpuStatus) -> Result<(), StorageError> {
        let now = self.timestamp();
        self.transaction(|tx| {
            tx.execute(
                "UPDATE gpu_resources SET status = ?1, last_updated = ?2 WHERE gpu_id = ?3",
                params![status.as_str(), now, gpu_id],
            )
            .map_err(StorageError::from)?;
            Ok(())
        })
    }

    /// Reserve one available GPU for a case.
    ///
    /// Two phases: a cheap read picks a candidate outside any transaction,
    /// then the transaction re-checks the candidate is still available
    /// before flipping it. Losing a race surfaces as `NoResource`, never
    /// as a double reservation. The case row is created (`QUEUED`) if it
    /// does not exist yet, and `cases.assigned_gpu_id` is set in the same
    /// transaction so the ownership invariant holds on commit.
    pub fn reserve_gpu_for_case(&self, case_id: &str) -> Result<i64, ReserveError> {
        let candidate: Option<i64> = self.read(|conn| {
            conn.query_row(
                "SELECT gpu_id FROM gpu_resources WHERE status = 'available'
                 ORDER BY gpu_id LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
        })?;
        let Some(gpu_id) = candidate else {
            return Err(ReserveError::NoResource);
        };

        let now = self.timestamp();
        self.transaction(|tx| {
            let exists = tx
                .query_row("SELECT 1 FROM cases WHERE case_id = ?1", [case_id], |_| Ok(()))
                .optional()
                .map_err(StorageError::from)?
                .is_some();
            if !exists {
                tx.execute(
                    "INSERT INTO cases (case_id, status, created_at, last_updated)
                     VALUES (?1, 'QUEUED', ?2, ?2)",
                    params![case_id, now],
                )
                .map_err(StorageError::from)?;
            }

            let still_available = tx
                .query_row(
                    "SELECT 1 FROM gpu_resources WHERE gpu_id = ?1 AND status = 'available'",
                    [gpu_id],
                    |_| Ok(()),
                )
                .optional()
                .map_err(StorageError::from)?
                .is_some();
            if !still_available {
                return Err(ReserveError::NoResource);
            }

            tx.execute(
                "UPDATE gpu_resources SET status = 'reserved', reserved_by_case_id = ?1,
                 last_updated = ?2 WHERE gpu_id = ?3",
                params![case_id, now, gpu_id],
            )
            .map_err(StorageError::from)?;
            tx.execute(
                "UPDATE cases SET assigned_gpu_id = ?1, last_updated = ?2 WHERE case_id = ?3",
                params![gpu_id, now, case_id],
            )
            .map_err(StorageError::from)?;
            Ok(gpu_id)
        })
    }

    /// Release whatever GPU the case holds. Safe to call when it holds
    /// none; idempotent.
    pub fn release_gpu_for_case(&self, case_id: &str) -> Result<(), StorageError> {
        let now = self.timestamp();
        self.transaction(|tx| {
            tx.execute(
                "UPDATE gpu_resources SET status = 'available', reserved_by_case_id = NULL,
                 last_updated = ?1 WHERE reserved_by_case_id = ?2",
                params![now, case_id],
            )
            .map_err(StorageError::from)?;
            tx.execute(
                "UPDATE cases SET assigned_gpu_id = NULL, last_updated = ?1 WHERE case_id = ?2",
                params![now, case_id],
            )
            .map_err(StorageError::from)?;
            Ok(())
        })
    }

    /// Upsert telemetry samples. Measurement columns only; reservation
    /// state belongs to the conductor and is never touched from here.
    pub fn update_gpu_samples(&self, samples: &[GpuSample]) -> Result<(), StorageError> {
        let now = self.timestamp();
        self.transaction(|tx| {
            for sample in samples {
                tx.execute(
                    "INSERT INTO gpu_resources
                         (gpu_id, uuid, status, memory_mb, utilization_percent,
                          temperature_celsius, last_updated)
                     VALUES (?1, ?2, 'available', ?3, ?4, ?5, ?6)
                     ON CONFLICT(gpu_id) DO UPDATE SET
                         uuid = COALESCE(excluded.uuid, uuid),
                         memory_mb = excluded.memory_mb,
                         utilization_percent = excluded.utilization_percent,
                         temperature_celsius = excluded.temperature_celsius,
                         last_updated = excluded.last_updated",
                    params![
                        sample.gpu_id,
                        sample.uuid,
                        sample.memory_mb,
                        sample.utilization_percent,
                        sample.temperature_celsius,
                        now
                    ],
                )
                .map_err(StorageError::from)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
#[path = "../state_tests/gpus.rs"]
mod tests;
