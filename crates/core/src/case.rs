// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Case identity and lifecycle state machine.
//!
//! A case is one directory of treatment data progressing through the
//! configured workflow steps. The status enum mirrors the CHECK constraint
//! on the `cases` table; transitions are driven by the conductor only.

use serde::{Deserialize, Serialize};

crate::status_enum! {
    /// Lifecycle status of a case.
    pub enum CaseStatus {
        /// Discovered but not yet recorded by the conductor.
        New => "NEW",
        /// Case row created, waiting for its first step.
        Queued => "QUEUED",
        /// A workflow step is in flight on a reserved GPU.
        Processing => "PROCESSING",
        /// Input transfer to the remote host in progress.
        Uploading => "UPLOADING",
        /// Remote command running.
        Executing => "EXECUTING",
        /// Result transfer from the remote host in progress.
        Downloading => "DOWNLOADING",
        /// All steps finished; GPU released.
        Completed => "COMPLETED",
        /// Workflow aborted; error recorded, GPU released.
        Failed => "FAILED",
        /// No GPU was free; dormant until a release re-triggers advance.
        PendingResource => "PENDING_RESOURCE",
    }
}

impl CaseStatus {
    /// Terminal states never leave the store and hold no GPU.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaseStatus::Completed | CaseStatus::Failed)
    }
}

/// A row from the `cases` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case_id: String,
    pub status: CaseStatus,
    pub assigned_gpu_id: Option<i64>,
    /// Step currently in flight, or most recently completed.
    pub workflow_step: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub last_updated: String,
}

/// A row from the append-only `case_history` audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseHistoryRecord {
    pub case_id: String,
    pub status: CaseStatus,
    pub workflow_step: Option<String>,
    pub message: Option<String>,
    pub gpu_id: Option<i64>,
    pub timestamp: String,
}

#[cfg(test)]
#[path = "case_tests.rs"]
mod tests;
