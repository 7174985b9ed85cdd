// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! GPU resource model.

use serde::{Deserialize, Serialize};

crate::status_enum! {
    /// Availability of a GPU slot.
    pub enum GpuStatus {
        Available => "available",
        Reserved => "reserved",
        Error => "error",
        Maintenance => "maintenance",
    }
}

/// A row from the `gpu_resources` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuRecord {
    pub gpu_id: i64,
    pub uuid: Option<String>,
    pub status: GpuStatus,
    pub reserved_by_case_id: Option<String>,
    pub memory_mb: Option<i64>,
    pub utilization_percent: Option<f64>,
    pub temperature_celsius: Option<f64>,
    pub last_updated: String,
}

/// One telemetry sample for a GPU, as collected by the system curator.
///
/// Carries measurements only; reservation state is owned by the conductor
/// and never written from telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuSample {
    pub gpu_id: i64,
    pub uuid: Option<String>,
    pub memory_mb: Option<i64>,
    pub utilization_percent: Option<f64>,
    pub temperature_celsius: Option<f64>,
}
