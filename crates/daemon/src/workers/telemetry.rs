// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! GPU telemetry sampling.

use gantry_core::GpuSample;

/// Query run on the remote host to sample every GPU.
pub const NVIDIA_SMI_QUERY: &str = "nvidia-smi \
    --query-gpu=index,uuid,memory.used,utilization.gpu,temperature.gpu \
    --format=csv,noheader,nounits";

/// Parse `nvidia-smi` CSV output (`noheader,nounits`) into samples.
/// Malformed lines are skipped with a warning rather than failing the
/// whole cycle.
pub fn parse_nvidia_smi_csv(output: &str) -> Vec<GpuSample> {
    let mut samples = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 5 {
            tracing::warn!(line, "skipping malformed telemetry line");
            continue;
        }
        let Ok(gpu_id) = fields[0].parse::<i64>() else {
            tracing::warn!(line, "skipping telemetry line with bad GPU index");
            continue;
        };
        samples.push(GpuSample {
            gpu_id,
            uuid: (!fields[1].is_empty()).then(|| fields[1].to_string()),
            memory_mb: fields[2].parse().ok(),
            utilization_percent: fields[3].parse().ok(),
            temperature_celsius: fields[4].parse().ok(),
        });
    }
    samples
}
