// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor restart scenario: running workers are adopted, not
//! respawned.

use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use gantry_core::{HpcConfig, ProcessConfig};
use gantry_daemon::{Supervisor, WorkerLauncher};
use gantry_storage::StateStore;

fn write_worker_script(dir: &Path) -> PathBuf {
    let path = dir.join("worker.sh");
    std::fs::write(&path, "#!/bin/sh\nsleep 300\n").unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn configs() -> BTreeMap<String, ProcessConfig> {
    let mut configs = BTreeMap::new();
    configs.insert("w1".to_string(), ProcessConfig::default());
    configs
}

#[tokio::test]
async fn restarted_supervisor_adopts_running_worker() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_worker_script(dir.path());
    let db = dir.path().join("state.db");

    // First supervisor starts the worker.
    let store = StateStore::open(&db).unwrap();
    let launcher = WorkerLauncher::new(script.clone(), PathBuf::from("gantry.yaml"));
    let first = Supervisor::new(
        store.clone(),
        Box::new(launcher),
        None,
        &HpcConfig::default(),
        &configs(),
    );
    first.start_all().await.unwrap();
    let pid = first.snapshot().await[0].pid.unwrap();
    drop(first);

    // A replacement supervisor reads the persisted PID, probes it, and
    // leaves the worker alone.
    let launcher = WorkerLauncher::new(script, PathBuf::from("gantry.yaml"));
    let second = Supervisor::new(
        store.clone(),
        Box::new(launcher),
        None,
        &HpcConfig::default(),
        &configs(),
    );
    second.adopt_persisted().await.unwrap();
    second.start_all().await.unwrap();
    second.check_health().await.unwrap();

    let snapshot = second.snapshot().await;
    assert_eq!(snapshot[0].pid, Some(pid), "worker was adopted, not respawned");
    assert_eq!(snapshot[0].restart_count, 0);
    assert_eq!(snapshot[0].consecutive_failures, 0);

    second.stop_all().await.unwrap();
    assert!(store.load_process_statuses().unwrap().is_empty());
}
