// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::StateStore;

fn temp_store() -> (tempfile::TempDir, StateStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open(&dir.path().join("state.db")).unwrap();
    (dir, store)
}

#[test]
fn upsert_and_load_round_trip() {
    let (_dir, store) = temp_store();
    store.upsert_process_status("remote_executor", 4242, true, "hpc.example.org").unwrap();
    store.upsert_process_status("conductor", 100, false, "localhost").unwrap();

    let rows = store.load_process_statuses().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].process_name, "conductor");
    assert_eq!(rows[0].pid, 100);
    assert!(!rows[0].is_remote);
    assert_eq!(rows[1].host, "hpc.example.org");
}

#[test]
fn upsert_replaces_previous_pid() {
    let (_dir, store) = temp_store();
    store.upsert_process_status("conductor", 100, false, "localhost").unwrap();
    store.upsert_process_status("conductor", 200, false, "localhost").unwrap();

    let rows = store.load_process_statuses().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].pid, 200);
}

#[test]
fn clear_removes_the_row() {
    let (_dir, store) = temp_store();
    store.upsert_process_status("conductor", 100, false, "localhost").unwrap();
    store.clear_process_status("conductor").unwrap();
    assert!(store.load_process_statuses().unwrap().is_empty());
}
