// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::StateStore;

fn temp_store() -> (tempfile::TempDir, StateStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open(&dir.path().join("state.db")).unwrap();
    (dir, store)
}

#[test]
fn processed_and_failed_paths_both_count_as_seen() {
    let (_dir, store) = temp_store();
    store.add_scanned_case("/staging/caseA", "processed").unwrap();
    store.add_scanned_case("/staging/caseB", "failed").unwrap();

    let seen = store.seen_case_paths().unwrap();
    assert!(seen.contains("/staging/caseA"));
    assert!(seen.contains("/staging/caseB"));
}

#[test]
fn rescan_overwrites_status() {
    let (_dir, store) = temp_store();
    store.add_scanned_case("/staging/caseA", "failed").unwrap();
    store.add_scanned_case("/staging/caseA", "processed").unwrap();
    assert_eq!(store.seen_case_paths().unwrap().len(), 1);
}

#[test]
fn removed_path_is_forgotten() {
    let (_dir, store) = temp_store();
    store.add_scanned_case("/staging/caseA", "processed").unwrap();
    store.remove_scanned_case("/staging/caseA").unwrap();
    assert!(store.seen_case_paths().unwrap().is_empty());
}
