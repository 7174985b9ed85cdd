// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::{StateStore, StepChange};
use gantry_core::CaseStatus;

fn temp_store() -> (tempfile::TempDir, StateStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open(&dir.path().join("state.db")).unwrap();
    (dir, store)
}

#[test]
fn update_creates_case_and_history_in_one_transaction() {
    let (_dir, store) = temp_store();
    store
        .update_case_status("c1", CaseStatus::Queued, Some("New case detected"), StepChange::Keep)
        .unwrap();

    let case = store.get_case("c1").unwrap().unwrap();
    assert_eq!(case.status, CaseStatus::Queued);
    assert_eq!(case.workflow_step, None);
    assert_eq!(case.created_at, case.last_updated);

    let history = store.case_history("c1").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, CaseStatus::Queued);
    assert_eq!(history[0].message.as_deref(), Some("New case detected"));
    assert_eq!(history[0].timestamp, case.last_updated);
}

#[test]
fn every_status_change_appends_exactly_one_history_row() {
    let (_dir, store) = temp_store();
    store.update_case_status("c1", CaseStatus::Queued, None, StepChange::Keep).unwrap();
    store
        .update_case_status("c1", CaseStatus::Processing, None, StepChange::Set("stepA"))
        .unwrap();
    store.update_case_status("c1", CaseStatus::Completed, None, StepChange::Clear).unwrap();

    let history = store.case_history("c1").unwrap();
    let statuses: Vec<_> = history.iter().map(|h| h.status).collect();
    assert_eq!(
        statuses,
        vec![CaseStatus::Queued, CaseStatus::Processing, CaseStatus::Completed]
    );
}

#[test]
fn step_change_set_and_clear() {
    let (_dir, store) = temp_store();
    store
        .update_case_status("c1", CaseStatus::Processing, None, StepChange::Set("stepA"))
        .unwrap();
    assert_eq!(store.case_workflow_step("c1").unwrap().as_deref(), Some("stepA"));

    // Keep leaves the step alone.
    store
        .update_case_status("c1", CaseStatus::PendingResource, None, StepChange::Keep)
        .unwrap();
    assert_eq!(store.case_workflow_step("c1").unwrap().as_deref(), Some("stepA"));

    store.update_case_status("c1", CaseStatus::Completed, None, StepChange::Clear).unwrap();
    assert_eq!(store.case_workflow_step("c1").unwrap(), None);
}

#[test]
fn failed_status_records_error_message() {
    let (_dir, store) = temp_store();
    store.update_case_status("c1", CaseStatus::Queued, None, StepChange::Keep).unwrap();
    store
        .update_case_status(
            "c1",
            CaseStatus::Failed,
            Some("Workflow failed: boom"),
            StepChange::Keep,
        )
        .unwrap();

    let case = store.get_case("c1").unwrap().unwrap();
    assert_eq!(case.status, CaseStatus::Failed);
    assert_eq!(case.error_message.as_deref(), Some("Workflow failed: boom"));
}

#[test]
fn terminal_status_clears_assigned_gpu() {
    let (_dir, store) = temp_store();
    store.register_gpu(0, None).unwrap();
    store.update_case_status("c1", CaseStatus::Queued, None, StepChange::Keep).unwrap();
    let gpu = store.reserve_gpu_for_case("c1").unwrap();
    assert_eq!(store.get_case("c1").unwrap().unwrap().assigned_gpu_id, Some(gpu));

    store.update_case_status("c1", CaseStatus::Completed, None, StepChange::Clear).unwrap();
    assert_eq!(store.get_case("c1").unwrap().unwrap().assigned_gpu_id, None);
}

#[test]
fn history_rows_record_the_gpu_in_effect() {
    let (_dir, store) = temp_store();
    store.register_gpu(3, None).unwrap();
    store.reserve_gpu_for_case("c1").unwrap();
    store
        .update_case_status("c1", CaseStatus::Processing, None, StepChange::Set("stepA"))
        .unwrap();

    let history = store.case_history("c1").unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.gpu_id, Some(3));
    assert_eq!(last.workflow_step.as_deref(), Some("stepA"));
}

#[test]
fn missing_case_reads_as_none() {
    let (_dir, store) = temp_store();
    assert!(!store.case_exists("ghost").unwrap());
    assert_eq!(store.case_status("ghost").unwrap(), None);
    assert_eq!(store.case_workflow_step("ghost").unwrap(), None);
}
