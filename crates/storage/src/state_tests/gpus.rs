// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::{ReserveError, StateStore, StepChange};
use gantry_core::{CaseStatus, GpuSample, GpuStatus};

fn temp_store() -> (tempfile::TempDir, StateStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open(&dir.path().join("state.db")).unwrap();
    (dir, store)
}

#[test]
fn reserve_flips_gpu_and_links_case_both_ways() {
    let (_dir, store) = temp_store();
    store.register_gpu(0, Some("GPU-aaaa")).unwrap();

    let gpu_id = store.reserve_gpu_for_case("c1").unwrap();
    assert_eq!(gpu_id, 0);

    let gpus = store.list_gpus().unwrap();
    assert_eq!(gpus[0].status, GpuStatus::Reserved);
    assert_eq!(gpus[0].reserved_by_case_id.as_deref(), Some("c1"));

    let case = store.get_case("c1").unwrap().unwrap();
    assert_eq!(case.assigned_gpu_id, Some(0));
    // Reservation created the case row when it did not exist.
    assert_eq!(case.status, CaseStatus::Queued);
}

#[test]
fn reserve_with_no_available_gpu_is_no_resource() {
    let (_dir, store) = temp_store();
    assert!(matches!(store.reserve_gpu_for_case("c1"), Err(ReserveError::NoResource)));

    store.register_gpu(0, None).unwrap();
    store.reserve_gpu_for_case("c1").unwrap();
    assert!(matches!(store.reserve_gpu_for_case("c2"), Err(ReserveError::NoResource)));
}

#[test]
fn a_case_never_holds_more_than_one_gpu() {
    let (_dir, store) = temp_store();
    store.register_gpu(0, None).unwrap();
    store.register_gpu(1, None).unwrap();

    store.reserve_gpu_for_case("c1").unwrap();
    let second = store.reserve_gpu_for_case("c2").unwrap();
    assert_eq!(second, 1);

    let reserved_by_c1: Vec<_> = store
        .list_gpus()
        .unwrap()
        .into_iter()
        .filter(|g| g.reserved_by_case_id.as_deref() == Some("c1"))
        .collect();
    assert_eq!(reserved_by_c1.len(), 1);
}

#[test]
fn concurrent_reservations_grant_at_most_k_gpus() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    let setup = StateStore::open(&path).unwrap();
    setup.register_gpu(0, None).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let path = path.clone();
            std::thread::spawn(move || {
                let store = StateStore::open(&path)?;
                Ok::<_, crate::StorageError>(store.reserve_gpu_for_case(&format!("c{i}")).is_ok())
            })
        })
        .collect();

    let granted = handles
        .into_iter()
        .map(|h| h.join())
        .filter(|r| matches!(r, Ok(Ok(true))))
        .count();
    assert_eq!(granted, 1, "exactly one reservation should win");

    let reserved = setup
        .list_gpus()
        .unwrap()
        .into_iter()
        .filter(|g| g.status == GpuStatus::Reserved)
        .count();
    assert_eq!(reserved, 1);
}

#[test]
fn release_is_idempotent_and_two_sided() {
    let (_dir, store) = temp_store();
    store.register_gpu(0, None).unwrap();
    store.reserve_gpu_for_case("c1").unwrap();

    store.release_gpu_for_case("c1").unwrap();
    let gpus = store.list_gpus().unwrap();
    assert_eq!(gpus[0].status, GpuStatus::Available);
    assert_eq!(gpus[0].reserved_by_case_id, None);
    assert_eq!(store.get_case("c1").unwrap().unwrap().assigned_gpu_id, None);

    // Releasing again (or for a case holding nothing) is a no-op.
    store.release_gpu_for_case("c1").unwrap();
    store.release_gpu_for_case("ghost").unwrap();
}

#[test]
fn telemetry_upsert_never_touches_reservation_state() {
    let (_dir, store) = temp_store();
    store.register_gpu(0, None).unwrap();
    store.reserve_gpu_for_case("c1").unwrap();

    store
        .update_gpu_samples(&[
            GpuSample {
                gpu_id: 0,
                uuid: Some("GPU-aaaa".into()),
                memory_mb: Some(16_384),
                utilization_percent: Some(87.5),
                temperature_celsius: Some(64.0),
            },
            GpuSample {
                gpu_id: 1,
                uuid: None,
                memory_mb: Some(16_384),
                utilization_percent: Some(1.0),
                temperature_celsius: Some(35.0),
            },
        ])
        .unwrap();

    let gpus = store.list_gpus().unwrap();
    assert_eq!(gpus.len(), 2);
    // Reserved GPU kept its reservation, got fresh measurements.
    assert_eq!(gpus[0].status, GpuStatus::Reserved);
    assert_eq!(gpus[0].reserved_by_case_id.as_deref(), Some("c1"));
    assert_eq!(gpus[0].utilization_percent, Some(87.5));
    // New GPU appeared as available.
    assert_eq!(gpus[1].status, GpuStatus::Available);
}

#[test]
fn maintenance_gpus_are_not_reservable() {
    let (_dir, store) = temp_store();
    store.register_gpu(0, None).unwrap();
    store.set_gpu_status(0, GpuStatus::Maintenance).unwrap();
    assert!(matches!(store.reserve_gpu_for_case("c1"), Err(ReserveError::NoResource)));
}

#[test]
fn reserve_does_not_downgrade_existing_case_status() {
    let (_dir, store) = temp_store();
    store.register_gpu(0, None).unwrap();
    store
        .update_case_status("c1", CaseStatus::PendingResource, None, StepChange::Keep)
        .unwrap();

    store.reserve_gpu_for_case("c1").unwrap();
    // Status changes are the conductor's job; reserve only links the GPU.
    assert_eq!(store.case_status("c1").unwrap(), Some(CaseStatus::PendingResource));
}
