// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::StateStore;
use tracing_subscriber::layer::SubscriberExt;

#[test]
fn events_land_in_the_logs_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    let store = StateStore::open(&path).unwrap();

    let subscriber =
        tracing_subscriber::registry().with(StoreLogLayer::new(StateStore::open(&path).unwrap()));
    tracing::subscriber::with_default(subscriber, || {
        tracing::info!(correlation_id = "corr-1", "case advanced");
        tracing::warn!("no GPUs available");
    });

    let logs = store.recent_logs(10).unwrap();
    assert_eq!(logs.len(), 2);
    // Newest first.
    assert_eq!(logs[0].level, "WARN");
    assert_eq!(logs[0].message, "no GPUs available");
    assert_eq!(logs[0].correlation_id, None);
    assert_eq!(logs[1].level, "INFO");
    assert_eq!(logs[1].correlation_id.as_deref(), Some("corr-1"));
}

#[test]
fn insert_log_records_component_and_level() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open(&dir.path().join("state.db")).unwrap();

    store.insert_log("conductor", "INFO", Some("corr-9"), "workflow started").unwrap();

    let logs = store.recent_logs(1).unwrap();
    assert_eq!(logs[0].component, "conductor");
    assert_eq!(logs[0].correlation_id.as_deref(), Some("corr-9"));
}
