// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gantry_remote::{FakeTransfer, TransferOp};

fn envelope(command: &str) -> Envelope {
    Envelope {
        command: command.into(),
        payload: serde_json::json!({
            "case_id": "c1",
            "local_path": "/staging/c1",
            "remote_path": "/data/upload/c1",
        }),
        timestamp: "2026-01-10T12:00:00.000Z".into(),
        correlation_id: "c1".into(),
        retry_count: 0,
    }
}

fn worker(transfer: &FakeTransfer) -> FileTransferWorker {
    FileTransferWorker::new(Arc::new(transfer.clone()), "file_transfer_queue".into())
}

#[test]
fn validates_command_and_required_fields() {
    let transfer = FakeTransfer::new();
    let worker = worker(&transfer);

    assert!(worker.validate(&envelope("upload_case")).is_ok());
    assert!(worker.validate(&envelope("download_results")).is_ok());

    let bad = Envelope { command: "execute_command".into(), ..envelope("upload_case") };
    assert!(worker.validate(&bad).unwrap_err().contains("unsupported command"));

    let missing = Envelope {
        payload: serde_json::json!({"case_id": "c1", "local_path": "/staging/c1"}),
        ..envelope("upload_case")
    };
    assert!(worker.validate(&missing).unwrap_err().contains("remote_path"));
}

#[tokio::test]
async fn upload_copies_then_verifies() {
    let transfer = FakeTransfer::new();
    let mut worker = worker(&transfer);

    let outcome = worker.execute(&envelope("upload_case")).await.unwrap().unwrap();
    assert_eq!(outcome.command, "case_upload_completed");
    assert_eq!(outcome.payload["case_id"], "c1");
    assert_eq!(outcome.payload["remote_path"], "/data/upload/c1");

    assert_eq!(
        transfer.ops(),
        vec![
            TransferOp::Upload { local: "/staging/c1".into(), remote: "/data/upload/c1".into() },
            TransferOp::Verify { local: "/staging/c1".into(), remote: "/data/upload/c1".into() },
        ]
    );
}

#[tokio::test]
async fn download_publishes_the_canonical_completion_event() {
    let transfer = FakeTransfer::new();
    let mut worker = worker(&transfer);

    let outcome = worker.execute(&envelope("download_results")).await.unwrap().unwrap();
    assert_eq!(outcome.command, "results_download_completed");

    assert_eq!(
        transfer.ops(),
        vec![
            TransferOp::Download { remote: "/data/upload/c1".into(), local: "/staging/c1".into() },
            TransferOp::Verify { local: "/staging/c1".into(), remote: "/data/upload/c1".into() },
        ]
    );
}

#[tokio::test]
async fn transport_failure_during_copy_is_a_network_error() {
    let transfer = FakeTransfer::new();
    transfer.fail_next_network("pipe closed");
    let mut worker = worker(&transfer);

    let err = worker.execute(&envelope("upload_case")).await.unwrap_err();
    assert_eq!(err.kind, WorkerErrorKind::Network);
    assert!(err.is_retryable());
}

#[test]
fn transfer_errors_classify_into_retry_kinds() {
    let integrity =
        classify(TransferError::Integrity { path: "/data/c1".into(), detail: "sha256".into() });
    assert_eq!(integrity.kind, WorkerErrorKind::DataIntegrity);
    assert!(integrity.is_retryable());

    let network = classify(TransferError::Network("reset".into()));
    assert_eq!(network.kind, WorkerErrorKind::Network);

    let not_found = classify(TransferError::NotFound("/staging/c1".into()));
    assert_eq!(not_found.kind, WorkerErrorKind::FileNotFound);
}

#[tokio::test]
async fn missing_local_file_is_file_not_found() {
    let transfer = FakeTransfer::new();
    transfer.fail_next_not_found("/staging/c1");
    let mut worker = worker(&transfer);

    let err = worker.execute(&envelope("upload_case")).await.unwrap_err();
    assert_eq!(err.kind, WorkerErrorKind::FileNotFound);
    assert!(err.is_retryable());
}

#[test]
fn failure_outcome_names_case_and_operation() {
    let transfer = FakeTransfer::new();
    let worker = worker(&transfer);
    let error = WorkerError::new(WorkerErrorKind::DataIntegrity, "mismatch");

    let upload = worker.failure_outcome(&envelope("upload_case"), &error).unwrap();
    assert_eq!(upload.command, "file_transfer_failed");
    assert_eq!(upload.payload["operation"], "upload");

    let download = worker.failure_outcome(&envelope("download_results"), &error).unwrap();
    assert_eq!(download.payload["operation"], "download");
    assert_eq!(download.payload["case_id"], "c1");
}
