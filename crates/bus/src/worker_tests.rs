// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::dlq_name;
use serde_json::json;

const CONDUCTOR: &str = "conductor_queue";

fn fast_policy() -> RetryPolicy {
    RetryPolicy { max_retries: 3, base_delay: Duration::from_millis(1) }
}

/// Worker whose execute() replays a script of results.
struct ScriptedWorker {
    script: Vec<Result<Option<OutcomeMessage>, WorkerError>>,
    executed: Vec<Envelope>,
    cancel: CancellationToken,
}

#[async_trait]
impl Worker for ScriptedWorker {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn queue(&self) -> &str {
        "scripted_queue"
    }

    fn validate(&self, envelope: &Envelope) -> Result<(), String> {
        if envelope.command != "do_thing" {
            return Err(format!("unsupported command type: {}", envelope.command));
        }
        if envelope.case_id().is_none() {
            return Err("missing 'case_id' field in payload".into());
        }
        Ok(())
    }

    async fn execute(&mut self, envelope: &Envelope) -> Result<Option<OutcomeMessage>, WorkerError> {
        self.executed.push(envelope.clone());
        let result = if self.script.is_empty() {
            Ok(None)
        } else {
            self.script.remove(0)
        };
        if self.script.is_empty() {
            self.cancel.cancel();
        }
        result
    }

    fn failure_outcome(&self, envelope: &Envelope, error: &WorkerError) -> Option<OutcomeMessage> {
        Some(OutcomeMessage::new(
            "thing_failed",
            json!({
                "case_id": envelope.case_id(),
                "error": error.to_string(),
            }),
        ))
    }
}

async fn run_scripted(
    broker: &Broker,
    script: Vec<Result<Option<OutcomeMessage>, WorkerError>>,
) -> Vec<Envelope> {
    let cancel = CancellationToken::new();
    let mut worker = ScriptedWorker { script, executed: Vec::new(), cancel: cancel.clone() };
    // Validation failures never reach execute(), so cancel once the
    // queue drains as a backstop.
    let consume = run_worker(broker, CONDUCTOR, &mut worker, fast_policy(), &cancel);
    tokio::select! {
        result = consume => result.unwrap(),
        _ = tokio::time::sleep(Duration::from_secs(5)) => panic!("worker did not finish"),
    }
    worker.executed
}

async fn conductor_messages(broker: &Broker) -> Vec<Envelope> {
    let mut messages = Vec::new();
    while broker.queue_depth(CONDUCTOR).await.unwrap() > 0 {
        let cancel = CancellationToken::new();
        struct Collect<'a> {
            sink: &'a mut Vec<Envelope>,
            cancel: CancellationToken,
        }
        #[async_trait]
        impl MessageHandler for Collect<'_> {
            async fn handle(&mut self, envelope: Envelope) -> Result<Outcome, HandlerError> {
                self.sink.push(envelope);
                self.cancel.cancel();
                Ok(Outcome::Ack)
            }
        }
        let mut handler = Collect { sink: &mut messages, cancel: cancel.clone() };
        broker.consume(CONDUCTOR, &mut handler, &cancel).await.unwrap();
    }
    messages
}

fn temp_broker() -> (tempfile::TempDir, Broker) {
    let dir = tempfile::tempdir().unwrap();
    let broker = Broker::new(&dir.path().join("broker.db"), 3);
    (dir, broker)
}

#[tokio::test]
async fn success_publishes_outcome_with_inbound_correlation_id() {
    let (_dir, broker) = temp_broker();
    broker
        .publish("scripted_queue", "do_thing", json!({"case_id": "c1"}), Some("corr-1".into()), 0)
        .await
        .unwrap();

    let executed = run_scripted(
        &broker,
        vec![Ok(Some(OutcomeMessage::new("thing_done", json!({"case_id": "c1"}))))],
    )
    .await;
    assert_eq!(executed.len(), 1);

    let outcomes = conductor_messages(&broker).await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].command, "thing_done");
    assert_eq!(outcomes[0].correlation_id.as_str(), "corr-1");
}

#[tokio::test]
async fn transient_failures_are_retried_then_succeed() {
    let (_dir, broker) = temp_broker();
    broker
        .publish("scripted_queue", "do_thing", json!({"case_id": "c1"}), None, 0)
        .await
        .unwrap();

    let executed = run_scripted(
        &broker,
        vec![
            Err(WorkerError::new(WorkerErrorKind::RemoteExecution, "exit 1")),
            Err(WorkerError::new(WorkerErrorKind::Network, "reset")),
            Ok(Some(OutcomeMessage::new("thing_done", json!({"case_id": "c1"})))),
        ],
    )
    .await;

    // Two transient failures, third attempt succeeds; one delivery only.
    assert_eq!(executed.len(), 3);
    let outcomes = conductor_messages(&broker).await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].command, "thing_done");
    assert_eq!(broker.queue_depth(&dlq_name("scripted_queue")).await.unwrap(), 0);
}

#[tokio::test]
async fn exhausted_retries_publish_failure_and_dead_letter() {
    let (_dir, broker) = temp_broker();
    broker
        .publish("scripted_queue", "do_thing", json!({"case_id": "c1"}), Some("corr-9".into()), 0)
        .await
        .unwrap();

    let failures = (0..4)
        .map(|n| Err(WorkerError::new(WorkerErrorKind::DataIntegrity, format!("mismatch {n}"))))
        .collect();
    let executed = run_scripted(&broker, failures).await;
    assert_eq!(executed.len(), 4, "initial attempt plus max_retries");

    let outcomes = conductor_messages(&broker).await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].command, "thing_failed");
    assert_eq!(outcomes[0].correlation_id.as_str(), "corr-9");
    assert_eq!(broker.queue_depth(&dlq_name("scripted_queue")).await.unwrap(), 1);
}

#[tokio::test]
async fn fatal_errors_skip_the_retry_loop() {
    let (_dir, broker) = temp_broker();
    broker
        .publish("scripted_queue", "do_thing", json!({"case_id": "c1"}), None, 0)
        .await
        .unwrap();

    let executed =
        run_scripted(&broker, vec![Err(WorkerError::new(WorkerErrorKind::Fatal, "bad state"))])
            .await;
    assert_eq!(executed.len(), 1);
    assert_eq!(broker.queue_depth(&dlq_name("scripted_queue")).await.unwrap(), 1);
}

#[tokio::test]
async fn invalid_message_reports_malformed_and_dead_letters() {
    let (_dir, broker) = temp_broker();
    broker
        .publish("scripted_queue", "wrong_command", json!({"case_id": "c1"}), None, 0)
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let mut worker =
        ScriptedWorker { script: Vec::new(), executed: Vec::new(), cancel: cancel.clone() };
    let consume = run_worker(&broker, CONDUCTOR, &mut worker, fast_policy(), &cancel);
    // Validation failure never reaches execute(), so stop once the DLQ
    // has the message.
    tokio::select! {
        result = consume => result.unwrap(),
        _ = async {
            loop {
                if broker.queue_depth(&dlq_name("scripted_queue")).await.unwrap_or(0) > 0 {
                    cancel.cancel();
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            cancel.cancelled().await;
        } => {}
    }

    assert!(worker.executed.is_empty());
    let outcomes = conductor_messages(&broker).await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].command, "malformed_message");
    assert!(outcomes[0].payload_str("error").unwrap().contains("unsupported command"));
    assert!(outcomes[0].payload_str("original_message").unwrap().len() <= 500);
}
