// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use async_trait::async_trait;
use serde_json::json;

fn temp_broker() -> (tempfile::TempDir, Broker) {
    let dir = tempfile::tempdir().unwrap();
    let broker = Broker::new(&dir.path().join("broker.db"), 3);
    (dir, broker)
}

/// Handler that records envelopes and replays scripted results.
struct ScriptedHandler {
    seen: Vec<Envelope>,
    script: Vec<Result<Outcome, HandlerError>>,
    cancel: CancellationToken,
    /// Cancel after this many deliveries.
    stop_after: usize,
}

impl ScriptedHandler {
    fn new(script: Vec<Result<Outcome, HandlerError>>, cancel: CancellationToken) -> Self {
        let stop_after = script.len();
        Self { seen: Vec::new(), script, cancel, stop_after }
    }
}

#[async_trait]
impl MessageHandler for ScriptedHandler {
    async fn handle(&mut self, envelope: Envelope) -> Result<Outcome, HandlerError> {
        self.seen.push(envelope);
        let result = if self.script.is_empty() {
            Ok(Outcome::Ack)
        } else {
            self.script.remove(0)
        };
        if self.seen.len() >= self.stop_after {
            self.cancel.cancel();
        }
        result
    }
}

async fn drain(broker: &Broker, queue: &str, script: Vec<Result<Outcome, HandlerError>>) -> Vec<Envelope> {
    let cancel = CancellationToken::new();
    let mut handler = ScriptedHandler::new(script, cancel.clone());
    broker.consume(queue, &mut handler, &cancel).await.unwrap();
    handler.seen
}

#[tokio::test]
async fn publish_then_consume_preserves_fifo_order() {
    let (_dir, broker) = temp_broker();
    for n in 0..3 {
        broker
            .publish("work", "new_case_found", json!({"case_id": format!("c{n}")}), None, 0)
            .await
            .unwrap();
    }

    let seen = drain(&broker, "work", vec![Ok(Outcome::Ack), Ok(Outcome::Ack), Ok(Outcome::Ack)]).await;
    let ids: Vec<_> = seen.iter().filter_map(|e| e.case_id().map(String::from)).collect();
    assert_eq!(ids, vec!["c0", "c1", "c2"]);
    assert_eq!(broker.queue_depth("work").await.unwrap(), 0);
}

#[tokio::test]
async fn messages_survive_broker_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broker.db");
    {
        let broker = Broker::new(&path, 3);
        broker.publish("work", "new_case_found", json!({"case_id": "c1"}), None, 0).await.unwrap();
    }
    let broker = Broker::new(&path, 3);
    assert_eq!(broker.queue_depth("work").await.unwrap(), 1);
}

#[tokio::test]
async fn publish_returns_supplied_correlation_id() {
    let (_dir, broker) = temp_broker();
    let id = broker
        .publish("work", "execute_command", json!({}), Some("case-7".into()), 0)
        .await
        .unwrap();
    assert_eq!(id.as_str(), "case-7");

    let generated = broker.publish("work", "execute_command", json!({}), None, 0).await.unwrap();
    assert!(!generated.as_str().is_empty());
}

#[tokio::test]
async fn retry_count_at_limit_publishes_to_dlq() {
    let (_dir, broker) = temp_broker();
    broker.publish("work", "upload_case", json!({"case_id": "c1"}), None, 3).await.unwrap();

    assert_eq!(broker.queue_depth("work").await.unwrap(), 0);
    assert_eq!(broker.queue_depth(&dlq_name("work")).await.unwrap(), 1);
}

#[tokio::test]
async fn unparseable_body_is_reported_when_a_report_queue_is_set() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Broker::new(&dir.path().join("broker.db"), 3).with_malformed_reports("work");
    broker.publish_raw("work", "\u{1}\u{2} not json").await.unwrap();

    // The report lands on the consumed queue itself and is delivered as
    // a regular event.
    let seen = drain(&broker, "work", vec![Ok(Outcome::Ack)]).await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].command, "malformed_message");
    assert!(seen[0].payload_str("original_message").unwrap().contains("not json"));
    assert_eq!(broker.queue_depth(&dlq_name("work")).await.unwrap(), 1);
}

#[tokio::test]
async fn unparseable_body_dead_letters_without_retry() {
    let (_dir, broker) = temp_broker();
    broker.publish_raw("work", "this is not json").await.unwrap();
    broker.publish("work", "new_case_found", json!({"case_id": "c1"}), None, 0).await.unwrap();

    let seen = drain(&broker, "work", vec![Ok(Outcome::Ack)]).await;
    // Only the valid message reached the handler.
    assert_eq!(seen.len(), 1);
    assert_eq!(broker.queue_depth(&dlq_name("work")).await.unwrap(), 1);
}

#[tokio::test]
async fn failing_handler_dead_letters_after_max_retries_plus_one_deliveries() {
    let (_dir, broker) = temp_broker();
    broker.publish("work", "upload_case", json!({"case_id": "c1"}), None, 0).await.unwrap();

    let script = (0..4).map(|_| Err(HandlerError("kaboom".into()))).collect();
    let seen = drain(&broker, "work", script).await;

    // Delivered at retry_count 0, 1, 2, 3: max_retries + 1 attempts.
    assert_eq!(seen.len(), 4);
    let counts: Vec<_> = seen.iter().map(|e| e.retry_count).collect();
    assert_eq!(counts, vec![0, 1, 2, 3]);
    // Correlation ID survives every republish.
    assert!(seen.iter().all(|e| e.correlation_id == seen[0].correlation_id));
    assert_eq!(broker.queue_depth("work").await.unwrap(), 0);
    assert_eq!(broker.queue_depth(&dlq_name("work")).await.unwrap(), 1);
}

#[tokio::test]
async fn handler_dead_letter_outcome_routes_to_dlq() {
    let (_dir, broker) = temp_broker();
    broker.publish("work", "bogus", json!({}), None, 0).await.unwrap();

    drain(&broker, "work", vec![Ok(Outcome::DeadLetter)]).await;
    assert_eq!(broker.queue_depth(&dlq_name("work")).await.unwrap(), 1);
}

#[tokio::test]
async fn claimed_messages_are_reoffered_on_restart() {
    let (_dir, broker) = temp_broker();
    broker.publish("work", "new_case_found", json!({"case_id": "c1"}), None, 0).await.unwrap();

    // Simulate a consumer that claimed and crashed.
    broker.claim_next("work").await.unwrap();

    let seen = drain(&broker, "work", vec![Ok(Outcome::Ack)]).await;
    assert_eq!(seen.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unreachable_broker_surfaces_unavailable_after_backoff() {
    // A directory that does not exist: every connect attempt fails.
    let broker = Broker::new(Path::new("/nonexistent/dir/broker.db"), 3);
    let err = broker
        .publish("work", "new_case_found", json!({"case_id": "c1"}), None, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::Unavailable(_)));
}

#[tokio::test]
async fn queues_are_isolated() {
    let (_dir, broker) = temp_broker();
    broker.publish("a", "x", json!({}), None, 0).await.unwrap();
    broker.publish("b", "y", json!({}), None, 0).await.unwrap();

    let seen = drain(&broker, "a", vec![Ok(Outcome::Ack)]).await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].command, "x");
    assert_eq!(broker.queue_depth("b").await.unwrap(), 1);
}
