// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Poison-message scenario: a non-JSON body on the conductor queue.

use async_trait::async_trait;
use gantry_bus::{dlq_name, Envelope, HandlerError, MessageHandler, Outcome};
use tokio_util::sync::CancellationToken;

use crate::support::{harness, CONDUCTOR};

/// Forwards events to the conductor the way the conductor worker does.
struct ForwardToConductor<'a> {
    conductor: &'a gantry_conductor::Conductor,
    seen: Vec<Envelope>,
    cancel: CancellationToken,
}

#[async_trait]
impl MessageHandler for ForwardToConductor<'_> {
    async fn handle(&mut self, envelope: Envelope) -> Result<Outcome, HandlerError> {
        self.conductor
            .process(&envelope)
            .await
            .map_err(|err| HandlerError(err.to_string()))?;
        self.seen.push(envelope);
        self.cancel.cancel();
        Ok(Outcome::Ack)
    }
}

#[tokio::test]
async fn poison_message_dead_letters_and_reports() {
    let h = harness(&["stepA"]);
    h.broker.publish_raw(CONDUCTOR, "\u{7}binary rubbish, not json").await.unwrap();

    let cancel = CancellationToken::new();
    let mut handler =
        ForwardToConductor { conductor: &h.conductor, seen: Vec::new(), cancel: cancel.clone() };
    h.broker.consume(CONDUCTOR, &mut handler, &cancel).await.unwrap();

    // The poison body went to the DLQ, and the consumer reported it as
    // a malformed_message event that the conductor absorbed.
    assert_eq!(h.broker.queue_depth(&dlq_name(CONDUCTOR)).await.unwrap(), 1);
    assert_eq!(handler.seen.len(), 1);
    assert_eq!(handler.seen[0].command, "malformed_message");

    // No case rows were touched.
    assert!(h.store.list_cases().unwrap().is_empty());
}
