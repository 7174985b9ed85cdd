// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conductor worker: drains the conductor queue into the workflow
//! engine and emits its own periodic `system_monitor` tick.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use gantry_bus::{Broker, Envelope, HandlerError, MessageHandler, Outcome};
use gantry_conductor::{Conductor, WorkflowConfig};
use gantry_core::{AppConfig, Clock, SystemClock};
use gantry_storage::StateStore;

use super::WorkerRunError;

struct ConductorHandler {
    conductor: Conductor,
}

#[async_trait]
impl MessageHandler for ConductorHandler {
    async fn handle(&mut self, envelope: Envelope) -> Result<Outcome, HandlerError> {
        // process() already converts event-level faults into FAILED
        // cases; an Err here is a store/broker fault, worth a redelivery.
        match self.conductor.process(&envelope).await {
            Ok(()) => Ok(Outcome::Ack),
            Err(err) => Err(HandlerError(err.to_string())),
        }
    }
}

pub async fn run(
    config: &AppConfig,
    store: StateStore,
    broker: Broker,
    cancel: &CancellationToken,
) -> Result<(), WorkerRunError> {
    let conductor = Conductor::new(store, broker.clone(), WorkflowConfig::from_app(config));
    let mut handler = ConductorHandler { conductor };

    let ticker = {
        let broker = broker.clone();
        let queue = config.queues.system_curator.clone();
        let interval = Duration::from_secs(config.conductor.monitor_interval_sec.max(1));
        let cancel = cancel.clone();
        async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            timer.tick().await; // swallow the immediate first tick
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = timer.tick() => {}
                }
                let result = broker
                    .publish(
                        &queue,
                        "system_monitor",
                        json!({
                            "triggered_by": "conductor",
                            "timestamp": SystemClock.timestamp(),
                        }),
                        None,
                        0,
                    )
                    .await;
                if let Err(err) = result {
                    tracing::error!(error = %err, "failed to send system monitor task");
                }
            }
        }
    };

    let consume = broker.consume(&config.queues.conductor, &mut handler, cancel);
    tokio::pin!(consume);
    tokio::select! {
        result = &mut consume => result?,
        () = ticker => {
            // The ticker only ends on cancellation; let the consumer
            // finish its in-flight message before returning.
            consume.await?;
        }
    }
    Ok(())
}
