// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Optional `tracing` layer that mirrors log events into the `logs`
//! table. Failures are swallowed: the sink must never block operation.

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::store::StateStore;

/// Mirror of console logging into the state store.
///
/// Uses its own [`StateStore`] handle so log inserts never contend with
/// the caller's transaction on the same connection lock.
pub struct StoreLogLayer {
    store: StateStore,
}

impl StoreLogLayer {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }
}

#[derive(Default)]
struct EventFields {
    message: String,
    correlation_id: Option<String>,
}

impl Visit for EventFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "correlation_id" => self.correlation_id = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            "correlation_id" => self.correlation_id = Some(format!("{value:?}")),
            _ => {}
        }
    }
}

fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "TRACE",
        Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARN",
        Level::ERROR => "ERROR",
    }
}

impl<S: Subscriber> Layer<S> for StoreLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut fields = EventFields::default();
        event.record(&mut fields);
        if fields.message.is_empty() {
            return;
        }

        // Best effort only; a failed insert must not disturb the caller.
        let _ = self.store.insert_log(
            metadata.target(),
            level_name(metadata.level()),
            fields.correlation_id.as_deref(),
            &fields.message,
        );
    }
}

#[cfg(test)]
#[path = "sink_tests.rs"]
mod tests;
