// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gantry-bus: durable queues and the common worker shape.
//!
//! The broker is an embedded durable-queue database: queues are rows in a
//! single SQLite file with WAL enabled, so messages survive restarts and
//! per-queue FIFO falls out of the monotonic rowid. Every primary queue
//! has a `<queue>.dlq` companion that receives malformed bodies and
//! messages whose retries are exhausted.

mod broker;
mod envelope;
mod error;
mod worker;

pub use broker::{dlq_name, Broker, MessageHandler, Outcome};
pub use envelope::Envelope;
pub use error::{BusError, HandlerError};
pub use worker::{run_worker, OutcomeMessage, RetryPolicy, Worker, WorkerError, WorkerErrorKind};
