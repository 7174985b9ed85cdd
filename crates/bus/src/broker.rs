// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The embedded durable-queue broker.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tokio_util::sync::CancellationToken;

use gantry_core::{Clock, CorrelationId, SystemClock};

use crate::envelope::Envelope;
use crate::error::{BusError, HandlerError};

const CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Dead-letter companion of a primary queue.
pub fn dlq_name(queue: &str) -> String {
    format!("{queue}.dlq")
}

/// Terminal signal from a message handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Processing finished; remove the message.
    Ack,
    /// The message cannot be processed; route it to the DLQ.
    DeadLetter,
}

/// A consume-loop handler. One message is in flight per consumer
/// (prefetch = 1); returning `Err` republishes the message with an
/// incremented retry count, or dead-letters it once retries are
/// exhausted.
#[async_trait]
pub trait MessageHandler: Send {
    async fn handle(&mut self, envelope: Envelope) -> Result<Outcome, HandlerError>;
}

/// Durable queue broker backed by a single SQLite file.
///
/// Connects lazily on first use; a publish that cannot connect retries
/// with bounded exponential backoff before surfacing
/// [`BusError::Unavailable`].
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
    /// Queue that receives `malformed_message` reports for unparseable
    /// bodies seen by this handle's consume loop.
    report_queue: Option<String>,
}

struct BrokerInner {
    path: PathBuf,
    max_retries: u32,
    conn: Mutex<Option<Connection>>,
    timestamp: Box<dyn Fn() -> String + Send + Sync>,
}

impl Broker {
    /// Create a broker handle with the system clock.
    pub fn new(path: &Path, max_retries: u32) -> Self {
        Self::with_clock(path, max_retries, SystemClock)
    }

    /// Create a broker handle with an explicit clock.
    pub fn with_clock<C: Clock + 'static>(path: &Path, max_retries: u32, clock: C) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                path: path.to_path_buf(),
                max_retries,
                conn: Mutex::new(None),
                timestamp: Box::new(move || clock.timestamp()),
            }),
            report_queue: None,
        }
    }

    /// Report unparseable bodies to `queue` as `malformed_message`
    /// events (in addition to dead-lettering them).
    pub fn with_malformed_reports(mut self, queue: &str) -> Self {
        self.report_queue = Some(queue.to_string());
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.inner.max_retries
    }

    fn open_connection(&self) -> Result<Connection, rusqlite::Error> {
        let conn = Connection::open(&self.inner.path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "busy_timeout", 30_000)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS messages (
                 message_id INTEGER PRIMARY KEY AUTOINCREMENT,
                 queue TEXT NOT NULL,
                 body TEXT NOT NULL,
                 state TEXT NOT NULL DEFAULT 'ready' CHECK(state IN ('ready', 'claimed')),
                 enqueued_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_messages_queue
                 ON messages(queue, state, message_id);",
        )?;
        Ok(conn)
    }

    /// Run `f` on the live connection, connecting lazily with bounded
    /// exponential backoff.
    async fn with_conn<T>(
        &self,
        f: impl Fn(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, BusError> {
        let mut delay = CONNECT_BASE_DELAY;
        let mut last_error = String::new();
        for attempt in 0..CONNECT_ATTEMPTS {
            enum Step<T> {
                Done(T),
                ConnectFailed,
                Retry,
            }

            let step = {
                let mut guard = self.inner.conn.lock();
                let connect_failed = if guard.is_none() {
                    match self.open_connection() {
                        Ok(conn) => {
                            *guard = Some(conn);
                            false
                        }
                        Err(err) => {
                            last_error = err.to_string();
                            true
                        }
                    }
                } else {
                    false
                };

                if connect_failed {
                    Step::ConnectFailed
                } else if let Some(conn) = guard.as_ref() {
                    match f(conn) {
                        Ok(value) => Step::Done(value),
                        Err(err) => {
                            // Invalidate the connection; retry reconnects.
                            last_error = err.to_string();
                            *guard = None;
                            Step::Retry
                        }
                    }
                } else {
                    Step::Retry
                }
            };
            match step {
                Step::Done(value) => return Ok(value),
                Step::ConnectFailed => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %last_error,
                        "broker connect failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    continue;
                }
                Step::Retry => {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
        Err(BusError::Unavailable(last_error))
    }

    /// Publish a message. Returns the correlation ID (generated when not
    /// supplied). A message whose `retry_count` already reached the
    /// retry limit goes straight to the queue's DLQ.
    pub async fn publish(
        &self,
        queue: &str,
        command: &str,
        payload: serde_json::Value,
        correlation_id: Option<CorrelationId>,
        retry_count: u32,
    ) -> Result<CorrelationId, BusError> {
        let correlation_id = correlation_id.unwrap_or_else(CorrelationId::generate);
        let envelope = Envelope {
            command: command.to_string(),
            payload,
            timestamp: (self.inner.timestamp)(),
            correlation_id: correlation_id.clone(),
            retry_count,
        };
        let body = serde_json::to_string(&envelope)?;

        let target = if retry_count >= self.inner.max_retries {
            tracing::warn!(
                queue,
                command,
                correlation_id = %correlation_id,
                retry_count,
                "retry limit reached, routing message to DLQ"
            );
            dlq_name(queue)
        } else {
            queue.to_string()
        };

        let enqueued_at = (self.inner.timestamp)();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO messages (queue, body, enqueued_at) VALUES (?1, ?2, ?3)",
                params![target, body, enqueued_at],
            )
            .map(|_| ())
        })
        .await?;
        tracing::debug!(queue, command, correlation_id = %correlation_id, "published message");
        Ok(correlation_id)
    }

    /// Publish a raw body without envelope validation. Used by queue
    /// tooling and tests; consumers dead-letter anything unparseable.
    pub async fn publish_raw(&self, queue: &str, body: &str) -> Result<(), BusError> {
        let queue = queue.to_string();
        let body = body.to_string();
        let enqueued_at = (self.inner.timestamp)();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO messages (queue, body, enqueued_at) VALUES (?1, ?2, ?3)",
                params![queue, body, enqueued_at],
            )
            .map(|_| ())
        })
        .await
    }

    /// Pop the next ready message without entering a consume loop.
    /// Unparseable bodies are dead-lettered and skipped. Used by queue
    /// tooling and test harnesses.
    pub async fn take_next(&self, queue: &str) -> Result<Option<Envelope>, BusError> {
        loop {
            let Some((message_id, body)) = self.claim_next(queue).await? else {
                return Ok(None);
            };
            match serde_json::from_str(&body) {
                Ok(envelope) => {
                    self.delete_message(message_id).await?;
                    return Ok(Some(envelope));
                }
                Err(_) => self.move_to_dlq(message_id, queue).await?,
            }
        }
    }

    /// Number of messages currently sitting in a queue.
    pub async fn queue_depth(&self, queue: &str) -> Result<u64, BusError> {
        let queue = queue.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE queue = ?1",
                [queue.as_str()],
                |row| row.get::<_, u64>(0),
            )
        })
        .await
    }

    /// Consume messages one at a time until cancelled.
    ///
    /// Messages left `claimed` by a crashed consumer are re-offered when
    /// the loop starts (at-least-once delivery). The cancellation token
    /// is honored between deliveries only; an in-flight handler runs to
    /// completion.
    pub async fn consume<H: MessageHandler>(
        &self,
        queue: &str,
        handler: &mut H,
        cancel: &CancellationToken,
    ) -> Result<(), BusError> {
        self.recover_claimed(queue).await?;

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let Some((message_id, body)) = self.claim_next(queue).await? else {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(POLL_INTERVAL) => continue,
                }
            };

            let envelope: Envelope = match serde_json::from_str(&body) {
                Ok(envelope) => envelope,
                Err(err) => {
                    tracing::error!(
                        queue,
                        error = %err,
                        body_preview = body.get(..100).unwrap_or(&body),
                        "unparseable message body, dead-lettering"
                    );
                    if let Some(report) = self.report_queue.clone() {
                        let preview: String = body.chars().take(500).collect();
                        let result = self
                            .publish(
                                &report,
                                "malformed_message",
                                serde_json::json!({
                                    "error": err.to_string(),
                                    "original_message": preview,
                                }),
                                None,
                                0,
                            )
                            .await;
                        if let Err(publish_err) = result {
                            tracing::error!(
                                error = %publish_err,
                                "failed to report malformed message"
                            );
                        }
                    }
                    self.move_to_dlq(message_id, queue).await?;
                    continue;
                }
            };

            let correlation_id = envelope.correlation_id.clone();
            let command = envelope.command.clone();
            let retry_count = envelope.retry_count;
            match handler.handle(envelope.clone()).await {
                Ok(Outcome::Ack) => self.delete_message(message_id).await?,
                Ok(Outcome::DeadLetter) => {
                    tracing::warn!(
                        queue,
                        command = command.as_str(),
                        correlation_id = %correlation_id,
                        "handler dead-lettered message"
                    );
                    self.move_to_dlq(message_id, queue).await?;
                }
                Err(err) => {
                    if retry_count >= self.inner.max_retries {
                        tracing::warn!(
                            queue,
                            command = command.as_str(),
                            correlation_id = %correlation_id,
                            retry_count,
                            error = %err,
                            "retries exhausted, dead-lettering message"
                        );
                        self.move_to_dlq(message_id, queue).await?;
                    } else {
                        tracing::info!(
                            queue,
                            command = command.as_str(),
                            correlation_id = %correlation_id,
                            retry_count = retry_count + 1,
                            error = %err,
                            "handler failed, republishing for retry"
                        );
                        self.publish(
                            queue,
                            &command,
                            envelope.payload,
                            Some(correlation_id),
                            retry_count + 1,
                        )
                        .await?;
                        self.delete_message(message_id).await?;
                    }
                }
            }
        }
    }

    async fn recover_claimed(&self, queue: &str) -> Result<(), BusError> {
        let queue = queue.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE messages SET state = 'ready' WHERE queue = ?1 AND state = 'claimed'",
                [queue.as_str()],
            )
            .map(|_| ())
        })
        .await
    }

    async fn claim_next(&self, queue: &str) -> Result<Option<(i64, String)>, BusError> {
        let queue = queue.to_string();
        self.with_conn(move |conn| {
            let next = conn
                .query_row(
                    "SELECT message_id, body FROM messages
                     WHERE queue = ?1 AND state = 'ready'
                     ORDER BY message_id LIMIT 1",
                    [queue.as_str()],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;
            if let Some((message_id, _)) = &next {
                conn.execute(
                    "UPDATE messages SET state = 'claimed' WHERE message_id = ?1",
                    [message_id],
                )?;
            }
            Ok(next)
        })
        .await
    }

    async fn delete_message(&self, message_id: i64) -> Result<(), BusError> {
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM messages WHERE message_id = ?1", [message_id]).map(|_| ())
        })
        .await
    }

    async fn move_to_dlq(&self, message_id: i64, queue: &str) -> Result<(), BusError> {
        let dlq = dlq_name(queue);
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE messages SET queue = ?1, state = 'ready' WHERE message_id = ?2",
                params![dlq, message_id],
            )
            .map(|_| ())
        })
        .await
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
