// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection handling and the two primitive access scopes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, Transaction};

use gantry_core::{Clock, SystemClock};

use crate::error::StorageError;
use crate::schema;

/// One logical handle onto the state store.
///
/// A handle wraps a single SQLite connection; clones share it and
/// serialize on an internal lock. Give each concurrent actor its own
/// handle via [`StateStore::open`]; within one process a handle is safe
/// to share, across processes WAL + the 30 s busy timeout arbitrate.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    path: PathBuf,
    conn: Mutex<Connection>,
    timestamp: Box<dyn Fn() -> String + Send + Sync>,
}

impl StateStore {
    /// Open a handle with the system clock.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Self::open_with_clock(path, SystemClock)
    }

    /// Open a handle with an explicit clock (tests pin timestamps).
    pub fn open_with_clock<C: Clock + 'static>(path: &Path, clock: C) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "busy_timeout", 30_000)?;
        schema::ensure_schema(&conn)?;

        Ok(Self {
            inner: Arc::new(StoreInner {
                path: path.to_path_buf(),
                conn: Mutex::new(conn),
                timestamp: Box::new(move || clock.timestamp()),
            }),
        })
    }

    /// Path this handle was opened on.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Current ISO-8601 UTC timestamp from the handle's clock.
    pub(crate) fn timestamp(&self) -> String {
        (self.inner.timestamp)()
    }

    /// Raw connection access for internal callers that need to inspect
    /// SQLite error codes before mapping.
    pub(crate) fn raw<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, rusqlite::Error> {
        let conn = self.inner.conn.lock();
        f(&conn)
    }

    /// Snapshot read on the live connection.
    pub fn read<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, StorageError> {
        let conn = self.inner.conn.lock();
        f(&conn).map_err(StorageError::from)
    }

    /// Scoped transaction: commit on `Ok`, rollback on `Err`.
    ///
    /// All multi-statement mutations go through here. The error type is
    /// generic so domain aborts (e.g. a lost reservation race) roll back
    /// without masquerading as storage failures.
    pub fn transaction<T, E>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        let mut conn = self.inner.conn.lock();
        let tx = conn.transaction().map_err(|e| E::from(StorageError::from(e)))?;
        let value = f(&tx)?;
        tx.commit().map_err(|e| E::from(StorageError::from(e)))?;
        Ok(value)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
