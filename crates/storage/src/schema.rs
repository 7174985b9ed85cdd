// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema bootstrap.
//!
//! Every table is created `IF NOT EXISTS` inside one IMMEDIATE
//! transaction: the write lock makes the first successful connection the
//! single creator even when several processes boot at once.

use rusqlite::Connection;

const SCHEMA: &str = r#"
BEGIN IMMEDIATE;

CREATE TABLE IF NOT EXISTS cases (
    case_id TEXT PRIMARY KEY,
    status TEXT NOT NULL CHECK(status IN (
        'NEW', 'QUEUED', 'PROCESSING', 'UPLOADING', 'EXECUTING',
        'DOWNLOADING', 'COMPLETED', 'FAILED', 'PENDING_RESOURCE'
    )),
    assigned_gpu_id INTEGER,
    workflow_step TEXT,
    error_message TEXT,
    created_at TEXT NOT NULL,
    last_updated TEXT NOT NULL,
    FOREIGN KEY (assigned_gpu_id) REFERENCES gpu_resources(gpu_id)
);

CREATE TABLE IF NOT EXISTS case_history (
    history_id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_id TEXT NOT NULL,
    status TEXT NOT NULL,
    workflow_step TEXT,
    message TEXT,
    gpu_id INTEGER,
    timestamp TEXT NOT NULL,
    FOREIGN KEY (case_id) REFERENCES cases(case_id)
);

CREATE TABLE IF NOT EXISTS gpu_resources (
    gpu_id INTEGER PRIMARY KEY,
    uuid TEXT UNIQUE,
    status TEXT NOT NULL CHECK(status IN ('available', 'reserved', 'error', 'maintenance')),
    reserved_by_case_id TEXT,
    memory_mb INTEGER,
    utilization_percent REAL,
    temperature_celsius REAL,
    last_updated TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS scanned_cases (
    case_path TEXT PRIMARY KEY,
    scanned_at TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'processed' CHECK(status IN ('processed', 'failed'))
);

CREATE TABLE IF NOT EXISTS process_status (
    process_name TEXT PRIMARY KEY,
    pid INTEGER,
    is_remote INTEGER NOT NULL,
    host TEXT,
    last_updated TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS logs (
    log_id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    component TEXT NOT NULL,
    level TEXT NOT NULL CHECK(level IN ('TRACE', 'DEBUG', 'INFO', 'WARN', 'ERROR')),
    correlation_id TEXT,
    message TEXT NOT NULL
);

COMMIT;
"#;

/// Idempotently create all tables.
pub(crate) fn ensure_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}
