//! Canonical SQLite schema for the event store.
//!
//! - `open_events` is the append-only log; rows are never updated and are
//!   removed only by the retention sweep
//! - `store_meta` tracks schema version and the last retention sweep

/// Migration v1: event log plus store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS open_events (
    event_id INTEGER PRIMARY KEY AUTOINCREMENT,
    identifier TEXT NOT NULL CHECK (length(identifier) BETWEEN 1 AND 100),
    origin TEXT NOT NULL,
    agent TEXT NOT NULL DEFAULT '',
    occurred_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    last_sweep_at_us INTEGER NOT NULL DEFAULT 0,
    last_sweep_deleted INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO store_meta (
    id,
    schema_version,
    last_sweep_at_us,
    last_sweep_deleted
) VALUES (1, 1, 0, 0);
";

/// Migration v2: read-path indexes for dedup lookups, sweeps and reports.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_open_events_key_time
    ON open_events(identifier, origin, occurred_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_open_events_time
    ON open_events(occurred_at_us);

CREATE INDEX IF NOT EXISTS idx_open_events_identifier_time
    ON open_events(identifier, occurred_at_us);

UPDATE store_meta
SET schema_version = 2
WHERE id = 1;
";

/// Indexes expected by dedup, sweep and report query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_open_events_key_time",
    "idx_open_events_time",
    "idx_open_events_identifier_time",
];
