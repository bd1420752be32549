//! Event store seam and its implementations.
//!
//! [`EventStore`] is the only way core logic touches persistence. Every
//! operation receives the store explicitly, which keeps the dedup policy and
//! the report path testable against [`MemoryStore`].
//!
//! [`SqliteStore`] is the production store. Its conditional insert runs the
//! recency check and the insert inside one `BEGIN IMMEDIATE` transaction, so
//! two concurrent opens for the same pair cannot both be recorded.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::dedup::within_window;
use crate::error::ErrorCode;
use crate::event::{OpenEvent, from_micros};
use crate::range::TimeRange;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures reaching or reading the event store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached: locked, busy, missing, or I/O failure.
    #[error("event store unavailable: {reason}")]
    Unavailable { reason: String },

    /// Any other SQLite failure.
    #[error("event store query failed: {0}")]
    Query(#[source] rusqlite::Error),

    /// A stored row could not be decoded.
    #[error("corrupt event row {event_id}: {reason}")]
    Corrupt { event_id: i64, reason: String },
}

impl StoreError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Unavailable { .. } => ErrorCode::StoreUnavailable,
            Self::Query(_) => ErrorCode::StoreQueryFailed,
            Self::Corrupt { .. } => ErrorCode::CorruptStore,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode as Sql;

        match err {
            rusqlite::Error::SqliteFailure(ref failure, _)
                if matches!(
                    failure.code,
                    Sql::DatabaseBusy
                        | Sql::DatabaseLocked
                        | Sql::CannotOpen
                        | Sql::SystemIoFailure
                        | Sql::PermissionDenied
                        | Sql::ReadOnly
                        | Sql::DiskFull
                        | Sql::NotADatabase
                ) =>
            {
                Self::Unavailable {
                    reason: err.to_string(),
                }
            }
            other => Self::Query(other),
        }
    }
}

impl<T> From<PoisonError<T>> for StoreError {
    fn from(_: PoisonError<T>) -> Self {
        Self::Unavailable {
            reason: "store lock poisoned".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Per-identifier inventory row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifierStat {
    pub identifier: String,
    pub count: usize,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Append-only open-event log with query capability.
pub trait EventStore {
    /// Append one event unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn insert(&self, event: &OpenEvent) -> Result<(), StoreError>;

    /// Most recent event for the (identifier, origin) pair.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the lookup fails.
    fn find_latest(&self, identifier: &str, origin: &str) -> Result<Option<OpenEvent>, StoreError>;

    /// Events whose identifier starts with `prefix` (literal, case-sensitive)
    /// and whose `occurred_at` lies in `range` (inclusive), oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn query(&self, prefix: Option<&str>, range: &TimeRange) -> Result<Vec<OpenEvent>, StoreError>;

    /// Delete every event strictly older than `horizon`; returns how many.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the delete fails.
    fn delete_older_than(&self, horizon: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Insert `event` unless a stored event for the same pair is inside
    /// `window` of it. Returns whether the event was inserted.
    ///
    /// The default runs lookup then insert with no atomicity; stores that
    /// can do better override it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the lookup or the insert fails.
    fn insert_if_outside_window(
        &self,
        event: &OpenEvent,
        window: Duration,
    ) -> Result<bool, StoreError> {
        if let Some(latest) = self.find_latest(&event.identifier, &event.origin)? {
            if within_window(latest.occurred_at, event.occurred_at, window) {
                return Ok(false);
            }
        }
        self.insert(event)?;
        Ok(true)
    }

    /// Distinct identifiers with their open counts, sorted by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn identifiers(&self) -> Result<Vec<IdentifierStat>, StoreError>;

    /// All events for one identifier, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn events_for(&self, identifier: &str) -> Result<Vec<OpenEvent>, StoreError>;
}

impl<S: EventStore + ?Sized> EventStore for std::sync::Arc<S> {
    fn insert(&self, event: &OpenEvent) -> Result<(), StoreError> {
        (**self).insert(event)
    }

    fn find_latest(&self, identifier: &str, origin: &str) -> Result<Option<OpenEvent>, StoreError> {
        (**self).find_latest(identifier, origin)
    }

    fn query(&self, prefix: Option<&str>, range: &TimeRange) -> Result<Vec<OpenEvent>, StoreError> {
        (**self).query(prefix, range)
    }

    fn delete_older_than(&self, horizon: DateTime<Utc>) -> Result<usize, StoreError> {
        (**self).delete_older_than(horizon)
    }

    fn insert_if_outside_window(
        &self,
        event: &OpenEvent,
        window: Duration,
    ) -> Result<bool, StoreError> {
        (**self).insert_if_outside_window(event, window)
    }

    fn identifiers(&self) -> Result<Vec<IdentifierStat>, StoreError> {
        (**self).identifiers()
    }

    fn events_for(&self, identifier: &str) -> Result<Vec<OpenEvent>, StoreError> {
        (**self).events_for(identifier)
    }
}

fn effective_prefix(prefix: Option<&str>) -> Option<&str> {
    prefix.filter(|p| !p.is_empty())
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

const EVENT_COLUMNS: &str = "event_id, identifier, origin, agent, occurred_at_us";

/// SQLite-backed [`EventStore`].
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Wrap an already-migrated connection.
    #[must_use]
    pub const fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Open (creating and migrating if needed) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path, busy_timeout: std::time::Duration) -> anyhow::Result<Self> {
        super::open_store(path, busy_timeout).map(Self::from_connection)
    }

    /// Fresh migrated in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if migration fails.
    pub fn in_memory() -> anyhow::Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        super::migrations::migrate(&mut conn)?;
        Ok(Self { conn })
    }

    /// Timestamp and row count of the last retention sweep, if any ran.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if `store_meta` cannot be read.
    pub fn last_sweep(&self) -> Result<Option<(DateTime<Utc>, usize)>, StoreError> {
        let (at_us, deleted): (i64, i64) = self.conn.query_row(
            "SELECT last_sweep_at_us, last_sweep_deleted FROM store_meta WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        if at_us == 0 {
            return Ok(None);
        }
        Ok(from_micros(at_us).map(|at| (at, usize::try_from(deleted).unwrap_or(0))))
    }

    fn insert_with(conn: &Connection, event: &OpenEvent) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO open_events (identifier, origin, agent, occurred_at_us)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                event.identifier,
                event.origin,
                event.agent,
                event.occurred_at_us()
            ],
        )?;
        Ok(())
    }

    fn latest_with(
        conn: &Connection,
        identifier: &str,
        origin: &str,
    ) -> Result<Option<OpenEvent>, StoreError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM open_events \
             WHERE identifier = ?1 AND origin = ?2 \
             ORDER BY occurred_at_us DESC, event_id DESC \
             LIMIT 1"
        );
        let raw = conn
            .query_row(&sql, params![identifier, origin], RawEvent::from_row)
            .optional()?;
        raw.map(RawEvent::decode).transpose()
    }

    fn collect(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<OpenEvent>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, RawEvent::from_row)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?.decode()?);
        }
        Ok(events)
    }
}

impl EventStore for SqliteStore {
    fn insert(&self, event: &OpenEvent) -> Result<(), StoreError> {
        Self::insert_with(&self.conn, event)?;
        Ok(())
    }

    fn find_latest(&self, identifier: &str, origin: &str) -> Result<Option<OpenEvent>, StoreError> {
        Self::latest_with(&self.conn, identifier, origin)
    }

    fn query(&self, prefix: Option<&str>, range: &TimeRange) -> Result<Vec<OpenEvent>, StoreError> {
        match effective_prefix(prefix) {
            // substr() compares literally; LIKE would treat '%' and '_' as wildcards.
            Some(prefix) => {
                let len = i64::try_from(prefix.chars().count()).unwrap_or(i64::MAX);
                let sql = format!(
                    "SELECT {EVENT_COLUMNS} FROM open_events \
                     WHERE substr(identifier, 1, ?1) = ?2 \
                       AND occurred_at_us >= ?3 AND occurred_at_us <= ?4 \
                     ORDER BY occurred_at_us ASC, event_id ASC"
                );
                self.collect(&sql, params![len, prefix, range.start_us(), range.end_us()])
            }
            None => {
                let sql = format!(
                    "SELECT {EVENT_COLUMNS} FROM open_events \
                     WHERE occurred_at_us >= ?1 AND occurred_at_us <= ?2 \
                     ORDER BY occurred_at_us ASC, event_id ASC"
                );
                self.collect(&sql, params![range.start_us(), range.end_us()])
            }
        }
    }

    fn delete_older_than(&self, horizon: DateTime<Utc>) -> Result<usize, StoreError> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let deleted = tx.execute(
            "DELETE FROM open_events WHERE occurred_at_us < ?1",
            params![horizon.timestamp_micros()],
        )?;
        tx.execute(
            "UPDATE store_meta SET last_sweep_at_us = ?1, last_sweep_deleted = ?2 WHERE id = 1",
            params![
                Utc::now().timestamp_micros(),
                i64::try_from(deleted).unwrap_or(i64::MAX)
            ],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    fn insert_if_outside_window(
        &self,
        event: &OpenEvent,
        window: Duration,
    ) -> Result<bool, StoreError> {
        // IMMEDIATE takes the write lock before the read, so no other writer
        // can slip an insert for the same pair between check and append.
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        if let Some(latest) = Self::latest_with(&tx, &event.identifier, &event.origin)? {
            if within_window(latest.occurred_at, event.occurred_at, window) {
                tx.rollback()?;
                return Ok(false);
            }
        }
        Self::insert_with(&tx, event)?;
        tx.commit()?;
        Ok(true)
    }

    fn identifiers(&self) -> Result<Vec<IdentifierStat>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT identifier, COUNT(*), MIN(occurred_at_us), MAX(occurred_at_us) \
             FROM open_events \
             GROUP BY identifier \
             ORDER BY identifier ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut stats = Vec::new();
        for row in rows {
            let (identifier, count, first_us, last_us) = row?;
            let (Some(first_seen), Some(last_seen)) = (from_micros(first_us), from_micros(last_us))
            else {
                return Err(StoreError::Corrupt {
                    event_id: -1,
                    reason: format!("timestamp out of range for identifier '{identifier}'"),
                });
            };
            stats.push(IdentifierStat {
                identifier,
                count: usize::try_from(count).unwrap_or(0),
                first_seen,
                last_seen,
            });
        }
        Ok(stats)
    }

    fn events_for(&self, identifier: &str) -> Result<Vec<OpenEvent>, StoreError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM open_events \
             WHERE identifier = ?1 \
             ORDER BY occurred_at_us DESC, event_id DESC"
        );
        self.collect(&sql, params![identifier])
    }
}

/// Undecoded row; timestamp validation happens in [`RawEvent::decode`].
struct RawEvent {
    event_id: i64,
    identifier: String,
    origin: String,
    agent: String,
    occurred_at_us: i64,
}

impl RawEvent {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            event_id: row.get(0)?,
            identifier: row.get(1)?,
            origin: row.get(2)?,
            agent: row.get(3)?,
            occurred_at_us: row.get(4)?,
        })
    }

    fn decode(self) -> Result<OpenEvent, StoreError> {
        let occurred_at = from_micros(self.occurred_at_us).ok_or_else(|| StoreError::Corrupt {
            event_id: self.event_id,
            reason: format!("occurred_at_us {} out of range", self.occurred_at_us),
        })?;
        Ok(OpenEvent {
            identifier: self.identifier,
            origin: self.origin,
            agent: self.agent,
            occurred_at,
        })
    }
}

// ---------------------------------------------------------------------------
// In-memory test double
// ---------------------------------------------------------------------------

/// Vec-backed [`EventStore`] for tests and dry runs.
///
/// [`MemoryStore::set_unavailable`] makes every call fail with
/// [`StoreError::Unavailable`], for exercising degradation paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: Mutex<Vec<OpenEvent>>,
    unavailable: Mutex<bool>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with events, bypassing any policy.
    #[must_use]
    pub fn with_events(events: Vec<OpenEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            unavailable: Mutex::new(false),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self
            .unavailable
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = unavailable;
    }

    /// Snapshot of stored events in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<OpenEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn guard(&self) -> Result<MutexGuard<'_, Vec<OpenEvent>>, StoreError> {
        if *self.unavailable.lock()? {
            return Err(StoreError::Unavailable {
                reason: "memory store marked unavailable".to_string(),
            });
        }
        Ok(self.events.lock()?)
    }
}

fn latest_in<'a>(events: &'a [OpenEvent], identifier: &str, origin: &str) -> Option<&'a OpenEvent> {
    // Later insertion wins ties, matching the SQLite `event_id DESC` order.
    events
        .iter()
        .filter(|e| e.identifier == identifier && e.origin == origin)
        .fold(None, |best: Option<&OpenEvent>, e| match best {
            Some(b) if b.occurred_at > e.occurred_at => Some(b),
            _ => Some(e),
        })
}

impl EventStore for MemoryStore {
    fn insert(&self, event: &OpenEvent) -> Result<(), StoreError> {
        self.guard()?.push(event.clone());
        Ok(())
    }

    fn find_latest(&self, identifier: &str, origin: &str) -> Result<Option<OpenEvent>, StoreError> {
        let events = self.guard()?;
        Ok(latest_in(&events, identifier, origin).cloned())
    }

    fn query(&self, prefix: Option<&str>, range: &TimeRange) -> Result<Vec<OpenEvent>, StoreError> {
        let prefix = effective_prefix(prefix);
        let mut matched: Vec<OpenEvent> = self
            .guard()?
            .iter()
            .filter(|e| prefix.is_none_or(|p| e.identifier.starts_with(p)))
            .filter(|e| range.contains(e.occurred_at))
            .cloned()
            .collect();
        matched.sort_by_key(|e| e.occurred_at);
        Ok(matched)
    }

    fn delete_older_than(&self, horizon: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut events = self.guard()?;
        let before = events.len();
        events.retain(|e| e.occurred_at >= horizon);
        Ok(before - events.len())
    }

    fn insert_if_outside_window(
        &self,
        event: &OpenEvent,
        window: Duration,
    ) -> Result<bool, StoreError> {
        let mut events = self.guard()?;
        if let Some(latest) = latest_in(&events, &event.identifier, &event.origin) {
            if within_window(latest.occurred_at, event.occurred_at, window) {
                return Ok(false);
            }
        }
        events.push(event.clone());
        Ok(true)
    }

    fn identifiers(&self) -> Result<Vec<IdentifierStat>, StoreError> {
        let events = self.guard()?;
        let mut by_id: std::collections::BTreeMap<&str, IdentifierStat> =
            std::collections::BTreeMap::new();
        for e in events.iter() {
            by_id
                .entry(e.identifier.as_str())
                .and_modify(|stat| {
                    stat.count += 1;
                    stat.first_seen = stat.first_seen.min(e.occurred_at);
                    stat.last_seen = stat.last_seen.max(e.occurred_at);
                })
                .or_insert_with(|| IdentifierStat {
                    identifier: e.identifier.clone(),
                    count: 1,
                    first_seen: e.occurred_at,
                    last_seen: e.occurred_at,
                });
        }
        Ok(by_id.into_values().collect())
    }

    fn events_for(&self, identifier: &str) -> Result<Vec<OpenEvent>, StoreError> {
        let events = self.guard()?;
        let mut matched: Vec<(usize, OpenEvent)> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.identifier == identifier)
            .map(|(i, e)| (i, e.clone()))
            .collect();
        matched.sort_by(|(ia, a), (ib, b)| b.occurred_at.cmp(&a.occurred_at).then(ib.cmp(ia)));
        Ok(matched.into_iter().map(|(_, e)| e).collect())
    }
}
