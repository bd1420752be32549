//! Deduplication policy for incoming opens.
//!
//! Repeated opens of the same identifier from the same origin inside the
//! dedup window collapse to the first one. Origins on the exclusion list
//! (internal and test traffic) are never recorded.
//!
//! The window is measured from the most recent *stored* event for the
//! (identifier, origin) pair, so a steady stream of opens every hour keeps
//! being suppressed until a gap of at least one window occurs.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

use crate::db::store::{EventStore, StoreError};
use crate::event::OpenEvent;
use crate::geo::{Cidr, parse_origin};

/// Default dedup window.
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

/// Decide whether `candidate` falls inside the window of `latest`.
///
/// A zero or negative window disables dedup. A candidate older than the
/// latest stored event has a negative delta and counts as inside.
#[must_use]
pub fn within_window(latest: DateTime<Utc>, candidate: DateTime<Utc>, window: Duration) -> bool {
    if window <= Duration::zero() {
        return false;
    }
    candidate - latest < window
}

/// One entry of the origin exclusion list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginPattern {
    /// Matches the origin string exactly (after trimming).
    Exact(String),
    /// Matches any address inside the block.
    Cidr(Cidr),
    /// `*` matches any run of characters, e.g. `192.168.*`.
    Glob(String),
}

impl OriginPattern {
    /// Classify a raw config entry.
    ///
    /// Entries containing `*` are globs, entries that parse as CIDR blocks
    /// with a `/` are networks, everything else is an exact match.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.contains('*') {
            return Self::Glob(raw.to_string());
        }
        if raw.contains('/') {
            if let Some(cidr) = Cidr::parse(raw) {
                return Self::Cidr(cidr);
            }
        }
        Self::Exact(raw.to_string())
    }

    #[must_use]
    pub fn matches(&self, origin: &str) -> bool {
        let origin = origin.trim();
        match self {
            Self::Exact(exact) => exact == origin,
            Self::Cidr(cidr) => parse_origin(origin).is_some_and(|addr| cidr.contains(addr)),
            Self::Glob(pattern) => glob_match(pattern, origin),
        }
    }
}

/// Minimal `*`-only glob. No character classes, no `?`.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let [first, middle @ .., last] = parts.as_slice() else {
        return pattern == text;
    };

    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };
    for part in middle {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

/// Why an open was or was not recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Record,
    /// A stored event for the same pair is inside the window.
    Duplicate,
    /// The origin is on the exclusion list.
    Excluded,
}

impl Decision {
    #[must_use]
    pub const fn should_record(self) -> bool {
        matches!(self, Self::Record)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Record => f.write_str("record"),
            Self::Duplicate => f.write_str("duplicate"),
            Self::Excluded => f.write_str("excluded"),
        }
    }
}

/// Dedup window plus origin exclusions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupPolicy {
    window: Duration,
    exclusions: Vec<OriginPattern>,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_WINDOW_HOURS), Vec::new())
    }
}

impl DedupPolicy {
    #[must_use]
    pub const fn new(window: Duration, exclusions: Vec<OriginPattern>) -> Self {
        Self { window, exclusions }
    }

    /// Build from raw exclusion strings as they appear in config.
    #[must_use]
    pub fn from_patterns<S: AsRef<str>>(window: Duration, patterns: &[S]) -> Self {
        let exclusions = patterns
            .iter()
            .map(|p| p.as_ref())
            .filter(|p| !p.trim().is_empty())
            .map(OriginPattern::parse)
            .collect();
        Self::new(window, exclusions)
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    #[must_use]
    pub fn is_excluded(&self, origin: &str) -> bool {
        self.exclusions.iter().any(|p| p.matches(origin))
    }

    /// Classify an open without touching the store beyond one lookup.
    ///
    /// Excluded origins short-circuit before the store is consulted.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] from the latest-event lookup.
    pub fn decide(
        &self,
        store: &dyn EventStore,
        identifier: &str,
        origin: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<Decision, StoreError> {
        if self.is_excluded(origin) {
            return Ok(Decision::Excluded);
        }
        match store.find_latest(identifier, origin)? {
            Some(latest) if within_window(latest.occurred_at, occurred_at, self.window) => {
                Ok(Decision::Duplicate)
            }
            _ => Ok(Decision::Record),
        }
    }

    /// True when an open should be persisted.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] from the latest-event lookup.
    pub fn should_record(
        &self,
        store: &dyn EventStore,
        identifier: &str,
        origin: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.decide(store, identifier, origin, occurred_at)
            .map(Decision::should_record)
    }

    /// Classify and, when allowed, insert in one store transaction.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] from the conditional insert.
    pub fn record(
        &self,
        store: &dyn EventStore,
        event: &OpenEvent,
    ) -> Result<Decision, StoreError> {
        if self.is_excluded(&event.origin) {
            return Ok(Decision::Excluded);
        }
        if store.insert_if_outside_window(event, self.window)? {
            Ok(Decision::Record)
        } else {
            Ok(Decision::Duplicate)
        }
    }
}
