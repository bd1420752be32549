//! Open event data model.
//!
//! An [`OpenEvent`] is one observed fetch of the tracking pixel. Events are
//! immutable once recorded and are only ever removed by the retention sweep.
//!
//! Timestamps are UTC with microsecond precision; the store persists them as
//! `occurred_at_us` (microseconds since Unix epoch).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single observed open of the tracking resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpenEvent {
    /// Tracking identifier the pixel was requested for.
    pub identifier: String,
    /// Requester network address (the dedup and grouping key).
    pub origin: String,
    /// Raw `User-Agent` header. Empty when the client sent none.
    pub agent: String,
    /// When the open was observed.
    pub occurred_at: DateTime<Utc>,
}

impl OpenEvent {
    /// Build an event, truncating `occurred_at` to microsecond precision so
    /// that an event read back from the store compares equal to the one
    /// written.
    #[must_use]
    pub fn new(
        identifier: impl Into<String>,
        origin: impl Into<String>,
        agent: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let occurred_at = DateTime::<Utc>::from_timestamp_micros(occurred_at.timestamp_micros())
            .unwrap_or(occurred_at);
        Self {
            identifier: identifier.into(),
            origin: origin.into(),
            agent: agent.into(),
            occurred_at,
        }
    }

    /// `occurred_at` as microseconds since the Unix epoch.
    #[must_use]
    pub fn occurred_at_us(&self) -> i64 {
        self.occurred_at.timestamp_micros()
    }

    /// True when `self` and `other` share the (identifier, origin) dedup key.
    #[must_use]
    pub fn same_key(&self, other: &Self) -> bool {
        self.identifier == other.identifier && self.origin == other.origin
    }
}

/// Convert stored microseconds back into a UTC timestamp.
///
/// Returns `None` for values outside chrono's representable range.
#[must_use]
pub fn from_micros(us: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(us)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn new_truncates_to_micros() {
        let at = Utc.timestamp_opt(1_700_000_000, 123_456_789).single().expect("valid ts");
        let event = OpenEvent::new("a", "1.2.3.4", "ua", at);
        assert_eq!(event.occurred_at.timestamp_subsec_nanos(), 123_456_000);
        assert_eq!(from_micros(event.occurred_at_us()), Some(event.occurred_at));
    }

    #[test]
    fn same_key_ignores_agent_and_time() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).single().expect("valid ts");
        let a = OpenEvent::new("camp1-x@a", "1.2.3.4", "Mozilla", at);
        let b = OpenEvent::new("camp1-x@a", "1.2.3.4", "curl", at + Duration::hours(3));
        let c = OpenEvent::new("camp1-x@a", "5.6.7.8", "Mozilla", at);
        assert!(a.same_key(&b));
        assert!(!a.same_key(&c));
    }
}
