//! Time-range filters for report queries.
//!
//! A range is either a named preset (`7d`, `30d`, `90d`, `all`) or explicit
//! inclusive bounds. Explicit bounds that cannot be parsed, or that are
//! inverted, never fail the request: they fall back to the default range of
//! [`DEFAULT_RANGE_DAYS`] days ending now, and the result records that it did.

use anyhow::bail;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Length of the fallback range.
pub const DEFAULT_RANGE_DAYS: i64 = 30;

/// Inclusive `[start, end]` time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    #[must_use]
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// `days` days ending at `now`.
    #[must_use]
    pub fn last_days(days: i64, now: DateTime<Utc>) -> Self {
        Self::new(now - Duration::days(days), now)
    }

    /// The fallback range: [`DEFAULT_RANGE_DAYS`] days ending at `now`.
    #[must_use]
    pub fn default_ending(now: DateTime<Utc>) -> Self {
        Self::last_days(DEFAULT_RANGE_DAYS, now)
    }

    /// Everything representable.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self::new(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC)
    }

    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }

    #[must_use]
    pub fn start_us(&self) -> i64 {
        self.start.timestamp_micros()
    }

    #[must_use]
    pub fn end_us(&self) -> i64 {
        self.end.timestamp_micros()
    }
}

/// Named range presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    Last7Days,
    #[default]
    Last30Days,
    Last90Days,
    All,
}

impl Preset {
    #[must_use]
    pub fn resolve(self, now: DateTime<Utc>) -> TimeRange {
        match self {
            Self::Last7Days => TimeRange::last_days(7, now),
            Self::Last30Days => TimeRange::last_days(30, now),
            Self::Last90Days => TimeRange::last_days(90, now),
            Self::All => TimeRange::unbounded(),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Last7Days => f.write_str("7d"),
            Self::Last30Days => f.write_str("30d"),
            Self::Last90Days => f.write_str("90d"),
            Self::All => f.write_str("all"),
        }
    }
}

impl FromStr for Preset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "7d" | "7" | "week" => Ok(Self::Last7Days),
            "30d" | "30" | "month" => Ok(Self::Last30Days),
            "90d" | "90" | "quarter" => Ok(Self::Last90Days),
            "all" => Ok(Self::All),
            other => bail!("unknown range preset '{other}': expected one of 7d, 30d, 90d, all"),
        }
    }
}

/// How a [`ResolvedRange`] was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum RangeSource {
    Preset { preset: String },
    Explicit,
    /// Explicit bounds were rejected; the default range was used instead.
    Fallback { reason: String },
}

/// A time range plus the record of how it was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRange {
    #[serde(flatten)]
    pub range: TimeRange,
    #[serde(flatten)]
    pub source: RangeSource,
}

/// What a caller asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeRequest {
    pub preset: Option<Preset>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl RangeRequest {
    /// Resolve against `now`.
    ///
    /// Explicit bounds win over a preset. A missing explicit bound is
    /// open-ended on that side of the window (`start` alone runs to `now`,
    /// `end` alone reaches back [`DEFAULT_RANGE_DAYS`] days). Bad bounds
    /// yield [`RangeSource::Fallback`]; reporting it is up to the caller.
    #[must_use]
    pub fn resolve(&self, now: DateTime<Utc>) -> ResolvedRange {
        if self.start.is_none() && self.end.is_none() {
            let preset = self.preset.unwrap_or_default();
            return ResolvedRange {
                range: preset.resolve(now),
                source: RangeSource::Preset {
                    preset: preset.to_string(),
                },
            };
        }

        match self.explicit(now) {
            Ok(range) => ResolvedRange {
                range,
                source: RangeSource::Explicit,
            },
            Err(reason) => ResolvedRange {
                range: TimeRange::default_ending(now),
                source: RangeSource::Fallback { reason },
            },
        }
    }

    fn explicit(&self, now: DateTime<Utc>) -> Result<TimeRange, String> {
        let start = self
            .start
            .as_deref()
            .map(|raw| {
                parse_bound(raw, Bound::Start).ok_or_else(|| format!("unparsable start '{raw}'"))
            })
            .transpose()?;
        let end = self
            .end
            .as_deref()
            .map(|raw| {
                parse_bound(raw, Bound::End).ok_or_else(|| format!("unparsable end '{raw}'"))
            })
            .transpose()?;

        let end = end.unwrap_or(now);
        let start = start.unwrap_or_else(|| end - Duration::days(DEFAULT_RANGE_DAYS));
        if start > end {
            return Err(format!("start {start} is after end {end}"));
        }
        Ok(TimeRange::new(start, end))
    }
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

/// Parse an RFC 3339 timestamp or a `YYYY-MM-DD` date.
///
/// A bare date means the start of that day (UTC) for a start bound and the
/// last microsecond of that day for an end bound.
fn parse_bound(raw: &str, bound: Bound) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let time = match bound {
        Bound::Start => NaiveTime::from_hms_opt(0, 0, 0)?,
        Bound::End => NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)?,
    };
    Utc.from_local_datetime(&date.and_time(time)).single()
}
