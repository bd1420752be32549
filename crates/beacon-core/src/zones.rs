//! Display timezones for reports.
//!
//! Zones are IANA names with a label, configured under `[display]`, and
//! follow daylight-saving transitions.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Timestamp layout used in every report.
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A labelled timezone, e.g. `Beijing` in `Asia/Shanghai`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayZone {
    pub label: String,
    /// IANA timezone name.
    pub timezone: String,
}

impl DisplayZone {
    #[must_use]
    pub fn new(label: impl Into<String>, timezone: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            timezone: timezone.into(),
        }
    }

    /// Resolved timezone; unknown names fall back to UTC with a warning.
    #[must_use]
    pub fn tz(&self) -> Tz {
        self.timezone.parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!(
                zone = %self.label,
                timezone = %self.timezone,
                "unknown display timezone, using UTC"
            );
            Tz::UTC
        })
    }

    /// Render `at` in this zone using [`DISPLAY_FORMAT`].
    #[must_use]
    pub fn format(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.tz()).format(DISPLAY_FORMAT).to_string()
    }
}

/// Beijing and US Eastern, side by side.
#[must_use]
pub fn default_zones() -> Vec<DisplayZone> {
    vec![
        DisplayZone::new("Beijing", "Asia/Shanghai"),
        DisplayZone::new("US Eastern", "America/New_York"),
    ]
}

/// First configured zone, or UTC when the list is empty.
#[must_use]
pub fn primary_zone(zones: &[DisplayZone]) -> DisplayZone {
    zones
        .first()
        .cloned()
        .unwrap_or_else(|| DisplayZone::new("UTC", "UTC"))
}
