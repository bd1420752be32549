//! Query path: store reads combined with aggregation.
//!
//! Report functions never return `Err`. A store failure produces empty rows
//! and [`QueryStatus::Failed`], so callers can tell "no opens" apart from
//! "could not read opens".

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::agent;
use crate::aggregate::{self, HOURS_PER_DAY, Summary};
use crate::db::store::{EventStore, IdentifierStat, StoreError};
use crate::error::ErrorCode;
use crate::event::OpenEvent;
use crate::geo::{Location, LocationLookup};
use crate::range::ResolvedRange;
use crate::zones::{self, DisplayZone};

/// Whether the underlying store read succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryStatus {
    Ok,
    Failed { code: ErrorCode, message: String },
}

impl QueryStatus {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    fn from_error(context: &str, err: &StoreError) -> Self {
        tracing::warn!(error = %err, code = %err.code(), "{context}");
        Self::Failed {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Which events a report covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportFilter {
    /// Literal identifier prefix; `None` or empty means every identifier.
    pub prefix: Option<String>,
    pub range: ResolvedRange,
}

impl ReportFilter {
    #[must_use]
    pub const fn new(prefix: Option<String>, range: ResolvedRange) -> Self {
        Self { prefix, range }
    }

    fn fetch(&self, store: &dyn EventStore) -> Result<Vec<OpenEvent>, StoreError> {
        store.query(self.prefix.as_deref(), &self.range.range)
    }
}

/// Per-request collaborators for labelling rows.
#[derive(Clone, Copy)]
pub struct Lookups<'a> {
    pub location: &'a dyn LocationLookup,
    pub zones: &'a [DisplayZone],
}

// ---------------------------------------------------------------------------
// Origin summaries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginReport {
    pub filter: ReportFilter,
    pub total_opens: usize,
    /// Sorted by count descending, then origin ascending.
    pub rows: Vec<Summary>,
    #[serde(flatten)]
    pub status: QueryStatus,
}

/// Per-origin summaries for `filter`, at most `top` rows when given.
#[must_use]
pub fn origin_report(
    store: &dyn EventStore,
    filter: &ReportFilter,
    location: &dyn LocationLookup,
    top: Option<usize>,
) -> OriginReport {
    let events = match filter.fetch(store) {
        Ok(events) => events,
        Err(err) => {
            return OriginReport {
                filter: filter.clone(),
                total_opens: 0,
                rows: Vec::new(),
                status: QueryStatus::from_error("origin report query failed", &err),
            };
        }
    };

    let summaries =
        aggregate::aggregate(&events, agent::describe, |origin| location.locate(origin));
    let rows = aggregate::top_origins(&summaries, top.unwrap_or(usize::MAX));

    OriginReport {
        filter: filter.clone(),
        total_opens: events.len(),
        rows,
        status: QueryStatus::Ok,
    }
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardReport {
    pub filter: ReportFilter,
    pub total_opens: usize,
    pub per_identifier: BTreeMap<String, usize>,
    /// Label of the zone the histogram is bucketed in.
    pub histogram_zone: String,
    pub hourly: [usize; HOURS_PER_DAY],
    pub top_origins: Vec<Summary>,
    #[serde(flatten)]
    pub status: QueryStatus,
}

/// Opens per identifier, hourly histogram, and the busiest origins.
#[must_use]
pub fn dashboard_report(
    store: &dyn EventStore,
    filter: &ReportFilter,
    lookups: Lookups<'_>,
    top: usize,
) -> DashboardReport {
    let zone = zones::primary_zone(lookups.zones);
    let (events, status) = match filter.fetch(store) {
        Ok(events) => (events, QueryStatus::Ok),
        Err(err) => (
            Vec::new(),
            QueryStatus::from_error("dashboard query failed", &err),
        ),
    };

    let summaries = aggregate::aggregate(&events, agent::describe, |origin| {
        lookups.location.locate(origin)
    });

    DashboardReport {
        filter: filter.clone(),
        total_opens: events.len(),
        per_identifier: aggregate::counts_by_identifier(&events),
        histogram_zone: zone.label.clone(),
        hourly: aggregate::hourly_histogram(&events, &zone.tz()),
        top_origins: aggregate::top_origins(&summaries, top),
        status,
    }
}

// ---------------------------------------------------------------------------
// Identifier inventory and detail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifierList {
    pub rows: Vec<IdentifierStat>,
    #[serde(flatten)]
    pub status: QueryStatus,
}

/// Every identifier with its open count.
#[must_use]
pub fn identifier_list(store: &dyn EventStore) -> IdentifierList {
    match store.identifiers() {
        Ok(rows) => IdentifierList {
            rows,
            status: QueryStatus::Ok,
        },
        Err(err) => IdentifierList {
            rows: Vec::new(),
            status: QueryStatus::from_error("identifier listing failed", &err),
        },
    }
}

/// A timestamp rendered in one display zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZonedTime {
    pub zone: String,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenDetail {
    pub occurred_at: DateTime<Utc>,
    pub local_times: Vec<ZonedTime>,
    pub origin: String,
    pub agent: String,
    pub descriptor: String,
    pub location: Location,
    /// Fetched by a mail provider's image proxy; `origin` and `location`
    /// describe the proxy, not the reader.
    pub via_proxy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifierDetail {
    pub identifier: String,
    pub campaign: Option<String>,
    pub recipient: Option<String>,
    /// Newest first.
    pub opens: Vec<OpenDetail>,
    #[serde(flatten)]
    pub status: QueryStatus,
}

/// All opens of one identifier with per-zone times and labels.
#[must_use]
pub fn identifier_detail(
    store: &dyn EventStore,
    identifier: &str,
    lookups: Lookups<'_>,
) -> IdentifierDetail {
    let parsed = crate::identifier::parse(identifier);
    let (events, status) = match store.events_for(identifier) {
        Ok(events) => (events, QueryStatus::Ok),
        Err(err) => (
            Vec::new(),
            QueryStatus::from_error("identifier detail query failed", &err),
        ),
    };

    let opens = events
        .into_iter()
        .map(|event| OpenDetail {
            local_times: lookups
                .zones
                .iter()
                .map(|zone| ZonedTime {
                    zone: zone.label.clone(),
                    time: zone.format(event.occurred_at),
                })
                .collect(),
            descriptor: agent::describe(&event.agent),
            via_proxy: agent::client(&event.agent).is_proxy(),
            location: lookups.location.locate(&event.origin),
            occurred_at: event.occurred_at,
            origin: event.origin,
            agent: event.agent,
        })
        .collect();

    IdentifierDetail {
        identifier: identifier.to_string(),
        campaign: parsed.campaign.map(str::to_string),
        recipient: parsed.recipient.map(str::to_string),
        opens,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::MemoryStore;
    use crate::geo::{NetworkEntry, NoLookup, StaticTable};
    use crate::range::{RangeRequest, TimeRange};
    use crate::zones::default_zones;
    use chrono::{Duration, TimeZone};

    const CHROME: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 15, 12, 0, 0).single().expect("valid ts")
    }

    fn seeded() -> MemoryStore {
        MemoryStore::with_events(vec![
            OpenEvent::new("camp1-a@x", "203.0.113.7", CHROME, now() - Duration::hours(5)),
            OpenEvent::new("camp1-a@x", "203.0.113.7", "curl/8.4.0", now() - Duration::hours(30)),
            OpenEvent::new("camp1-b@y", "198.51.100.2", "", now() - Duration::hours(3)),
            OpenEvent::new("camp2-c@z", "10.0.0.9", CHROME, now() - Duration::hours(2)),
            OpenEvent::new("camp1-a@x", "203.0.113.7", CHROME, now() - Duration::days(45)),
        ])
    }

    fn all_time() -> ReportFilter {
        ReportFilter::new(
            None,
            RangeRequest {
                preset: Some(crate::range::Preset::All),
                ..RangeRequest::default()
            }
            .resolve(now()),
        )
    }

    fn table() -> StaticTable {
        StaticTable::from_entries(&[NetworkEntry {
            cidr: "203.0.113.0/24".into(),
            location: "Exampleland".into(),
        }])
    }

    #[test]
    fn origin_report_uses_default_range_and_prefix() {
        let filter =
            ReportFilter::new(Some("camp1".into()), RangeRequest::default().resolve(now()));
        let report = origin_report(&seeded(), &filter, &table(), None);

        assert!(report.status.is_ok());
        assert_eq!(report.total_opens, 3, "45-day-old open is outside 30d");
        assert_eq!(report.rows.len(), 2);

        let top = &report.rows[0];
        assert_eq!(top.origin, "203.0.113.7");
        assert_eq!(top.count, 2);
        assert_eq!(top.first_seen, now() - Duration::hours(30));
        assert_eq!(top.descriptor, "Automated (curl)");
        assert_eq!(top.location, Location::Known("Exampleland".into()));
        assert_eq!(report.rows[1].location, Location::Unknown);
    }

    #[test]
    fn origin_report_top_limits_rows() {
        let report = origin_report(&seeded(), &all_time(), &NoLookup, Some(1));
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.total_opens, 5);
    }

    #[test]
    fn store_failure_is_distinguishable_from_empty() {
        let store = MemoryStore::new();
        let empty = origin_report(&store, &all_time(), &NoLookup, None);
        assert!(empty.status.is_ok());
        assert!(empty.rows.is_empty());

        store.set_unavailable(true);
        let failed = origin_report(&store, &all_time(), &NoLookup, None);
        assert!(failed.rows.is_empty());
        assert!(matches!(failed.status, QueryStatus::Failed { .. }));

        let zones = default_zones();
        let lookups = Lookups {
            location: &NoLookup,
            zones: &zones,
        };
        assert!(!dashboard_report(&store, &all_time(), lookups, 5).status.is_ok());
        assert!(!identifier_detail(&store, "camp1-a@x", lookups).status.is_ok());
        assert!(!identifier_list(&store).status.is_ok());
    }

    #[test]
    fn dashboard_buckets_in_primary_zone() {
        let zones = default_zones();
        let lookups = Lookups {
            location: &NoLookup,
            zones: &zones,
        };
        let report = dashboard_report(&seeded(), &all_time(), lookups, 5);

        assert_eq!(report.histogram_zone, "Beijing");
        assert_eq!(report.hourly.iter().sum::<usize>(), 5);
        // 07:00 UTC is 15:00 in Beijing.
        assert_eq!(report.hourly[15], 1);
        assert_eq!(report.per_identifier["camp1-a@x"], 3);
        assert_eq!(report.top_origins[0].origin, "203.0.113.7");
    }

    #[test]
    fn empty_zone_list_buckets_in_utc() {
        let lookups = Lookups {
            location: &NoLookup,
            zones: &[],
        };
        let report = dashboard_report(&seeded(), &all_time(), lookups, 5);
        assert_eq!(report.histogram_zone, "UTC");
        assert_eq!(report.hourly[7], 1);
    }

    #[test]
    fn identifier_detail_lists_newest_first_in_every_zone() {
        let zones = default_zones();
        let table = table();
        let lookups = Lookups {
            location: &table,
            zones: &zones,
        };
        let detail = identifier_detail(&seeded(), "camp1-a@x", lookups);

        assert_eq!(detail.campaign.as_deref(), Some("camp1"));
        assert_eq!(detail.recipient.as_deref(), Some("a@x"));
        assert_eq!(detail.opens.len(), 3);
        assert!(detail.opens[0].occurred_at > detail.opens[1].occurred_at);

        let first = &detail.opens[0];
        assert_eq!(first.descriptor, "Chrome on Windows");
        assert_eq!(first.location, Location::Known("Exampleland".into()));
        assert_eq!(
            first.local_times,
            vec![
                ZonedTime {
                    zone: "Beijing".into(),
                    time: "2025-07-15 15:00:00".into(),
                },
                ZonedTime {
                    zone: "US Eastern".into(),
                    time: "2025-07-15 03:00:00".into(),
                },
            ]
        );
    }

    #[test]
    fn identifier_detail_flags_image_proxy_opens() {
        let gmail =
            "Mozilla/5.0 (Windows NT 5.1; rv:11.0) Gecko Firefox/11.0 (via ggpht.com GoogleImageProxy)";
        let store = MemoryStore::with_events(vec![
            OpenEvent::new("camp3-q@x", "66.249.84.1", gmail, now() - Duration::hours(1)),
            OpenEvent::new("camp3-q@x", "203.0.113.7", CHROME, now() - Duration::hours(2)),
        ]);
        let lookups = Lookups {
            location: &NoLookup,
            zones: &[],
        };
        let detail = identifier_detail(&store, "camp3-q@x", lookups);
        assert!(detail.opens[0].via_proxy);
        assert_eq!(detail.opens[0].descriptor, "Gmail image proxy");
        assert!(!detail.opens[1].via_proxy);
    }

    #[test]
    fn identifier_list_counts() {
        let list = identifier_list(&seeded());
        assert_eq!(list.rows.len(), 3);
        assert_eq!(list.rows[0].identifier, "camp1-a@x");
        assert_eq!(list.rows[0].count, 3);
    }

    #[test]
    fn explicit_range_is_inclusive() {
        let start = now() - Duration::hours(5);
        let filter = ReportFilter::new(
            None,
            crate::range::ResolvedRange {
                range: TimeRange::new(start, now() - Duration::hours(3)),
                source: crate::range::RangeSource::Explicit,
            },
        );
        let report = origin_report(&seeded(), &filter, &NoLookup, None);
        assert_eq!(report.total_opens, 2);
    }

    #[test]
    fn failed_status_serializes_flat() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let report = identifier_list(&store);
        let json = serde_json::to_value(&report).expect("json");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["code"], "E3001");
        assert!(json["message"].as_str().is_some_and(|m| m.contains("unavailable")));
    }
}
