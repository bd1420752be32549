//! End-to-end scenarios over the SQLite store: ingestion, retention,
//! filtering and the failure paths of the query side.

use beacon_core::OpenEvent;
use beacon_core::config::{self, ProjectConfig};
use beacon_core::db::store::{EventStore, SqliteStore};
use beacon_core::db::{self, DEFAULT_BUSY_TIMEOUT};
use beacon_core::dedup::DedupPolicy;
use beacon_core::geo::NoLookup;
use beacon_core::ingest::{IngestOutcome, Retention, record_open};
use beacon_core::range::{RangeRequest, RangeSource, TimeRange};
use beacon_core::report::{QueryStatus, ReportFilter, origin_report};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 1, 10, 0, 0).single().expect("valid ts")
}

fn file_store() -> (TempDir, SqliteStore) {
    let dir = TempDir::new().expect("temp dir");
    let store =
        SqliteStore::open(&config::db_path(dir.path()), DEFAULT_BUSY_TIMEOUT).expect("open store");
    (dir, store)
}

fn open_at(identifier: &str, origin: &str, at: DateTime<Utc>) -> OpenEvent {
    OpenEvent::new(identifier, origin, "Mozilla/5.0", at)
}

#[test]
fn repeated_opens_inside_window_store_once() {
    let (_dir, store) = file_store();
    let policy = DedupPolicy::default();
    let outcomes: Vec<IngestOutcome> = [0, 1, 2]
        .into_iter()
        .map(|h| {
            let at = t0() + Duration::hours(h);
            record_open(&store, &policy, Retention::default(), &open_at("A", "1.2.3.4", at), at)
        })
        .collect();

    assert_eq!(
        outcomes,
        vec![IngestOutcome::Recorded, IngestOutcome::Suppressed, IngestOutcome::Suppressed]
    );
    assert_eq!(store.events_for("A").expect("events").len(), 1);
}

#[test]
fn opens_a_day_apart_are_both_stored() {
    let (_dir, store) = file_store();
    let policy = DedupPolicy::default();
    for h in [0, 25] {
        let at = t0() + Duration::hours(h);
        let event = open_at("A", "1.2.3.4", at);
        let outcome = record_open(&store, &policy, Retention::default(), &event, at);
        assert_eq!(outcome, IngestOutcome::Recorded);
    }
    assert_eq!(store.events_for("A").expect("events").len(), 2);
}

#[test]
fn retention_removes_only_expired_events() {
    let (_dir, store) = file_store();
    let now = t0();
    store.insert(&open_at("old", "1.1.1.1", now - Duration::days(101))).expect("insert");
    store.insert(&open_at("recent", "1.1.1.1", now - Duration::days(99))).expect("insert");

    let deleted = beacon_core::ingest::sweep(&store, Duration::days(100), now).expect("sweep");
    assert_eq!(deleted, 1);

    let remaining: Vec<String> = store
        .query(None, &TimeRange::unbounded())
        .expect("query")
        .into_iter()
        .map(|e| e.identifier)
        .collect();
    assert_eq!(remaining, vec!["recent"]);
    assert!(store.last_sweep().expect("meta").is_some());
}

#[test]
fn prefix_filter_selects_campaign() {
    let (_dir, store) = file_store();
    for (id, origin) in [
        ("camp1-x@a", "1.1.1.1"),
        ("camp1-y@b", "2.2.2.2"),
        ("camp2-z@c", "3.3.3.3"),
    ] {
        store.insert(&open_at(id, origin, t0())).expect("insert");
    }

    let filter = ReportFilter::new(Some("camp1".into()), RangeRequest::default().resolve(t0()));
    let report = origin_report(&store, &filter, &NoLookup, None);
    assert_eq!(report.status, QueryStatus::Ok);

    let mut origins: Vec<String> = report.rows.into_iter().map(|s| s.origin).collect();
    origins.sort();
    assert_eq!(origins, vec!["1.1.1.1", "2.2.2.2"]);
}

#[test]
fn bad_bounds_fall_back_to_thirty_days() {
    let now = t0();
    let resolved = RangeRequest {
        preset: None,
        start: Some("not-a-date".into()),
        end: Some("2025-01-01".into()),
    }
    .resolve(now);

    assert!(matches!(resolved.source, RangeSource::Fallback { .. }));
    assert_eq!(resolved.range, TimeRange::new(now - Duration::days(30), now));

    let inverted = RangeRequest {
        preset: None,
        start: Some("2025-08-20".into()),
        end: Some("2025-08-10".into()),
    }
    .resolve(now);
    assert!(matches!(inverted.source, RangeSource::Fallback { .. }));
}

#[test]
fn store_reopens_with_existing_events() {
    let dir = TempDir::new().expect("temp dir");
    let path = config::db_path(dir.path());
    {
        let store = SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT).expect("open");
        store.insert(&open_at("A", "1.1.1.1", t0())).expect("insert");
    }
    let conn = db::try_open_store(&path, DEFAULT_BUSY_TIMEOUT)
        .expect("reopen")
        .expect("file exists");
    let store = SqliteStore::from_connection(conn);
    assert_eq!(store.identifiers().expect("ids").len(), 1);
}

#[test]
fn configured_exclusions_apply_to_ingestion() {
    let (_dir, store) = file_store();
    let cfg: ProjectConfig = toml::from_str(
        r#"
[dedup]
exclude = ["10.0.0.0/8"]
"#,
    )
    .expect("parse config");

    let at = t0();
    let outcome = record_open(
        &store,
        &cfg.dedup_policy(),
        cfg.retention.policy(),
        &open_at("A", "10.1.2.3", at),
        at,
    );
    assert_eq!(outcome, IngestOutcome::Excluded);
    assert!(store.identifiers().expect("ids").is_empty());
}

#[test]
fn missing_store_reports_none() {
    let dir = TempDir::new().expect("temp dir");
    let conn =
        db::try_open_store(&config::db_path(dir.path()), DEFAULT_BUSY_TIMEOUT).expect("open");
    assert!(conn.is_none());
}
