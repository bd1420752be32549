//! Reduce raw open events into per-origin summaries and dashboard series.
//!
//! Everything here is pure. Callers fetch events from the store first and
//! pass in how to describe an agent and where an origin is.

use chrono::{DateTime, TimeZone, Timelike, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::event::OpenEvent;
use crate::geo::Location;

/// Number of buckets in [`hourly_histogram`].
pub const HOURS_PER_DAY: usize = 24;

/// Per-origin rollup of the events matching a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub origin: String,
    pub count: usize,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Descriptor of the representative event's agent.
    pub descriptor: String,
    pub location: Location,
}

/// Earliest event wins; equal timestamps fall to the smaller agent string.
fn is_better_representative(candidate: &OpenEvent, current: &OpenEvent) -> bool {
    match candidate.occurred_at.cmp(&current.occurred_at) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => candidate.agent < current.agent,
    }
}

/// Group `events` by origin into [`Summary`] values.
///
/// `descriptor_fn` is applied once per origin to the representative
/// event's agent, `location_fn` once per origin. Input order does not
/// affect the result.
pub fn aggregate<D, L>(
    events: &[OpenEvent],
    descriptor_fn: D,
    location_fn: L,
) -> HashMap<String, Summary>
where
    D: Fn(&str) -> String,
    L: Fn(&str) -> Location,
{
    struct Group<'a> {
        count: usize,
        last_seen: DateTime<Utc>,
        representative: &'a OpenEvent,
    }

    let mut groups: HashMap<&str, Group<'_>> = HashMap::new();
    for event in events {
        groups
            .entry(event.origin.as_str())
            .and_modify(|group| {
                group.count += 1;
                group.last_seen = group.last_seen.max(event.occurred_at);
                if is_better_representative(event, group.representative) {
                    group.representative = event;
                }
            })
            .or_insert(Group {
                count: 1,
                last_seen: event.occurred_at,
                representative: event,
            });
    }

    groups
        .into_iter()
        .map(|(origin, group)| {
            let summary = Summary {
                origin: origin.to_string(),
                count: group.count,
                first_seen: group.representative.occurred_at,
                last_seen: group.last_seen,
                descriptor: descriptor_fn(&group.representative.agent),
                location: location_fn(origin),
            };
            (origin.to_string(), summary)
        })
        .collect()
}

/// Summaries sorted by count descending, then origin ascending; first `n`.
#[must_use]
pub fn top_origins(summaries: &HashMap<String, Summary>, n: usize) -> Vec<Summary> {
    let mut ranked: Vec<&Summary> = summaries.values().collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.origin.cmp(&b.origin)));
    ranked.into_iter().take(n).cloned().collect()
}

/// Opens per identifier, ordered by identifier.
#[must_use]
pub fn counts_by_identifier(events: &[OpenEvent]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for event in events {
        *counts.entry(event.identifier.clone()).or_insert(0) += 1;
    }
    counts
}

/// Opens per local hour of day in `zone`. Index 0 is 00:00-00:59.
#[must_use]
pub fn hourly_histogram<Z: TimeZone>(events: &[OpenEvent], zone: &Z) -> [usize; HOURS_PER_DAY] {
    let mut buckets = [0usize; HOURS_PER_DAY];
    for event in events {
        let hour = event.occurred_at.with_timezone(zone).hour() as usize;
        buckets[hour % HOURS_PER_DAY] += 1;
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use chrono_tz::Tz;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).single().expect("valid ts")
    }

    fn ev(origin: &str, agent: &str, minutes: i64) -> OpenEvent {
        OpenEvent::new("camp1-a@x", origin, agent, t0() + Duration::minutes(minutes))
    }

    fn upper(agent: &str) -> String {
        agent.to_uppercase()
    }

    fn nowhere(_: &str) -> Location {
        Location::Unknown
    }

    #[test]
    fn groups_by_origin() {
        let events = vec![
            ev("1.1.1.1", "b", 30),
            ev("1.1.1.1", "a", 10),
            ev("2.2.2.2", "c", 5),
            ev("1.1.1.1", "d", 20),
        ];
        let map = aggregate(&events, upper, nowhere);
        assert_eq!(map.len(), 2);

        let one = &map["1.1.1.1"];
        assert_eq!(one.count, 3);
        assert_eq!(one.first_seen, t0() + Duration::minutes(10));
        assert_eq!(one.last_seen, t0() + Duration::minutes(30));
        assert_eq!(one.descriptor, "A");
        assert_eq!(one.location, Location::Unknown);

        assert_eq!(map["2.2.2.2"].count, 1);
    }

    #[test]
    fn representative_tie_breaks_on_agent() {
        let events = vec![ev("1.1.1.1", "zeta", 0), ev("1.1.1.1", "alpha", 0)];
        let forward = aggregate(&events, upper, nowhere);
        let reversed: Vec<OpenEvent> = events.into_iter().rev().collect();
        let backward = aggregate(&reversed, upper, nowhere);
        assert_eq!(forward["1.1.1.1"].descriptor, "ALPHA");
        assert_eq!(forward, backward);
    }

    #[test]
    fn location_fn_sees_origin() {
        let events = vec![ev("10.0.0.1", "", 0)];
        let map = aggregate(&events, upper, |origin| Location::Known(format!("at {origin}")));
        assert_eq!(map["10.0.0.1"].location, Location::Known("at 10.0.0.1".into()));
    }

    #[test]
    fn empty_input_is_empty_map() {
        assert!(aggregate(&[], upper, nowhere).is_empty());
        assert!(counts_by_identifier(&[]).is_empty());
        assert_eq!(hourly_histogram(&[], &Utc), [0; 24]);
    }

    #[test]
    fn top_origins_orders_by_count_then_origin() {
        let events = vec![
            ev("9.9.9.9", "", 0),
            ev("9.9.9.9", "", 1),
            ev("3.3.3.3", "", 2),
            ev("1.1.1.1", "", 3),
            ev("2.2.2.2", "", 4),
            ev("2.2.2.2", "", 5),
        ];
        let map = aggregate(&events, upper, nowhere);
        let top: Vec<String> = top_origins(&map, 3).into_iter().map(|s| s.origin).collect();
        assert_eq!(top, vec!["2.2.2.2", "9.9.9.9", "1.1.1.1"]);
        assert_eq!(top_origins(&map, 10).len(), 4);
        assert!(top_origins(&map, 0).is_empty());
    }

    #[test]
    fn counts_per_identifier() {
        let events = vec![
            OpenEvent::new("b", "1.1.1.1", "", t0()),
            OpenEvent::new("a", "1.1.1.1", "", t0()),
            OpenEvent::new("b", "2.2.2.2", "", t0()),
        ];
        let counts = counts_by_identifier(&events);
        assert_eq!(
            counts.into_iter().collect::<Vec<_>>(),
            vec![("a".to_string(), 1), ("b".to_string(), 2)]
        );
    }

    #[test]
    fn histogram_buckets_in_local_hour() {
        // 2025-03-10 12:00 UTC is 20:00 in Shanghai and 08:00 EDT.
        let events = vec![ev("1.1.1.1", "", 0), ev("1.1.1.1", "", 59), ev("1.1.1.1", "", 60)];

        let buckets = hourly_histogram(&events, &Tz::Asia__Shanghai);
        assert_eq!(buckets[20], 2);
        assert_eq!(buckets[21], 1);
        assert_eq!(buckets.iter().sum::<usize>(), 3);

        assert_eq!(hourly_histogram(&events, &Tz::America__New_York)[8], 2);
    }
}
