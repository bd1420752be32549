//! Ingestion path for a single observed open.
//!
//! Order of work: validate the identifier, run the retention sweep, then
//! hand the event to the dedup policy's conditional insert. Nothing here
//! returns an error; failures are logged and reported as
//! [`IngestOutcome::Failed`] so the pixel is always served.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

use crate::db::store::EventStore;
use crate::dedup::{DedupPolicy, Decision};
use crate::event::OpenEvent;
use crate::identifier;

/// What happened to one open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Recorded,
    /// Inside the dedup window of a stored open for the same pair.
    Suppressed,
    /// Origin is on the exclusion list.
    Excluded,
    /// Invalid identifier or store failure; nothing was written.
    Failed { reason: String },
}

impl IngestOutcome {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Recorded => "recorded",
            Self::Suppressed => "suppressed",
            Self::Excluded => "excluded",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for IngestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<Decision> for IngestOutcome {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Record => Self::Recorded,
            Decision::Duplicate => Self::Suppressed,
            Decision::Excluded => Self::Excluded,
        }
    }
}

/// Retention settings applied on ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub horizon: Duration,
    pub sweep_on_ingest: bool,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            horizon: Duration::days(100),
            sweep_on_ingest: true,
        }
    }
}

/// `now - horizon`, saturating at the earliest representable instant.
#[must_use]
pub fn cutoff(horizon: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_sub_signed(horizon).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Delete events older than [`cutoff`]. Returns how many went.
///
/// # Errors
///
/// Returns the store's error if the delete fails.
pub fn sweep(
    store: &dyn EventStore,
    horizon: Duration,
    now: DateTime<Utc>,
) -> Result<usize, crate::db::store::StoreError> {
    let deleted = store.delete_older_than(cutoff(horizon, now))?;
    if deleted > 0 {
        tracing::info!(deleted, "retention sweep removed expired opens");
    }
    Ok(deleted)
}

/// Record one open, never failing outward.
///
/// A failed sweep is logged and does not block the insert.
pub fn record_open(
    store: &dyn EventStore,
    policy: &DedupPolicy,
    retention: Retention,
    event: &OpenEvent,
    now: DateTime<Utc>,
) -> IngestOutcome {
    if let Err(err) = identifier::validate(&event.identifier) {
        tracing::warn!(
            identifier = %event.identifier,
            error = %err,
            "rejecting open with invalid identifier"
        );
        return IngestOutcome::Failed {
            reason: err.to_string(),
        };
    }

    if retention.sweep_on_ingest {
        if let Err(err) = sweep(store, retention.horizon, now) {
            tracing::warn!(error = %err, code = %err.code(), "retention sweep failed");
        }
    }

    match policy.record(store, event) {
        Ok(decision) => {
            tracing::debug!(
                identifier = %event.identifier,
                origin = %event.origin,
                %decision,
                "open ingested"
            );
            decision.into()
        }
        Err(err) => {
            tracing::warn!(
                identifier = %event.identifier,
                origin = %event.origin,
                error = %err,
                code = %err.code(),
                "failed to record open"
            );
            IngestOutcome::Failed {
                reason: err.to_string(),
            }
        }
    }
}
