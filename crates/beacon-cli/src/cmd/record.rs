//! `bcn record`: ingest one open from the command line.
//!
//! Runs the same path as the pixel endpoint and, like it, never fails on
//! store trouble: the outcome is printed and the exit status stays zero.

use std::io::Write;
use std::path::Path;

use beacon_core::OpenEvent;
use beacon_core::config;
use beacon_core::db::{DEFAULT_BUSY_TIMEOUT, store::SqliteStore};
use beacon_core::error::ErrorCode;
use beacon_core::geo::parse_origin;
use beacon_core::ingest::{self, IngestOutcome};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;

use crate::output::{OutputMode, render_mode};

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Tracking identifier, e.g. `camp1-alice@example.com`.
    pub identifier: String,

    /// Requester address.
    #[arg(long)]
    pub origin: String,

    /// Raw User-Agent string.
    #[arg(long, default_value = "")]
    pub agent: String,

    /// When the open happened (RFC 3339). Defaults to now.
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct RecordReport {
    identifier: String,
    origin: String,
    occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    outcome: IngestOutcome,
}

/// Execute `bcn record`.
pub fn run_record(
    args: &RecordArgs,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let cfg = super::load_config(output, project_root)?;
    let now = Utc::now();
    let occurred_at = args.at.unwrap_or(now);
    let identifier = beacon_core::identifier::strip_image_suffix(args.identifier.trim());

    if parse_origin(&args.origin).is_none() {
        tracing::warn!(
            origin = %args.origin,
            code = %ErrorCode::InvalidOrigin,
            "origin is not an IP address; recording as-is"
        );
    }

    let event = OpenEvent::new(identifier, args.origin.trim(), args.agent.as_str(), occurred_at);
    let db_path = config::db_path(project_root);
    let outcome = match SqliteStore::open(&db_path, DEFAULT_BUSY_TIMEOUT) {
        Ok(store) => ingest::record_open(
            &store,
            &cfg.dedup_policy(),
            cfg.retention.policy(),
            &event,
            now,
        ),
        Err(err) => {
            tracing::warn!(
                error = %format!("{err:#}"),
                code = %ErrorCode::StoreUnavailable,
                "cannot open event store"
            );
            IngestOutcome::Failed {
                reason: format!("{err:#}"),
            }
        }
    };

    let report = RecordReport {
        identifier: event.identifier,
        origin: event.origin,
        occurred_at: event.occurred_at,
        outcome,
    };

    render_mode(
        output,
        &report,
        |r, w| writeln!(w, "{}", r.outcome),
        |r, w| match &r.outcome {
            IngestOutcome::Failed { reason } => writeln!(w, "✗ failed: {reason}"),
            outcome => writeln!(w, "✓ {outcome}: {} from {}", r.identifier, r.origin),
        },
    )
}
