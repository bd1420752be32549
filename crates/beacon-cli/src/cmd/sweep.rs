//! `bcn sweep`: delete opens past the retention horizon.

use std::io::Write;
use std::path::Path;

use beacon_core::config::RetentionConfig;
use beacon_core::error::ErrorCode;
use beacon_core::ingest;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;

use crate::output::{CliError, OutputMode, pretty_kv, render_error, render_mode};

#[derive(Args, Debug, Default)]
pub struct SweepArgs {
    /// Retention in days. Defaults to `retention.days` from config.
    #[arg(long)]
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
struct PreviousSweep {
    at: DateTime<Utc>,
    deleted: usize,
}

#[derive(Debug, Serialize)]
struct SweepReport {
    retention_days: i64,
    cutoff: DateTime<Utc>,
    deleted: usize,
    /// The sweep before this one, manual or on ingest.
    previous: Option<PreviousSweep>,
}

/// Execute `bcn sweep`.
pub fn run_sweep(args: &SweepArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let cfg = super::load_config(output, project_root)?;
    let store = super::open_existing_store(output, project_root)?;

    let retention = RetentionConfig {
        days: args.days.unwrap_or(cfg.retention.days).max(0),
        sweep_on_ingest: cfg.retention.sweep_on_ingest,
    };
    let horizon = retention.horizon();
    let now = Utc::now();

    let previous = match store.last_sweep() {
        Ok(last) => last.map(|(at, deleted)| PreviousSweep { at, deleted }),
        Err(err) => {
            tracing::warn!(error = %err, "could not read last sweep");
            None
        }
    };

    let deleted = match ingest::sweep(&store, horizon, now) {
        Ok(deleted) => deleted,
        Err(err) => {
            let error = CliError::from_code(ErrorCode::StoreUnavailable, err.to_string());
            render_error(output, &error)?;
            return Err(err.into());
        }
    };

    let report = SweepReport {
        retention_days: retention.days,
        cutoff: ingest::cutoff(horizon, now),
        deleted,
        previous,
    };
    render_mode(
        output,
        &report,
        |r, w| writeln!(w, "{}", r.deleted),
        |r, w| {
            pretty_kv(w, "Retention", format!("{} days", r.retention_days))?;
            pretty_kv(w, "Cutoff", super::short_time(&cfg, r.cutoff))?;
            pretty_kv(w, "Deleted", r.deleted.to_string())?;
            match &r.previous {
                Some(prev) => pretty_kv(
                    w,
                    "Previous",
                    format!("{} ({} deleted)", super::short_time(&cfg, prev.at), prev.deleted),
                ),
                None => pretty_kv(w, "Previous", "never"),
            }
        },
    )
}
