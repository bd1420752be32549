//! `bcn summary`: per-origin rollup of opens in a time range.

use std::io::Write;
use std::path::Path;

use beacon_core::config::ProjectConfig;
use beacon_core::report::{self, OriginReport, ReportFilter};
use clap::Args;

use super::RangeArgs;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug, Default)]
pub struct SummaryArgs {
    #[command(flatten)]
    pub range: RangeArgs,

    /// Only identifiers starting with this literal prefix.
    #[arg(long)]
    pub prefix: Option<String>,

    /// Show at most this many origins.
    #[arg(long)]
    pub top: Option<usize>,
}

/// Execute `bcn summary`.
pub fn run_summary(
    args: &SummaryArgs,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let cfg = super::load_config(output, project_root)?;
    let store = super::open_existing_store(output, project_root)?;
    let filter = ReportFilter::new(args.prefix.clone(), args.range.resolve());
    let geo = cfg.location_lookup(project_root);

    let report = report::origin_report(&store, &filter, &geo, args.top);
    render_mode(
        output,
        &report,
        |r, w| render_summary_text(r, &cfg, w),
        |r, w| render_summary_pretty(r, &cfg, w),
    )?;
    super::ensure_query_ok(output, &report.status)
}

fn render_summary_text(
    report: &OriginReport,
    cfg: &ProjectConfig,
    w: &mut dyn Write,
) -> std::io::Result<()> {
    for row in &report.rows {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}",
            row.origin,
            row.count,
            super::short_time(cfg, row.first_seen),
            super::short_time(cfg, row.last_seen),
            row.descriptor,
            row.location
        )?;
    }
    Ok(())
}

fn render_summary_pretty(
    report: &OriginReport,
    cfg: &ProjectConfig,
    w: &mut dyn Write,
) -> std::io::Result<()> {
    pretty_section(w, "Opens by origin")?;
    pretty_kv(w, "Range", super::describe_range(cfg, &report.filter.range))?;
    if let Some(prefix) = report.filter.prefix.as_deref().filter(|p| !p.is_empty()) {
        pretty_kv(w, "Prefix", prefix)?;
    }
    pretty_kv(w, "Opens", report.total_opens.to_string())?;
    pretty_kv(w, "Origins", report.rows.len().to_string())?;

    if report.rows.is_empty() {
        return writeln!(w, "\n  (no opens in range)");
    }

    writeln!(w)?;
    writeln!(
        w,
        "{:<39}  {:>5}  {:<19}  {:<19}  {:<24}  LOCATION",
        "ORIGIN", "OPENS", "FIRST", "LAST", "CLIENT"
    )?;
    for row in &report.rows {
        writeln!(
            w,
            "{:<39}  {:>5}  {:<19}  {:<19}  {:<24}  {}",
            row.origin,
            row.count,
            super::short_time(cfg, row.first_seen),
            super::short_time(cfg, row.last_seen),
            row.descriptor,
            row.location
        )?;
    }
    Ok(())
}
