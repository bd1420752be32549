//! `bcn dashboard`: opens per identifier, time-of-day histogram and the
//! busiest origins for one range.

use std::io::Write;
use std::path::Path;

use beacon_core::config::ProjectConfig;
use beacon_core::report::{self, DashboardReport, Lookups, ReportFilter};
use clap::Args;

use super::RangeArgs;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Widest histogram bar in pretty output.
const BAR_WIDTH: usize = 40;

#[derive(Args, Debug, Default)]
pub struct DashboardArgs {
    #[command(flatten)]
    pub range: RangeArgs,

    /// Only identifiers starting with this literal prefix.
    #[arg(long)]
    pub prefix: Option<String>,
}

/// Execute `bcn dashboard`.
pub fn run_dashboard(
    args: &DashboardArgs,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let cfg = super::load_config(output, project_root)?;
    let store = super::open_existing_store(output, project_root)?;
    let filter = ReportFilter::new(args.prefix.clone(), args.range.resolve());
    let geo = cfg.location_lookup(project_root);
    let lookups = Lookups {
        location: &geo,
        zones: &cfg.display.zones,
    };

    let dashboard = report::dashboard_report(&store, &filter, lookups, cfg.display.top_origins);
    render_mode(
        output,
        &dashboard,
        render_dashboard_text,
        |d, w| render_dashboard_pretty(d, &cfg, w),
    )?;
    super::ensure_query_ok(output, &dashboard.status)
}

fn render_dashboard_text(dashboard: &DashboardReport, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(w, "total\t{}", dashboard.total_opens)?;
    for (identifier, count) in &dashboard.per_identifier {
        writeln!(w, "identifier\t{identifier}\t{count}")?;
    }
    for (hour, count) in dashboard.hourly.iter().enumerate() {
        writeln!(w, "hour\t{hour:02}\t{count}")?;
    }
    for row in &dashboard.top_origins {
        writeln!(w, "origin\t{}\t{}", row.origin, row.count)?;
    }
    Ok(())
}

fn bar(count: usize, max: usize) -> String {
    if max == 0 || count == 0 {
        return String::new();
    }
    let len = (count * BAR_WIDTH).div_ceil(max);
    "#".repeat(len.min(BAR_WIDTH))
}

fn render_dashboard_pretty(
    dashboard: &DashboardReport,
    cfg: &ProjectConfig,
    w: &mut dyn Write,
) -> std::io::Result<()> {
    pretty_section(w, "Dashboard")?;
    pretty_kv(w, "Range", super::describe_range(cfg, &dashboard.filter.range))?;
    if let Some(prefix) = dashboard.filter.prefix.as_deref().filter(|p| !p.is_empty()) {
        pretty_kv(w, "Prefix", prefix)?;
    }
    pretty_kv(w, "Opens", dashboard.total_opens.to_string())?;

    writeln!(w)?;
    pretty_section(w, "Opens per identifier")?;
    if dashboard.per_identifier.is_empty() {
        writeln!(w, "  (none)")?;
    }
    for (identifier, count) in &dashboard.per_identifier {
        writeln!(w, "  {count:>6}  {identifier}")?;
    }

    writeln!(w)?;
    pretty_section(w, &format!("Opens by hour ({})", dashboard.histogram_zone))?;
    let max = dashboard.hourly.iter().copied().max().unwrap_or(0);
    for (hour, count) in dashboard.hourly.iter().enumerate() {
        writeln!(w, "  {hour:02}  {count:>5}  {}", bar(*count, max))?;
    }

    writeln!(w)?;
    pretty_section(w, "Top origins")?;
    if dashboard.top_origins.is_empty() {
        writeln!(w, "  (none)")?;
    }
    for row in &dashboard.top_origins {
        writeln!(w, "  {:>6}  {:<39}  {}", row.count, row.origin, row.location)?;
    }
    Ok(())
}
