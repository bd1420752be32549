//! `bcn list`: every tracked identifier with its open count.

use std::io::Write;
use std::path::Path;

use beacon_core::report::{self, IdentifierList};
use clap::Args;

use crate::output::{OutputMode, pretty_section, render_mode};

#[derive(Args, Debug, Default)]
pub struct ListArgs {}

/// Execute `bcn list`.
pub fn run_list(_args: &ListArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let cfg = super::load_config(output, project_root)?;
    let store = super::open_existing_store(output, project_root)?;
    let list = report::identifier_list(&store);

    render_mode(
        output,
        &list,
        |list, w| {
            for row in &list.rows {
                writeln!(
                    w,
                    "{}\t{}\t{}",
                    row.identifier,
                    row.count,
                    super::short_time(&cfg, row.last_seen)
                )?;
            }
            Ok(())
        },
        |list, w| render_list_pretty(list, &cfg, w),
    )?;

    super::ensure_query_ok(output, &list.status)
}

fn render_list_pretty(
    list: &IdentifierList,
    cfg: &beacon_core::config::ProjectConfig,
    w: &mut dyn Write,
) -> std::io::Result<()> {
    pretty_section(w, &format!("Tracked identifiers ({})", list.rows.len()))?;
    if list.rows.is_empty() {
        return writeln!(w, "  (no opens recorded)");
    }

    let width = list
        .rows
        .iter()
        .map(|row| row.identifier.chars().count())
        .max()
        .unwrap_or(0)
        .max("IDENTIFIER".len());
    writeln!(w, "{:<width$}  {:>6}  LAST OPEN", "IDENTIFIER", "OPENS")?;
    for row in &list.rows {
        writeln!(
            w,
            "{:<width$}  {:>6}  {}",
            row.identifier,
            row.count,
            super::short_time(cfg, row.last_seen)
        )?;
    }
    Ok(())
}
