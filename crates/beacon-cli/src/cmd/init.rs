use std::io::Write;
use std::path::Path;

use anyhow::{Context as _, Result};
use beacon_core::config::{self, PROJECT_DIR};
use beacon_core::db::{self, DEFAULT_BUSY_TIMEOUT, migrations};
use clap::Args;
use serde::Serialize;

use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite `.beacon/config.toml` with defaults even if it exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct InitReport {
    config: String,
    database: String,
    schema_version: u32,
}

/// Execute `bcn init`. Creates the project skeleton:
///
/// ```text
/// .beacon/
///   config.toml   (defaults)
///   beacon.db     (migrated event store)
/// ```
///
/// An existing store is migrated in place and never truncated.
///
/// # Errors
///
/// Returns an error if `.beacon/` already exists and `--force` is not set,
/// or if any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let config_path = config::config_path(project_root);
    let db_path = config::db_path(project_root);

    if config_path.exists() && !args.force {
        anyhow::bail!("{PROJECT_DIR}/ already exists. Use `bcn init --force` to reinitialize.");
    }

    config::write_default_project_config(project_root)?;

    let conn = db::open_store(&db_path, DEFAULT_BUSY_TIMEOUT)
        .with_context(|| format!("Failed to create event store: {}", db_path.display()))?;
    let schema_version = migrations::current_schema_version(&conn)?;
    tracing::info!(path = %db_path.display(), schema_version, "event store ready");

    let report = InitReport {
        config: config_path.display().to_string(),
        database: db_path.display().to_string(),
        schema_version,
    };

    render(output, &report, |r, w| {
        writeln!(w, "✓ Initialized {PROJECT_DIR}/")?;
        writeln!(w)?;
        writeln!(w, "  Config:   {}", r.config)?;
        writeln!(w, "  Database: {} (schema v{})", r.database, r.schema_version)?;
        writeln!(w)?;
        writeln!(w, "Next steps:")?;
        writeln!(w, "  Serve the pixel:   bcn serve --bind 0.0.0.0:5000")?;
        writeln!(
            w,
            "  Embed:             <img src=\"http://host:5000/track/<campaign>-<recipient>.png\">"
        )?;
        writeln!(w, "  Report:            bcn summary --range 7d")
    })
}
