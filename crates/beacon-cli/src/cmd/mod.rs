pub mod completions;
pub mod dashboard;
pub mod init;
pub mod list;
pub mod record;
pub mod serve;
pub mod show;
pub mod summary;
pub mod sweep;

use std::path::Path;

use beacon_core::config::{self, ProjectConfig};
use beacon_core::db::{self, DEFAULT_BUSY_TIMEOUT, store::SqliteStore};
use beacon_core::error::ErrorCode;
use beacon_core::range::{Preset, RangeRequest, RangeSource, ResolvedRange};
use beacon_core::report::QueryStatus;
use clap::Args;

use crate::output::{CliError, OutputMode, render_error};

/// Time-range flags shared by the report commands.
#[derive(Args, Debug, Default, Clone)]
pub struct RangeArgs {
    /// Range preset: 7d, 30d, 90d or all.
    #[arg(long, value_name = "PRESET")]
    pub range: Option<Preset>,

    /// Inclusive start (RFC 3339 or YYYY-MM-DD). Overrides --range.
    #[arg(long)]
    pub start: Option<String>,

    /// Inclusive end (RFC 3339 or YYYY-MM-DD). Overrides --range.
    #[arg(long)]
    pub end: Option<String>,
}

impl RangeArgs {
    /// Resolve against the current time, warning on stderr when bad bounds
    /// forced the default range.
    pub fn resolve(&self) -> ResolvedRange {
        let resolved = RangeRequest {
            preset: self.range,
            start: self.start.clone(),
            end: self.end.clone(),
        }
        .resolve(chrono::Utc::now());

        if let RangeSource::Fallback { reason } = &resolved.source {
            let code = ErrorCode::InvalidRange;
            eprintln!(
                "warning: {} ({code}): {reason}; showing the default range",
                code.message()
            );
        }
        resolved
    }
}

/// Load `.beacon/config.toml`, rendering a catalog error on failure.
pub fn load_config(output: OutputMode, project_root: &Path) -> anyhow::Result<ProjectConfig> {
    match config::load_project_config(project_root) {
        Ok(cfg) => Ok(cfg),
        Err(err) => {
            let error = CliError::from_code(ErrorCode::ConfigParseError, format!("{err:#}"));
            render_error(output, &error)?;
            Err(err)
        }
    }
}

/// Open the store for a read command; it must already exist.
pub fn open_existing_store(
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<SqliteStore> {
    let path = config::db_path(project_root);
    match db::try_open_store(&path, DEFAULT_BUSY_TIMEOUT) {
        Ok(Some(conn)) => Ok(SqliteStore::from_connection(conn)),
        Ok(None) => {
            render_error(output, &CliError::from_code(ErrorCode::NotInitialized, ""))?;
            anyhow::bail!("event store not found at {}", path.display());
        }
        Err(err) => {
            let error = CliError::from_code(ErrorCode::StoreUnavailable, format!("{err:#}"));
            render_error(output, &error)?;
            Err(err)
        }
    }
}

/// Turn a failed report into a rendered error and a non-zero exit.
pub fn ensure_query_ok(output: OutputMode, status: &QueryStatus) -> anyhow::Result<()> {
    if let QueryStatus::Failed { code, message } = status {
        render_error(
            output,
            &CliError {
                message: message.clone(),
                suggestion: code.hint().map(str::to_string),
                error_code: Some(code.code().to_string()),
            },
        )?;
        anyhow::bail!("{message}");
    }
    Ok(())
}

/// Render a timestamp for text output in the first configured zone.
pub fn short_time(cfg: &ProjectConfig, at: chrono::DateTime<chrono::Utc>) -> String {
    cfg.display.primary_zone().format(at)
}

/// One-line description of a resolved range for pretty output.
pub fn describe_range(cfg: &ProjectConfig, resolved: &ResolvedRange) -> String {
    if resolved.range == beacon_core::range::TimeRange::unbounded() {
        return "all time".to_string();
    }
    format!(
        "{} .. {}",
        short_time(cfg, resolved.range.start),
        short_time(cfg, resolved.range.end)
    )
}
