use std::path::Path;

use anyhow::Context as _;
use beacon_core::config;
use beacon_core::db::store::SqliteStore;
use beacon_core::error::ErrorCode;
use clap::Args;

use crate::output::{CliError, OutputMode, render_error};
use crate::server::{self, AppState};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub bind: String,
}

/// Execute `bcn serve`. Blocks until shutdown.
pub fn run_serve(args: &ServeArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let cfg = super::load_config(output, project_root)?;
    let db_path = config::db_path(project_root);
    let store = SqliteStore::open(&db_path, cfg.store.serve_busy_timeout())
        .with_context(|| format!("Failed to open event store: {}", db_path.display()))?;

    let geo_entries = cfg.geo.networks.len();
    tracing::info!(
        window_hours = cfg.dedup.window_hours,
        exclusions = cfg.dedup.exclude.len(),
        retention_days = cfg.retention.days,
        geo_entries,
        "starting pixel server"
    );

    let state = AppState::new(Box::new(store), cfg.dedup_policy(), cfg.retention.policy());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async {
        match server::serve(&args.bind, state).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let detail = format!("{}: {err:#}", args.bind);
                render_error(output, &CliError::from_code(ErrorCode::BindFailed, detail))?;
                Err(err)
            }
        }
    })
}
