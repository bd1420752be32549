use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::dedup::{DEFAULT_WINDOW_HOURS, DedupPolicy};
use crate::geo::{GeoDatabase, GeoLookup, NetworkEntry, StaticTable};
use crate::ingest::Retention;
use crate::zones::{DisplayZone, default_zones, primary_zone};

/// Directory holding config and the event store, relative to the project root.
pub const PROJECT_DIR: &str = ".beacon";
/// Project config file name inside [`PROJECT_DIR`].
pub const CONFIG_FILE: &str = "config.toml";
/// Event store file name inside [`PROJECT_DIR`].
pub const DB_FILE: &str = "beacon.db";

/// Path of the event store for a project root.
#[must_use]
pub fn db_path(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_DIR).join(DB_FILE)
}

/// Path of the project config for a project root.
#[must_use]
pub fn config_path(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_DIR).join(CONFIG_FILE)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub geo: GeoConfig,
}

impl ProjectConfig {
    #[must_use]
    pub fn dedup_policy(&self) -> DedupPolicy {
        let window = Duration::try_hours(self.dedup.window_hours.max(0)).unwrap_or(Duration::MAX);
        DedupPolicy::from_patterns(window, &self.dedup.exclude)
    }

    /// Location lookup for reports. A relative `geo.database` path is
    /// resolved against `project_root`.
    #[must_use]
    pub fn location_lookup(&self, project_root: &Path) -> GeoLookup {
        let table = StaticTable::from_entries(&self.geo.networks);
        let database = self
            .geo
            .database
            .as_deref()
            .and_then(|path| GeoDatabase::open(&project_root.join(path)));
        GeoLookup::new(table, database)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Repeat opens inside this many hours collapse to one. `0` disables dedup.
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
    /// Origins never recorded: exact addresses, CIDR blocks, or `*` globs.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            exclude: default_exclude(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_retention_days")]
    pub days: i64,
    /// Run the sweep on every ingestion.
    #[serde(default = "default_true")]
    pub sweep_on_ingest: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: default_retention_days(),
            sweep_on_ingest: default_true(),
        }
    }
}

impl RetentionConfig {
    #[must_use]
    pub fn horizon(&self) -> Duration {
        Duration::try_days(self.days.max(0)).unwrap_or(Duration::MAX)
    }

    #[must_use]
    pub fn policy(&self) -> Retention {
        Retention {
            horizon: self.horizon(),
            sweep_on_ingest: self.sweep_on_ingest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite busy timeout for the pixel server, in milliseconds.
    #[serde(default = "default_serve_busy_timeout_ms")]
    pub serve_busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            serve_busy_timeout_ms: default_serve_busy_timeout_ms(),
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub const fn serve_busy_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.serve_busy_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Zones shown side by side in `show`; the first also buckets the
    /// dashboard histogram.
    #[serde(default = "default_zones")]
    pub zones: Vec<DisplayZone>,
    #[serde(default = "default_top_origins")]
    pub top_origins: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            zones: default_zones(),
            top_origins: default_top_origins(),
        }
    }
}

impl DisplayConfig {
    /// Zone used for hourly bucketing; UTC when none are configured.
    #[must_use]
    pub fn primary_zone(&self) -> DisplayZone {
        primary_zone(&self.zones)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoConfig {
    /// MaxMind City database, e.g. `GeoLite2-City.mmdb`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    /// Checked before the database.
    #[serde(default)]
    pub networks: Vec<NetworkEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

/// Load `.beacon/config.toml`, or defaults when it does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = config_path(project_root);
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Write a config file populated with defaults.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_default_project_config(project_root: &Path) -> Result<PathBuf> {
    let path = config_path(project_root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(&ProjectConfig::default())
        .context("Failed to serialize default config")?;
    std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Load `<config dir>/beacon/config.toml`, or defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("beacon/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

const fn default_true() -> bool {
    true
}

const fn default_window_hours() -> i64 {
    DEFAULT_WINDOW_HOURS
}

fn default_exclude() -> Vec<String> {
    vec!["127.0.0.1".to_string(), "::1".to_string()]
}

const fn default_retention_days() -> i64 {
    100
}

const fn default_serve_busy_timeout_ms() -> u64 {
    250
}

const fn default_top_origins() -> usize {
    5
}
