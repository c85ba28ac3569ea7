use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::logging::LoggingConfig;
use crate::replay::DEFAULT_PUBLISH_LIMIT;
use crate::types::HumanDuration;
use crate::validate;

/// Seconds between 1900-01-01 (store epoch) and 1970-01-01 (caller epoch).
pub const NTP_EPOCH_OFFSET: f64 = 2_208_988_800.0;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Where schema documents, datasets and lookup documents live.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Glob of schema documents (`*.toml`).
    pub schemas: String,
    /// Glob of dataset files (`*.json`).
    pub datasets: String,
    /// Optional lookup document (TOML or JSON).
    #[serde(default)]
    pub lookups: Option<String>,
    /// Offset added to caller (Unix) seconds to reach the store's time
    /// base.
    #[serde(default = "default_epoch_offset")]
    pub epoch_offset: f64,
}

fn default_epoch_offset() -> f64 {
    NTP_EPOCH_OFFSET
}

/// Defaults applied to replay and retrieval jobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplayDefaults {
    /// Bounded wait when closing a dataset handle.
    pub close_timeout: HumanDuration,
    pub publish_limit: usize,
}

impl Default for ReplayDefaults {
    fn default() -> Self {
        Self {
            close_timeout: HumanDuration::from(Duration::from_secs(5)),
            publish_limit: DEFAULT_PUBLISH_LIMIT,
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

/// Top-level `granule.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub replay: ReplayDefaults,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Read and parse a `granule.toml` file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.as_ref().display()))?;
        content.parse()
    }
}

impl FromStr for ServiceConfig {
    type Err = anyhow::Error;

    fn from_str(toml_str: &str) -> anyhow::Result<Self> {
        let config: ServiceConfig = toml::from_str(toml_str)?;
        validate::validate_service(&config)?;
        Ok(config)
    }
}

/// Expand a glob pattern relative to `base_dir`. Matches are sorted so load
/// order is deterministic. A pattern with no matches yields an empty list.
pub fn resolve_glob(pattern: &str, base_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let full = if Path::new(pattern).is_absolute() {
        PathBuf::from(pattern)
    } else {
        base_dir.join(pattern)
    };
    let full = full.to_string_lossy();
    let mut out = Vec::new();
    for entry in glob::glob(&full).map_err(|e| anyhow::anyhow!("bad glob {pattern:?}: {e}"))? {
        out.push(entry.map_err(|e| anyhow::anyhow!("glob {pattern:?}: {e}"))?);
    }
    out.sort();
    Ok(out)
}

/// Resolve a possibly relative path against `base_dir`.
pub fn resolve_path(path: impl AsRef<Path>, base_dir: &Path) -> PathBuf {
    let path = path.as_ref();
    if path.is_relative() {
        base_dir.join(path)
    } else {
        path.to_path_buf()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
