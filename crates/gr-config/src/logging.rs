use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use serde::Deserialize;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// The `[logging]` section of `granule.toml`; may be left out entirely.
///
/// ```toml
/// [logging]
/// level = "info"
/// format = "json"
/// file = "logs/granule.log"
///
/// [logging.modules]
/// "gr_runtime::replay" = "debug"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Per-module level overrides.
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
    /// Relative paths resolve against the directory of `granule.toml`.
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            modules: BTreeMap::new(),
            file: None,
            format: LogFormat::Plain,
        }
    }
}

impl LoggingConfig {
    /// `EnvFilter` directives: the global level followed by each module
    /// override in name order.
    pub fn filter_directives(&self) -> String {
        let mut out = if self.level.is_empty() {
            default_level()
        } else {
            self.level.clone()
        };
        for (module, level) in &self.modules {
            write!(out, ",{module}={level}").ok();
        }
        out
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One line per event, `[domain]` tag first.
    #[default]
    Plain,
    Json,
}
