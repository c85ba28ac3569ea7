use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::output::{OutputUri, parse_output_uri};
use crate::types::DeliveryFormat;
use crate::validate;

pub const DEFAULT_PUBLISH_LIMIT: usize = 10;

/// A replay (or one-shot retrieval) job.
///
/// `dataset_id` is optional at the serde level so that a job file without it
/// still parses; the runtime rejects it before doing any work.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub dataset_id: Option<String>,
    pub delivery_format: DeliveryFormat,
    /// Sink URI (`file://`, `arrow://`, `stdout:`). The caller supplies a
    /// sink when this is unset.
    pub output_destination: Option<String>,
    /// Stream configuration copied into every batch, e.g.
    /// `reference_designator` used to scope lookup keys.
    pub stream_config: BTreeMap<String, String>,
    pub query: QueryConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Window start, seconds since the Unix epoch.
    pub start_time: Option<f64>,
    /// Window end (exclusive), seconds since the Unix epoch.
    pub end_time: Option<f64>,
    /// Stride in seconds. With `exact_stride` unset it is used as an index
    /// step over the mapped range.
    pub stride_time: Option<f64>,
    pub exact_stride: bool,
    /// Parameters to publish. Empty means every column of the delivery
    /// schema.
    pub parameters: Vec<String>,
    /// Rows per published batch.
    pub publish_limit: usize,
    pub explicit_index_range: Option<IndexRangeConfig>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            start_time: None,
            end_time: None,
            stride_time: None,
            exact_stride: false,
            parameters: Vec::new(),
            publish_limit: DEFAULT_PUBLISH_LIMIT,
            explicit_index_range: None,
        }
    }
}

/// Python-style slice over row indices; negative bounds count from the end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexRangeConfig {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub stride: Option<usize>,
}

impl ReplayConfig {
    /// Parsed `output_destination`, if set.
    pub fn output_uri(&self) -> anyhow::Result<Option<OutputUri>> {
        self.output_destination
            .as_deref()
            .map(parse_output_uri)
            .transpose()
    }

    /// Read and parse a replay job file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.as_ref().display()))?;
        content.parse()
    }

    /// Re-run load-time validation, for configs assembled in code.
    pub fn validate(&self) -> anyhow::Result<()> {
        validate::validate_replay(self)
    }
}

impl FromStr for ReplayConfig {
    type Err = anyhow::Error;

    fn from_str(toml_str: &str) -> anyhow::Result<Self> {
        let config: ReplayConfig = toml::from_str(toml_str)?;
        validate::validate_replay(&config)?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
