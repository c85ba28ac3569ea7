use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use orion_error::prelude::*;
use serde::Serialize;

use gr_config::{DeliveryFormat, IndexRangeConfig, QueryConfig, ReplayConfig};
use gr_core::batch::RecordBatch;
use gr_core::error::CoreReason;
use gr_core::store::DatasetLease;
use gr_core::window::{IndexRange, WindowQuery};

use crate::catalog::Catalog;
use crate::error::{RuntimeError, RuntimeReason, RuntimeResult};

/// A caller-side timestamp: Unix seconds or a UTC date-time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallerTime(pub f64);

impl From<f64> for CallerTime {
    fn from(secs: f64) -> Self {
        Self(secs)
    }
}

impl From<i64> for CallerTime {
    fn from(secs: i64) -> Self {
        Self(secs as f64)
    }
}

impl From<DateTime<Utc>> for CallerTime {
    fn from(t: DateTime<Utc>) -> Self {
        Self(t.timestamp() as f64 + f64::from(t.timestamp_subsec_nanos()) * 1e-9)
    }
}

/// Layout of a dataset as stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetInfo {
    pub dataset_id: String,
    pub schema_id: String,
    pub num_timesteps: usize,
    /// Stored rows per column of the dataset's schema.
    pub extents: BTreeMap<String, usize>,
    /// First and last stored time in Unix seconds.
    pub time_bounds: Option<(f64, f64)>,
}

/// Convert query settings into a window request.
pub fn window_query(query: &QueryConfig) -> WindowQuery {
    WindowQuery {
        start_time: query.start_time,
        end_time: query.end_time,
        stride_time: query.stride_time,
        exact_stride: query.exact_stride,
        index_range: query.explicit_index_range.map(index_range),
        parameters: query.parameters.clone(),
    }
}

fn index_range(cfg: IndexRangeConfig) -> IndexRange {
    IndexRange::new(cfg.start, cfg.stop, cfg.stride.unwrap_or(1))
}

fn retrieve_err(dataset_id: &str, e: impl std::fmt::Display) -> RuntimeError {
    StructError::from(RuntimeReason::Retrieve)
        .with_detail(format!("problems reading from dataset {dataset_id:?}: {e}"))
}

/// Corruption and configuration errors reach the caller as they are; any
/// other read failure becomes a retrieval error.
fn classify(dataset_id: &str, e: RuntimeError) -> RuntimeError {
    if matches!(
        e.reason(),
        RuntimeReason::Core(CoreReason::Corruption | CoreReason::Configuration)
    ) {
        e
    } else {
        retrieve_err(dataset_id, e)
    }
}

/// One-shot reads against a [`Catalog`].
#[derive(Clone)]
pub struct Retriever {
    catalog: Arc<Catalog>,
}

impl Retriever {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Read the window `config` describes as a single batch.
    ///
    /// An empty dataset yields an empty batch. Corrupted data and bad
    /// settings fail with their own reason, other store failures as a
    /// retrieval error. The dataset handle is closed on every path.
    #[tracing::instrument(name = "retrieve", skip_all, fields(dataset = config.dataset_id.as_deref().unwrap_or("")))]
    pub fn execute_retrieve(&self, config: &ReplayConfig) -> RuntimeResult<RecordBatch> {
        let Some(dataset_id) = config.dataset_id.as_deref() else {
            return StructError::from(RuntimeReason::Core(CoreReason::Configuration))
                .with_detail("dataset_id not specified".to_string())
                .err();
        };
        self.read(
            dataset_id,
            &config.delivery_format,
            &config.stream_config,
            &window_query(&config.query),
        )
    }

    /// The last `min(n, num_timesteps)` rows of a dataset.
    pub fn last_values(
        &self,
        dataset_id: &str,
        n: usize,
        delivery: &DeliveryFormat,
    ) -> RuntimeResult<RecordBatch> {
        let query = WindowQuery::all().with_index_range(IndexRange::last(n));
        self.read(dataset_id, delivery, &BTreeMap::new(), &query)
    }

    /// Rows with `start <= time < end`.
    pub fn retrieve_range(
        &self,
        dataset_id: &str,
        start: impl Into<CallerTime>,
        end: impl Into<CallerTime>,
    ) -> RuntimeResult<RecordBatch> {
        let query = WindowQuery::between(Some(start.into().0), Some(end.into().0));
        self.read(dataset_id, &DeliveryFormat::default(), &BTreeMap::new(), &query)
    }

    pub fn dataset_info(&self, dataset_id: &str) -> RuntimeResult<DatasetInfo> {
        let catalog = &self.catalog;
        let lease = DatasetLease::open(catalog.store().as_ref(), dataset_id, catalog.close_timeout())
            .map_err(|e| retrieve_err(dataset_id, e))?;
        let schema = catalog.schemas().resolve(lease.schema_id()).err_conv()?;
        let extents = schema
            .all_parameters()
            .iter()
            .filter_map(|p| lease.extent(&p.name).map(|n| (p.name.clone(), n)))
            .collect();
        let offset = catalog.epoch_offset();
        let time_bounds = lease
            .time_bounds()
            .map_err(|e| retrieve_err(dataset_id, e))?
            .map(|(a, b)| (a - offset, b - offset));
        let info = DatasetInfo {
            dataset_id: dataset_id.to_string(),
            schema_id: lease.schema_id().to_string(),
            num_timesteps: lease.num_timesteps(),
            extents,
            time_bounds,
        };
        release(lease);
        Ok(info)
    }

    fn read(
        &self,
        dataset_id: &str,
        delivery: &DeliveryFormat,
        stream_config: &BTreeMap<String, String>,
        query: &WindowQuery,
    ) -> RuntimeResult<RecordBatch> {
        let catalog = &self.catalog;
        let lease = DatasetLease::open(catalog.store().as_ref(), dataset_id, catalog.close_timeout())
            .map_err(|e| retrieve_err(dataset_id, e))?;

        let result = catalog
            .delivery_schema(lease.schema_id(), delivery)
            .and_then(|schema| {
                let ctx = catalog.batch_context(stream_config);
                if lease.num_timesteps() == 0 {
                    gr_info!(pipe, dataset = %dataset_id, "reading from an empty dataset");
                    return Ok(RecordBatch::new(schema, ctx));
                }
                catalog
                    .reader()
                    .read(&*lease, schema, ctx, query)
                    .err_conv()
            });
        release(lease);

        let mut batch = result.map_err(|e| {
            gr_warn!(pipe, dataset = %dataset_id, error = %e, "retrieval failed");
            classify(dataset_id, e)
        })?;
        let fetched = batch.fetch_lookup_values();
        gr_debug!(pipe, dataset = %dataset_id, rows = batch.len(), lookups = fetched, "retrieved");
        Ok(batch)
    }
}

/// Close the lease, logging a failure instead of returning it.
pub(crate) fn release(lease: DatasetLease) {
    let id = lease.dataset_id().to_string();
    if let Err(e) = lease.release() {
        gr_warn!(res, dataset = %id, error = %e, "closing dataset failed");
    }
}
