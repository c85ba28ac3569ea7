mod state;

#[cfg(test)]
mod tests;

pub use state::{ReplayState, ReplayStatus};

use std::sync::{Arc, Mutex, PoisonError};

use orion_error::prelude::*;
use orion_error::ErrorOwe;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::Instrument;

use gr_config::ReplayConfig;
use gr_core::batch::{Provenance, RecordBatch};
use gr_core::error::CoreReason;
use gr_core::sink::PublishSink;

use crate::catalog::Catalog;
use crate::error::{RuntimeReason, RuntimeResult};
use crate::retrieve::Retriever;

pub const DEFAULT_PRODUCER_ID: &str = "granule-replay";

/// What a finished replay worker delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub batches: usize,
    pub rows: usize,
    /// True when the worker exited because of [`ReplayController::stop`].
    pub stopped: bool,
}

/// Streams one dataset window to a sink in `publish_limit`-row batches on
/// a background task.
///
/// ```ignore
/// let ctl = ReplayController::new(job, catalog, sink)?;
/// ctl.start()?;
/// ctl.pause();
/// ctl.resume();
/// let summary = ctl.join().await?;
/// ```
pub struct ReplayController {
    job: Arc<ReplayJob>,
    state: Arc<ReplayState>,
    worker: Mutex<Option<JoinHandle<RuntimeResult<ReplaySummary>>>>,
}

struct ReplayJob {
    dataset_id: String,
    config: ReplayConfig,
    catalog: Arc<Catalog>,
    sink: Arc<dyn PublishSink>,
    producer_id: String,
}

impl ReplayController {
    /// Fails with a configuration error when the job names no dataset or
    /// does not validate.
    pub fn new(
        config: ReplayConfig,
        catalog: Arc<Catalog>,
        sink: Arc<dyn PublishSink>,
    ) -> RuntimeResult<Self> {
        let Some(dataset_id) = config.dataset_id.clone() else {
            return StructError::from(RuntimeReason::Core(CoreReason::Configuration))
                .with_detail("dataset_id not specified".to_string())
                .err();
        };
        config.validate().owe_conf()?;
        Ok(Self {
            job: Arc::new(ReplayJob {
                dataset_id,
                config,
                catalog,
                sink,
                producer_id: DEFAULT_PRODUCER_ID.to_string(),
            }),
            state: Arc::new(ReplayState::new()),
            worker: Mutex::new(None),
        })
    }

    /// Stamp batches with `producer_id` instead of the default. Only takes
    /// effect before [`start`](Self::start).
    pub fn with_producer_id(mut self, producer_id: impl Into<String>) -> Self {
        if let Some(job) = Arc::get_mut(&mut self.job) {
            job.producer_id = producer_id.into();
        }
        self
    }

    pub fn dataset_id(&self) -> &str {
        &self.job.dataset_id
    }

    /// Spawn the worker. Fails with `AlreadyPublishing` while a replay is
    /// active; must be called from within a tokio runtime.
    pub fn start(&self) -> RuntimeResult<()> {
        if !self.state.try_begin() {
            return StructError::from(RuntimeReason::AlreadyPublishing)
                .with_detail(format!("dataset {:?} is already publishing", self.job.dataset_id))
                .err();
        }
        let job = Arc::clone(&self.job);
        let state = Arc::clone(&self.state);
        let span = tracing::info_span!("replay", dataset = %job.dataset_id);
        let handle = tokio::spawn(run_replay(job, state).instrument(span));
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    pub fn pause(&self) {
        self.state.pause();
    }

    pub fn resume(&self) {
        self.state.resume();
    }

    /// Ask the worker to exit before its next batch. Does not wait.
    pub fn stop(&self) {
        self.state.stop();
    }

    pub fn status(&self) -> ReplayStatus {
        self.state.status()
    }

    /// Wait for the worker started by the last [`start`](Self::start).
    pub async fn join(&self) -> RuntimeResult<ReplaySummary> {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return StructError::from(RuntimeReason::Shutdown)
                .with_detail("replay was not started".to_string())
                .err();
        };
        match handle.await {
            Ok(result) => result,
            Err(e) => StructError::from(RuntimeReason::Shutdown)
                .with_detail(format!("replay worker failed: {e}"))
                .err(),
        }
    }
}

async fn run_replay(job: Arc<ReplayJob>, state: Arc<ReplayState>) -> RuntimeResult<ReplaySummary> {
    gr_info!(pipe, publish_limit = job.config.query.publish_limit, "replay started");
    let result = publish_all(&job, &state).await;
    match &result {
        Ok(summary) if summary.stopped => {
            gr_info!(pipe, batches = summary.batches, rows = summary.rows, "replay stopped");
        }
        Ok(summary) => {
            state.finish();
            gr_info!(pipe, batches = summary.batches, rows = summary.rows, "replay finished");
        }
        Err(e) => {
            state.finish();
            gr_error!(pipe, error = %e, "replay aborted");
        }
    }
    result
}

async fn publish_all(job: &ReplayJob, state: &ReplayState) -> RuntimeResult<ReplaySummary> {
    let mut batch = Retriever::new(Arc::clone(&job.catalog)).execute_retrieve(&job.config)?;
    let columns = publish_columns(&batch, &job.config.query.parameters);
    let limit = job.config.query.publish_limit.max(1);
    let total = batch.len();

    let mut summary = ReplaySummary::default();
    let mut offset = 0;
    while offset < total {
        if state.is_ended() || !state.wait_playing().await {
            summary.stopped = true;
            break;
        }
        let end = (offset + limit).min(total);
        let mut chunk = batch.slice(offset..end, &columns).err_conv()?;
        let provenance = Provenance::new(job.producer_id.as_str())
            .with("dataset_id", job.dataset_id.as_str())
            .with("batch_index", summary.batches as u64)
            .with("row_offset", offset as u64);
        let wire = chunk.to_wire(&provenance);
        job.sink.publish(&wire).await.err_conv()?;
        gr_debug!(pipe, batch = summary.batches, rows = end - offset, "batch published");

        summary.batches += 1;
        summary.rows += end - offset;
        offset = end;
    }
    job.sink.flush().await.err_conv()?;
    Ok(summary)
}

/// Requested parameters the delivery schema offers, or all of its columns
/// when none were requested.
fn publish_columns(batch: &RecordBatch, parameters: &[String]) -> Vec<String> {
    let schema = batch.schema();
    if parameters.is_empty() {
        return schema.column_names();
    }
    let mut columns = Vec::with_capacity(parameters.len());
    for name in parameters {
        if schema.is_available(name) {
            columns.push(name.clone());
        } else {
            gr_warn!(pipe, parameter = %name, schema = %schema.id(), "parameter not in delivery schema, skipped");
        }
    }
    columns
}
