use std::collections::BTreeSet;
use std::sync::Arc;

use orion_error::StructError;

use super::{CoverageWindow, WindowQuery};
use crate::batch::{BatchContext, RecordBatch};
use crate::error::{CoreReason, CoreResult};
use crate::schema::{ParameterKind, SchemaDefinition};
use crate::store::DatasetHandle;

/// Reads time windows from a dataset into record batches.
///
/// Caller times are shifted by `epoch_offset` before they are mapped onto
/// the store's temporal column.
#[derive(Debug, Clone, Copy)]
pub struct TimeWindowReader {
    epoch_offset: f64,
}

impl TimeWindowReader {
    pub fn new(epoch_offset: f64) -> Self {
        Self { epoch_offset }
    }

    pub fn epoch_offset(&self) -> f64 {
        self.epoch_offset
    }

    /// Map `query` onto store positions.
    pub fn compute_window(
        &self,
        handle: &dyn DatasetHandle,
        query: &WindowQuery,
    ) -> CoreResult<CoverageWindow> {
        let n = handle.num_timesteps();

        if let Some(range) = &query.index_range {
            return Ok(range.resolve(n));
        }

        if query.exact_stride
            && let Some(stride) = query.stride_time
        {
            return self.exact_window(handle, query, stride);
        }

        if query.start_time.is_none() && query.end_time.is_none() {
            return Ok(CoverageWindow::Range {
                start: 0,
                stop: n,
                stride: query.index_step(),
            });
        }

        let start = match query.start_time {
            Some(t) => handle.time_to_index(t + self.epoch_offset)?,
            None => 0,
        };
        let stop = match query.end_time {
            Some(t) => handle.time_to_index(t + self.epoch_offset)?,
            None => n,
        };
        let stop = stop.min(n);
        Ok(CoverageWindow::Range {
            start: start.min(stop),
            stop,
            stride: query.index_step(),
        })
    }

    /// Every time `start, start + stride, ...` up to the end bound, mapped to
    /// an index. A missing bound falls back to the dataset's first or last
    /// stored time (the last one inclusive). Enumeration never runs past the
    /// last stored time.
    fn exact_window(
        &self,
        handle: &dyn DatasetHandle,
        query: &WindowQuery,
        stride: f64,
    ) -> CoreResult<CoverageWindow> {
        if !stride.is_finite() || stride <= 0.0 {
            return StructError::from(CoreReason::Configuration)
                .with_detail(format!("exact stride must be a positive number of seconds, got {stride}"))
                .err();
        }
        let n = handle.num_timesteps();
        let Some((first, last)) = handle.time_bounds()? else {
            return Ok(CoverageWindow::empty());
        };
        let start = query.start_time.map_or(first, |t| t + self.epoch_offset);
        let (end, inclusive) = match query.end_time {
            Some(t) if t + self.epoch_offset <= last => (t + self.epoch_offset, false),
            _ => (last, true),
        };

        let mut picked = BTreeSet::new();
        // times before the first sample all land on index 0
        let mut step = if start < first {
            ((first - start) / stride).floor() as u64
        } else {
            0
        };
        loop {
            let t = start + stride * step as f64;
            if t > end || (!inclusive && t >= end) {
                break;
            }
            let idx = handle.time_to_index(t)?;
            if idx < n {
                picked.insert(idx);
            }
            if picked.len() == n {
                break;
            }
            step += 1;
        }
        Ok(CoverageWindow::Indices(picked.into_iter().collect()))
    }

    /// Read the window into a batch bound to `schema`. The temporal column
    /// is read first, then every stored column the requested parameters
    /// need.
    ///
    /// A column stored shorter than the declared timestep count is padded
    /// at the tail with its fill value. A column stored longer is a
    /// corruption error and no batch is returned.
    pub fn read(
        &self,
        handle: &dyn DatasetHandle,
        schema: Arc<SchemaDefinition>,
        ctx: BatchContext,
        query: &WindowQuery,
    ) -> CoreResult<RecordBatch> {
        let mut batch = RecordBatch::new(Arc::clone(&schema), ctx);
        let n = handle.num_timesteps();
        if n == 0 {
            log::info!("dataset {:?} is empty", handle.dataset_id());
            return Ok(batch);
        }

        let window = self.compute_window(handle, query)?;
        if window.is_empty() {
            log::warn!(
                "requested empty window {window:?} from dataset {:?}",
                handle.dataset_id()
            );
            return Ok(batch);
        }
        log::debug!(
            "reading {} rows from dataset {:?}",
            window.len(),
            handle.dataset_id()
        );

        for column in stored_columns(&schema, &query.parameters) {
            let Some(extent) = handle.extent(&column) else {
                log::debug!(
                    "dataset {:?} has no column {column:?}",
                    handle.dataset_id()
                );
                continue;
            };
            if extent > n {
                return StructError::from(CoreReason::Corruption)
                    .with_detail(format!(
                        "dataset {:?} is corrupted: column {column:?} has extent {extent}, \
                         expected {n} timesteps",
                        handle.dataset_id()
                    ))
                    .err();
            }

            let mut values = handle.read(&column, &window)?;
            let expected = window.len();
            if values.len() < expected {
                log::warn!(
                    "dataset {:?}: column {column:?} has extent {extent} of {n}; \
                     padding {} rows with fill",
                    handle.dataset_id(),
                    expected - values.len()
                );
                let fill = schema
                    .parameter(&column)
                    .map(|p| p.fill_value.clone())
                    .ok_or_else(|| {
                        StructError::from(CoreReason::UnknownColumn)
                            .with_detail(format!("column {column:?} is not in schema"))
                    })?;
                values.resize(expected, fill);
            }
            batch.put_raw(&column, values)?;
        }
        Ok(batch)
    }
}

/// Stored columns to read, temporal first. With `parameters` empty every
/// stored column is read; otherwise the requested stored columns plus the
/// stored inputs of requested derived columns.
fn stored_columns(schema: &SchemaDefinition, parameters: &[String]) -> Vec<String> {
    let temporal = schema.temporal();
    let mut wanted: BTreeSet<String> = BTreeSet::new();
    if parameters.is_empty() {
        wanted.extend(
            schema
                .all_parameters()
                .iter()
                .filter(|p| p.kind.is_stored())
                .map(|p| p.name.clone()),
        );
    } else {
        let mut pending: Vec<String> = parameters.to_vec();
        let mut seen = BTreeSet::new();
        while let Some(name) = pending.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            let Some(spec) = schema.parameter(&name) else {
                log::debug!("requested parameter {name:?} is not in schema {:?}", schema.id());
                continue;
            };
            match spec.kind {
                ParameterKind::Function => {
                    if let Some(d) = &spec.derivation {
                        pending.extend(d.column_dependencies().map(str::to_string));
                    }
                }
                kind if kind.is_stored() => {
                    wanted.insert(name);
                }
                _ => {}
            }
        }
    }
    wanted.remove(temporal);

    let mut out = Vec::with_capacity(wanted.len() + 1);
    out.push(temporal.to_string());
    // schema order
    out.extend(
        schema
            .all_parameters()
            .iter()
            .filter(|p| wanted.contains(&p.name))
            .map(|p| p.name.clone()),
    );
    out
}
