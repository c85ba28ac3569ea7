//! Read-only access to persisted datasets.
//!
//! A [`ColumnStore`] opens [`DatasetHandle`]s by id. Handles report the
//! declared timestep count, per-column extents and the time-to-index
//! mapping, and read raw column values for a [`CoverageWindow`]. Callers
//! hold handles through a [`DatasetLease`], which closes the handle on
//! every exit path.

mod memory;

use std::ops::Deref;
use std::time::Duration;

use crate::error::CoreResult;
use crate::value::Value;
use crate::window::CoverageWindow;

pub use memory::{MemoryColumnStore, MemoryDataset};

/// Close timeout used when the caller does not configure one.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

pub trait ColumnStore: Send + Sync {
    fn open(&self, dataset_id: &str) -> CoreResult<Box<dyn DatasetHandle>>;

    /// Known dataset ids, sorted.
    fn dataset_ids(&self) -> Vec<String>;
}

pub trait DatasetHandle: Send + Sync {
    fn dataset_id(&self) -> &str;

    /// Id of the schema the dataset was written with.
    fn schema_id(&self) -> &str;

    /// Declared number of timesteps.
    fn num_timesteps(&self) -> usize;

    /// Rows physically stored for `column`; `None` if the dataset does not
    /// carry it. May disagree with [`num_timesteps`](Self::num_timesteps)
    /// on a damaged dataset.
    fn extent(&self, column: &str) -> Option<usize>;

    /// Lower-bound index of `store_time` in the temporal column: the first
    /// index whose time is `>= store_time`.
    fn time_to_index(&self, store_time: f64) -> CoreResult<usize>;

    /// First and last stored time, store epoch.
    fn time_bounds(&self) -> CoreResult<Option<(f64, f64)>>;

    /// Values of `column` at the window positions that lie within its
    /// extent, in window order. Never pads.
    fn read(&self, column: &str, window: &CoverageWindow) -> CoreResult<Vec<Value>>;

    /// Release the handle, waiting at most `timeout`. Idempotent.
    fn close(&mut self, timeout: Duration) -> CoreResult<()>;
}

// ---------------------------------------------------------------------------
// DatasetLease
// ---------------------------------------------------------------------------

/// An open dataset handle that is closed when the lease is released or
/// dropped.
pub struct DatasetLease {
    handle: Box<dyn DatasetHandle>,
    timeout: Duration,
    closed: bool,
}

impl DatasetLease {
    pub fn open(store: &dyn ColumnStore, dataset_id: &str, timeout: Duration) -> CoreResult<Self> {
        let handle = store.open(dataset_id)?;
        log::debug!("opened dataset {dataset_id:?}");
        Ok(Self {
            handle,
            timeout,
            closed: false,
        })
    }

    /// Close now and report the outcome. Dropping the lease closes too but
    /// only logs a failure.
    pub fn release(mut self) -> CoreResult<()> {
        self.closed = true;
        self.handle.close(self.timeout)
    }
}

impl Deref for DatasetLease {
    type Target = dyn DatasetHandle;

    fn deref(&self) -> &Self::Target {
        self.handle.as_ref()
    }
}

impl Drop for DatasetLease {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.handle.close(self.timeout) {
            log::warn!("closing dataset {:?} failed: {e}", self.handle.dataset_id());
        }
    }
}
