//! Time windows over a dataset.
//!
//! A [`WindowQuery`] describes what the caller wants in caller-epoch time
//! (or as an explicit index range); [`TimeWindowReader`] maps it onto a
//! [`CoverageWindow`] of store indices and assembles a [`RecordBatch`] from
//! the stored columns.
//!
//! [`RecordBatch`]: crate::batch::RecordBatch

mod reader;

#[cfg(test)]
mod tests;

pub use reader::TimeWindowReader;

// ---------------------------------------------------------------------------
// IndexRange
// ---------------------------------------------------------------------------

/// Index slice with negative positions counted from the end, like a Python
/// slice with a positive step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub stride: usize,
}

impl Default for IndexRange {
    fn default() -> Self {
        Self {
            start: None,
            stop: None,
            stride: 1,
        }
    }
}

impl IndexRange {
    pub fn new(start: Option<i64>, stop: Option<i64>, stride: usize) -> Self {
        Self {
            start,
            stop,
            stride: stride.max(1),
        }
    }

    /// The last `n` rows.
    pub fn last(n: usize) -> Self {
        let n = i64::try_from(n).unwrap_or(i64::MAX);
        Self::new(Some(-n), None, 1)
    }

    /// Concrete window over a dataset of `len` rows.
    pub fn resolve(&self, len: usize) -> CoverageWindow {
        let clamp = |pos: i64| -> usize {
            if pos < 0 {
                let back = usize::try_from(pos.unsigned_abs()).unwrap_or(usize::MAX);
                len.saturating_sub(back)
            } else {
                usize::try_from(pos).unwrap_or(usize::MAX).min(len)
            }
        };
        let start = self.start.map_or(0, clamp);
        let stop = self.stop.map_or(len, clamp).max(start);
        CoverageWindow::Range {
            start,
            stop,
            stride: self.stride.max(1),
        }
    }
}

// ---------------------------------------------------------------------------
// CoverageWindow
// ---------------------------------------------------------------------------

/// Resolved store positions: a strided half-open range or an explicit
/// ascending index list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverageWindow {
    Range {
        start: usize,
        stop: usize,
        stride: usize,
    },
    Indices(Vec<usize>),
}

impl CoverageWindow {
    pub fn full(len: usize) -> Self {
        Self::Range {
            start: 0,
            stop: len,
            stride: 1,
        }
    }

    pub fn empty() -> Self {
        Self::Indices(Vec::new())
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        match self {
            Self::Range {
                start,
                stop,
                stride,
            } => {
                let stride = (*stride).max(1);
                stop.saturating_sub(*start).div_ceil(stride)
            }
            Self::Indices(idx) => idx.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn indices(&self) -> Vec<usize> {
        match self {
            Self::Range {
                start,
                stop,
                stride,
            } => (*start..*stop).step_by((*stride).max(1)).collect(),
            Self::Indices(idx) => idx.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// WindowQuery
// ---------------------------------------------------------------------------

/// A read request. Times are caller epoch (Unix seconds).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowQuery {
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub stride_time: Option<f64>,
    /// Enumerate every `stride_time` step instead of using it as an index
    /// step.
    pub exact_stride: bool,
    pub index_range: Option<IndexRange>,
    /// Parameters to read; empty reads all.
    pub parameters: Vec<String>,
}

impl WindowQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start_time: Option<f64>, end_time: Option<f64>) -> Self {
        Self {
            start_time,
            end_time,
            ..Self::default()
        }
    }

    pub fn with_stride(mut self, stride_time: f64, exact: bool) -> Self {
        self.stride_time = Some(stride_time);
        self.exact_stride = exact;
        self
    }

    pub fn with_index_range(mut self, range: IndexRange) -> Self {
        self.index_range = Some(range);
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<String>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Index step used by a fuzzy stride.
    pub(crate) fn index_step(&self) -> usize {
        match self.stride_time {
            Some(s) if s.is_finite() && s >= 1.0 => s.round() as usize,
            _ => 1,
        }
    }
}
