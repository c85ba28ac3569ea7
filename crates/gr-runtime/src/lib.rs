#[macro_use]
mod log_macros;

pub mod catalog;
pub mod error;
pub mod replay;
pub mod retrieve;
pub mod signal;
pub mod sink_build;
pub mod tracing_init;

pub use catalog::Catalog;
pub use error::{RuntimeError, RuntimeReason, RuntimeResult};
pub use replay::{ReplayController, ReplayStatus, ReplaySummary};
pub use retrieve::{CallerTime, DatasetInfo, Retriever};
