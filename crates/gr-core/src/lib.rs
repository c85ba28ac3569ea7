//! Core data model for granule retrieval and replay: schemas with derived
//! and lookup parameters, record batches, column stores, time windows and
//! publish sinks.

pub mod batch;
pub mod error;
pub mod function;
pub mod lookup;
pub mod schema;
pub mod sink;
pub mod store;
pub mod value;
pub mod window;

#[cfg(test)]
mod testutil;
