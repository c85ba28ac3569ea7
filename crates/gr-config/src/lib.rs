pub mod logging;
pub mod output;
pub mod replay;
pub mod service;
pub mod types;
mod validate;

pub use logging::{LogFormat, LoggingConfig};
pub use output::{OutputUri, parse_output_uri};
pub use replay::{DEFAULT_PUBLISH_LIMIT, IndexRangeConfig, QueryConfig, ReplayConfig};
pub use service::{
    CatalogConfig, NTP_EPOCH_OFFSET, ReplayDefaults, ServiceConfig, resolve_glob, resolve_path,
};
pub use types::{DeliveryFormat, HumanDuration};
