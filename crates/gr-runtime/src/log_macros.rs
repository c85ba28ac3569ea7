//! Logging macros that tag every event with a `domain` field.
//!
//! Domains used by the runtime:
//!
//! - `sys`: process lifecycle, signals, bootstrap summary
//! - `pipe`: retrieval and replay data flow
//! - `res`: dataset handles and sinks being opened or closed
//! - `conf`: catalog and configuration loading
//!
//! ```ignore
//! gr_info!(sys, schemas = 3, datasets = 2, "catalog ready");
//! gr_warn!(pipe, error = %e, "replay aborted");
//! ```
//!
//! The domain is a bare identifier, turned into a string by the macro.

#[doc(hidden)]
macro_rules! gr_log {
    ($level:ident, $domain:ident, $($field:tt)*) => {
        tracing::$level!(domain = stringify!($domain), $($field)*)
    };
}

#[allow(unused_macros)]
macro_rules! gr_error {
    ($domain:ident, $($rest:tt)*) => {
        gr_log!(error, $domain, $($rest)*)
    };
}

macro_rules! gr_warn {
    ($domain:ident, $($rest:tt)*) => {
        gr_log!(warn, $domain, $($rest)*)
    };
}

macro_rules! gr_info {
    ($domain:ident, $($rest:tt)*) => {
        gr_log!(info, $domain, $($rest)*)
    };
}

macro_rules! gr_debug {
    ($domain:ident, $($rest:tt)*) => {
        gr_log!(debug, $domain, $($rest)*)
    };
}

#[allow(unused_macros)]
macro_rules! gr_trace {
    ($domain:ident, $($rest:tt)*) => {
        gr_log!(trace, $domain, $($rest)*)
    };
}
