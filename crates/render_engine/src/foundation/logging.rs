//! Logging initialization

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system
///
/// Defaults to the `info` level; `RUST_LOG` overrides it.
pub fn init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}
