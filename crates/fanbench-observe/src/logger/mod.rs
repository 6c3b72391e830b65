mod config;
mod error;
mod format;
mod layer;

pub use config::LoggerConfig;
pub use error::LoggerError;
pub use format::LoggerFormat;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global `tracing` subscriber described by `cfg`.
///
/// Can succeed only once per process; later calls return [`LoggerError::AlreadyInstalled`].
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let filter = layer::filter(&cfg.directive)?;
    let output = layer::output(cfg)?;
    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .map_err(LoggerError::AlreadyInstalled)
}
