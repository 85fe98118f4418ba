mod config;
mod error;
mod init;
mod object;

pub use config::LoggerConfig;
pub use error::{LoggerError, LoggerResult};
pub use object::{LoggerFormat, LoggerLevel, LoggerUtcMicros, format_utc_micros};

/// Installs the global tracing subscriber described by `cfg`.
///
/// Only binaries call this; libraries just emit `tracing` events.
///
/// # Examples
/// ```rust
/// use runr_observe::{LoggerConfig, init_logger};
///
/// let config = LoggerConfig::default();
/// init_logger(&config).expect("Failed to initialize logger");
/// tracing::info!("logger initialized");
/// ```
pub fn init_logger(cfg: &LoggerConfig) -> LoggerResult<()> {
    init::install(cfg)
}
