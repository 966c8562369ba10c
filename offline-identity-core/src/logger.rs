//! Bridge from the `log` facade to a host-provided logger.
//!
//! Mobile and desktop hosts usually own the logging pipeline. They implement
//! [`Logger`] and register it once with [`set_logger`]; every record the crate
//! emits through `log` is then forwarded to it.
//!
//! ```rust
//! use offline_identity_core::logger::{LogLevel, Logger};
//!
//! struct StderrLogger;
//!
//! impl Logger for StderrLogger {
//!     fn log(&self, level: LogLevel, message: String) {
//!         eprintln!("[{level:?}] {message}");
//!     }
//! }
//! ```

use std::sync::{Arc, OnceLock};

/// Receives log messages emitted by this crate.
#[cfg_attr(feature = "ffi", uniffi::export(with_foreign))]
pub trait Logger: Sync + Send {
    /// Logs `message` at `level`.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a forwarded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum LogLevel {
    /// Very detailed tracing.
    Trace,
    /// Debugging information.
    Debug,
    /// Normal progress, such as a saved record.
    Info,
    /// Something went wrong but the caller can continue, such as a failed decryption.
    Warn,
    /// An operation failed.
    Error,
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

struct ForeignLogger;

impl log::Log for ForeignLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if !should_forward(record.level(), record.module_path()) {
            return;
        }
        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(record.level().into(), record.args().to_string());
        }
    }

    fn flush(&self) {}
}

/// Debug and trace output from other crates is dropped.
fn should_forward(level: log::Level, module_path: Option<&str>) -> bool {
    let verbose = matches!(level, log::Level::Debug | log::Level::Trace);
    !verbose || module_path.is_some_and(|path| path.starts_with("offline_identity"))
}

/// Registers the host logger.
///
/// Only the first call has an effect; later calls are ignored.
#[cfg_attr(feature = "ffi", uniffi::export)]
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        log::warn!("logger already set");
        return;
    }

    static LOGGER: ForeignLogger = ForeignLogger;
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Trace);
    }
}
