//! Bridge from the `log` facade to the host app's logger.
//!
//! Everything in this crate logs through the `log` macros. Once the app has
//! registered a [`Logger`], records are forwarded to it (Logcat on Android,
//! `os_log` on iOS); before that they go to stderr.
//!
//! ## Kotlin
//!
//! ```kotlin
//! object NexPayLogger : Logger {
//!     override fun log(level: LogLevel, message: String) {
//!         when (level) {
//!             LogLevel.ERROR -> Log.e("NexPay", message)
//!             LogLevel.WARN -> Log.w("NexPay", message)
//!             else -> Log.d("NexPay", message)
//!         }
//!     }
//! }
//!
//! // Application.onCreate, once per process
//! setLogger(NexPayLogger)
//! ```

use std::sync::{Arc, OnceLock};

/// Log sink implemented by the host application.
#[uniffi::export(with_foreign)]
pub trait Logger: Sync + Send {
    /// Receives one formatted log line.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a forwarded log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum LogLevel {
    /// Very detailed tracing.
    Trace,
    /// Debugging information.
    Debug,
    /// Progress of normal operations.
    Info,
    /// Recoverable problems.
    Warn,
    /// Failures.
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

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Self::Error,
            LogLevel::Warn => Self::Warn,
            LogLevel::Info => Self::Info,
            LogLevel::Debug => Self::Debug,
            LogLevel::Trace => Self::Trace,
        }
    }
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

struct ForeignLogger;

impl log::Log for ForeignLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Debug and trace output from dependencies is noise on device.
        let from_nexpay = record
            .module_path()
            .is_some_and(|module_path| module_path.starts_with("nexpay"));
        if record.level() >= log::Level::Debug && !from_nexpay {
            return;
        }

        let message = format!("{}", record.args());
        match LOGGER_INSTANCE.get() {
            Some(logger) => logger.log(record.level().into(), message),
            None => eprintln!("[{}] {message}", record.level()),
        }
    }

    fn flush(&self) {}
}

/// Registers the host logger and installs the `log` bridge.
///
/// Only the first call has an effect; later calls are reported on stderr.
#[uniffi::export]
pub fn set_logger(logger: Arc<dyn Logger>) {
    static LOGGER: ForeignLogger = ForeignLogger;

    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("nexpay logger already set");
        return;
    }

    if let Err(e) = log::set_logger(&LOGGER) {
        eprintln!("failed to install nexpay logger: {e}");
        return;
    }
    log::set_max_level(log::LevelFilter::Debug);
}

/// Changes the most verbose level that is forwarded.
#[uniffi::export]
pub fn set_log_level(level: LogLevel) {
    log::set_max_level(level.into());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(LogLevel::from(log::Level::Warn), LogLevel::Warn);
        assert_eq!(log::LevelFilter::from(LogLevel::Trace), log::LevelFilter::Trace);
    }
}
