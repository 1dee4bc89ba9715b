//! Logging capability used by the attribution engine.
//!
//! The engine only talks to [`DeeplinkLogger`]. Hosts that already have a
//! logging pipeline implement the trait; everyone else gets [`TracingLogger`].

use std::sync::Arc;

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
	Debug,
	Info,
	Warning,
	Error,
}

/// Narrow logging interface with four severities.
pub trait DeeplinkLogger: Send + Sync {
	fn debug(&self, message: &str);
	fn info(&self, message: &str);
	fn warning(&self, message: &str);
	fn error(&self, message: &str);

	/// Dispatches to the method matching `level`.
	fn log(&self, level: LogLevel, message: &str) {
		match level {
			LogLevel::Debug => self.debug(message),
			LogLevel::Info => self.info(message),
			LogLevel::Warning => self.warning(message),
			LogLevel::Error => self.error(message),
		}
	}
}

/// Default logger, forwards to `tracing` under the `reinhardt_deeplink` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl DeeplinkLogger for TracingLogger {
	fn debug(&self, message: &str) {
		tracing::debug!(target: "reinhardt_deeplink", "{message}");
	}

	fn info(&self, message: &str) {
		tracing::info!(target: "reinhardt_deeplink", "{message}");
	}

	fn warning(&self, message: &str) {
		tracing::warn!(target: "reinhardt_deeplink", "{message}");
	}

	fn error(&self, message: &str) {
		tracing::error!(target: "reinhardt_deeplink", "{message}");
	}
}

/// Shared logger handle.
pub type SharedLogger = Arc<dyn DeeplinkLogger>;

/// Returns the built-in fallback logger.
pub fn default_logger() -> SharedLogger {
	Arc::new(TracingLogger)
}
