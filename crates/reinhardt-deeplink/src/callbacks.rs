//! Host callbacks and error reporting.

use std::fmt;
use std::sync::Arc;

use crate::error::DeeplinkError;
use crate::logging::SharedLogger;
use crate::recovery::AttributionOutcome;
use crate::validator::ValidatedLink;

type LinkCallback = Arc<dyn Fn(&ValidatedLink) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&DeeplinkError) + Send + Sync>;
type AttributionCallback = Arc<dyn Fn(&AttributionOutcome) + Send + Sync>;

/// Callbacks registered by the host application.
///
/// Every callback is optional and invoked synchronously. Callbacks should
/// return quickly; they run on the task that delivers links.
#[derive(Clone, Default)]
pub struct DeeplinkCallbacks {
	on_deep_link: Option<LinkCallback>,
	on_error: Option<ErrorCallback>,
	on_attribution_data: Option<AttributionCallback>,
}

impl DeeplinkCallbacks {
	pub fn new() -> Self {
		Self::default()
	}

	/// Called with every validated, de-duplicated link, deferred or real-time.
	pub fn on_deep_link(mut self, f: impl Fn(&ValidatedLink) + Send + Sync + 'static) -> Self {
		self.on_deep_link = Some(Arc::new(f));
		self
	}

	/// Called once per recoverable failure.
	pub fn on_error(mut self, f: impl Fn(&DeeplinkError) + Send + Sync + 'static) -> Self {
		self.on_error = Some(Arc::new(f));
		self
	}

	/// Called with the outcome of every attribution run.
	pub fn on_attribution_data(
		mut self,
		f: impl Fn(&AttributionOutcome) + Send + Sync + 'static,
	) -> Self {
		self.on_attribution_data = Some(Arc::new(f));
		self
	}

	pub(crate) fn deep_link(&self, link: &ValidatedLink) {
		if let Some(f) = &self.on_deep_link {
			f(link);
		}
	}

	pub(crate) fn error(&self, error: &DeeplinkError) {
		if let Some(f) = &self.on_error {
			f(error);
		}
	}

	pub(crate) fn attribution(&self, outcome: &AttributionOutcome) {
		if let Some(f) = &self.on_attribution_data {
			f(outcome);
		}
	}
}

impl fmt::Debug for DeeplinkCallbacks {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DeeplinkCallbacks")
			.field("on_deep_link", &self.on_deep_link.is_some())
			.field("on_error", &self.on_error.is_some())
			.field("on_attribution_data", &self.on_attribution_data.is_some())
			.finish()
	}
}

/// Logs a recoverable failure and forwards it to `on_error`.
#[derive(Clone)]
pub(crate) struct ErrorReporter {
	logger: SharedLogger,
	callbacks: DeeplinkCallbacks,
}

impl ErrorReporter {
	pub(crate) fn new(logger: SharedLogger, callbacks: DeeplinkCallbacks) -> Self {
		Self { logger, callbacks }
	}

	pub(crate) fn logger(&self) -> &SharedLogger {
		&self.logger
	}

	pub(crate) fn callbacks(&self) -> &DeeplinkCallbacks {
		&self.callbacks
	}

	pub(crate) fn report(&self, context: &str, error: DeeplinkError) {
		self.logger.warning(&format!("{context}: {error}"));
		self.callbacks.error(&error);
	}
}
