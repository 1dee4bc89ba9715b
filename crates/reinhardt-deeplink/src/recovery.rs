//! Deferred link recovery.
//!
//! [`AttributionRecovery`] runs the platform fallback chain at most once per
//! process: the native provider first (only inside the first-launch window),
//! then the expiring link store. Every candidate is validated before it is
//! accepted, and no failure inside the chain escapes to the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::callbacks::ErrorReporter;
use crate::config::Platform;
use crate::error::DeeplinkError;
use crate::expiring::{ExpiringLinkStore, StoredLinkRead};
use crate::first_launch::FirstLaunchTracker;
use crate::provider::{AttributionProvider, LinkSource};
use crate::validator::{LinkValidator, ValidatedLink};

/// Lifecycle of the one-time recovery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryState {
	NotAttempted,
	InProgress,
	/// Terminal. Holds the recovered link, if any.
	Resolved(Option<ValidatedLink>),
}

/// Observability record of one recovery run. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributionOutcome {
	pub success: bool,
	pub link: Option<String>,
	pub source: Option<LinkSource>,
	pub platform: Platform,
	pub processing_time: Duration,
	pub error: Option<String>,
	pub metadata: HashMap<String, Value>,
}

impl AttributionOutcome {
	/// Flattens the outcome into a JSON object for analytics pipelines.
	pub fn to_map(&self) -> Value {
		json!({
			"success": self.success,
			"link": self.link,
			"source": self.source.map(|s| s.as_str()).unwrap_or("none"),
			"platform": self.platform.as_str(),
			"processing_time_ms": self.processing_time.as_millis() as u64,
			"error": self.error,
			"metadata": self.metadata,
		})
	}

	/// Returns `true` if the stored link had expired during this run.
	pub fn is_expired(&self) -> bool {
		self.error.as_deref() == Some(EXPIRED)
	}
}

const EXPIRED: &str = "expired";
const NOT_FOUND: &str = "no deferred link found";

/// One-shot fallback chain.
pub struct AttributionRecovery {
	platform: Platform,
	validator: Arc<LinkValidator>,
	provider: Arc<dyn AttributionProvider>,
	store: ExpiringLinkStore,
	first_launch: FirstLaunchTracker,
	reporter: ErrorReporter,
	state: Mutex<RecoveryState>,
}

impl AttributionRecovery {
	pub(crate) fn new(
		platform: Platform,
		validator: Arc<LinkValidator>,
		provider: Arc<dyn AttributionProvider>,
		store: ExpiringLinkStore,
		first_launch: FirstLaunchTracker,
		reporter: ErrorReporter,
	) -> Self {
		Self {
			platform,
			validator,
			provider,
			store,
			first_launch,
			reporter,
			state: Mutex::new(RecoveryState::NotAttempted),
		}
	}

	pub fn state(&self) -> RecoveryState {
		self.state.lock().clone()
	}

	/// Runs the chain if it has never run. Returns the link recovered by this call.
	///
	/// Later calls return `None` without touching providers or storage and
	/// emit no outcome. If the returned future is dropped before it resolves,
	/// the state goes back to `NotAttempted` so the next call starts over.
	pub async fn run_once(&self) -> Option<ValidatedLink> {
		{
			let mut state = self.state.lock();
			if *state != RecoveryState::NotAttempted {
				return None;
			}
			*state = RecoveryState::InProgress;
		}
		let mut guard = AttemptGuard {
			state: &self.state,
			committed: false,
		};

		let started = Instant::now();
		let (link, mut outcome) = self.resolve().await;
		outcome.processing_time = started.elapsed();

		*self.state.lock() = RecoveryState::Resolved(link.clone());
		guard.commit();

		self.reporter.logger().info(&format!(
			"attribution finished: success={} source={} in {:?}",
			outcome.success,
			outcome.source.map(|s| s.as_str()).unwrap_or("none"),
			outcome.processing_time
		));
		self.reporter.callbacks().attribution(&outcome);
		link
	}

	async fn resolve(&self) -> (Option<ValidatedLink>, AttributionOutcome) {
		let mut metadata = HashMap::new();
		let mut error = None;

		self.first_launch.record_launch().await;
		let eligible = self.provider.is_native() && self.first_launch.is_eligible().await;
		metadata.insert("provider".to_string(), json!(self.provider.name()));
		metadata.insert("first_launch_window".to_string(), json!(eligible));

		if eligible {
			match self.provider.fetch_candidate().await {
				Ok(Some(candidate)) => {
					if let Some(link) = self.validator.validate(&candidate.raw) {
						self.first_launch.mark_completed().await;
						return self.success(link, candidate.source, metadata);
					}
					self.reporter.logger().debug(&format!(
						"ignoring invalid {} candidate {:?}",
						candidate.source, candidate.raw
					));
					metadata.insert("rejected_candidate".to_string(), json!(candidate.source.as_str()));
				}
				Ok(None) => {
					self.reporter
						.logger()
						.debug(&format!("{} returned no link", self.provider.name()));
				}
				Err(e) => {
					error = Some(e.to_string());
					self.reporter.report("native attribution failed", e);
				}
			}
		}

		let result = match self.store.read_detailed().await {
			StoredLinkRead::Fresh(raw) => {
				// single use: the slot is emptied whether or not the link is usable
				self.store.clear().await;
				match self.validator.validate(&raw) {
					Some(link) => {
						self.first_launch.mark_completed().await;
						return self.success(link, LinkSource::Storage, metadata);
					}
					None => {
						self.reporter
							.report("stored deferred link rejected", DeeplinkError::InvalidLinkFormat(raw));
						None
					}
				}
			}
			StoredLinkRead::Expired { link, age } => {
				metadata.insert("expired".to_string(), json!(true));
				metadata.insert("expired_link".to_string(), json!(link));
				metadata.insert("age_hours".to_string(), json!(age.as_secs_f64() / 3600.0));
				Some(EXPIRED)
			}
			StoredLinkRead::Absent => None,
		};

		self.first_launch.mark_completed().await;

		let outcome = AttributionOutcome {
			success: false,
			link: None,
			source: None,
			platform: self.platform,
			processing_time: Duration::ZERO,
			error: Some(
				result
					.map(str::to_string)
					.or(error)
					.unwrap_or_else(|| NOT_FOUND.to_string()),
			),
			metadata,
		};
		(None, outcome)
	}

	fn success(
		&self,
		link: ValidatedLink,
		source: LinkSource,
		mut metadata: HashMap<String, Value>,
	) -> (Option<ValidatedLink>, AttributionOutcome) {
		if let Some(id) = &link.id {
			metadata.insert("link_id".to_string(), json!(id));
		}
		let outcome = AttributionOutcome {
			success: true,
			link: Some(link.raw.clone()),
			source: Some(source),
			platform: self.platform,
			processing_time: Duration::ZERO,
			error: None,
			metadata,
		};
		(Some(link), outcome)
	}
}

/// Rolls an abandoned attempt back to `NotAttempted`.
struct AttemptGuard<'a> {
	state: &'a Mutex<RecoveryState>,
	committed: bool,
}

impl AttemptGuard<'_> {
	fn commit(&mut self) {
		self.committed = true;
	}
}

impl Drop for AttemptGuard<'_> {
	fn drop(&mut self) {
		if !self.committed {
			*self.state.lock() = RecoveryState::NotAttempted;
		}
	}
}
