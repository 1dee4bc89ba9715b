//! Lifecycle orchestration.
//!
//! [`DeeplinkService`] is constructed once by the host and passed to
//! wherever links are needed. `initialize()` subscribes to real-time links,
//! runs deferred recovery, then starts routing the subscription; both paths
//! end in the same dispatch gate and the same `on_deep_link` callback.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::callbacks::{DeeplinkCallbacks, ErrorReporter};
use crate::config::{DeeplinkConfig, Platform};
use crate::error::{DeeplinkError, DeeplinkResult};
use crate::expiring::{ExpiringLinkStore, LinkMetadata};
use crate::first_launch::FirstLaunchTracker;
use crate::gate::DispatchGate;
use crate::logging::{SharedLogger, default_logger};
use crate::provider::{ClipboardSource, InstallReferrerSource, select_provider};
use crate::realtime::{LinkStream, RealtimeLinkSource};
use crate::recovery::{AttributionRecovery, RecoveryState};
use crate::storage::{KeyValueStore, MemoryStore, StorageKeys};
use crate::validator::LinkValidator;

/// Result of [`DeeplinkService::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializeStatus {
	/// Recovery ran and the real-time subscription is live.
	Initialized,
	/// A previous call already did the work; nothing happened.
	AlreadyInitialized,
}

/// Builder for [`DeeplinkService`].
pub struct DeeplinkServiceBuilder {
	config: DeeplinkConfig,
	storage: Option<Arc<dyn KeyValueStore>>,
	referrer: Option<Arc<dyn InstallReferrerSource>>,
	clipboard: Option<Arc<dyn ClipboardSource>>,
	realtime: Option<Arc<dyn RealtimeLinkSource>>,
	logger: Option<SharedLogger>,
	callbacks: DeeplinkCallbacks,
}

impl DeeplinkServiceBuilder {
	/// Durable storage. Defaults to a [`MemoryStore`].
	pub fn storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
		self.storage = Some(storage);
		self
	}

	/// Android install referrer service.
	pub fn install_referrer(mut self, source: Arc<dyn InstallReferrerSource>) -> Self {
		self.referrer = Some(source);
		self
	}

	/// iOS clipboard access.
	pub fn clipboard(mut self, source: Arc<dyn ClipboardSource>) -> Self {
		self.clipboard = Some(source);
		self
	}

	/// Real-time link delivery.
	pub fn realtime(mut self, source: Arc<dyn RealtimeLinkSource>) -> Self {
		self.realtime = Some(source);
		self
	}

	/// Logger. Defaults to [`TracingLogger`](crate::logging::TracingLogger).
	pub fn logger(mut self, logger: SharedLogger) -> Self {
		self.logger = Some(logger);
		self
	}

	pub fn callbacks(mut self, callbacks: DeeplinkCallbacks) -> Self {
		self.callbacks = callbacks;
		self
	}

	pub fn build(self) -> DeeplinkService {
		let config = Arc::new(self.config);
		let logger = self.logger.unwrap_or_else(default_logger);
		let reporter = ErrorReporter::new(logger, self.callbacks.clone());
		let storage = self
			.storage
			.unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);
		let keys = StorageKeys::new(&config.storage_key_prefix);
		let validator = Arc::new(LinkValidator::new(&config));

		let store = ExpiringLinkStore::new(
			storage.clone(),
			keys.clone(),
			config.max_link_age,
			reporter.clone(),
		);
		let first_launch =
			FirstLaunchTracker::new(storage, keys, config.max_link_age, reporter.clone());
		let provider = select_provider(&config, validator.clone(), self.referrer, self.clipboard);
		reporter.logger().debug(&format!(
			"deep link service for {} using provider {}",
			config.platform,
			provider.name()
		));
		let recovery = AttributionRecovery::new(
			config.platform,
			validator.clone(),
			provider,
			store.clone(),
			first_launch.clone(),
			reporter.clone(),
		);

		DeeplinkService {
			gate: Arc::new(DispatchGate::new(config.dedup_window, self.callbacks)),
			config,
			validator,
			store,
			first_launch,
			recovery,
			reporter,
			realtime: self.realtime,
			initialized: AtomicBool::new(false),
			subscription: Mutex::new(None),
		}
	}
}

struct Subscription {
	cancel: CancellationToken,
	handle: JoinHandle<()>,
}

/// Clears the initialized flag if `initialize()` is abandoned midway.
struct InitGuard<'a> {
	initialized: &'a AtomicBool,
	committed: bool,
}

impl InitGuard<'_> {
	fn commit(&mut self) {
		self.committed = true;
	}
}

impl Drop for InitGuard<'_> {
	fn drop(&mut self) {
		if !self.committed {
			self.initialized.store(false, Ordering::SeqCst);
		}
	}
}

/// Deferred and real-time deep link orchestrator.
pub struct DeeplinkService {
	config: Arc<DeeplinkConfig>,
	validator: Arc<LinkValidator>,
	store: ExpiringLinkStore,
	first_launch: FirstLaunchTracker,
	recovery: AttributionRecovery,
	gate: Arc<DispatchGate>,
	reporter: ErrorReporter,
	realtime: Option<Arc<dyn RealtimeLinkSource>>,
	initialized: AtomicBool,
	subscription: Mutex<Option<Subscription>>,
}

impl DeeplinkService {
	pub fn builder(config: DeeplinkConfig) -> DeeplinkServiceBuilder {
		DeeplinkServiceBuilder {
			config,
			storage: None,
			referrer: None,
			clipboard: None,
			realtime: None,
			logger: None,
			callbacks: DeeplinkCallbacks::default(),
		}
	}

	pub fn config(&self) -> &DeeplinkConfig {
		&self.config
	}

	pub fn is_initialized(&self) -> bool {
		self.initialized.load(Ordering::SeqCst)
	}

	pub fn recovery_state(&self) -> RecoveryState {
		self.recovery.state()
	}

	/// Runs deferred recovery once and starts routing real-time links.
	///
	/// The real-time subscription opens before recovery starts, so links the
	/// platform delivers meanwhile are buffered and routed after the recovered
	/// link. If the returned future is dropped before it completes, the service
	/// stays uninitialized and a later call starts over.
	/// Must be called from within a tokio runtime.
	pub async fn initialize(&self) -> InitializeStatus {
		if self.initialized.swap(true, Ordering::SeqCst) {
			self.reporter
				.logger()
				.debug("initialize() called again, ignoring");
			return InitializeStatus::AlreadyInitialized;
		}
		let mut guard = InitGuard {
			initialized: &self.initialized,
			committed: false,
		};

		let realtime = self.realtime.clone().map(|source| {
			let stream = source.subscribe();
			(source, stream)
		});

		if self.config.platform == Platform::Web {
			self.reporter
				.logger()
				.info("web platform, deferred recovery not applicable");
		} else if let Some(link) = self.recovery.run_once().await {
			self.gate.dispatch(&link);
		}

		if let Some((source, stream)) = realtime {
			if let Some(raw) = source.initial_link().await {
				route_realtime(&self.validator, &self.gate, &self.reporter, &raw);
			}
			self.spawn_subscription(stream);
		}

		guard.commit();
		self.reporter.logger().info("deep link service initialized");
		InitializeStatus::Initialized
	}

	fn spawn_subscription(&self, mut stream: LinkStream) {
		let cancel = CancellationToken::new();
		let token = cancel.clone();
		let validator = self.validator.clone();
		let gate = self.gate.clone();
		let reporter = self.reporter.clone();

		let handle = tokio::spawn(async move {
			loop {
				tokio::select! {
					biased;
					_ = token.cancelled() => break,
					item = stream.next() => match item {
						Some(Ok(raw)) => route_realtime(&validator, &gate, &reporter, &raw),
						Some(Err(e)) => reporter.report("real-time link stream error", e),
						None => {
							reporter.logger().debug("real-time link stream ended");
							break;
						}
					},
				}
			}
		});

		let previous = self
			.subscription
			.lock()
			.replace(Subscription { cancel, handle });
		if let Some(previous) = previous {
			previous.cancel.cancel();
		}
	}

	/// Cancels the real-time subscription and resets the initialized flag.
	///
	/// Safe to call repeatedly. Recovery is not re-run by a later `initialize()`.
	pub async fn dispose(&self) {
		let subscription = self.subscription.lock().take();
		if let Some(Subscription { cancel, handle }) = subscription {
			cancel.cancel();
			if let Err(e) = handle.await {
				self.reporter
					.logger()
					.error(&format!("real-time link task failed: {e}"));
			}
		}
		if self.initialized.swap(false, Ordering::SeqCst) {
			self.reporter.logger().debug("deep link service disposed");
		}
	}

	pub fn is_valid_deep_link(&self, link: &str) -> bool {
		self.validator.is_valid_deep_link(link)
	}

	pub fn extract_link_id(&self, link: &str) -> Option<String> {
		self.validator.extract_id(link)
	}

	pub fn extract_link_parameters(&self, link: &str) -> HashMap<String, String> {
		self.validator.extract_parameters(link)
	}

	fn ensure_initialized(&self) -> DeeplinkResult<()> {
		if self.is_initialized() {
			Ok(())
		} else {
			Err(DeeplinkError::NotInitialized)
		}
	}

	/// Stores a link for recovery on a later launch.
	pub async fn store_deferred_link(&self, link: &str) -> DeeplinkResult<()> {
		self.ensure_initialized()?;
		self.store.store(link).await;
		Ok(())
	}

	pub async fn get_stored_deferred_link(&self) -> DeeplinkResult<Option<String>> {
		self.ensure_initialized()?;
		Ok(self.store.read().await)
	}

	pub async fn clear_stored_deferred_link(&self) -> DeeplinkResult<()> {
		self.ensure_initialized()?;
		self.store.clear().await;
		Ok(())
	}

	pub async fn get_attribution_metadata(&self) -> DeeplinkResult<Option<LinkMetadata>> {
		self.ensure_initialized()?;
		Ok(self.store.metadata().await)
	}

	/// Removes the stored link if it has expired. Returns `true` if one was removed.
	pub async fn cleanup_expired_links(&self) -> DeeplinkResult<bool> {
		self.ensure_initialized()?;
		Ok(self.store.cleanup_expired().await)
	}

	/// Testing hook: the next process start counts as a fresh install.
	pub async fn reset_first_launch_flag(&self) -> DeeplinkResult<()> {
		self.ensure_initialized()?;
		self.first_launch.reset().await;
		Ok(())
	}

	/// Testing hook: backdates the stored link past the maximum age.
	pub async fn force_expire_stored_link(&self) -> DeeplinkResult<bool> {
		self.ensure_initialized()?;
		Ok(self.store.force_expire().await)
	}

	/// Testing hook: forgets the last dispatched link.
	pub fn clear_dedup_cache(&self) -> DeeplinkResult<()> {
		self.ensure_initialized()?;
		self.gate.clear();
		Ok(())
	}
}

impl Drop for DeeplinkService {
	fn drop(&mut self) {
		if let Some(subscription) = self.subscription.get_mut().take() {
			subscription.cancel.cancel();
		}
	}
}

fn route_realtime(
	validator: &LinkValidator,
	gate: &DispatchGate,
	reporter: &ErrorReporter,
	raw: &str,
) {
	match validator.validate(raw) {
		Some(link) => {
			if !gate.dispatch(&link) {
				reporter
					.logger()
					.debug(&format!("suppressed duplicate link {}", link.raw));
			}
		}
		None => reporter.report(
			"ignoring real-time link",
			DeeplinkError::InvalidLinkFormat(raw.to_string()),
		),
	}
}
