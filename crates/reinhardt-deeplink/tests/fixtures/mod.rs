//! Shared fixtures for deep link integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use mockall::mock;
use parking_lot::Mutex;
use reinhardt_deeplink::config::DEFAULT_STORAGE_KEY_PREFIX;
use reinhardt_deeplink::{
	AttributionOutcome, ClipboardContents, ClipboardSource, DeeplinkCallbacks, DeeplinkConfig,
	DeeplinkConfigBuilder, DeeplinkResult, InstallReferrerSource, KeyValueStore, LinkStream,
	MemoryStore, Platform, RealtimeLinkSource, ReferrerDetails, StorageError, StorageKeys,
};
use rstest::*;

// ============================================================================
// mockall-based collaborator mocks
// ============================================================================

mock! {
	/// Install referrer service with programmable answers.
	pub ReferrerSource {}

	#[async_trait::async_trait]
	impl InstallReferrerSource for ReferrerSource {
		async fn fetch_referrer(&self) -> DeeplinkResult<ReferrerDetails>;
	}
}

mock! {
	/// Clipboard with programmable contents.
	pub Clipboard {}

	#[async_trait::async_trait]
	impl ClipboardSource for Clipboard {
		async fn read_clipboard(&self) -> DeeplinkResult<ClipboardContents>;
	}
}

mock! {
	/// Key-value storage for failure injection.
	pub Store {}

	#[async_trait::async_trait]
	impl KeyValueStore for Store {
		async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
		async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
		async fn delete(&self, key: &str) -> Result<(), StorageError>;
	}
}

/// Referrer mock answering every call with `payload`.
pub fn referrer_with(payload: Option<&'static str>) -> MockReferrerSource {
	let mut mock = MockReferrerSource::new();
	mock.expect_fetch_referrer().returning(move || {
		Ok(ReferrerDetails {
			referrer_payload: payload.map(str::to_string),
		})
	});
	mock
}

/// Referrer mock that fails the test if it is ever queried.
pub fn silent_referrer() -> MockReferrerSource {
	let mut mock = MockReferrerSource::new();
	mock.expect_fetch_referrer().never();
	mock
}

/// Clipboard mock answering every call with `text`.
pub fn clipboard_with(text: Option<&'static str>) -> MockClipboard {
	let mut mock = MockClipboard::new();
	mock.expect_read_clipboard().returning(move || {
		Ok(ClipboardContents {
			clipboard_text: text.map(str::to_string),
		})
	});
	mock
}

/// Storage mock where every operation fails.
pub fn broken_store() -> MockStore {
	let mut mock = MockStore::new();
	mock.expect_get()
		.returning(|_| Err(StorageError::Backend("keychain locked".into())));
	mock.expect_set()
		.returning(|_, _| Err(StorageError::Backend("keychain locked".into())));
	mock.expect_delete()
		.returning(|_| Err(StorageError::Backend("keychain locked".into())));
	mock
}

// ============================================================================
// Hand-written collaborators
// ============================================================================

/// Referrer service that never answers within a test's timeout.
pub struct HangingReferrer;

#[async_trait]
impl InstallReferrerSource for HangingReferrer {
	async fn fetch_referrer(&self) -> DeeplinkResult<ReferrerDetails> {
		tokio::time::sleep(Duration::from_secs(30)).await;
		Ok(ReferrerDetails::default())
	}
}

/// Clipboard that never answers within the read limit.
pub struct HangingClipboard;

#[async_trait]
impl ClipboardSource for HangingClipboard {
	async fn read_clipboard(&self) -> DeeplinkResult<ClipboardContents> {
		tokio::time::sleep(Duration::from_secs(30)).await;
		Ok(ClipboardContents::default())
	}
}

/// Real-time source replaying a fixed sequence of stream items.
pub struct ScriptedStream {
	initial: Option<String>,
	items: Mutex<Option<Vec<DeeplinkResult<String>>>>,
}

impl ScriptedStream {
	pub fn new(items: Vec<DeeplinkResult<String>>) -> Self {
		Self {
			initial: None,
			items: Mutex::new(Some(items)),
		}
	}

	pub fn with_initial_link(mut self, link: &str) -> Self {
		self.initial = Some(link.to_string());
		self
	}
}

#[async_trait]
impl RealtimeLinkSource for ScriptedStream {
	async fn initial_link(&self) -> Option<String> {
		self.initial.clone()
	}

	fn subscribe(&self) -> LinkStream {
		let items = self.items.lock().take().unwrap_or_default();
		futures::stream::iter(items).boxed()
	}
}

// ============================================================================
// Callback recording
// ============================================================================

/// Collects everything the engine hands to host callbacks.
#[derive(Clone, Default)]
pub struct Recorder {
	links: Arc<Mutex<Vec<String>>>,
	errors: Arc<Mutex<Vec<String>>>,
	outcomes: Arc<Mutex<Vec<AttributionOutcome>>>,
}

impl Recorder {
	pub fn callbacks(&self) -> DeeplinkCallbacks {
		let links = self.links.clone();
		let errors = self.errors.clone();
		let outcomes = self.outcomes.clone();
		DeeplinkCallbacks::new()
			.on_deep_link(move |link| links.lock().push(link.raw.clone()))
			.on_error(move |error| errors.lock().push(error.to_string()))
			.on_attribution_data(move |outcome| outcomes.lock().push(outcome.clone()))
	}

	pub fn links(&self) -> Vec<String> {
		self.links.lock().clone()
	}

	pub fn errors(&self) -> Vec<String> {
		self.errors.lock().clone()
	}

	pub fn outcomes(&self) -> Vec<AttributionOutcome> {
		self.outcomes.lock().clone()
	}

	/// The single outcome of the run. Panics if there was not exactly one.
	pub fn outcome(&self) -> AttributionOutcome {
		let outcomes = self.outcomes.lock();
		assert_eq!(outcomes.len(), 1, "expected exactly one attribution outcome");
		outcomes[0].clone()
	}
}

#[fixture]
pub fn recorder() -> Recorder {
	Recorder::default()
}

// ============================================================================
// Configuration and storage
// ============================================================================

/// Builder for the `testapp` / `test.com` configuration used across the suite.
pub fn config_builder(platform: Platform) -> DeeplinkConfigBuilder {
	DeeplinkConfig::builder()
		.app_scheme("testapp")
		.domain("test.com")
		.paths(&["/app/", "/content/"])
		.platform(platform)
}

pub fn test_config(platform: Platform) -> DeeplinkConfig {
	config_builder(platform).build().unwrap()
}

pub fn default_keys() -> StorageKeys {
	StorageKeys::new(DEFAULT_STORAGE_KEY_PREFIX)
}

#[fixture]
pub fn keys() -> StorageKeys {
	default_keys()
}

#[fixture]
pub fn memory_store() -> Arc<MemoryStore> {
	Arc::new(MemoryStore::new())
}

/// Writes a pending deferred link stored `age` ago.
pub async fn seed_deferred_link(store: &MemoryStore, link: &str, age: Duration) {
	let keys = default_keys();
	let stored_at = Utc::now().timestamp_millis() - age.as_millis() as i64;
	store.set(&keys.deferred_link, link).await.unwrap();
	store
		.set(&keys.deferred_link_timestamp, &stored_at.to_string())
		.await
		.unwrap();
}

/// Writes an install timestamp `age` ago, as if the app had been opened before.
pub async fn seed_install(store: &MemoryStore, age: Duration) {
	let keys = default_keys();
	let installed_at = Utc::now().timestamp_millis() - age.as_millis() as i64;
	store
		.set(&keys.install_timestamp, &installed_at.to_string())
		.await
		.unwrap();
}

/// Gives the real-time task time to drain its stream.
pub async fn settle() {
	tokio::time::sleep(Duration::from_millis(50)).await;
}
