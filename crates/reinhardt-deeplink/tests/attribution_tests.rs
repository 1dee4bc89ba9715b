//! # Deferred Attribution Tests
//!
//! End-to-end recovery through [`DeeplinkService::initialize`] with mocked
//! native providers and in-memory storage.
//!
//! ## Test Coverage
//! - Fallback ordering (native provider before storage)
//! - Install referrer payload decoding
//! - Clipboard recovery on iOS
//! - Timeouts and provider failures
//! - First-launch window
//! - Expired stored links
//! - Storage failures

use std::sync::Arc;
use std::time::Duration;

use reinhardt_deeplink::{
	DeeplinkError, DeeplinkService, InitializeStatus, LinkSource, MemoryStore,
	Platform, RecoveryState, StorageKeys,
};
use rstest::*;
use serde_json::json;

mod fixtures;
use fixtures::*;

const STORED: &str = "testapp://content?id=1";
const REFERRER_PAYLOAD: &str = "utm_source=ads&utm_content=testapp%3A%2F%2Fcontent%3Fid%3D99";

const EIGHT_DAYS: Duration = Duration::from_secs(8 * 24 * 60 * 60);

// ============================================================================
// Android Install Referrer
// ============================================================================

#[rstest]
#[tokio::test]
async fn test_native_candidate_wins_over_stored_link(
	recorder: Recorder,
	memory_store: Arc<MemoryStore>,
	keys: StorageKeys,
) {
	seed_deferred_link(&memory_store, STORED, Duration::from_secs(60)).await;
	let service = DeeplinkService::builder(test_config(Platform::Android))
		.storage(memory_store.clone())
		.install_referrer(Arc::new(referrer_with(Some(REFERRER_PAYLOAD))))
		.callbacks(recorder.callbacks())
		.build();

	service.initialize().await;

	assert_eq!(recorder.links(), vec!["testapp://content?id=99"]);
	// storage is never consulted once the native step succeeds
	assert_eq!(memory_store.peek(&keys.deferred_link).as_deref(), Some(STORED));
	assert_eq!(memory_store.peek(&keys.first_launch_completed).as_deref(), Some("true"));

	let outcome = recorder.outcome();
	assert!(outcome.success);
	assert_eq!(outcome.source, Some(LinkSource::InstallReferrer));
	assert_eq!(outcome.metadata["link_id"], json!("99"));

	let map = outcome.to_map();
	assert_eq!(map["source"], "install_referrer");
	assert_eq!(map["platform"], "android");
}

#[rstest]
#[tokio::test]
async fn test_double_encoded_referrer_is_decoded(recorder: Recorder) {
	let service = DeeplinkService::builder(test_config(Platform::Android))
		.install_referrer(Arc::new(referrer_with(Some(
			"utm_content=testapp%253A%252F%252Fapp%253Fid%253D5",
		))))
		.callbacks(recorder.callbacks())
		.build();

	service.initialize().await;

	assert_eq!(recorder.links(), vec!["testapp://app?id=5"]);
}

#[rstest]
#[case::no_payload(None)]
#[case::no_utm_content(Some("utm_source=google-play&utm_medium=organic"))]
#[tokio::test]
async fn test_empty_referrer_falls_back_to_storage(
	recorder: Recorder,
	memory_store: Arc<MemoryStore>,
	keys: StorageKeys,
	#[case] payload: Option<&'static str>,
) {
	seed_deferred_link(&memory_store, STORED, Duration::from_secs(60)).await;
	let service = DeeplinkService::builder(test_config(Platform::Android))
		.storage(memory_store.clone())
		.install_referrer(Arc::new(referrer_with(payload)))
		.callbacks(recorder.callbacks())
		.build();

	service.initialize().await;

	assert_eq!(recorder.links(), vec![STORED]);
	assert_eq!(recorder.outcome().source, Some(LinkSource::Storage));
	// a recovered stored link is single use
	assert!(!memory_store.contains_key(&keys.deferred_link));
	assert!(recorder.errors().is_empty());
}

#[rstest]
#[tokio::test]
async fn test_invalid_referrer_candidate_is_skipped(
	recorder: Recorder,
	memory_store: Arc<MemoryStore>,
) {
	seed_deferred_link(&memory_store, STORED, Duration::from_secs(60)).await;
	let service = DeeplinkService::builder(test_config(Platform::Android))
		.storage(memory_store.clone())
		.install_referrer(Arc::new(referrer_with(Some(
			"utm_content=https%3A%2F%2Fevil.com%2Fapp%2Fx%3Fid%3D1",
		))))
		.callbacks(recorder.callbacks())
		.build();

	service.initialize().await;

	assert_eq!(recorder.links(), vec![STORED]);
	let outcome = recorder.outcome();
	assert_eq!(outcome.metadata["rejected_candidate"], json!("install_referrer"));
	assert!(recorder.errors().is_empty());
}

#[rstest]
#[tokio::test]
async fn test_referrer_failure_is_reported_and_chain_continues(
	recorder: Recorder,
	memory_store: Arc<MemoryStore>,
) {
	seed_deferred_link(&memory_store, STORED, Duration::from_secs(60)).await;
	let mut referrer = MockReferrerSource::new();
	referrer.expect_fetch_referrer().times(1).returning(|| {
		Err(DeeplinkError::NativeProviderUnavailable {
			provider: "install_referrer",
			message: "service disconnected".into(),
		})
	});
	let service = DeeplinkService::builder(test_config(Platform::Android))
		.storage(memory_store.clone())
		.install_referrer(Arc::new(referrer))
		.callbacks(recorder.callbacks())
		.build();

	service.initialize().await;

	assert_eq!(recorder.links(), vec![STORED]);
	let errors = recorder.errors();
	assert_eq!(errors.len(), 1);
	assert!(errors[0].contains("service disconnected"));
}

#[rstest]
#[tokio::test]
async fn test_referrer_timeout_acts_like_no_link(
	recorder: Recorder,
	memory_store: Arc<MemoryStore>,
) {
	seed_deferred_link(&memory_store, STORED, Duration::from_secs(60)).await;
	let config = config_builder(Platform::Android)
		.attribution_timeout(Duration::from_millis(50))
		.build()
		.unwrap();
	let service = DeeplinkService::builder(config)
		.storage(memory_store.clone())
		.install_referrer(Arc::new(HangingReferrer))
		.callbacks(recorder.callbacks())
		.build();

	service.initialize().await;

	assert_eq!(recorder.links(), vec![STORED]);
	let errors = recorder.errors();
	assert_eq!(errors.len(), 1);
	assert!(errors[0].contains("timed out"));
}

#[rstest]
#[tokio::test]
async fn test_disabled_android_recovery_uses_storage_only(
	recorder: Recorder,
	memory_store: Arc<MemoryStore>,
) {
	seed_deferred_link(&memory_store, STORED, Duration::from_secs(60)).await;
	let config = config_builder(Platform::Android)
		.enable_android_recovery(false)
		.build()
		.unwrap();
	let service = DeeplinkService::builder(config)
		.storage(memory_store.clone())
		.install_referrer(Arc::new(silent_referrer()))
		.callbacks(recorder.callbacks())
		.build();

	service.initialize().await;

	assert_eq!(recorder.links(), vec![STORED]);
}

// ============================================================================
// iOS Clipboard
// ============================================================================

#[rstest]
#[tokio::test]
async fn test_clipboard_link_is_recovered(recorder: Recorder) {
	let config = config_builder(Platform::Ios)
		.enable_ios_recovery(true)
		.build()
		.unwrap();
	let service = DeeplinkService::builder(config)
		.clipboard(Arc::new(clipboard_with(Some(
			"Look at this testapp://content?id=5 before it's gone",
		))))
		.callbacks(recorder.callbacks())
		.build();

	service.initialize().await;

	assert_eq!(recorder.links(), vec!["testapp://content?id=5"]);
	assert_eq!(recorder.outcome().source, Some(LinkSource::Clipboard));
}

#[rstest]
#[tokio::test]
async fn test_clipboard_link_after_domain_mention_is_recovered(recorder: Recorder) {
	let config = config_builder(Platform::Ios)
		.enable_ios_recovery(true)
		.build()
		.unwrap();
	let service = DeeplinkService::builder(config)
		.clipboard(Arc::new(clipboard_with(Some(
			"visit test.com: https://test.com/app/x?id=5",
		))))
		.callbacks(recorder.callbacks())
		.build();

	service.initialize().await;

	assert_eq!(recorder.links(), vec!["https://test.com/app/x?id=5"]);
	assert_eq!(recorder.outcome().source, Some(LinkSource::Clipboard));
}

#[rstest]
#[tokio::test]
async fn test_unrelated_clipboard_text_is_ignored(recorder: Recorder) {
	let config = config_builder(Platform::Ios)
		.enable_ios_recovery(true)
		.build()
		.unwrap();
	let service = DeeplinkService::builder(config)
		.clipboard(Arc::new(clipboard_with(Some("eggs, milk, bread"))))
		.callbacks(recorder.callbacks())
		.build();

	service.initialize().await;

	assert!(recorder.links().is_empty());
	let outcome = recorder.outcome();
	assert!(!outcome.success);
	assert_eq!(outcome.error.as_deref(), Some("no deferred link found"));
	assert_eq!(service.recovery_state(), RecoveryState::Resolved(None));
}

#[rstest]
#[tokio::test]
async fn test_clipboard_is_not_read_when_ios_recovery_disabled(recorder: Recorder) {
	let mut clipboard = MockClipboard::new();
	clipboard.expect_read_clipboard().never();
	let service = DeeplinkService::builder(test_config(Platform::Ios))
		.clipboard(Arc::new(clipboard))
		.callbacks(recorder.callbacks())
		.build();

	service.initialize().await;

	assert!(!recorder.outcome().success);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_clipboard_read_times_out(recorder: Recorder, memory_store: Arc<MemoryStore>) {
	seed_deferred_link(&memory_store, STORED, Duration::from_secs(60)).await;
	let config = config_builder(Platform::Ios)
		.enable_ios_recovery(true)
		.build()
		.unwrap();
	let service = DeeplinkService::builder(config)
		.storage(memory_store.clone())
		.clipboard(Arc::new(HangingClipboard))
		.callbacks(recorder.callbacks())
		.build();

	service.initialize().await;

	assert_eq!(recorder.links(), vec![STORED]);
	let errors = recorder.errors();
	assert_eq!(errors.len(), 1);
	assert!(errors[0].contains("clipboard"));
	assert!(errors[0].contains("3s"));
}

// ============================================================================
// First-Launch Window
// ============================================================================

#[rstest]
#[tokio::test]
async fn test_native_provider_not_queried_on_later_launch(memory_store: Arc<MemoryStore>) {
	let mut first_referrer = MockReferrerSource::new();
	first_referrer
		.expect_fetch_referrer()
		.times(1)
		.returning(|| Ok(Default::default()));
	let first = DeeplinkService::builder(test_config(Platform::Android))
		.storage(memory_store.clone())
		.install_referrer(Arc::new(first_referrer))
		.build();
	first.initialize().await;
	drop(first);

	let recorder = Recorder::default();
	let second = DeeplinkService::builder(test_config(Platform::Android))
		.storage(memory_store.clone())
		.install_referrer(Arc::new(silent_referrer()))
		.callbacks(recorder.callbacks())
		.build();
	second.initialize().await;

	let outcome = recorder.outcome();
	assert_eq!(outcome.metadata["first_launch_window"], json!(false));
}

#[rstest]
#[tokio::test]
async fn test_elapsed_window_closes_marker(
	recorder: Recorder,
	memory_store: Arc<MemoryStore>,
	keys: StorageKeys,
) {
	seed_install(&memory_store, EIGHT_DAYS).await;
	let service = DeeplinkService::builder(test_config(Platform::Android))
		.storage(memory_store.clone())
		.install_referrer(Arc::new(silent_referrer()))
		.callbacks(recorder.callbacks())
		.build();

	service.initialize().await;

	assert_eq!(memory_store.peek(&keys.first_launch_completed).as_deref(), Some("true"));
	assert!(recorder.links().is_empty());
}

#[rstest]
#[tokio::test]
async fn test_storage_only_attempt_completes_marker(
	recorder: Recorder,
	memory_store: Arc<MemoryStore>,
	keys: StorageKeys,
) {
	let service = DeeplinkService::builder(test_config(Platform::Other))
		.storage(memory_store.clone())
		.callbacks(recorder.callbacks())
		.build();

	service.initialize().await;

	assert!(!recorder.outcome().success);
	assert_eq!(memory_store.peek(&keys.first_launch_completed).as_deref(), Some("true"));
}

#[rstest]
#[tokio::test]
async fn test_stored_link_still_recovered_outside_window(
	recorder: Recorder,
	memory_store: Arc<MemoryStore>,
) {
	seed_install(&memory_store, EIGHT_DAYS).await;
	seed_deferred_link(&memory_store, STORED, Duration::from_secs(5)).await;
	let service = DeeplinkService::builder(test_config(Platform::Android))
		.storage(memory_store.clone())
		.install_referrer(Arc::new(silent_referrer()))
		.callbacks(recorder.callbacks())
		.build();

	service.initialize().await;

	assert_eq!(recorder.links(), vec![STORED]);
}

// ============================================================================
// Expiry and Storage Failures
// ============================================================================

#[rstest]
#[tokio::test]
async fn test_expired_stored_link_reports_expired_outcome(
	recorder: Recorder,
	memory_store: Arc<MemoryStore>,
	keys: StorageKeys,
) {
	seed_deferred_link(&memory_store, STORED, EIGHT_DAYS).await;
	let service = DeeplinkService::builder(test_config(Platform::Other))
		.storage(memory_store.clone())
		.callbacks(recorder.callbacks())
		.build();

	service.initialize().await;

	assert!(recorder.links().is_empty());
	assert!(!memory_store.contains_key(&keys.deferred_link));
	assert!(!memory_store.contains_key(&keys.deferred_link_timestamp));

	let outcome = recorder.outcome();
	assert!(outcome.is_expired());
	assert_eq!(outcome.metadata["expired"], json!(true));
	assert_eq!(outcome.metadata["expired_link"], json!(STORED));
}

#[rstest]
#[tokio::test]
async fn test_storage_failure_is_reported_not_raised(recorder: Recorder) {
	let service = DeeplinkService::builder(test_config(Platform::Other))
		.storage(Arc::new(broken_store()))
		.callbacks(recorder.callbacks())
		.build();

	assert_eq!(service.initialize().await, InitializeStatus::Initialized);

	assert!(recorder.links().is_empty());
	let errors = recorder.errors();
	assert!(!errors.is_empty());
	assert!(errors.iter().all(|e| e.contains("keychain locked")));
	assert!(!recorder.outcome().success);
}

#[rstest]
#[tokio::test]
async fn test_web_platform_skips_recovery(recorder: Recorder, memory_store: Arc<MemoryStore>) {
	seed_deferred_link(&memory_store, STORED, Duration::from_secs(60)).await;
	let service = DeeplinkService::builder(test_config(Platform::Web))
		.storage(memory_store.clone())
		.callbacks(recorder.callbacks())
		.build();

	service.initialize().await;

	assert!(recorder.links().is_empty());
	assert!(recorder.outcomes().is_empty());
	assert_eq!(service.recovery_state(), RecoveryState::NotAttempted);
}
