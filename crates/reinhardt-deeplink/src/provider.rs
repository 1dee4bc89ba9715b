//! Platform attribution providers.
//!
//! Each platform recovers deferred links differently. Android reads the
//! install referrer, iOS may read the clipboard, and everything else relies
//! on the stored link alone. [`AttributionProvider`] hides that choice from
//! the recovery strategy; [`select_provider`] picks the variant once at startup.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::config::{DeeplinkConfig, Platform};
use crate::error::{DeeplinkError, DeeplinkResult};
use crate::validator::LinkValidator;

/// Where a candidate link came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
	InstallReferrer,
	Clipboard,
	Storage,
	Realtime,
}

impl LinkSource {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::InstallReferrer => "install_referrer",
			Self::Clipboard => "clipboard",
			Self::Storage => "storage",
			Self::Realtime => "realtime",
		}
	}
}

impl fmt::Display for LinkSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// An unvalidated link produced by one recovery step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateLink {
	pub raw: String,
	pub source: LinkSource,
}

impl CandidateLink {
	pub fn new(raw: impl Into<String>, source: LinkSource) -> Self {
		Self {
			raw: raw.into(),
			source,
		}
	}
}

/// Answer of an install referrer service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferrerDetails {
	pub referrer_payload: Option<String>,
}

/// Answer of a clipboard read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardContents {
	pub clipboard_text: Option<String>,
}

/// Native install referrer service (Android-style).
#[async_trait]
pub trait InstallReferrerSource: Send + Sync {
	async fn fetch_referrer(&self) -> DeeplinkResult<ReferrerDetails>;
}

/// Native clipboard access (iOS-style).
#[async_trait]
pub trait ClipboardSource: Send + Sync {
	async fn read_clipboard(&self) -> DeeplinkResult<ClipboardContents>;
}

/// One native recovery step of the fallback chain.
#[async_trait]
pub trait AttributionProvider: Send + Sync {
	/// Provider name used in logs and outcomes.
	fn name(&self) -> &'static str;

	/// Returns `false` for providers that never query the platform.
	fn is_native(&self) -> bool {
		true
	}

	/// Queries the platform once, bounded by the provider's timeout.
	///
	/// A timeout is returned as [`DeeplinkError::NativeProviderTimeout`]; the
	/// caller treats it exactly like an empty answer.
	async fn fetch_candidate(&self) -> DeeplinkResult<Option<CandidateLink>>;
}

/// Android provider reading `utm_content` from the install referrer.
pub struct InstallReferrerProvider {
	source: Arc<dyn InstallReferrerSource>,
	timeout: Duration,
}

impl InstallReferrerProvider {
	pub fn new(source: Arc<dyn InstallReferrerSource>, timeout: Duration) -> Self {
		Self { source, timeout }
	}
}

#[async_trait]
impl AttributionProvider for InstallReferrerProvider {
	fn name(&self) -> &'static str {
		LinkSource::InstallReferrer.as_str()
	}

	async fn fetch_candidate(&self) -> DeeplinkResult<Option<CandidateLink>> {
		let details = tokio::time::timeout(self.timeout, self.source.fetch_referrer())
			.await
			.map_err(|_| DeeplinkError::NativeProviderTimeout {
				provider: self.name(),
				timeout: self.timeout,
			})??;

		Ok(details
			.referrer_payload
			.as_deref()
			.and_then(parse_referrer_payload)
			.map(|link| CandidateLink::new(link, LinkSource::InstallReferrer)))
	}
}

/// Extracts the URL-decoded `utm_content` parameter from a referrer payload.
///
/// Store referrers are sometimes encoded twice; a value that still looks
/// percent-encoded after the first pass is decoded once more.
pub fn parse_referrer_payload(payload: &str) -> Option<String> {
	let payload = payload.trim().trim_start_matches('?');
	let content = form_urlencoded::parse(payload.as_bytes())
		.find(|(key, _)| key == "utm_content")
		.map(|(_, value)| value.into_owned())?;

	let content = if !content.contains("://") && content.contains("%3A") {
		form_urlencoded::parse(format!("v={content}").as_bytes())
			.next()
			.map(|(_, value)| value.into_owned())
			.unwrap_or(content)
	} else {
		content
	};

	let content = content.trim();
	(!content.is_empty()).then(|| content.to_string())
}

/// iOS provider reading the clipboard.
pub struct ClipboardProvider {
	source: Arc<dyn ClipboardSource>,
	timeout: Duration,
	validator: Arc<LinkValidator>,
}

impl ClipboardProvider {
	pub fn new(
		source: Arc<dyn ClipboardSource>,
		timeout: Duration,
		validator: Arc<LinkValidator>,
	) -> Self {
		Self {
			source,
			timeout,
			validator,
		}
	}
}

#[async_trait]
impl AttributionProvider for ClipboardProvider {
	fn name(&self) -> &'static str {
		LinkSource::Clipboard.as_str()
	}

	async fn fetch_candidate(&self) -> DeeplinkResult<Option<CandidateLink>> {
		let contents = tokio::time::timeout(self.timeout, self.source.read_clipboard())
			.await
			.map_err(|_| DeeplinkError::NativeProviderTimeout {
				provider: self.name(),
				timeout: self.timeout,
			})??;

		let Some(text) = contents.clipboard_text else {
			return Ok(None);
		};
		if !self.validator.mentions_app(&text) {
			return Ok(None);
		}
		// shared links often arrive wrapped in a sentence
		let raw = text
			.split_whitespace()
			.find(|token| self.validator.is_valid_deep_link(token))
			.unwrap_or(text.trim());
		Ok(Some(CandidateLink::new(raw, LinkSource::Clipboard)))
	}
}

/// Provider for platforms without native recovery.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageOnlyProvider;

#[async_trait]
impl AttributionProvider for StorageOnlyProvider {
	fn name(&self) -> &'static str {
		"storage_only"
	}

	fn is_native(&self) -> bool {
		false
	}

	async fn fetch_candidate(&self) -> DeeplinkResult<Option<CandidateLink>> {
		Ok(None)
	}
}

/// Selects the provider for the configured platform.
///
/// Falls back to [`StorageOnlyProvider`] when the platform's recovery is
/// disabled or the host did not supply the native collaborator.
pub fn select_provider(
	config: &DeeplinkConfig,
	validator: Arc<LinkValidator>,
	referrer: Option<Arc<dyn InstallReferrerSource>>,
	clipboard: Option<Arc<dyn ClipboardSource>>,
) -> Arc<dyn AttributionProvider> {
	match (config.platform, referrer, clipboard) {
		(Platform::Android, Some(source), _) if config.enable_android_recovery => Arc::new(
			InstallReferrerProvider::new(source, config.attribution_timeout),
		),
		(Platform::Ios, _, Some(source)) if config.enable_ios_recovery => Arc::new(
			ClipboardProvider::new(source, config.clipboard_timeout, validator),
		),
		_ => Arc::new(StorageOnlyProvider),
	}
}
