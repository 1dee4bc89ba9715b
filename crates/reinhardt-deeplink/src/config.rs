//! Deep link configuration.
//!
//! [`DeeplinkConfig`] is built once at startup and shared read-only by every
//! component. It can be assembled in code through [`DeeplinkConfigBuilder`]
//! or loaded from a TOML document through [`DeeplinkSettings`].

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DeeplinkError, DeeplinkResult};

/// Default maximum age of a stored deferred link (7 days).
pub const DEFAULT_MAX_LINK_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default timeout for a single native provider query.
pub const DEFAULT_ATTRIBUTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Hard timeout applied to clipboard reads, independent of the attribution timeout.
pub const CLIPBOARD_TIMEOUT: Duration = Duration::from_secs(3);

/// Default duplicate-suppression window of the dispatch gate.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(3);

/// Default prefix for every persisted key.
pub const DEFAULT_STORAGE_KEY_PREFIX: &str = "reinhardt_deeplink_";

/// Platform the attribution strategy is selected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
	/// Android, recovers through the install referrer.
	Android,
	/// iOS, recovers through the clipboard when opted in.
	Ios,
	/// Browser builds, real-time links only.
	Web,
	/// Desktop and anything else, storage fallback only.
	Other,
}

impl Platform {
	/// Returns the platform this binary was compiled for.
	pub fn current() -> Self {
		if cfg!(target_os = "android") {
			Self::Android
		} else if cfg!(target_os = "ios") {
			Self::Ios
		} else if cfg!(target_arch = "wasm32") {
			Self::Web
		} else {
			Self::Other
		}
	}

	/// Lowercase platform name used in attribution outcomes.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Android => "android",
			Self::Ios => "ios",
			Self::Web => "web",
			Self::Other => "other",
		}
	}
}

impl fmt::Display for Platform {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Immutable deep link configuration.
#[derive(Debug, Clone)]
pub struct DeeplinkConfig {
	/// Custom URI scheme identifying this app, lowercase (e.g. `myapp`).
	pub app_scheme: String,

	/// Hostnames accepted for web links, lowercase.
	pub valid_domains: BTreeSet<String>,

	/// Path allow-list. A web link matches when its path contains any entry.
	pub valid_paths: Vec<String>,

	/// Oldest a stored deferred link may be before it is discarded.
	pub max_link_age: Duration,

	/// Timeout for each native provider query.
	pub attribution_timeout: Duration,

	/// Timeout for clipboard reads.
	pub clipboard_timeout: Duration,

	/// Whether Android install referrer recovery runs.
	pub enable_android_recovery: bool,

	/// Whether iOS clipboard recovery runs. Off by default for privacy.
	pub enable_ios_recovery: bool,

	/// Prefix applied to every persisted key.
	pub storage_key_prefix: String,

	/// How long a dispatched link suppresses identical dispatches.
	pub dedup_window: Duration,

	/// Platform used to select the attribution provider.
	pub platform: Platform,
}

impl DeeplinkConfig {
	/// Creates a new builder.
	pub fn builder() -> DeeplinkConfigBuilder {
		DeeplinkConfigBuilder::default()
	}

	/// Returns `true` if `host` is one of the accepted web domains.
	pub fn is_valid_domain(&self, host: &str) -> bool {
		self.valid_domains.contains(&host.to_ascii_lowercase())
	}
}

/// Builder for [`DeeplinkConfig`].
#[derive(Debug, Clone, Default)]
pub struct DeeplinkConfigBuilder {
	app_scheme: Option<String>,
	valid_domains: Vec<String>,
	valid_paths: Option<Vec<String>>,
	max_link_age: Option<Duration>,
	attribution_timeout: Option<Duration>,
	enable_android_recovery: Option<bool>,
	enable_ios_recovery: Option<bool>,
	storage_key_prefix: Option<String>,
	dedup_window: Option<Duration>,
	platform: Option<Platform>,
}

impl DeeplinkConfigBuilder {
	/// Sets the custom URI scheme.
	pub fn app_scheme(mut self, scheme: impl Into<String>) -> Self {
		self.app_scheme = Some(scheme.into());
		self
	}

	/// Adds an accepted web domain.
	pub fn domain(mut self, domain: impl Into<String>) -> Self {
		self.valid_domains.push(domain.into());
		self
	}

	/// Adds several accepted web domains.
	pub fn domains(mut self, domains: &[&str]) -> Self {
		self.valid_domains
			.extend(domains.iter().map(|d| d.to_string()));
		self
	}

	/// Replaces the path allow-list. Defaults to `["/"]` when never called.
	pub fn paths(mut self, paths: &[&str]) -> Self {
		self.valid_paths = Some(paths.iter().map(|p| p.to_string()).collect());
		self
	}

	/// Sets the maximum age of a stored deferred link.
	pub fn max_link_age(mut self, age: Duration) -> Self {
		self.max_link_age = Some(age);
		self
	}

	/// Sets the per-call native provider timeout.
	pub fn attribution_timeout(mut self, timeout: Duration) -> Self {
		self.attribution_timeout = Some(timeout);
		self
	}

	/// Enables or disables Android install referrer recovery.
	pub fn enable_android_recovery(mut self, enabled: bool) -> Self {
		self.enable_android_recovery = Some(enabled);
		self
	}

	/// Enables or disables iOS clipboard recovery.
	pub fn enable_ios_recovery(mut self, enabled: bool) -> Self {
		self.enable_ios_recovery = Some(enabled);
		self
	}

	/// Sets the prefix for persisted keys.
	pub fn storage_key_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.storage_key_prefix = Some(prefix.into());
		self
	}

	/// Sets the duplicate-suppression window.
	pub fn dedup_window(mut self, window: Duration) -> Self {
		self.dedup_window = Some(window);
		self
	}

	/// Overrides the detected platform.
	pub fn platform(mut self, platform: Platform) -> Self {
		self.platform = Some(platform);
		self
	}

	/// Builds the configuration, checking its invariants.
	///
	/// # Errors
	///
	/// Returns [`DeeplinkError::InvalidConfig`] when the scheme is missing or
	/// malformed, no domain was given, the path list is empty, or a duration is zero.
	pub fn build(self) -> DeeplinkResult<DeeplinkConfig> {
		let app_scheme = self
			.app_scheme
			.map(|s| s.trim().trim_end_matches("://").to_ascii_lowercase())
			.filter(|s| !s.is_empty())
			.ok_or_else(|| DeeplinkError::InvalidConfig("app scheme is required".into()))?;
		if !is_scheme_token(&app_scheme) {
			return Err(DeeplinkError::InvalidConfig(format!(
				"app scheme {app_scheme:?} is not a valid URI scheme"
			)));
		}

		let valid_domains: BTreeSet<String> = self
			.valid_domains
			.iter()
			.map(|d| d.trim().to_ascii_lowercase())
			.filter(|d| !d.is_empty())
			.collect();
		if valid_domains.is_empty() {
			return Err(DeeplinkError::InvalidConfig(
				"at least one valid domain is required".into(),
			));
		}

		let valid_paths = self.valid_paths.unwrap_or_else(|| vec!["/".to_string()]);
		if valid_paths.is_empty() {
			return Err(DeeplinkError::InvalidConfig(
				"valid paths must not be empty".into(),
			));
		}

		let max_link_age = self.max_link_age.unwrap_or(DEFAULT_MAX_LINK_AGE);
		if max_link_age.is_zero() {
			return Err(DeeplinkError::InvalidConfig(
				"max link age must be greater than zero".into(),
			));
		}

		let attribution_timeout = self
			.attribution_timeout
			.unwrap_or(DEFAULT_ATTRIBUTION_TIMEOUT);
		if attribution_timeout.is_zero() {
			return Err(DeeplinkError::InvalidConfig(
				"attribution timeout must be greater than zero".into(),
			));
		}

		Ok(DeeplinkConfig {
			app_scheme,
			valid_domains,
			valid_paths,
			max_link_age,
			attribution_timeout,
			clipboard_timeout: CLIPBOARD_TIMEOUT,
			enable_android_recovery: self.enable_android_recovery.unwrap_or(true),
			enable_ios_recovery: self.enable_ios_recovery.unwrap_or(false),
			storage_key_prefix: self
				.storage_key_prefix
				.unwrap_or_else(|| DEFAULT_STORAGE_KEY_PREFIX.to_string()),
			dedup_window: self.dedup_window.unwrap_or(DEFAULT_DEDUP_WINDOW),
			platform: self.platform.unwrap_or_else(Platform::current),
		})
	}
}

// RFC 3986: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
fn is_scheme_token(scheme: &str) -> bool {
	let mut chars = scheme.chars();
	matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
		&& chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Deep link settings as they appear in a TOML settings file.
///
/// ```toml
/// app_scheme = "myapp"
/// valid_domains = ["example.com"]
/// valid_paths = ["/app/"]
/// max_link_age_secs = 604800
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeeplinkSettings {
	pub app_scheme: String,
	pub valid_domains: Vec<String>,
	#[serde(default)]
	pub valid_paths: Option<Vec<String>>,
	#[serde(default)]
	pub enable_android_recovery: Option<bool>,
	#[serde(default)]
	pub enable_ios_recovery: Option<bool>,
	#[serde(default)]
	pub max_link_age_secs: Option<u64>,
	#[serde(default)]
	pub attribution_timeout_secs: Option<u64>,
	#[serde(default)]
	pub dedup_window_millis: Option<u64>,
	#[serde(default)]
	pub storage_key_prefix: Option<String>,
	#[serde(default)]
	pub platform: Option<Platform>,
}

impl DeeplinkSettings {
	/// Parses settings from a TOML document.
	pub fn from_toml_str(source: &str) -> DeeplinkResult<Self> {
		Ok(toml::from_str(source)?)
	}

	/// Converts the settings into a builder so callers can still override fields.
	pub fn into_builder(self) -> DeeplinkConfigBuilder {
		let mut builder = DeeplinkConfig::builder().app_scheme(self.app_scheme);
		for domain in self.valid_domains {
			builder = builder.domain(domain);
		}
		if let Some(paths) = self.valid_paths {
			builder.valid_paths = Some(paths);
		}
		builder.enable_android_recovery = self.enable_android_recovery;
		builder.enable_ios_recovery = self.enable_ios_recovery;
		builder.max_link_age = self.max_link_age_secs.map(Duration::from_secs);
		builder.attribution_timeout = self.attribution_timeout_secs.map(Duration::from_secs);
		builder.dedup_window = self.dedup_window_millis.map(Duration::from_millis);
		builder.storage_key_prefix = self.storage_key_prefix;
		builder.platform = self.platform;
		builder
	}

	/// Builds a validated configuration.
	pub fn build(self) -> DeeplinkResult<DeeplinkConfig> {
		self.into_builder().build()
	}
}
