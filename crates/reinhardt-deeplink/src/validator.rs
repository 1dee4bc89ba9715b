//! Deep link validation and parsing.
//!
//! Validation runs in three tiers: a structured parse for the custom scheme,
//! a structured parse for web links, and a regex fallback for loosely encoded
//! strings such as install referrer payloads. Nothing in this module panics or
//! returns an error; a string is either a link for this app or it is not.

use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::DeeplinkConfig;

static ID_PARAMETER: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"[?&]id=([^&#\s]+)").expect("id parameter pattern is valid")
});

/// A link that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedLink {
	/// The link as received, trimmed.
	pub raw: String,
	/// Value of the `id` query parameter.
	pub id: Option<String>,
	/// All query parameters.
	pub parameters: HashMap<String, String>,
}

/// Decides whether a candidate string is a deep link for this app.
#[derive(Debug, Clone)]
pub struct LinkValidator {
	app_scheme: String,
	valid_domains: BTreeSet<String>,
	valid_paths: Vec<String>,
	// valid_paths with slashes stripped; an empty key matches any host
	route_keys: Vec<String>,
	fallback_patterns: Vec<Regex>,
}

impl LinkValidator {
	/// Creates a validator for `config`, compiling the fallback patterns once.
	pub fn new(config: &DeeplinkConfig) -> Self {
		let route_keys = config
			.valid_paths
			.iter()
			.map(|p| p.trim_matches('/').to_ascii_lowercase())
			.collect();

		let mut patterns = vec![format!(
			r"^{}://[^\s?#]+\?(?:[^\s#]*&)?id=[^&#\s]+",
			regex::escape(&config.app_scheme)
		)];
		for domain in &config.valid_domains {
			for path in &config.valid_paths {
				patterns.push(format!(
					r"(?i)^https?://{}{}.*id=[^&#\s]+",
					regex::escape(domain),
					regex::escape(path)
				));
			}
		}
		let fallback_patterns = patterns
			.iter()
			.filter_map(|p| Regex::new(p).ok())
			.collect();

		Self {
			app_scheme: config.app_scheme.clone(),
			valid_domains: config.valid_domains.clone(),
			valid_paths: config.valid_paths.clone(),
			route_keys,
			fallback_patterns,
		}
	}

	/// Returns `true` if `raw` is a well-formed, in-scope deep link.
	pub fn is_valid_deep_link(&self, raw: &str) -> bool {
		let raw = raw.trim();
		if raw.is_empty() {
			return false;
		}

		match Url::parse(raw) {
			Ok(url) if url.scheme() == self.app_scheme => self.is_valid_custom_scheme(&url),
			Ok(url) if matches!(url.scheme(), "http" | "https") => self.is_valid_web_link(&url),
			_ => self.matches_fallback(raw),
		}
	}

	/// Validates `raw` and extracts its identifier and parameters.
	pub fn validate(&self, raw: &str) -> Option<ValidatedLink> {
		if !self.is_valid_deep_link(raw) {
			return None;
		}
		let raw = raw.trim();
		Some(ValidatedLink {
			raw: raw.to_string(),
			id: self.extract_id(raw),
			parameters: self.extract_parameters(raw),
		})
	}

	/// Returns the `id` query parameter, if present and non-empty.
	pub fn extract_id(&self, raw: &str) -> Option<String> {
		let raw = raw.trim();
		match Url::parse(raw) {
			Ok(url) => query_id(&url),
			Err(_) => ID_PARAMETER
				.captures(raw)
				.and_then(|c| c.get(1))
				.map(|m| m.as_str().to_string()),
		}
	}

	/// Returns every query parameter, or an empty map when `raw` does not parse.
	pub fn extract_parameters(&self, raw: &str) -> HashMap<String, String> {
		match Url::parse(raw.trim()) {
			Ok(url) => url.query_pairs().into_owned().collect(),
			Err(_) => HashMap::new(),
		}
	}

	/// Returns `true` if free text mentions one of this app's domains or its scheme.
	///
	/// Used to pre-screen clipboard contents before full validation.
	pub fn mentions_app(&self, text: &str) -> bool {
		let lowered = text.to_ascii_lowercase();
		lowered.contains(&format!("{}://", self.app_scheme))
			|| self.valid_domains.iter().any(|d| lowered.contains(d.as_str()))
	}

	fn is_valid_custom_scheme(&self, url: &Url) -> bool {
		if query_id(url).is_none() {
			return false;
		}
		let host = url.host_str().unwrap_or_default();
		if host.is_empty() || self.route_keys.is_empty() {
			return true;
		}
		self.route_keys
			.iter()
			.any(|key| key.is_empty() || key.eq_ignore_ascii_case(host))
	}

	fn is_valid_web_link(&self, url: &Url) -> bool {
		let Some(host) = url.host_str() else {
			return false;
		};
		if !self.valid_domains.contains(&host.to_ascii_lowercase()) {
			return false;
		}
		let path = url.path();
		if !self.valid_paths.iter().any(|p| path.contains(p.as_str())) {
			return false;
		}
		query_id(url).is_some()
	}

	fn matches_fallback(&self, raw: &str) -> bool {
		self.fallback_patterns.iter().any(|re| re.is_match(raw))
	}
}

fn query_id(url: &Url) -> Option<String> {
	url.query_pairs()
		.find(|(key, _)| key == "id")
		.map(|(_, value)| value.into_owned())
		.filter(|value| !value.is_empty())
}
