//! Duplicate suppression in front of the host callback.
//!
//! The OS sometimes delivers the same URI through two code paths within a
//! few milliseconds, and a recovered deferred link may also arrive as a
//! real-time link. [`DispatchGate`] remembers the last dispatched link for a
//! configurable window and drops structurally identical links inside it.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use url::Url;

use crate::callbacks::DeeplinkCallbacks;
use crate::validator::ValidatedLink;

#[derive(Debug, Clone)]
struct RecentDispatch {
	key: String,
	expires_at: Instant,
}

/// Single-slot dedup cache with an explicit expiry instant.
#[derive(Debug)]
pub struct DispatchGate {
	window: Duration,
	recent: Mutex<Option<RecentDispatch>>,
	callbacks: DeeplinkCallbacks,
}

impl DispatchGate {
	pub fn new(window: Duration, callbacks: DeeplinkCallbacks) -> Self {
		Self {
			window,
			recent: Mutex::new(None),
			callbacks,
		}
	}

	pub fn window(&self) -> Duration {
		self.window
	}

	/// Forwards `link` to `on_deep_link` unless it duplicates the last dispatch.
	///
	/// Returns `true` if the callback ran.
	pub fn dispatch(&self, link: &ValidatedLink) -> bool {
		let key = dedup_key(&link.raw);
		let now = Instant::now();
		{
			let mut recent = self.recent.lock();
			let duplicate = recent
				.as_ref()
				.is_some_and(|last| last.key == key && now < last.expires_at);
			if duplicate {
				return false;
			}
			*recent = Some(RecentDispatch {
				key,
				expires_at: now + self.window,
			});
		}
		self.callbacks.deep_link(link);
		true
	}

	/// Forgets the remembered link.
	pub fn clear(&self) {
		*self.recent.lock() = None;
	}
}

/// Structural identifier: scheme, host, path and query pairs sorted by key.
///
/// Two URLs that differ only in parameter order share a key. Strings that do
/// not parse are keyed by their trimmed text.
pub fn dedup_key(raw: &str) -> String {
	let raw = raw.trim();
	let Ok(url) = Url::parse(raw) else {
		return raw.to_string();
	};
	let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
	pairs.sort();
	let query = pairs
		.iter()
		.map(|(k, v)| format!("{k}={v}"))
		.collect::<Vec<_>>()
		.join("&");
	format!(
		"{}://{}{}?{}",
		url.scheme(),
		url.host_str().unwrap_or_default().to_ascii_lowercase(),
		url.path(),
		query
	)
}
