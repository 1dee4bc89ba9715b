//! First-launch window tracking.
//!
//! Native providers (install referrer, clipboard) are only queried inside the
//! post-install window: the marker is not completed and the install happened
//! at most `window` ago. Once any recovery attempt has finished (storage-only
//! platforms included), or the window has passed, the marker is completed
//! and stays that way until [`FirstLaunchTracker::reset`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::callbacks::ErrorReporter;
use crate::error::{DeeplinkError, DeeplinkResult};
use crate::storage::{KeyValueStore, StorageKeys};

/// Persisted first-launch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FirstLaunchMarker {
	pub completed: bool,
	pub install_timestamp: Option<i64>,
}

impl FirstLaunchMarker {
	/// Returns `true` if native recovery may still run at `now_millis`.
	pub fn is_within_window(&self, now_millis: i64, window: Duration) -> bool {
		if self.completed {
			return false;
		}
		let Some(installed_at) = self.install_timestamp else {
			return false;
		};
		let elapsed = now_millis.saturating_sub(installed_at).max(0) as u128;
		elapsed <= window.as_millis()
	}
}

#[derive(Clone)]
pub struct FirstLaunchTracker {
	storage: Arc<dyn KeyValueStore>,
	keys: StorageKeys,
	window: Duration,
	reporter: ErrorReporter,
}

impl FirstLaunchTracker {
	pub(crate) fn new(
		storage: Arc<dyn KeyValueStore>,
		keys: StorageKeys,
		window: Duration,
		reporter: ErrorReporter,
	) -> Self {
		Self {
			storage,
			keys,
			window,
			reporter,
		}
	}

	/// Records the install time on the first process start ever.
	pub async fn record_launch(&self) -> Option<FirstLaunchMarker> {
		let mut marker = self.load_or_report().await?;
		if marker.install_timestamp.is_none() {
			let now = Utc::now().timestamp_millis();
			if let Err(e) = self
				.storage
				.set(&self.keys.install_timestamp, &now.to_string())
				.await
			{
				self.reporter
					.report("failed to record install time", e.into());
				return None;
			}
			self.reporter.logger().info("first launch after install recorded");
			marker.install_timestamp = Some(now);
		}
		Some(marker)
	}

	/// Returns `true` if native-provider recovery may run now.
	///
	/// Closes the window as a side effect when it has elapsed. Storage
	/// failures count as not eligible.
	pub async fn is_eligible(&self) -> bool {
		let Some(marker) = self.load_or_report().await else {
			return false;
		};
		if marker.completed {
			return false;
		}
		if marker.is_within_window(Utc::now().timestamp_millis(), self.window) {
			return true;
		}
		self.reporter
			.logger()
			.debug("first-launch window elapsed, skipping native recovery");
		self.mark_completed().await;
		false
	}

	/// Flips the marker to completed.
	pub async fn mark_completed(&self) {
		if let Err(e) = self
			.storage
			.set(&self.keys.first_launch_completed, "true")
			.await
		{
			self.reporter
				.report("failed to complete first-launch marker", e.into());
		}
	}

	/// Deletes the marker so the next launch counts as a fresh install.
	pub async fn reset(&self) {
		for key in [&self.keys.first_launch_completed, &self.keys.install_timestamp] {
			if let Err(e) = self.storage.delete(key).await {
				self.reporter
					.report("failed to reset first-launch marker", e.into());
			}
		}
	}

	/// Reads the marker.
	pub async fn marker(&self) -> DeeplinkResult<FirstLaunchMarker> {
		let completed = self
			.storage
			.get(&self.keys.first_launch_completed)
			.await?
			.is_some_and(|v| v == "true");
		let install_timestamp = match self.storage.get(&self.keys.install_timestamp).await? {
			Some(raw) => Some(raw.trim().parse::<i64>().map_err(|_| {
				DeeplinkError::StorageCorrupt {
					key: self.keys.install_timestamp.clone(),
					value: raw.clone(),
				}
			})?),
			None => None,
		};
		Ok(FirstLaunchMarker {
			completed,
			install_timestamp,
		})
	}

	async fn load_or_report(&self) -> Option<FirstLaunchMarker> {
		match self.marker().await {
			Ok(marker) => Some(marker),
			Err(e @ DeeplinkError::StorageCorrupt { .. }) => {
				// an unreadable install time must not reopen the window
				self.reporter.report("corrupt first-launch marker", e);
				self.mark_completed().await;
				Some(FirstLaunchMarker {
					completed: true,
					install_timestamp: None,
				})
			}
			Err(e) => {
				self.reporter.report("failed to read first-launch marker", e);
				None
			}
		}
	}
}
