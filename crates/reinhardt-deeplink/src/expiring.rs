//! Single-slot store for the pending deferred link.
//!
//! Holds at most one link plus the time it was stored. Expiry is lazy: an
//! old record is deleted the next time someone reads it, there is no sweeper.
//! Storage failures never escape; they are reported and the read yields nothing.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::callbacks::ErrorReporter;
use crate::error::{DeeplinkError, DeeplinkResult};
use crate::storage::{KeyValueStore, StorageKeys};

/// The persisted pending link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeferredLinkRecord {
	pub link: String,
	pub stored_at_epoch_millis: i64,
}

impl PendingDeferredLinkRecord {
	/// Age of the record at `now_millis`. Timestamps in the future count as age zero.
	pub fn age_at(&self, now_millis: i64) -> Duration {
		let elapsed = now_millis.saturating_sub(self.stored_at_epoch_millis).max(0);
		Duration::from_millis(elapsed as u64)
	}
}

/// Result of reading the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredLinkRead {
	/// Nothing stored.
	Absent,
	/// A link within the maximum age.
	Fresh(String),
	/// A link past the maximum age. It has been deleted.
	Expired { link: String, age: Duration },
}

/// Diagnostic view of the stored link.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkMetadata {
	pub link: String,
	pub stored_at: DateTime<Utc>,
	pub age_hours: f64,
	pub is_expired: bool,
	/// Time left before expiry, `None` once expired.
	pub expires_in: Option<Duration>,
}

fn now_millis() -> i64 {
	Utc::now().timestamp_millis()
}

/// Wraps the key-value collaborator with the max-age policy.
#[derive(Clone)]
pub struct ExpiringLinkStore {
	storage: Arc<dyn KeyValueStore>,
	keys: StorageKeys,
	max_age: Duration,
	reporter: ErrorReporter,
}

impl ExpiringLinkStore {
	pub(crate) fn new(
		storage: Arc<dyn KeyValueStore>,
		keys: StorageKeys,
		max_age: Duration,
		reporter: ErrorReporter,
	) -> Self {
		Self {
			storage,
			keys,
			max_age,
			reporter,
		}
	}

	/// Maximum age applied on read.
	pub fn max_age(&self) -> Duration {
		self.max_age
	}

	/// Stores `link`, overwriting any pending link.
	pub async fn store(&self, link: &str) {
		if let Err(e) = self.write_record(link, now_millis()).await {
			self.reporter.report("failed to store deferred link", e);
			return;
		}
		self.reporter.logger().debug(&format!("stored deferred link {link}"));
	}

	/// Returns the pending link, or `None` if absent or expired.
	pub async fn read(&self) -> Option<String> {
		match self.read_detailed().await {
			StoredLinkRead::Fresh(link) => Some(link),
			StoredLinkRead::Absent | StoredLinkRead::Expired { .. } => None,
		}
	}

	/// Reads the slot, deleting the record if it has expired or is corrupt.
	pub async fn read_detailed(&self) -> StoredLinkRead {
		let record = match self.load_record().await {
			Ok(Some(record)) => record,
			Ok(None) => return StoredLinkRead::Absent,
			Err(e) => {
				let corrupt = matches!(e, DeeplinkError::StorageCorrupt { .. });
				self.reporter.report("failed to read deferred link", e);
				if corrupt {
					self.clear().await;
				}
				return StoredLinkRead::Absent;
			}
		};

		let age = record.age_at(now_millis());
		if age > self.max_age {
			self.reporter.logger().info(&format!(
				"discarding deferred link stored {}h ago",
				age.as_secs() / 3600
			));
			self.clear().await;
			return StoredLinkRead::Expired {
				link: record.link,
				age,
			};
		}
		StoredLinkRead::Fresh(record.link)
	}

	/// Deletes the pending link unconditionally.
	pub async fn clear(&self) {
		for key in [&self.keys.deferred_link, &self.keys.deferred_link_timestamp] {
			if let Err(e) = self.storage.delete(key).await {
				self.reporter
					.report("failed to clear deferred link", e.into());
			}
		}
	}

	/// Describes the pending link without mutating it.
	pub async fn metadata(&self) -> Option<LinkMetadata> {
		let record = match self.load_record().await {
			Ok(record) => record?,
			Err(e) => {
				self.reporter.report("failed to read deferred link metadata", e);
				return None;
			}
		};

		let age = record.age_at(now_millis());
		let is_expired = age > self.max_age;
		Some(LinkMetadata {
			stored_at: Utc
				.timestamp_millis_opt(record.stored_at_epoch_millis)
				.single()
				.unwrap_or_default(),
			link: record.link,
			age_hours: age.as_secs_f64() / 3600.0,
			is_expired,
			expires_in: self.max_age.checked_sub(age).filter(|_| !is_expired),
		})
	}

	/// Deletes the pending link if it has expired. Returns `true` if it did.
	pub async fn cleanup_expired(&self) -> bool {
		matches!(self.read_detailed().await, StoredLinkRead::Expired { .. })
	}

	/// Backdates the pending link past the maximum age. Returns `false` if nothing is stored.
	pub async fn force_expire(&self) -> bool {
		let record = match self.load_record().await {
			Ok(Some(record)) => record,
			Ok(None) => return false,
			Err(e) => {
				self.reporter.report("failed to expire deferred link", e);
				return false;
			}
		};
		let backdate = i64::try_from(self.max_age.as_millis())
			.unwrap_or(i64::MAX)
			.saturating_add(1_000);
		let stored_at = now_millis().saturating_sub(backdate);
		match self.write_record(&record.link, stored_at).await {
			Ok(()) => true,
			Err(e) => {
				self.reporter.report("failed to expire deferred link", e);
				false
			}
		}
	}

	async fn write_record(&self, link: &str, stored_at: i64) -> DeeplinkResult<()> {
		self.storage.set(&self.keys.deferred_link, link).await?;
		if let Err(e) = self
			.storage
			.set(&self.keys.deferred_link_timestamp, &stored_at.to_string())
			.await
		{
			// never leave the new link paired with an older timestamp
			if let Err(cleanup) = self.storage.delete(&self.keys.deferred_link).await {
				self.reporter.logger().warning(&format!(
					"failed to remove half-written deferred link: {cleanup}"
				));
			}
			return Err(e.into());
		}
		Ok(())
	}

	async fn load_record(&self) -> DeeplinkResult<Option<PendingDeferredLinkRecord>> {
		let Some(link) = self.storage.get(&self.keys.deferred_link).await? else {
			return Ok(None);
		};
		let raw = self
			.storage
			.get(&self.keys.deferred_link_timestamp)
			.await?
			.unwrap_or_default();
		let stored_at_epoch_millis =
			raw.trim()
				.parse::<i64>()
				.map_err(|_| DeeplinkError::StorageCorrupt {
					key: self.keys.deferred_link_timestamp.clone(),
					value: raw.clone(),
				})?;
		Ok(Some(PendingDeferredLinkRecord {
			link,
			stored_at_epoch_millis,
		}))
	}
}
