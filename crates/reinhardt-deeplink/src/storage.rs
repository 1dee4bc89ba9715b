//! Key-value storage collaborator.
//!
//! The attribution engine persists exactly two records (the pending deferred
//! link and the first-launch marker) through [`KeyValueStore`]. Hosts usually
//! bridge this to the platform preferences store; [`MemoryStore`] and
//! [`FileStore`] cover tests and desktop builds.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::StorageError;

/// String key-value storage with no transactional guarantees.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
	/// Returns the value stored under `key`.
	async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

	/// Stores `value` under `key`, replacing any previous value.
	async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

	/// Removes `key`. Removing a missing key is not an error.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Persisted key names, all sharing the configured prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
	pub deferred_link: String,
	pub deferred_link_timestamp: String,
	pub first_launch_completed: String,
	pub install_timestamp: String,
}

impl StorageKeys {
	pub fn new(prefix: &str) -> Self {
		Self {
			deferred_link: format!("{prefix}deferred_link"),
			deferred_link_timestamp: format!("{prefix}deferred_link_timestamp"),
			first_launch_completed: format!("{prefix}first_launch_completed"),
			install_timestamp: format!("{prefix}install_timestamp"),
		}
	}
}

/// In-memory store, lost when the process exits.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
	data: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns `true` if `key` holds a value.
	pub fn contains_key(&self, key: &str) -> bool {
		self.data.read().contains_key(key)
	}

	/// Returns the value under `key` without going through the async trait.
	pub fn peek(&self, key: &str) -> Option<String> {
		self.data.read().get(key).cloned()
	}

	/// Number of stored keys.
	pub fn len(&self) -> usize {
		self.data.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.read().is_empty()
	}
}

#[async_trait]
impl KeyValueStore for MemoryStore {
	async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
		Ok(self.data.read().get(key).cloned())
	}

	async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
		self.data.write().insert(key.to_string(), value.to_string());
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.data.write().remove(key);
		Ok(())
	}
}

/// Store backed by a single JSON document on disk.
///
/// Every write replaces the document through a temporary file and a rename,
/// so a crash leaves either the old or the new document behind.
#[derive(Debug)]
pub struct FileStore {
	path: PathBuf,
	// serialises read-modify-write cycles within this process
	lock: tokio::sync::Mutex<()>,
}

impl FileStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			lock: tokio::sync::Mutex::new(()),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	async fn load(&self) -> Result<HashMap<String, String>, StorageError> {
		match tokio::fs::read(&self.path).await {
			Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
			Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
			Err(e) => Err(e.into()),
		}
	}

	async fn save(&self, data: &HashMap<String, String>) -> Result<(), StorageError> {
		if let Some(parent) = self.path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		let tmp = self.path.with_extension("tmp");
		tokio::fs::write(&tmp, serde_json::to_vec_pretty(data)?).await?;
		tokio::fs::rename(&tmp, &self.path).await?;
		Ok(())
	}
}

#[async_trait]
impl KeyValueStore for FileStore {
	async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
		let _guard = self.lock.lock().await;
		Ok(self.load().await?.remove(key))
	}

	async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
		let _guard = self.lock.lock().await;
		let mut data = self.load().await?;
		data.insert(key.to_string(), value.to_string());
		self.save(&data).await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let _guard = self.lock.lock().await;
		let mut data = self.load().await?;
		if data.remove(key).is_some() {
			self.save(&data).await?;
		}
		Ok(())
	}
}
