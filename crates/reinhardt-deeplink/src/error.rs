//! Error types for deep link attribution and routing.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by a [`KeyValueStore`](crate::storage::KeyValueStore) backend.
#[derive(Debug, Error)]
pub enum StorageError {
	/// The backing file or device could not be accessed.
	#[error("storage I/O failed: {0}")]
	Io(#[from] std::io::Error),

	/// The persisted document could not be encoded or decoded.
	#[error("storage serialization failed: {0}")]
	Serialization(#[from] serde_json::Error),

	/// Backend specific failure.
	#[error("storage backend error: {0}")]
	Backend(String),
}

/// Errors that can occur while validating, recovering or routing deep links.
///
/// Apart from [`DeeplinkError::NotInitialized`] and configuration errors,
/// these are never returned to the host. They are reported through the
/// `on_error` callback and the attribution flow moves on.
#[derive(Debug, Error)]
pub enum DeeplinkError {
	/// The candidate string is not a deep link for this app.
	#[error("invalid deep link format: {0}")]
	InvalidLinkFormat(String),

	/// A native attribution provider failed or is not available on this device.
	#[error("native provider {provider} unavailable: {message}")]
	NativeProviderUnavailable {
		provider: &'static str,
		message: String,
	},

	/// A native attribution provider did not answer in time.
	#[error("native provider {provider} timed out after {timeout:?}")]
	NativeProviderTimeout {
		provider: &'static str,
		timeout: Duration,
	},

	/// The key-value storage collaborator failed.
	#[error("storage unavailable: {0}")]
	StorageUnavailable(#[from] StorageError),

	/// A persisted value could not be parsed.
	#[error("corrupt storage value for {key}: {value:?}")]
	StorageCorrupt { key: String, value: String },

	/// The real-time link stream reported a delivery problem.
	#[error("real-time link stream error: {0}")]
	LinkStream(String),

	/// An instance-scoped operation was used before `initialize()`.
	#[error("deep link service not initialized; call initialize() first")]
	NotInitialized,

	/// The configuration violates one of its invariants.
	#[error("invalid deep link configuration: {0}")]
	InvalidConfig(String),

	/// The settings document could not be parsed.
	#[error("failed to parse deep link settings: {0}")]
	Settings(#[from] toml::de::Error),
}

/// Result type for deep link operations.
pub type DeeplinkResult<T> = Result<T, DeeplinkError>;
