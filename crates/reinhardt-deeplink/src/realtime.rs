//! Real-time link delivery.
//!
//! The platform layer hands incoming URLs to the engine through
//! [`RealtimeLinkSource`]. [`LinkBroadcaster`] is a ready-made source for
//! hosts that receive URLs through callbacks and want to push them in.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::{DeeplinkError, DeeplinkResult};

/// Stream of incoming URL strings for the life of the subscription.
pub type LinkStream = Pin<Box<dyn Stream<Item = DeeplinkResult<String>> + Send>>;

/// Source of links delivered while the app is running.
#[async_trait]
pub trait RealtimeLinkSource: Send + Sync {
	/// The link that launched the process, if the platform reports one.
	///
	/// Delivered after deferred recovery and before the stream.
	async fn initial_link(&self) -> Option<String> {
		None
	}

	/// Opens a new subscription.
	fn subscribe(&self) -> LinkStream;
}

/// Broadcast-backed link source.
///
/// Links published while nobody is subscribed are dropped.
pub struct LinkBroadcaster {
	tx: broadcast::Sender<String>,
	initial: Mutex<Option<String>>,
}

impl LinkBroadcaster {
	pub fn new() -> Self {
		Self::with_capacity(64)
	}

	pub fn with_capacity(capacity: usize) -> Self {
		let (tx, _) = broadcast::channel(capacity);
		Self {
			tx,
			initial: Mutex::new(None),
		}
	}

	/// Sets the launch link returned once by [`RealtimeLinkSource::initial_link`].
	pub fn with_initial_link(self, link: impl Into<String>) -> Self {
		*self.initial.lock() = Some(link.into());
		self
	}

	/// Publishes a URL to every subscriber. Returns the number of subscribers reached.
	pub fn publish(&self, link: impl Into<String>) -> usize {
		self.tx.send(link.into()).unwrap_or(0)
	}

	pub fn subscriber_count(&self) -> usize {
		self.tx.receiver_count()
	}
}

impl Default for LinkBroadcaster {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl RealtimeLinkSource for LinkBroadcaster {
	async fn initial_link(&self) -> Option<String> {
		self.initial.lock().take()
	}

	fn subscribe(&self) -> LinkStream {
		BroadcastStream::new(self.tx.subscribe())
			.map(|item| item.map_err(|e| DeeplinkError::LinkStream(e.to_string())))
			.boxed()
	}
}
