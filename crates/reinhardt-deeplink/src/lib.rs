//! Deferred deep link attribution for Reinhardt mobile apps.
//!
//! A *deferred* deep link is a URL the user clicked before the app was
//! installed. This crate recovers it on the first launch after install and
//! routes it, together with links that arrive while the app is running, to a
//! single host callback:
//!
//! - **Validation**: custom scheme and web links checked against the configured
//!   scheme, domains and paths
//! - **Recovery**: install referrer (Android), clipboard (iOS) and a local
//!   expiring store, tried in order, once per process
//! - **Dispatch**: one de-duplicated `on_deep_link` callback for every path
//!
//! Native platform access, storage and real-time delivery are collaborators
//! behind the traits in [`provider`], [`storage`] and [`realtime`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use reinhardt_deeplink::{DeeplinkCallbacks, DeeplinkConfig, DeeplinkService, LinkBroadcaster};
//!
//! # async fn run() -> reinhardt_deeplink::DeeplinkResult<()> {
//! let config = DeeplinkConfig::builder()
//!     .app_scheme("myapp")
//!     .domain("example.com")
//!     .paths(&["/products/", "/users/"])
//!     .build()?;
//!
//! let links = Arc::new(LinkBroadcaster::new());
//! let service = DeeplinkService::builder(config)
//!     .realtime(links.clone())
//!     .callbacks(DeeplinkCallbacks::new().on_deep_link(|link| {
//!         println!("navigate to {:?}", link.id);
//!     }))
//!     .build();
//!
//! service.initialize().await;
//! links.publish("myapp://products?id=42");
//! # Ok(())
//! # }
//! ```

pub mod callbacks;
pub mod config;
pub mod error;
pub mod expiring;
pub mod first_launch;
pub mod gate;
pub mod logging;
pub mod provider;
pub mod realtime;
pub mod recovery;
pub mod service;
pub mod storage;
pub mod validator;

// Re-export main types for convenience
pub use callbacks::DeeplinkCallbacks;
pub use config::{DeeplinkConfig, DeeplinkConfigBuilder, DeeplinkSettings, Platform};
pub use error::{DeeplinkError, DeeplinkResult, StorageError};
pub use expiring::{ExpiringLinkStore, LinkMetadata, PendingDeferredLinkRecord, StoredLinkRead};
pub use first_launch::{FirstLaunchMarker, FirstLaunchTracker};
pub use gate::DispatchGate;
pub use logging::{DeeplinkLogger, LogLevel, SharedLogger, TracingLogger};
pub use provider::{
	AttributionProvider, CandidateLink, ClipboardContents, ClipboardProvider, ClipboardSource,
	InstallReferrerProvider, InstallReferrerSource, LinkSource, ReferrerDetails,
	StorageOnlyProvider,
};
pub use realtime::{LinkBroadcaster, LinkStream, RealtimeLinkSource};
pub use recovery::{AttributionOutcome, AttributionRecovery, RecoveryState};
pub use service::{DeeplinkService, DeeplinkServiceBuilder, InitializeStatus};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageKeys};
pub use validator::{LinkValidator, ValidatedLink};
