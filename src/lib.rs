//! # Reinhardt Links
//!
//! Deferred deep link attribution and routing for Reinhardt mobile apps.
//!
//! A user who clicks a link to content before the app is installed should
//! land on that content when the app first opens. Reinhardt Links recovers the
//! link after install (install referrer, clipboard, or a local expiring store),
//! validates it against the app's scheme and domains, and delivers it through
//! the same callback as links received while the app is running.
//!
//! ## Feature Flags
//!
//! - `deeplink` (default) - The attribution engine, re-exported as [`deeplink`]
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use reinhardt_links::deeplink::{DeeplinkCallbacks, DeeplinkConfig, DeeplinkService};
//!
//! # async fn run() -> reinhardt_links::deeplink::DeeplinkResult<()> {
//! let config = DeeplinkConfig::builder()
//!     .app_scheme("myapp")
//!     .domain("example.com")
//!     .build()?;
//!
//! let service = DeeplinkService::builder(config)
//!     .callbacks(DeeplinkCallbacks::new().on_deep_link(|link| {
//!         println!("open {}", link.raw);
//!     }))
//!     .build();
//! service.initialize().await;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "deeplink")]
pub mod deeplink;

#[cfg(feature = "deeplink")]
pub mod prelude {
	pub use crate::deeplink::{
		DeeplinkCallbacks, DeeplinkConfig, DeeplinkError, DeeplinkResult, DeeplinkService,
		InitializeStatus, Platform, ValidatedLink,
	};
}
