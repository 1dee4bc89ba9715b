//! Deep link attribution module.
//!
//! This module provides deferred deep link recovery and real-time routing.
//!
//! # Examples
//!
//! ```rust,no_run
//! use reinhardt_links::deeplink::{DeeplinkConfig, LinkValidator};
//! ```

#[cfg(feature = "deeplink")]
pub use reinhardt_deeplink::*;
