//! # Transports
//!
//! Implementations of the engine's [`Fetch`](crate::core::transport::Fetch)
//! capability.
//!
//! ## Contained Modules:
//!
//! - **`http_fetch`** (feature `retrieve`): `HttpFetcher`, a `reqwest` client
//!   with `reqwest-middleware` exponential-backoff retries that resolves
//!   paths against a base URL.
//! - **`scripted`**: `ScriptedFetcher`, an in-memory transport with scripted
//!   responses and held fetches, used to exercise poll loops without a network.

#![forbid(unsafe_code)]

/// Generic HTTP transport with retry middleware.
#[cfg(feature = "retrieve")]
pub mod http_fetch;
/// In-memory transport with scripted responses.
pub mod scripted;

#[cfg(feature = "retrieve")]
pub use http_fetch::{HttpFetchOptions, HttpFetcher};
pub use scripted::ScriptedFetcher;
