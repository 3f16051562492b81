//! # Core Engine Module
//!
//! The consolidation engine: it keeps the tree of every registered path,
//! polls only the minimal set of ancestor paths that covers all subscribers,
//! and fans each polled response back out to the subscribers beneath it.
//!
//! ## Core Components:
//!
//! - **`tree`**: The arena-backed namespace of registered paths.
//!
//! - **`consolidator`**: Picks consolidation points, merges rates and owns the
//!   public `Consolidator` handle.
//!
//! - **`scheduler`**: The active poll set and the per-target poll loops
//!   (fetch, route, sleep, repeat) with lazy, race-safe cancellation.
//!
//! - **`router`**: Walks a response in lockstep with the tree and produces one
//!   `data` event per subscriber.
//!
//! - **`events`**: The event type and the listener registry.
//!
//! - **`transport`**: The `Fetch` capability the engine polls through.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Consolidation point selection and the engine handle.
pub mod consolidator;
/// Event type and listener fan-out.
pub mod events;
/// Response fan-out to subscribers.
pub mod router;
/// Active poll set and poll loops.
pub mod scheduler;
/// The fetch capability and response decoding.
pub mod transport;
/// The path namespace.
pub mod tree;

// --- Public API Re-exports ---
pub use consolidator::{Consolidator, EngineOptions, DEFAULT_POLL_RATE};
pub use events::{ConsolidatorEvent, EventHub};
pub use scheduler::ActivePollSet;
pub use transport::{Fetch, FetchResponse};
pub use tree::{NodeId, PathTree};
