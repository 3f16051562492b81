//! # lib_consolidator
//!
//! Poll consolidation over a hierarchical, slash-delimited namespace. Callers
//! register the paths they care about; the engine polls only the minimal set
//! of ancestor paths that covers them and hands every subscriber its own slice
//! of each consolidated response.
//!
//! ```no_run
//! use std::time::Duration;
//! use lib_consolidator::{Consolidator, ConsolidatorEvent, ScriptedFetcher};
//!
//! # async fn demo() -> Result<(), lib_consolidator::ConsolidatorError> {
//! let engine = Consolidator::new(ScriptedFetcher::new());
//! let mut events = engine.subscribe();
//! engine.register("/a/b", Some(Duration::from_millis(500)))?;
//! engine.register("/a/c", None)?; // now only /a is polled
//! while let Some(ConsolidatorEvent::Data { origin, data, .. }) = events.recv().await {
//!     println!("{origin}: {data}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod errors;
pub mod retrieve;

#[cfg(feature = "configs")]
pub mod configs;
#[cfg(feature = "loggers")]
pub mod loggers;

// Re-export the main surface
pub use crate::core::{Consolidator, ConsolidatorEvent, EngineOptions, Fetch, FetchResponse};
pub use errors::ConsolidatorError;
pub use retrieve::ScriptedFetcher;
