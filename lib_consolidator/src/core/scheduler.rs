//! # Poll Scheduler
//!
//! Owns the lifecycle of active poll targets. Each target runs in its own
//! tokio task that fetches, hands the response to the router and sleeps for
//! the node's rate before fetching again.
//!
//! ## Cancellation
//! Deactivation is lazy: an in-flight fetch is never aborted. Instead, every
//! activation is stamped with a generation number and the loop re-checks the
//! [`ActivePollSet`] before every fetch and again when the fetch completes.
//! A loop whose generation is no longer current discards its response
//! and exits, so a node that is deactivated and re-activated while a fetch is
//! outstanding never ends up with two loops.
//!
//! ## Halting
//! A loop that stops on its own (an error that does not allow a repoll, or a
//! single-shot target) takes its path out of the set under the same lock, so
//! the next registration landing on that node starts a fresh activation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::core::consolidator::{EngineState, Shared};
use crate::core::events::ConsolidatorEvent;
use crate::core::router;
use crate::core::transport::{decode_response, Fetch, FetchResponse};
use crate::core::tree::NodeId;
use crate::errors::ConsolidatorError;

/// The set of paths currently being fetched, each tagged with the generation
/// of the activation that put it there.
#[derive(Debug, Default)]
pub struct ActivePollSet {
    targets: HashMap<String, u64>,
    next_generation: u64,
}

impl ActivePollSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `path` and returns its new generation, or `None` if it was already active.
    pub fn insert(&mut self, path: &str) -> Option<u64> {
        if self.targets.contains_key(path) {
            return None;
        }
        self.next_generation += 1;
        self.targets.insert(path.to_string(), self.next_generation);
        Some(self.next_generation)
    }

    /// Removes `path`, returning whether it was present.
    pub fn remove(&mut self, path: &str) -> bool {
        self.targets.remove(path).is_some()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.targets.contains_key(path)
    }

    /// Removes `path` only if it is still held by `generation`.
    pub fn halt(&mut self, path: &str, generation: u64) -> bool {
        if !self.is_current(path, generation) {
            return false;
        }
        self.targets.remove(path);
        true
    }

    /// True while `path` is still active under the given activation.
    pub fn is_current(&self, path: &str, generation: u64) -> bool {
        self.targets.get(path) == Some(&generation)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Active paths in lexical order.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.targets.keys().cloned().collect();
        paths.sort();
        paths
    }
}

/// One activation of a node as a poll target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTarget {
    pub node: NodeId,
    pub path: String,
    pub generation: u64,
}

/// Starts the poll loop for a freshly activated target.
pub(crate) fn spawn_poll_loop<F: Fetch>(shared: Arc<Shared<F>>, target: PollTarget) {
    log::info!("Polling {} (generation {})", target.path, target.generation);
    tokio::spawn(poll_loop(shared, target));
}

async fn poll_loop<F: Fetch>(shared: Arc<Shared<F>>, target: PollTarget) {
    loop {
        if !shared.is_current(&target) {
            log::debug!("{} is no longer an active poll target. Stopping its poll loop.", target.path);
            return;
        }

        log::debug!("Fetching {}", target.path);
        let outcome = tokio::select! {
            _ = shared.shutdown.cancelled() => return,
            outcome = shared.fetcher.fetch(&target.path) => outcome,
        };

        let Some(delay) = complete_cycle(&shared, &target, outcome) else {
            return;
        };

        log::debug!("Repolling {} in {:?}", target.path, delay);
        tokio::select! {
            _ = shared.shutdown.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Handles one fetch result and returns the delay before the next fetch, if any.
///
/// The active-set check happens here, at response time, under the same lock
/// that consolidation mutates the set with. A current target that will not
/// fetch again is halted before the lock is released.
fn complete_cycle<F: Fetch>(
    shared: &Shared<F>,
    target: &PollTarget,
    outcome: Result<FetchResponse, ConsolidatorError>,
) -> Option<Duration> {
    let mut state = shared.lock_state();
    if !state.active.is_current(&target.path, target.generation) {
        log::debug!("Discarding response for {}: no longer an active poll target", target.path);
        return None;
    }

    let next = match outcome {
        Ok(response) => handle_response(shared, &state, target, &response),
        Err(cause) => {
            log::warn!("Fetch of {} failed: {}. Polling halted for this path.", target.path, cause);
            shared.hub.emit(ConsolidatorEvent::Error {
                origin: Some(target.path.clone()),
                cause,
            });
            None
        }
    };

    if next.is_none() && state.active.halt(&target.path, target.generation) {
        state.tree.node_mut(target.node).is_polled = false;
        log::debug!("{} halted (generation {})", target.path, target.generation);
    }
    next
}

fn handle_response<F: Fetch>(
    shared: &Shared<F>,
    state: &EngineState,
    target: &PollTarget,
    response: &FetchResponse,
) -> Option<Duration> {
    let rate = state.tree.node(target.node).rate;
    match decode_response(response) {
        Ok(data) => match router::route(&state.tree, &target.path, &data) {
            Ok(events) => events.into_iter().for_each(|event| shared.hub.emit(event)),
            Err(e) => log::warn!("{}", e),
        },
        Err(cause) => {
            log::warn!("Poll of {} returned an unusable response: {}", target.path, cause);
            let repoll = cause.allows_repoll();
            shared.hub.emit(ConsolidatorEvent::Error {
                origin: Some(target.path.clone()),
                cause,
            });
            if !repoll {
                return None;
            }
        }
    }
    rate
}
