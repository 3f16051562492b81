//! # Consolidation Engine
//!
//! Decides which nodes of the path tree are actually polled. Every
//! registration walks from the registered node toward the root looking for
//! consolidation points: nodes with more than one child, or with one child
//! while wanting their own data. The topmost such node becomes the single
//! poll target for its whole subtree and every poll target beneath it is
//! retired.
//!
//! ## Rate merging
//! The rate given to a consolidation point is the minimum of its own rate and
//! the rates found on the chain walked from the registered node up to it.
//! Rates requested on other branches beneath the point are not revisited, so
//! some registration orders leave the point polling slower than its fastest
//! subscriber. That behavior is kept as is. Registering a path again never
//! loosens it: the node keeps the faster of its old and new rate.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::events::{ConsolidatorEvent, EventHub};
use crate::core::scheduler::{self, ActivePollSet, PollTarget};
use crate::core::transport::Fetch;
use crate::core::tree::{split_path, NodeId, PathTree};
use crate::errors::ConsolidatorError;

/// The rate applied to registrations that do not ask for one.
pub const DEFAULT_POLL_RATE: Duration = Duration::from_millis(1000);

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Rate used when `register` is called without one. `None` makes such
    /// registrations single-shot. There is no second fallback rate: with
    /// `None` here a registration without a rate is fetched once.
    pub default_rate: Option<Duration>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_rate: Some(DEFAULT_POLL_RATE),
        }
    }
}

/// Minimum of two optional rates. An absent rate never wins against a present one.
pub fn merge_rate(a: Option<Duration>, b: Option<Duration>) -> Option<Duration> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Tree plus active poll set. Both only ever change together, under one lock.
#[derive(Debug, Default)]
pub struct EngineState {
    pub tree: PathTree,
    pub active: ActivePollSet,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a subscription on `segments` and recomputes the poll set around it.
    ///
    /// Returns the consolidation point and, if it was not already being
    /// polled, the activation the scheduler has to start.
    pub fn register<S: AsRef<str>>(&mut self, segments: &[S], rate: Option<Duration>) -> (NodeId, Option<PollTarget>) {
        let terminal = self.tree.ensure_path(segments);
        let node = self.tree.node_mut(terminal);
        node.wants_data = true;
        node.rate = merge_rate(node.rate, rate);

        let point = self.consolidation_point(terminal);
        let carried = self
            .tree
            .ancestors_inclusive(terminal)
            .take_while(|&id| id != point)
            .fold(None, |acc, id| merge_rate(acc, self.tree.node(id).rate));

        let children: Vec<NodeId> = self.tree.node(point).children.values().copied().collect();
        for child in children {
            self.deactivate_subtree(child);
        }

        let node = self.tree.node_mut(point);
        node.rate = merge_rate(carried, node.rate);
        let activation = self.activate(point);
        (point, activation)
    }

    /// The topmost ancestor-or-self of `terminal` that qualifies as a
    /// consolidation point, or `terminal` itself when none does. The root is
    /// never considered.
    pub fn consolidation_point(&self, terminal: NodeId) -> NodeId {
        self.tree
            .ancestors_inclusive(terminal)
            .filter(|&id| {
                let node = self.tree.node(id);
                node.children.len() > 1 || (node.children.len() == 1 && node.wants_data)
            })
            .last()
            .unwrap_or(terminal)
    }

    /// Marks `id` as polled. Returns the new activation if it was not active yet.
    pub fn activate(&mut self, id: NodeId) -> Option<PollTarget> {
        let node = self.tree.node_mut(id);
        node.is_polled = true;
        let path = node.path.clone();
        self.active.insert(&path).map(|generation| PollTarget {
            node: id,
            path,
            generation,
        })
    }

    /// Stops polling every node in the subtree rooted at `id`.
    pub fn deactivate_subtree(&mut self, id: NodeId) {
        for current in self.tree.subtree(id) {
            let node = self.tree.node_mut(current);
            let was_polled = std::mem::replace(&mut node.is_polled, false);
            if self.active.remove(&node.path) || was_polled {
                log::debug!("Deactivated {}", node.path);
            }
        }
    }
}

/// State shared between the engine handle and its poll loops.
pub(crate) struct Shared<F> {
    state: Mutex<EngineState>,
    pub(crate) hub: EventHub,
    pub(crate) fetcher: F,
    pub(crate) shutdown: CancellationToken,
}

impl<F> Shared<F> {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn is_current(&self, target: &PollTarget) -> bool {
        self.lock_state().active.is_current(&target.path, target.generation)
    }
}

/// # Consolidator
///
/// Handle to one consolidation engine. Cloning the handle shares the engine.
///
/// `register` spawns poll loops with `tokio::spawn`, so it must be called
/// from within a Tokio runtime.
pub struct Consolidator<F: Fetch> {
    shared: Arc<Shared<F>>,
    options: EngineOptions,
}

impl<F: Fetch> Clone for Consolidator<F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            options: self.options.clone(),
        }
    }
}

impl<F: Fetch> Consolidator<F> {
    /// Creates an engine with the default 1000ms poll rate.
    pub fn new(fetcher: F) -> Self {
        Self::with_options(fetcher, EngineOptions::default())
    }

    pub fn with_options(fetcher: F, options: EngineOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(EngineState::new()),
                hub: EventHub::new(),
                fetcher,
                shutdown: CancellationToken::new(),
            }),
            options,
        }
    }

    /// Registers interest in `path`, polled every `rate` (or the engine
    /// default when `None`).
    ///
    /// Returns the path of the node that ends up covering the subscription.
    ///
    /// # Errors
    /// `InvalidPath` when `path` is not absolute or has no segments.
    pub fn register(&self, path: &str, rate: Option<Duration>) -> Result<String, ConsolidatorError> {
        let segments = split_path(path);
        if !path.starts_with('/') || segments.is_empty() {
            return Err(ConsolidatorError::InvalidPath(path.to_string()));
        }

        let rate = rate.or(self.options.default_rate);
        let (point, activation) = {
            let mut state = self.shared.lock_state();
            let (point, activation) = state.register(&segments, rate);
            (state.tree.node(point).path.clone(), activation)
        };
        log::debug!("Registered {} -> consolidated at {}", path, point);

        if let Some(target) = activation {
            if self.shared.shutdown.is_cancelled() {
                log::debug!("Engine is shut down. Not polling {}", target.path);
            } else {
                scheduler::spawn_poll_loop(Arc::clone(&self.shared), target);
            }
        }
        Ok(point)
    }

    /// Registers a new event listener.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ConsolidatorEvent> {
        self.shared.hub.subscribe()
    }

    /// Stops every poll loop. Registrations afterwards still update the tree.
    pub fn shutdown(&self) {
        log::info!("Shutting down consolidator");
        self.shared.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Whether `path` is currently an active poll target.
    pub fn is_polled(&self, path: &str) -> bool {
        let state = self.shared.lock_state();
        state.active.contains(path)
    }

    /// Whether a caller registered exactly `path`.
    pub fn wants_data(&self, path: &str) -> bool {
        let state = self.shared.lock_state();
        state.tree.find_path(path).is_some_and(|id| state.tree.node(id).wants_data)
    }

    /// The rate recorded on `path`'s node.
    pub fn rate(&self, path: &str) -> Option<Duration> {
        let state = self.shared.lock_state();
        state.tree.find_path(path).and_then(|id| state.tree.node(id).rate)
    }

    /// All active poll targets, sorted.
    pub fn polled_paths(&self) -> Vec<String> {
        self.shared.lock_state().active.paths()
    }

    /// Nested JSON view of the whole tree.
    pub fn tree_snapshot(&self) -> Value {
        self.shared.lock_state().tree.snapshot()
    }

    #[cfg(test)]
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        f(&mut self.shared.lock_state())
    }
}
