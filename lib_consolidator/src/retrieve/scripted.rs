//! # Scripted Transport
//!
//! An in-memory [`Fetch`] used to drive the engine without a network. Each
//! path answers from a queue of one-shot responses first, then from a fixed
//! response. Fetches can be held in flight with [`ScriptedFetcher::hold`] and
//! let through one at a time with [`ScriptedFetcher::release`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Notify, Semaphore};

use crate::core::transport::{Fetch, FetchResponse};
use crate::errors::ConsolidatorError;

type Scripted = Result<FetchResponse, ConsolidatorError>;

#[derive(Default)]
struct Script {
    queued: HashMap<String, VecDeque<Scripted>>,
    fixed: HashMap<String, Scripted>,
    gates: HashMap<String, Arc<Semaphore>>,
    calls: HashMap<String, usize>,
}

#[derive(Default)]
pub struct ScriptedFetcher {
    script: Mutex<Script>,
    called: Notify,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answers every fetch of `path` with `response` once the queue is drained.
    pub fn respond_with(&self, path: &str, response: Scripted) {
        self.lock().fixed.insert(path.to_string(), response);
    }

    /// Queues a one-shot answer for the next fetch of `path`.
    pub fn push(&self, path: &str, response: Scripted) {
        self.lock().queued.entry(path.to_string()).or_default().push_back(response);
    }

    /// Makes subsequent fetches of `path` wait for [`release`](Self::release).
    pub fn hold(&self, path: &str) {
        self.lock()
            .gates
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(0)));
    }

    /// Lets one held fetch of `path` complete.
    pub fn release(&self, path: &str) {
        if let Some(gate) = self.lock().gates.get(path) {
            gate.add_permits(1);
        }
    }

    /// How many fetches of `path` have been started.
    pub fn calls(&self, path: &str) -> usize {
        self.lock().calls.get(path).copied().unwrap_or(0)
    }

    /// Waits until at least `count` fetches of `path` have been started.
    pub async fn wait_for_calls(&self, path: &str, count: usize) {
        loop {
            let notified = self.called.notified();
            if self.calls(path) >= count {
                return;
            }
            notified.await;
        }
    }
}

impl Fetch for ScriptedFetcher {
    async fn fetch(&self, path: &str) -> Result<FetchResponse, ConsolidatorError> {
        let gate = {
            let mut script = self.lock();
            *script.calls.entry(path.to_string()).or_default() += 1;
            script.gates.get(path).cloned()
        };
        self.called.notify_waiters();

        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let mut script = self.lock();
        let queued = script.queued.get_mut(path).and_then(VecDeque::pop_front);
        match queued {
            Some(response) => response,
            None => script.fixed.get(path).cloned().unwrap_or_else(|| {
                Err(ConsolidatorError::Transport(format!("no scripted response for {}", path)))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_then_fixed_then_error() {
        let fetcher = ScriptedFetcher::new();
        fetcher.push("/a", Ok(FetchResponse::json("1")));
        fetcher.respond_with("/a", Ok(FetchResponse::json("2")));

        assert_eq!(fetcher.fetch("/a").await.unwrap().body, "1");
        assert_eq!(fetcher.fetch("/a").await.unwrap().body, "2");
        assert_eq!(fetcher.fetch("/a").await.unwrap().body, "2");
        assert!(matches!(fetcher.fetch("/b").await, Err(ConsolidatorError::Transport(_))));
        assert_eq!(fetcher.calls("/a"), 3);
        assert_eq!(fetcher.calls("/b"), 1);
    }

    #[tokio::test]
    async fn test_held_fetch_waits_for_release() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond_with("/a", Ok(FetchResponse::json("{}")));
        fetcher.hold("/a");

        let task = tokio::spawn({
            let fetcher = Arc::clone(&fetcher);
            async move { fetcher.fetch("/a").await }
        });
        fetcher.wait_for_calls("/a", 1).await;
        assert!(!task.is_finished());

        fetcher.release("/a");
        assert!(task.await.unwrap().is_ok());
    }
}
