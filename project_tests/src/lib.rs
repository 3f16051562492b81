//! # Shared Test Support
//!
//! Helpers used by the integration tests in this crate: logger setup, event
//! collection with a timeout, and a throwaway `axum` server on `127.0.0.1:0`
//! that replays canned responses.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::{Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use lib_consolidator::ConsolidatorEvent;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Routes library logs to the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Waits for the next event, panicking if none arrives within five (virtual) seconds.
pub async fn next_event(events: &mut UnboundedReceiver<ConsolidatorEvent>) -> ConsolidatorEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Drains every event that is already queued.
pub fn drain(events: &mut UnboundedReceiver<ConsolidatorEvent>) -> Vec<ConsolidatorEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// A canned HTTP response served by [`serve`].
#[derive(Debug, Clone)]
pub struct CannedResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl CannedResponse {
    pub fn json(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: body.to_string(),
        }
    }
}

#[derive(Clone, Default)]
struct CannedState {
    responses: Arc<Mutex<VecDeque<CannedResponse>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

/// A running canned-response server. The server task stops when this is dropped.
pub struct CannedServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl CannedServer {
    /// `METHOD /path` of every request received so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock poisoned").clone()
    }
}

impl Drop for CannedServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Answers every request with the next canned response, or 404 once they run out.
async fn answer(State(state): State<CannedState>, method: Method, uri: Uri) -> Response {
    state
        .requests
        .lock()
        .expect("requests lock poisoned")
        .push(format!("{} {}", method, uri.path()));

    let next = state.responses.lock().expect("responses lock poisoned").pop_front();
    match next {
        Some(canned) => (
            StatusCode::from_u16(canned.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            [(header::CONTENT_TYPE, canned.content_type)],
            canned.body,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Starts an `axum` server on `127.0.0.1:0` that replays `responses` in order.
pub async fn serve(responses: Vec<CannedResponse>) -> anyhow::Result<CannedServer> {
    let state = CannedState {
        responses: Arc::new(Mutex::new(responses.into())),
        ..CannedState::default()
    };
    let requests = Arc::clone(&state.requests);
    let app = Router::new().fallback(answer).with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let base_url = format!("http://{}/", listener.local_addr()?);
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app.into_make_service()).await {
            eprintln!("canned server stopped: {}", e);
        }
    });

    Ok(CannedServer {
        base_url,
        requests,
        task,
    })
}
