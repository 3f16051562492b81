//! # Poll Loop Integration Tests
//!
//! Runs engines against a scripted transport on a paused Tokio clock so that
//! repoll intervals can be asserted deterministically.

use std::sync::Arc;
use std::time::Duration;

use lib_consolidator::{
    Consolidator, ConsolidatorError, ConsolidatorEvent, EngineOptions, FetchResponse, ScriptedFetcher,
};
use project_tests::{drain, init_logging, next_event};
use serde_json::json;
use tokio::time::sleep;

fn setup() -> (Arc<ScriptedFetcher>, Consolidator<Arc<ScriptedFetcher>>) {
    init_logging();
    let fetcher = Arc::new(ScriptedFetcher::new());
    let engine = Consolidator::new(Arc::clone(&fetcher));
    (fetcher, engine)
}

fn data(origin: &str, source: Option<&str>, value: serde_json::Value) -> ConsolidatorEvent {
    ConsolidatorEvent::Data {
        origin: origin.to_string(),
        source: source.map(str::to_string),
        data: value,
    }
}

#[tokio::test(start_paused = true)]
async fn test_response_is_fanned_out_to_origin_and_child() {
    let (fetcher, engine) = setup();
    fetcher.respond_with("/a/b", Ok(FetchResponse::json(r#"{"x": "v1", "y": "v2"}"#)));
    let mut events = engine.subscribe();

    engine.register("/a/b", None).unwrap();
    engine.register("/a/b/x", None).unwrap();

    assert_eq!(next_event(&mut events).await, data("/a/b", None, json!({"x": "v1", "y": "v2"})));
    assert_eq!(next_event(&mut events).await, data("/a/b/x", Some("/a/b"), json!("v1")));
    assert!(drain(&mut events).is_empty(), "no event expected for /a/b/y");
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_consolidated_parent_serves_both_children() {
    let (fetcher, engine) = setup();
    fetcher.respond_with("/a", Ok(FetchResponse::json(r#"{"b": 1, "c": {"deep": true}, "d": 4}"#)));
    let mut events = engine.subscribe();

    engine.register("/a/b", None).unwrap();
    engine.register("/a/c", None).unwrap();

    assert_eq!(next_event(&mut events).await, data("/a/b", Some("/a"), json!(1)));
    assert_eq!(next_event(&mut events).await, data("/a/c", Some("/a"), json!({"deep": true})));
    assert_eq!(fetcher.calls("/a/b"), 0);
    assert_eq!(fetcher.calls("/a/c"), 0);
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_repolls_at_node_rate() {
    let (fetcher, engine) = setup();
    fetcher.respond_with("/a", Ok(FetchResponse::json("1")));
    let mut events = engine.subscribe();

    engine.register("/a", Some(Duration::from_millis(100))).unwrap();
    sleep(Duration::from_millis(350)).await;

    let calls = fetcher.calls("/a");
    assert!((3..=4).contains(&calls), "expected 3 or 4 fetches, got {}", calls);
    assert_eq!(drain(&mut events).len(), calls);
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_successive_polls_arrive_in_completion_order() {
    let (fetcher, engine) = setup();
    fetcher.push("/a", Ok(FetchResponse::json("1")));
    fetcher.push("/a", Ok(FetchResponse::json("2")));
    fetcher.respond_with("/a", Ok(FetchResponse::json("3")));
    let mut events = engine.subscribe();

    engine.register("/a", Some(Duration::from_millis(10))).unwrap();

    for expected in 1..=3 {
        assert_eq!(next_event(&mut events).await, data("/a", None, json!(expected)));
    }
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_unset_rate_is_single_shot() {
    init_logging();
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.respond_with("/a", Ok(FetchResponse::json("{}")));
    let engine = Consolidator::with_options(Arc::clone(&fetcher), EngineOptions { default_rate: None });
    let mut events = engine.subscribe();

    engine.register("/a", None).unwrap();
    next_event(&mut events).await;
    sleep(Duration::from_secs(10)).await;

    assert_eq!(fetcher.calls("/a"), 1);
    assert!(!engine.is_polled("/a"));

    // Registering again fetches once more.
    engine.register("/a", None).unwrap();
    next_event(&mut events).await;
    assert_eq!(fetcher.calls("/a"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_content_type_errors_once_without_repoll() {
    let (fetcher, engine) = setup();
    fetcher.respond_with(
        "/a",
        Ok(FetchResponse {
            status_code: 200,
            content_type: Some("text/html".to_string()),
            body: "<html></html>".to_string(),
        }),
    );
    let mut events = engine.subscribe();

    engine.register("/a", Some(Duration::from_millis(50))).unwrap();
    let event = next_event(&mut events).await;
    sleep(Duration::from_secs(1)).await;

    assert_eq!(
        event,
        ConsolidatorEvent::Error {
            origin: Some("/a".to_string()),
            cause: ConsolidatorError::UnsupportedContentType("text/html".to_string()),
        }
    );
    assert!(drain(&mut events).is_empty());
    assert_eq!(fetcher.calls("/a"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_body_errors_once_without_repoll() {
    let (fetcher, engine) = setup();
    fetcher.respond_with("/a", Ok(FetchResponse::json("{\"unterminated\": ")));
    let mut events = engine.subscribe();

    engine.register("/a", Some(Duration::from_millis(50))).unwrap();
    let event = next_event(&mut events).await;
    sleep(Duration::from_secs(1)).await;

    assert!(matches!(
        event,
        ConsolidatorEvent::Error { cause: ConsolidatorError::MalformedBody(_), .. }
    ));
    assert!(drain(&mut events).is_empty());
    assert_eq!(fetcher.calls("/a"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_http_status_error_keeps_polling() {
    let (fetcher, engine) = setup();
    fetcher.push(
        "/a",
        Ok(FetchResponse {
            status_code: 503,
            ..FetchResponse::json("busy")
        }),
    );
    fetcher.respond_with("/a", Ok(FetchResponse::json(r#""ok""#)));
    let mut events = engine.subscribe();

    engine.register("/a", Some(Duration::from_millis(50))).unwrap();

    assert!(matches!(
        next_event(&mut events).await,
        ConsolidatorEvent::Error { cause: ConsolidatorError::HttpStatus { status: 503, .. }, .. }
    ));
    assert_eq!(next_event(&mut events).await, data("/a", None, json!("ok")));
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_halts_polling() {
    let (fetcher, engine) = setup();
    fetcher.respond_with("/a", Err(ConsolidatorError::Transport("connection refused".to_string())));
    let mut events = engine.subscribe();

    engine.register("/a", Some(Duration::from_millis(50))).unwrap();
    let event = next_event(&mut events).await;
    sleep(Duration::from_secs(1)).await;

    assert_eq!(event.origin(), Some("/a"));
    assert_eq!(fetcher.calls("/a"), 1);
    assert!(engine.polled_paths().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_subscriber_under_halted_target_restarts_polling() {
    let (fetcher, engine) = setup();
    fetcher.push("/a", Err(ConsolidatorError::Transport("connection refused".to_string())));
    fetcher.respond_with("/a", Ok(FetchResponse::json(r#"{"x": 7}"#)));
    let mut events = engine.subscribe();

    engine.register("/a", Some(Duration::from_millis(50))).unwrap();
    assert!(matches!(next_event(&mut events).await, ConsolidatorEvent::Error { .. }));
    sleep(Duration::from_secs(1)).await;
    assert_eq!(fetcher.calls("/a"), 1);

    assert_eq!(engine.register("/a/x", Some(Duration::from_millis(50))).unwrap(), "/a");
    assert_eq!(engine.polled_paths(), vec!["/a"]);
    assert_eq!(next_event(&mut events).await, data("/a", None, json!({"x": 7})));
    assert_eq!(next_event(&mut events).await, data("/a/x", Some("/a"), json!(7)));
    assert_eq!(fetcher.calls("/a"), 2);
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_response_of_subsumed_node_is_discarded() {
    let (fetcher, engine) = setup();
    fetcher.respond_with("/a/b", Ok(FetchResponse::json(r#"{"stale": true}"#)));
    fetcher.respond_with("/a", Ok(FetchResponse::json(r#"{"b": "fresh", "c": 2}"#)));
    fetcher.hold("/a/b");
    fetcher.hold("/a");
    let mut events = engine.subscribe();

    engine.register("/a/b", Some(Duration::from_millis(100))).unwrap();
    fetcher.wait_for_calls("/a/b", 1).await;

    // /a/b's fetch is in flight when /a takes over.
    engine.register("/a/c", Some(Duration::from_millis(100))).unwrap();
    fetcher.release("/a/b");
    sleep(Duration::from_secs(1)).await;

    assert!(drain(&mut events).is_empty(), "stale response must not be routed");
    assert_eq!(fetcher.calls("/a/b"), 1, "no repoll for a subsumed node");

    fetcher.release("/a");
    assert_eq!(next_event(&mut events).await, data("/a/b", Some("/a"), json!("fresh")));
    assert_eq!(next_event(&mut events).await, data("/a/c", Some("/a"), json!(2)));
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_all_loops() {
    let (fetcher, engine) = setup();
    fetcher.respond_with("/a", Ok(FetchResponse::json("1")));
    fetcher.respond_with("/b", Ok(FetchResponse::json("2")));

    engine.register("/a", Some(Duration::from_millis(20))).unwrap();
    engine.register("/b", Some(Duration::from_millis(20))).unwrap();
    sleep(Duration::from_millis(100)).await;

    engine.shutdown();
    let (a, b) = (fetcher.calls("/a"), fetcher.calls("/b"));
    sleep(Duration::from_secs(1)).await;

    assert!(a > 1 && b > 1);
    assert_eq!((fetcher.calls("/a"), fetcher.calls("/b")), (a, b));
}

#[tokio::test(start_paused = true)]
async fn test_every_listener_receives_events() {
    let (fetcher, engine) = setup();
    fetcher.respond_with("/a", Ok(FetchResponse::json("true")));
    let mut first = engine.subscribe();
    let mut second = engine.subscribe();

    engine.register("/a", None).unwrap();

    assert_eq!(next_event(&mut first).await, data("/a", None, json!(true)));
    assert_eq!(next_event(&mut second).await, data("/a", None, json!(true)));
    engine.shutdown();
}
