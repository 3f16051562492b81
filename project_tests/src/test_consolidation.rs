//! # Consolidation Integration Tests
//!
//! Drives the public `Consolidator` API and checks which paths end up being
//! polled, and at what rate, for different registration sequences.

use std::sync::Arc;
use std::time::Duration;

use lib_consolidator::{Consolidator, ConsolidatorError, FetchResponse, ScriptedFetcher};
use project_tests::init_logging;
use serde_json::Value;

fn engine() -> Consolidator<Arc<ScriptedFetcher>> {
    init_logging();
    let fetcher = Arc::new(ScriptedFetcher::new());
    Consolidator::new(fetcher)
}

/// Walks a tree snapshot and checks that every subscriber is covered by
/// exactly one polled ancestor-or-self.
fn assert_minimal_cover(snapshot: &Value, polled_above: usize) {
    let polled_here = polled_above + usize::from(snapshot["poll"] == true);
    if snapshot["emit"] == true {
        assert_eq!(polled_here, 1, "{} is covered by {} poll targets", snapshot["path"], polled_here);
    }
    if let Some(children) = snapshot["children"].as_object() {
        for child in children.values() {
            assert_minimal_cover(child, polled_here);
        }
    }
}

#[tokio::test]
async fn test_single_branch_is_polled_directly() {
    let engine = engine();
    assert_eq!(engine.register("/a/b/c", None).unwrap(), "/a/b/c");
    assert_eq!(engine.polled_paths(), vec!["/a/b/c"]);
    assert!(!engine.is_polled("/a/b"));
    engine.shutdown();
}

#[tokio::test]
async fn test_sibling_registrations_consolidate_to_parent() {
    let engine = engine();
    engine.register("/a/b", None).unwrap();
    assert_eq!(engine.polled_paths(), vec!["/a/b"]);

    assert_eq!(engine.register("/a/c", None).unwrap(), "/a");
    assert_eq!(engine.polled_paths(), vec!["/a"]);
    assert!(!engine.is_polled("/a/b"));
    assert!(!engine.is_polled("/a/c"));
    assert!(engine.wants_data("/a/b"));
    assert!(!engine.wants_data("/a"));
    engine.shutdown();
}

#[tokio::test]
async fn test_minimal_cover_holds_after_every_registration() {
    let engine = engine();
    let paths = [
        "/fleet/1/speed",
        "/fleet/1/heading",
        "/fleet/2/speed",
        "/weather",
        "/fleet/2",
        "/weather/wind/dir",
        "/ports/a/b/c",
        "/fleet",
    ];
    for path in paths {
        engine.register(path, Some(Duration::from_millis(200))).unwrap();
        assert_minimal_cover(&engine.tree_snapshot(), 0);
    }
    assert_eq!(engine.polled_paths(), vec!["/fleet", "/ports/a/b/c", "/weather"]);
    engine.shutdown();
}

#[tokio::test]
async fn test_rate_consolidates_to_fastest_on_walked_chain() {
    let engine = engine();
    engine.register("/a/b", Some(Duration::from_millis(2000))).unwrap();
    assert_eq!(engine.register("/a/b/c", Some(Duration::from_millis(500))).unwrap(), "/a/b");

    assert_eq!(engine.polled_paths(), vec!["/a/b"]);
    assert_eq!(engine.rate("/a/b"), Some(Duration::from_millis(500)));
    engine.shutdown();
}

#[tokio::test]
async fn test_rate_merge_ignores_other_branches() {
    let engine = engine();
    engine.register("/a/b", Some(Duration::from_millis(100))).unwrap();
    engine.register("/a/c", Some(Duration::from_millis(3000))).unwrap();

    // Only /a/c and /a were on the walked chain; /a/b's 100ms is not revisited.
    assert_eq!(engine.rate("/a"), Some(Duration::from_millis(3000)));
    engine.shutdown();
}

#[tokio::test]
async fn test_default_rate_applies_when_none_given() {
    let engine = engine();
    engine.register("/a", None).unwrap();
    assert_eq!(engine.rate("/a"), Some(Duration::from_millis(1000)));
    engine.shutdown();
}

#[tokio::test]
async fn test_invalid_paths_are_rejected() {
    let engine = engine();
    for path in ["", "/", "//", "a/b"] {
        assert_eq!(
            engine.register(path, None).unwrap_err(),
            ConsolidatorError::InvalidPath(path.to_string())
        );
    }
    assert!(engine.polled_paths().is_empty());
}

#[tokio::test]
async fn test_registration_after_shutdown_updates_tree_only() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.respond_with("/a", Ok(FetchResponse::json("{}")));
    let engine = Consolidator::new(Arc::clone(&fetcher));
    engine.shutdown();

    engine.register("/a", None).unwrap();
    tokio::task::yield_now().await;

    assert!(engine.is_shut_down());
    assert!(engine.is_polled("/a"));
    assert_eq!(fetcher.calls("/a"), 0);
}
