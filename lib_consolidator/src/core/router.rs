//! # Data Router
//!
//! Matches a polled response against the subtree of the node it was fetched
//! for and produces one `data` event per subscriber whose slice is present.
//! The walk is driven by the tree: response keys without a node are ignored
//! and nodes without a key are skipped.

use serde_json::Value;

use crate::core::events::ConsolidatorEvent;
use crate::core::tree::{split_path, NodeId, PathTree};
use crate::errors::ConsolidatorError;

/// Resolves `origin` in the tree and collects the events for `data`.
///
/// Returns `UnknownOrigin` when no node exists for `origin`; callers log it
/// as a warning instead of emitting an error event.
pub fn route(tree: &PathTree, origin: &str, data: &Value) -> Result<Vec<ConsolidatorEvent>, ConsolidatorError> {
    let node_id = tree
        .find(&split_path(origin))
        .ok_or_else(|| ConsolidatorError::UnknownOrigin(origin.to_string()))?;

    let mut events = Vec::new();
    let node = tree.node(node_id);
    if node.wants_data {
        events.push(ConsolidatorEvent::Data {
            origin: node.path.clone(),
            source: None,
            data: data.clone(),
        });
    }
    descend(tree, node_id, origin, data, &mut events);
    Ok(events)
}

fn descend(tree: &PathTree, node_id: NodeId, source: &str, value: &Value, events: &mut Vec<ConsolidatorEvent>) {
    for (name, &child_id) in &tree.node(node_id).children {
        let Some(child_value) = child_slice(value, name) else {
            continue;
        };
        let child = tree.node(child_id);
        if child.wants_data {
            events.push(ConsolidatorEvent::Data {
                origin: child.path.clone(),
                source: Some(source.to_string()),
                data: child_value.clone(),
            });
        }
        if !child.children.is_empty() && (child_value.is_object() || child_value.is_array()) {
            descend(tree, child_id, source, child_value, events);
        }
    }
}

/// Looks up a segment in an object by key, or in an array by index.
fn child_slice<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn subscribe(tree: &mut PathTree, path: &str) {
        let id = tree.ensure_path(&split_path(path));
        tree.node_mut(id).wants_data = true;
    }

    fn data_events(events: &[ConsolidatorEvent]) -> Vec<(String, Option<String>, Value)> {
        events
            .iter()
            .filter_map(|e| match e {
                ConsolidatorEvent::Data { origin, source, data } => Some((origin.clone(), source.clone(), data.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_origin_and_child_subscribers_receive_their_slices() {
        let mut tree = PathTree::new();
        subscribe(&mut tree, "/a/b");
        subscribe(&mut tree, "/a/b/x");

        let body = json!({"x": "v1", "y": "v2"});
        let events = data_events(&route(&tree, "/a/b", &body).unwrap());

        assert_eq!(
            events,
            vec![
                ("/a/b".to_string(), None, body.clone()),
                ("/a/b/x".to_string(), Some("/a/b".to_string()), json!("v1")),
            ]
        );
    }

    #[test]
    fn test_nested_subscribers_are_reached_through_unsubscribed_nodes() {
        let mut tree = PathTree::new();
        subscribe(&mut tree, "/a/b/c");
        subscribe(&mut tree, "/a/d");

        let body = json!({"b": {"c": 3, "z": 9}, "d": [1, 2], "e": true});
        let events = data_events(&route(&tree, "/a", &body).unwrap());

        assert_eq!(
            events,
            vec![
                ("/a/b/c".to_string(), Some("/a".to_string()), json!(3)),
                ("/a/d".to_string(), Some("/a".to_string()), json!([1, 2])),
            ]
        );
    }

    #[test]
    fn test_missing_keys_are_skipped() {
        let mut tree = PathTree::new();
        subscribe(&mut tree, "/a/b");
        subscribe(&mut tree, "/a/c");

        let events = route(&tree, "/a", &json!({"b": 1})).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].origin(), Some("/a/b"));
    }

    #[test]
    fn test_array_elements_are_addressed_by_index() {
        let mut tree = PathTree::new();
        subscribe(&mut tree, "/foo/bar/0");
        subscribe(&mut tree, "/foo/bar/2");

        let events = data_events(&route(&tree, "/foo/bar", &json!(["zero", "one"])).unwrap());
        assert_eq!(events, vec![("/foo/bar/0".to_string(), Some("/foo/bar".to_string()), json!("zero"))]);
    }

    #[test]
    fn test_scalar_response_stops_descent() {
        let mut tree = PathTree::new();
        subscribe(&mut tree, "/a");
        subscribe(&mut tree, "/a/b");

        let events = route(&tree, "/a", &json!(42)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].origin(), Some("/a"));
    }

    #[test]
    fn test_unknown_origin_is_reported() {
        let tree = PathTree::new();
        let err = route(&tree, "/nowhere", &json!({})).unwrap_err();
        assert_eq!(err, ConsolidatorError::UnknownOrigin("/nowhere".into()));
    }
}
