//! # Path Tree
//!
//! The hierarchical namespace of every path ever registered with an engine.
//! Nodes live in an arena (`Vec<Node>`) and are addressed by [`NodeId`]; the
//! parent link is a plain index, so upward walks never need shared ownership.
//! Nodes are created lazily and never removed.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{json, Value};

/// Index of a node inside a [`PathTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// One segment of a registered path.
#[derive(Debug, Clone)]
pub struct Node {
    /// The path segment this node represents (empty for the root).
    pub name: String,
    /// Full path from the root, e.g. `/a/b`. The root has an empty path.
    pub path: String,
    /// Back-reference used for upward traversal only. `None` for the root.
    pub parent: Option<NodeId>,
    /// Children keyed by segment name. Ordered so fan-out order is stable.
    pub children: BTreeMap<String, NodeId>,
    /// Set when a caller registered exactly this path.
    pub wants_data: bool,
    /// Set while this node is an active poll target.
    pub is_polled: bool,
    /// Minimum refresh interval requested for this node or consolidated beneath it.
    pub rate: Option<Duration>,
}

impl Node {
    fn new(name: &str, path: String, parent: Option<NodeId>) -> Self {
        Self {
            name: name.to_string(),
            path,
            parent,
            children: BTreeMap::new(),
            wants_data: false,
            is_polled: false,
            rate: None,
        }
    }
}

/// Arena-backed tree of path segments.
#[derive(Debug, Clone)]
pub struct PathTree {
    nodes: Vec<Node>,
}

impl Default for PathTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PathTree {
    /// Creates a tree holding only the root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new("", String::new(), None)],
        }
    }

    /// The root node id. The root is never a poll target.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when only the root exists.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Walks down from the root and returns the terminal node, creating every
    /// missing segment on the way. New nodes start with `wants_data = false`;
    /// existing nodes are not touched. An empty slice yields the root.
    pub fn ensure_path<S: AsRef<str>>(&mut self, segments: &[S]) -> NodeId {
        let mut current = self.root();
        for segment in segments {
            let segment = segment.as_ref();
            current = match self.nodes[current.0].children.get(segment) {
                Some(&child) => child,
                None => self.create_child(current, segment),
            };
        }
        current
    }

    /// Read-only lookup of a path given as segments.
    pub fn find<S: AsRef<str>>(&self, segments: &[S]) -> Option<NodeId> {
        segments.iter().try_fold(self.root(), |current, segment| {
            self.nodes[current.0].children.get(segment.as_ref()).copied()
        })
    }

    /// Lookup by full path string (`/a/b`).
    pub fn find_path(&self, path: &str) -> Option<NodeId> {
        self.find(&split_path(path))
    }

    /// Iterates from `id` up to, but excluding, the root.
    pub fn ancestors_inclusive(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let root = self.root();
        std::iter::successors(Some(id), move |&current| self.nodes[current.0].parent)
            .take_while(move |&current| current != root)
    }

    /// Every node in the subtree rooted at `id`, `id` first.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.nodes[current.0].children.values().rev().copied());
        }
        out
    }

    /// Nested JSON dump of the tree, handy for debugging consolidation decisions.
    pub fn snapshot(&self) -> Value {
        self.snapshot_node(self.root())
    }

    fn snapshot_node(&self, id: NodeId) -> Value {
        let node = &self.nodes[id.0];
        let children: serde_json::Map<String, Value> = node
            .children
            .iter()
            .map(|(name, &child)| (name.clone(), self.snapshot_node(child)))
            .collect();
        json!({
            "name": node.name,
            "path": node.path,
            "emit": node.wants_data,
            "poll": node.is_polled,
            "rateMs": node.rate.map(|r| r.as_millis() as u64),
            "children": children,
        })
    }

    fn create_child(&mut self, parent: NodeId, name: &str) -> NodeId {
        let path = format!("{}/{}", self.nodes[parent.0].path, name);
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(name, path, Some(parent)));
        self.nodes[parent.0].children.insert(name.to_string(), id);
        id
    }
}

/// Splits `/a/b/c` into `["a", "b", "c"]`, dropping empty segments from
/// leading, doubled or trailing slashes.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_path_builds_intermediate_nodes() {
        let mut tree = PathTree::new();
        let baa = tree.ensure_path(&["moo", "baa"]);
        let moo = tree.find(&["moo"]).unwrap();

        assert_eq!(tree.node(baa).name, "baa");
        assert_eq!(tree.node(baa).path, "/moo/baa");
        assert_eq!(tree.node(baa).parent, Some(moo));
        assert_eq!(tree.node(moo).children.get("baa"), Some(&baa));
        assert!(!tree.node(moo).wants_data);
        assert_eq!(tree.node(moo).parent, Some(tree.root()));
    }

    #[test]
    fn test_ensure_path_reuses_existing_nodes() {
        let mut tree = PathTree::new();
        let first = tree.ensure_path(&["moo", "baa"]);
        tree.node_mut(first).wants_data = true;
        tree.node_mut(first).is_polled = true;

        let woof = tree.ensure_path(&["moo", "baa", "woof"]);
        assert_eq!(tree.node(woof).path, "/moo/baa/woof");
        assert_eq!(tree.ensure_path(&["moo", "baa"]), first);
        assert!(tree.node(first).wants_data);
        assert!(tree.node(first).is_polled);
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_empty_segments_refer_to_root() {
        let mut tree = PathTree::new();
        let empty: [&str; 0] = [];
        assert_eq!(tree.ensure_path(&empty), tree.root());
        assert!(tree.is_empty());
        assert_eq!(tree.node(tree.root()).path, "");
    }

    #[test]
    fn test_split_path_ignores_empty_segments() {
        assert_eq!(split_path("/a/b/c"), vec!["a", "b", "c"]);
        assert_eq!(split_path("//a//b/"), vec!["a", "b"]);
        assert!(split_path("/").is_empty());
    }

    #[test]
    fn test_ancestors_stop_before_root() {
        let mut tree = PathTree::new();
        let c = tree.ensure_path(&["a", "b", "c"]);
        let paths: Vec<_> = tree
            .ancestors_inclusive(c)
            .map(|id| tree.node(id).path.clone())
            .collect();
        assert_eq!(paths, vec!["/a/b/c", "/a/b", "/a"]);
    }

    #[test]
    fn test_subtree_and_find_path() {
        let mut tree = PathTree::new();
        tree.ensure_path(&["a", "b"]);
        tree.ensure_path(&["a", "c", "d"]);
        let a = tree.find_path("/a").unwrap();
        let paths: Vec<_> = tree.subtree(a).into_iter().map(|id| tree.node(id).path.clone()).collect();
        assert_eq!(paths, vec!["/a", "/a/b", "/a/c", "/a/c/d"]);
        assert!(tree.find_path("/a/x").is_none());
    }

    #[test]
    fn test_snapshot_reports_flags() {
        let mut tree = PathTree::new();
        let b = tree.ensure_path(&["a", "b"]);
        tree.node_mut(b).wants_data = true;
        tree.node_mut(b).rate = Some(Duration::from_millis(250));

        let snap = tree.snapshot();
        let b_snap = &snap["children"]["a"]["children"]["b"];
        assert_eq!(b_snap["path"], "/a/b");
        assert_eq!(b_snap["emit"], true);
        assert_eq!(b_snap["poll"], false);
        assert_eq!(b_snap["rateMs"], 250);
    }
}
