//! Arena-indexed code graph (§4.2).
//!
//! Nodes live in a flat `Vec` and are referenced by `NodeIndex(u32)`, never
//! by `Rc`/`Arc` — the redesign note calls for integer-arena storage so the
//! graph can be serialized and rebuilt without a reference-counted web of
//! pointers. A `HashMap<String, NodeIndex>` sits alongside the arena for
//! lookups by node label, since that remains a supported query path.

use crate::model::{EdgeKind, GraphEdge, GraphNode, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct GraphFile {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

#[derive(Debug, Default)]
pub struct CodeGraph {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    by_label: HashMap<String, NodeIndex>,
    // adjacency[from.0 as usize] -> indices into `edges`
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

impl CodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing node's index if `label` is already present,
    /// otherwise inserts a new one.
    pub fn get_or_insert_node(&mut self, file: &str, symbol_name: &str) -> NodeIndex {
        let label = format!("{file}:{symbol_name}");
        if let Some(existing) = self.by_label.get(&label) {
            return *existing;
        }
        let index = NodeIndex(self.nodes.len() as u32);
        self.nodes.push(GraphNode {
            label: label.clone(),
            file: file.to_string(),
            symbol_name: symbol_name.to_string(),
        });
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        self.by_label.insert(label, index);
        index
    }

    pub fn node(&self, index: NodeIndex) -> Option<&GraphNode> {
        self.nodes.get(index.0 as usize)
    }

    pub fn find_node(&self, file: &str, symbol_name: &str) -> Option<NodeIndex> {
        self.by_label.get(&format!("{file}:{symbol_name}")).copied()
    }

    /// Inserts an edge, deduplicating on `(from, to, kind)` by keeping the
    /// higher confidence score of the two.
    pub fn insert_edge(&mut self, from: NodeIndex, to: NodeIndex, kind: EdgeKind, confidence: f32) {
        for &idx in &self.outgoing[from.0 as usize] {
            let existing = &mut self.edges[idx];
            if existing.to == to && existing.kind == kind {
                if confidence > existing.confidence {
                    existing.confidence = confidence;
                }
                return;
            }
        }
        let index = self.edges.len();
        self.edges.push(GraphEdge { from, to, kind, confidence });
        self.outgoing[from.0 as usize].push(index);
        self.incoming[to.0 as usize].push(index);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Direct callees/importers of `from`, depth-bounded breadth-first
    /// traversal over outgoing edges of `kind`.
    pub fn outgoing_related(&self, from: NodeIndex, kind: EdgeKind, max_depth: usize) -> Vec<(NodeIndex, usize)> {
        self.traverse(from, kind, max_depth, true)
    }

    /// Direct callers/importers of `to`, depth-bounded breadth-first
    /// traversal over incoming edges of `kind`.
    pub fn incoming_related(&self, to: NodeIndex, kind: EdgeKind, max_depth: usize) -> Vec<(NodeIndex, usize)> {
        self.traverse(to, kind, max_depth, false)
    }

    fn traverse(&self, start: NodeIndex, kind: EdgeKind, max_depth: usize, forward: bool) -> Vec<(NodeIndex, usize)> {
        use std::collections::VecDeque;
        let mut visited = vec![false; self.nodes.len()];
        let mut queue = VecDeque::new();
        let mut result = Vec::new();
        visited[start.0 as usize] = true;
        queue.push_back((start, 0usize));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let edge_indices = if forward {
                &self.outgoing[current.0 as usize]
            } else {
                &self.incoming[current.0 as usize]
            };
            for &edge_idx in edge_indices {
                let edge = &self.edges[edge_idx];
                if edge.kind != kind {
                    continue;
                }
                let neighbor = if forward { edge.to } else { edge.from };
                if visited[neighbor.0 as usize] {
                    continue;
                }
                visited[neighbor.0 as usize] = true;
                result.push((neighbor, depth + 1));
                queue.push_back((neighbor, depth + 1));
            }
        }
        result
    }

    /// Whether a path from `from` to `to` exists via edges of `kind`
    /// (cycle-safe: visited set prevents infinite loops on circular
    /// imports/calls).
    pub fn has_path(&self, from: NodeIndex, to: NodeIndex, kind: EdgeKind) -> bool {
        if from == to {
            return true;
        }
        self.outgoing_related(from, kind, usize::MAX)
            .iter()
            .any(|(n, _)| *n == to)
    }

    /// Labels of symbols directly connected to `(file, symbol_name)` by
    /// either direction of `Calls` or `Imports` edges, capped at `limit` and
    /// deduplicated — used to populate a search result's `related` field
    /// without exposing node indices to callers outside this module.
    pub fn related_labels(&self, file: &str, symbol_name: &str, limit: usize) -> Vec<String> {
        let Some(start) = self.find_node(file, symbol_name) else {
            return Vec::new();
        };
        let mut labels = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for kind in [EdgeKind::Calls, EdgeKind::Imports] {
            for (neighbor, _) in self
                .outgoing_related(start, kind, 1)
                .into_iter()
                .chain(self.incoming_related(start, kind, 1))
            {
                if let Some(node) = self.node(neighbor) {
                    if seen.insert(node.label.clone()) {
                        labels.push(node.label.clone());
                    }
                }
                if labels.len() >= limit {
                    return labels;
                }
            }
        }
        labels
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let file = GraphFile {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        };
        serde_json::to_string_pretty(&file)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        let file: GraphFile = serde_json::from_str(raw)?;
        let mut graph = Self::new();
        for node in file.nodes {
            let index = NodeIndex(graph.nodes.len() as u32);
            graph.by_label.insert(node.label.clone(), index);
            graph.nodes.push(node);
            graph.outgoing.push(Vec::new());
            graph.incoming.push(Vec::new());
        }
        for edge in file.edges {
            graph.insert_edge(edge.from, edge.to, edge.kind, edge.confidence);
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserting_same_label_twice_reuses_the_node() {
        let mut graph = CodeGraph::new();
        let a = graph.get_or_insert_node("a.rs", "foo");
        let b = graph.get_or_insert_node("a.rs", "foo");
        assert_eq!(a, b);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn duplicate_edges_keep_max_confidence() {
        let mut graph = CodeGraph::new();
        let a = graph.get_or_insert_node("a.rs", "foo");
        let b = graph.get_or_insert_node("b.rs", "bar");
        graph.insert_edge(a, b, EdgeKind::Calls, 0.4);
        graph.insert_edge(a, b, EdgeKind::Calls, 0.9);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.outgoing_related(a, EdgeKind::Calls, 1), vec![(b, 1)]);
    }

    #[test]
    fn traversal_handles_cycles() {
        let mut graph = CodeGraph::new();
        let a = graph.get_or_insert_node("a.rs", "foo");
        let b = graph.get_or_insert_node("b.rs", "bar");
        graph.insert_edge(a, b, EdgeKind::Calls, 1.0);
        graph.insert_edge(b, a, EdgeKind::Calls, 1.0);
        let related = graph.outgoing_related(a, EdgeKind::Calls, 10);
        assert_eq!(related.len(), 2);
        assert!(graph.has_path(a, b, EdgeKind::Calls));
        assert!(graph.has_path(b, a, EdgeKind::Calls));
    }

    #[test]
    fn related_labels_covers_both_directions() {
        let mut graph = CodeGraph::new();
        let a = graph.get_or_insert_node("a.rs", "foo");
        let b = graph.get_or_insert_node("b.rs", "bar");
        let c = graph.get_or_insert_node("c.rs", "baz");
        graph.insert_edge(a, b, EdgeKind::Calls, 1.0);
        graph.insert_edge(c, a, EdgeKind::Calls, 1.0);
        let related = graph.related_labels("a.rs", "foo", 10);
        assert!(related.contains(&"b.rs:bar".to_string()));
        assert!(related.contains(&"c.rs:baz".to_string()));
    }

    #[test]
    fn json_roundtrip_preserves_edges() {
        let mut graph = CodeGraph::new();
        let a = graph.get_or_insert_node("a.rs", "foo");
        let b = graph.get_or_insert_node("b.rs", "bar");
        graph.insert_edge(a, b, EdgeKind::Imports, 1.0);
        let json = graph.to_json().unwrap();
        let restored = CodeGraph::from_json(&json).unwrap();
        assert_eq!(restored.node_count(), 2);
        assert_eq!(restored.edge_count(), 1);
    }
}
