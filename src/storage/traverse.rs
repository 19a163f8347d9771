use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::types::{EdgeKey, Result, VertexId};

use super::graph::GraphStore;
use super::kv::KvStore;

/// One edge reached during [`walk`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraversalStep {
    /// Hops from the root; the root's own edges are at depth 1.
    pub depth: usize,
    /// The edge followed.
    pub edge: EdgeKey,
}

/// Breadth-first walk over outgoing edges, up to `max_depth` hops.
///
/// Uses an explicit frontier queue so deep graphs cannot exhaust the stack.
/// Each vertex is expanded at most once; edges into already-expanded vertices
/// are still reported.
pub fn walk<S: KvStore>(
    graph: &GraphStore<S>,
    root: &VertexId,
    max_depth: usize,
) -> Result<Vec<TraversalStep>> {
    let mut steps = Vec::new();
    let mut expanded: FxHashSet<VertexId> = FxHashSet::default();
    let mut frontier: VecDeque<(VertexId, usize)> = VecDeque::new();
    frontier.push_back((root.clone(), 0));

    while let Some((vertex, depth)) = frontier.pop_front() {
        if depth >= max_depth || !expanded.insert(vertex.clone()) {
            continue;
        }
        for edge in graph.outgoing_edges(&vertex)? {
            let edge = edge?;
            if !expanded.contains(&edge.dest) {
                frontier.push_back((edge.dest.clone(), depth + 1));
            }
            steps.push(TraversalStep {
                depth: depth + 1,
                edge,
            });
        }
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use crate::storage::options::GraphConfig;

    #[test]
    fn walk_is_bounded_by_depth_and_handles_cycles() {
        let g =
            GraphStore::open(&MemoryStore::new(), &GraphConfig::new("vertex", "edge")).unwrap();
        for (s, d) in [("a", "b"), ("b", "c"), ("c", "a"), ("c", "d")] {
            g.put_edge(&EdgeKey::new(s, "next", d), &[]).unwrap();
        }
        let one = walk(&g, &VertexId::from("a"), 1).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].edge.dest, VertexId::from("b"));

        let all = walk(&g, &VertexId::from("a"), 10).unwrap();
        let depths: Vec<usize> = all.iter().map(|s| s.depth).collect();
        assert_eq!(depths, vec![1, 2, 3, 3]);
        assert!(walk(&g, &VertexId::from("a"), 0).unwrap().is_empty());
    }
}
