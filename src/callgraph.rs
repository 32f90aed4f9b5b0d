//! The call graph produced by a run.
//!
//! Nodes are contours ([`CgnId`]), edges carry the call site (absent for
//! the synthetic root's calls to the entry points). The graph is built
//! from the solved points-to sets of each call site's `targets` node.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;

use crate::analysis::CgnId;
use crate::ssa::InstrRef;

#[derive(Debug)]
pub struct CallGraph {
    graph: DiGraph<CgnId, Option<InstrRef>>,
    root: NodeIndex,
    index: HashMap<CgnId, NodeIndex>,
}

impl CallGraph {
    pub(crate) fn new(root: CgnId) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        let root_ix = graph.add_node(root);
        index.insert(root, root_ix);
        CallGraph {
            graph,
            root: root_ix,
            index,
        }
    }

    pub(crate) fn ensure(&mut self, cgn: CgnId) -> NodeIndex {
        if let Some(&ix) = self.index.get(&cgn) {
            return ix;
        }
        let ix = self.graph.add_node(cgn);
        self.index.insert(cgn, ix);
        ix
    }

    pub(crate) fn add_edge(&mut self, caller: CgnId, site: Option<InstrRef>, callee: CgnId) {
        let a = self.ensure(caller);
        let b = self.ensure(callee);
        // One edge per (site, callee) pair.
        let exists = self
            .graph
            .edges_connecting(a, b)
            .any(|e| *e.weight() == site);
        if !exists {
            self.graph.add_edge(a, b, site);
        }
    }

    pub fn root(&self) -> CgnId {
        self.graph[self.root]
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All `(caller, site, callee)` edges.
    pub fn edges(&self) -> Vec<(CgnId, Option<InstrRef>, CgnId)> {
        self.graph
            .edge_indices()
            .map(|e| {
                let (a, b) = self.graph.edge_endpoints(e).unwrap();
                (self.graph[a], self.graph[e], self.graph[b])
            })
            .collect()
    }

    /// Callees reachable from `caller` in one step.
    pub fn callees_of(&self, caller: CgnId) -> Vec<CgnId> {
        match self.index.get(&caller) {
            Some(&ix) => self.graph.neighbors(ix).map(|n| self.graph[n]).collect(),
            None => Vec::new(),
        }
    }

    /// Every contour reachable from the root, root included.
    pub fn reachable(&self) -> HashSet<CgnId> {
        let mut seen = HashSet::new();
        let mut bfs = Bfs::new(&self.graph, self.root);
        while let Some(ix) = bfs.next(&self.graph) {
            seen.insert(self.graph[ix]);
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_are_deduplicated() {
        let mut cg = CallGraph::new(CgnId(0));
        cg.add_edge(CgnId(0), None, CgnId(1));
        cg.add_edge(CgnId(0), None, CgnId(1));
        assert_eq!(cg.edge_count(), 1);
        assert_eq!(cg.callees_of(CgnId(0)), vec![CgnId(1)]);
    }

    #[test]
    fn reachability_from_root() {
        let mut cg = CallGraph::new(CgnId(0));
        cg.add_edge(CgnId(0), None, CgnId(1));
        cg.add_edge(CgnId(1), None, CgnId(2));
        // An island, not reachable.
        cg.add_edge(CgnId(5), None, CgnId(6));
        let r = cg.reachable();
        assert!(r.contains(&CgnId(0)));
        assert!(r.contains(&CgnId(2)));
        assert!(!r.contains(&CgnId(6)));
    }
}
