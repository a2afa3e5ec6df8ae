use std::collections::{BTreeMap, BTreeSet};

/// Directed module → module edges built from resolved references.
#[derive(Clone, Debug, Default)]
pub struct ReferenceGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Self-edges are ignored.
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let (from, to) = (from.into(), to.into());
        if from == to {
            return;
        }
        self.edges.entry(from).or_default().insert(to);
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// Every distinct cycle reached by a depth-first walk, each closed with its
    /// first node repeated (`[A, B, C, A]`) and rotated to start at its
    /// smallest id.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut walk = CycleWalk {
            graph: self,
            finished: BTreeSet::new(),
            stack: Vec::new(),
            cycles: BTreeSet::new(),
        };
        for start in self.edges.keys() {
            walk.visit(start);
        }
        walk.cycles.into_iter().collect()
    }
}

struct CycleWalk<'g> {
    graph: &'g ReferenceGraph,
    finished: BTreeSet<&'g str>,
    stack: Vec<&'g str>,
    cycles: BTreeSet<Vec<String>>,
}

impl<'g> CycleWalk<'g> {
    fn visit(&mut self, node: &'g str) {
        if let Some(at) = self.stack.iter().position(|entry| *entry == node) {
            self.cycles.insert(canonical_cycle(&self.stack[at..]));
            return;
        }
        if self.finished.contains(node) {
            return;
        }

        let graph = self.graph;
        self.stack.push(node);
        if let Some(targets) = graph.edges.get(node) {
            for target in targets {
                self.visit(target);
            }
        }
        self.stack.pop();
        self.finished.insert(node);
    }
}

fn canonical_cycle(members: &[&str]) -> Vec<String> {
    let start = members
        .iter()
        .enumerate()
        .min_by_key(|(_, id)| **id)
        .map(|(index, _)| index)
        .unwrap_or(0);
    let mut cycle: Vec<String> = members[start..]
        .iter()
        .chain(&members[..start])
        .map(|id| id.to_string())
        .collect();
    if let Some(first) = cycle.first().cloned() {
        cycle.push(first);
    }
    cycle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_node_cycle_is_found_once() {
        let mut graph = ReferenceGraph::new();
        graph.add_edge("REQ-B", "REQ-C");
        graph.add_edge("REQ-C", "REQ-A");
        graph.add_edge("REQ-A", "REQ-B");
        assert_eq!(
            graph.find_cycles(),
            vec![vec!["REQ-A", "REQ-B", "REQ-C", "REQ-A"]]
        );
    }

    #[test]
    fn acyclic_graph_and_self_edges() {
        let mut graph = ReferenceGraph::new();
        graph.add_edge("A", "B");
        graph.add_edge("B", "C");
        graph.add_edge("A", "C");
        graph.add_edge("C", "C");
        assert!(graph.find_cycles().is_empty());
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn separate_cycles_are_reported_separately() {
        let mut graph = ReferenceGraph::new();
        graph.add_edge("A", "B");
        graph.add_edge("B", "A");
        graph.add_edge("C", "D");
        graph.add_edge("D", "C");
        assert_eq!(graph.find_cycles().len(), 2);
    }
}
