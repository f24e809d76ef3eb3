//! The call graph over implementations.

use std::collections::{HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::Program;

/// Caller-to-callee edges between implementations, identified by their index
/// in the program's implementation list.
#[derive(Debug, Clone)]
pub struct CallGraph {
    graph: DiGraph<usize, ()>,
    nodes: Vec<NodeIndex>,
}

impl CallGraph {
    /// Builds the graph from the call commands of every implementation.
    pub fn build(program: &Program) -> Self {
        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..program.implementations.len())
            .map(|id| graph.add_node(id))
            .collect();

        let impl_of_proc: HashMap<&str, usize> = program
            .implementations
            .iter()
            .enumerate()
            .map(|(id, i)| (i.proc.as_str(), id))
            .collect();

        for (caller, implementation) in program.implementations.iter().enumerate() {
            let mut seen = HashSet::new();
            for callee_proc in implementation.callees() {
                if let Some(&callee) = impl_of_proc.get(callee_proc) {
                    if seen.insert(callee) {
                        graph.add_edge(nodes[caller], nodes[callee], ());
                    }
                }
            }
        }

        CallGraph { graph, nodes }
    }

    /// Implementations called by `id`.
    pub fn callees(&self, id: usize) -> Vec<usize> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Implementations calling `id`.
    pub fn callers(&self, id: usize) -> Vec<usize> {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(&self, id: usize, dir: Direction) -> Vec<usize> {
        match self.nodes.get(id) {
            Some(&node) => self
                .graph
                .neighbors_directed(node, dir)
                .filter_map(|n| self.graph.node_weight(n).copied())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Implementations in reverse-topological SCC order: callees before
    /// callers, so leaves come first.
    pub fn reverse_topological_order(&self) -> Vec<usize> {
        tarjan_scc(&self.graph)
            .into_iter()
            .flatten()
            .filter_map(|n| self.graph.node_weight(n).copied())
            .collect()
    }

    /// Closes the edge relation under paths of length up to `depth`: `depth`
    /// times, every node gains edges to its callees' callees. Used when
    /// implementations are inlined to that depth.
    pub fn close_under_depth(&mut self, depth: usize) {
        for _ in 0..depth {
            let mut additions = Vec::new();
            for &node in &self.nodes {
                let direct: Vec<NodeIndex> = self
                    .graph
                    .neighbors_directed(node, Direction::Outgoing)
                    .collect();
                let mut reachable: HashSet<NodeIndex> = direct.iter().copied().collect();
                for &mid in &direct {
                    for far in self.graph.neighbors_directed(mid, Direction::Outgoing) {
                        if reachable.insert(far) {
                            additions.push((node, far));
                        }
                    }
                }
            }
            if additions.is_empty() {
                break;
            }
            for (from, to) in additions {
                self.graph.add_edge(from, to, ());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Attributes, Block, Cmd, Implementation, Location, Program};

    fn call(callee: &str) -> Cmd {
        Cmd::Call {
            callee: callee.to_string(),
            attributes: Attributes::new(),
            loc: Location::default(),
        }
    }

    fn program_with_calls(edges: &[(&str, &[&str])]) -> Program {
        let mut program = Program::new();
        for (name, callees) in edges {
            let cmds = callees.iter().map(|c| call(c)).collect();
            program.add_implementation(Implementation::new(
                *name,
                *name,
                vec![Block::new("entry", cmds)],
            ));
        }
        program
    }

    #[test]
    fn leaves_come_first() {
        // A -> B -> C; the initial work order starts at the leaf C.
        let program = program_with_calls(&[("A", &["B"]), ("B", &["C"]), ("C", &[])]);
        let graph = program.call_graph();
        let order = graph.reverse_topological_order();
        let pos = |name: &str| {
            let id = program.implementation_of(name).unwrap();
            order.iter().position(|&x| x == id).unwrap()
        };
        assert!(pos("C") < pos("B"));
        assert!(pos("B") < pos("A"));
    }

    #[test]
    fn callers_and_callees() {
        let program = program_with_calls(&[("A", &["B"]), ("B", &[]), ("C", &["B"])]);
        let graph = program.call_graph();
        let a = program.implementation_of("A").unwrap();
        let b = program.implementation_of("B").unwrap();
        let c = program.implementation_of("C").unwrap();

        assert_eq!(graph.callees(a), vec![b]);
        let mut callers = graph.callers(b);
        callers.sort_unstable();
        assert_eq!(callers, vec![a, c]);
    }

    #[test]
    fn recursion_forms_one_scc() {
        let program = program_with_calls(&[("A", &["B"]), ("B", &["A"]), ("C", &["A"])]);
        let graph = program.call_graph();
        let order = graph.reverse_topological_order();
        // The A/B cycle must come before its caller C.
        let c = program.implementation_of("C").unwrap();
        assert_eq!(order.last(), Some(&c));
    }

    #[test]
    fn depth_closure_adds_transitive_edges() {
        let program = program_with_calls(&[("A", &["B"]), ("B", &["C"]), ("C", &[])]);
        let mut graph = program.call_graph();
        let a = program.implementation_of("A").unwrap();
        let c = program.implementation_of("C").unwrap();
        assert!(!graph.callees(a).contains(&c));
        graph.close_under_depth(1);
        assert!(graph.callees(a).contains(&c));
    }

    #[test]
    fn calls_to_procedures_without_bodies_are_ignored() {
        let program = program_with_calls(&[("A", &["Extern", "B"]), ("B", &[])]);
        let graph = program.call_graph();
        let a = program.implementation_of("A").unwrap();
        let b = program.implementation_of("B").unwrap();
        assert_eq!(graph.callees(a), vec![b]);
    }
}
