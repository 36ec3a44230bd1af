// src/precedence.rs
//
// =============================================================================
// LABTWIN: PRECEDENCE GRAPH (v 0.3 )
// =============================================================================
//
// Which instruction waits for which.
//
// Responsibilities:
// 1. Directed edges predecessor -> successor between instruction ids.
// 2. Reject any edge that would close a cycle.
// 3. Topological order and Graphviz export for the visualisation layer.

use crate::core::Identifier;
use crate::error::RegistryError;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::dot::{Config, Dot};
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::Direction;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct PrecedenceGraph {
    graph: StableDiGraph<Identifier, ()>,
    id_map: HashMap<Identifier, NodeIndex>,
}

impl PrecedenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.id_map.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Registers a node. Adding an existing id returns its index.
    pub fn add_node(&mut self, id: &str) -> NodeIndex {
        if let Some(&idx) = self.id_map.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(id.to_string());
        self.id_map.insert(id.to_string(), idx);
        idx
    }

    /// Drops a node together with every edge touching it.
    pub fn remove_node(&mut self, id: &str) -> bool {
        match self.id_map.remove(id) {
            Some(idx) => {
                self.graph.remove_node(idx);
                true
            }
            None => false,
        }
    }

    fn index(&self, id: &str) -> Result<NodeIndex, RegistryError> {
        self.id_map
            .get(id)
            .copied()
            .ok_or_else(|| RegistryError::UnknownIdentifier(id.to_string()))
    }

    /// True if `from -> to` would close a cycle.
    pub fn would_cycle(&self, from: &str, to: &str) -> Result<bool, RegistryError> {
        let (a, b) = (self.index(from)?, self.index(to)?);
        Ok(a == b || has_path_connecting(&self.graph, b, a, None))
    }

    /// Adds `from -> to`. Duplicate edges are ignored.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), RegistryError> {
        if self.would_cycle(from, to)? {
            return Err(RegistryError::CyclicPrecedence {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        let (a, b) = (self.index(from)?, self.index(to)?);
        if self.graph.find_edge(a, b).is_none() {
            self.graph.add_edge(a, b, ());
        }
        Ok(())
    }

    fn neighbors(&self, id: &str, dir: Direction) -> Vec<Identifier> {
        let Some(&idx) = self.id_map.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<Identifier> = self
            .graph
            .neighbors_directed(idx, dir)
            .map(|n| self.graph[n].clone())
            .collect();
        out.sort();
        out
    }

    pub fn predecessors(&self, id: &str) -> Vec<Identifier> {
        self.neighbors(id, Direction::Incoming)
    }

    pub fn successors(&self, id: &str) -> Vec<Identifier> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Every edge as (predecessor, successor), sorted.
    pub fn edges(&self) -> Vec<(Identifier, Identifier)> {
        let mut out: Vec<(Identifier, Identifier)> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (self.graph[a].clone(), self.graph[b].clone()))
            .collect();
        out.sort();
        out
    }

    /// Predecessors before successors.
    pub fn topological_order(&self) -> Result<Vec<Identifier>, RegistryError> {
        toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|n| self.graph[n].clone()).collect())
            .map_err(|cycle| {
                let id = self.graph[cycle.node_id()].clone();
                RegistryError::CyclicPrecedence {
                    from: id.clone(),
                    to: id,
                }
            })
    }

    /// Graphviz DOT; `label` renders each node.
    pub fn to_dot(&self, label: impl Fn(&str) -> String) -> String {
        let labelled = self.graph.map(|_, id| label(id.as_str()), |_, _| String::new());
        format!("{}", Dot::with_config(&labelled, &[Config::EdgeNoLabel]))
    }
}
