use std::collections::BTreeSet;

/// Boundary node for a composite's own inputs.
pub const SELF_INPUT: &str = "SELF_INPUT";
/// Boundary node for a composite's own outputs.
pub const SELF_OUTPUT: &str = "SELF_OUTPUT";

pub type NodeId = u32;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("Dataflow graph contains a cycle through: {}", nodes.join(", "))]
    Cycle { nodes: Vec<String> },

    #[error("Unknown dataflow node '{name}'")]
    UnknownNode { name: String },
}

/// Dataflow graph of a composite component.
///
/// Nodes live in an arena (declaration order, boundary nodes last); an edge
/// `(target, source)` records that `target` consumes a value produced by
/// `source`.
#[derive(Debug, Clone)]
pub struct DataflowGraph {
    nodes: Vec<String>,
    edges: Vec<(NodeId, NodeId)>,
}

impl DataflowGraph {
    pub fn new<'a>(subcomponents: impl IntoIterator<Item = &'a str>) -> Self {
        let mut graph = DataflowGraph {
            nodes: Vec::new(),
            edges: Vec::new(),
        };
        for name in subcomponents {
            graph.add_node(name);
        }
        graph.add_node(SELF_INPUT);
        graph.add_node(SELF_OUTPUT);
        graph
    }

    fn add_node(&mut self, name: &str) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(name.to_string());
        id
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n == name)
            .map(|i| i as NodeId)
    }

    pub fn add_edge(&mut self, target: &str, source: &str) -> Result<(), GraphError> {
        let target = self.require(target)?;
        let source = self.require(source)?;
        self.edges.push((target, source));
        Ok(())
    }

    fn require(&self, name: &str) -> Result<NodeId, GraphError> {
        self.node_id(name).ok_or_else(|| GraphError::UnknownNode {
            name: name.to_string(),
        })
    }

    pub fn edges(&self) -> &[(NodeId, NodeId)] {
        &self.edges
    }

    pub fn node_name(&self, id: NodeId) -> &str {
        &self.nodes[id as usize]
    }

    /// Order in which subcomponents must run, boundary nodes excluded.
    ///
    /// Kahn's algorithm; among ready nodes the earliest declared runs first,
    /// so the order is deterministic.
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        let n = self.nodes.len();
        let mut pending = vec![0usize; n];
        let mut consumers: Vec<Vec<NodeId>> = vec![Vec::new(); n];
        for &(target, source) in &self.edges {
            pending[target as usize] += 1;
            consumers[source as usize].push(target);
        }

        let mut ready: BTreeSet<NodeId> = (0..n as NodeId)
            .filter(|&id| pending[id as usize] == 0)
            .collect();
        let mut order = Vec::with_capacity(n);

        while let Some(id) = ready.pop_first() {
            order.push(id);
            for &target in &consumers[id as usize] {
                pending[target as usize] -= 1;
                if pending[target as usize] == 0 {
                    ready.insert(target);
                }
            }
        }

        if order.len() < n {
            let nodes = (0..n)
                .filter(|&i| pending[i] > 0)
                .map(|i| self.nodes[i].clone())
                .collect();
            return Err(GraphError::Cycle { nodes });
        }

        Ok(order
            .into_iter()
            .map(|id| self.node_name(id))
            .filter(|name| *name != SELF_INPUT && *name != SELF_OUTPUT)
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_order() {
        let mut graph = DataflowGraph::new(["c", "b", "a"]);
        graph.add_edge("a", SELF_INPUT).unwrap();
        graph.add_edge("b", "a").unwrap();
        graph.add_edge("c", "b").unwrap();
        graph.add_edge(SELF_OUTPUT, "c").unwrap();
        assert_eq!(graph.topological_order().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_independent_nodes_keep_declaration_order() {
        let graph = DataflowGraph::new(["x", "y", "z"]);
        assert_eq!(graph.topological_order().unwrap(), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = DataflowGraph::new(["a", "b"]);
        graph.add_edge("a", "b").unwrap();
        graph.add_edge("b", "a").unwrap();
        let err = graph.topological_order().unwrap_err();
        assert_eq!(
            err,
            GraphError::Cycle {
                nodes: vec!["a".to_string(), "b".to_string()]
            }
        );
    }

    #[test]
    fn test_self_loop_is_cycle() {
        let mut graph = DataflowGraph::new(["a"]);
        graph.add_edge("a", "a").unwrap();
        assert!(matches!(
            graph.topological_order(),
            Err(GraphError::Cycle { .. })
        ));
    }

    #[test]
    fn test_unknown_node_rejected() {
        let mut graph = DataflowGraph::new(["a"]);
        assert!(matches!(
            graph.add_edge("a", "ghost"),
            Err(GraphError::UnknownNode { .. })
        ));
    }
}
