//! In-memory node registry: the ordered set of nodes plus the framework id.

use fsgrid_core::expr;

use crate::error::{StateError, StateResult};
use crate::node::{Node, NodeState, NodeType};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
    framework_id: Option<String>,
    nodes: Vec<Node>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn framework_id(&self) -> Option<&str> {
        self.framework_id.as_deref()
    }

    pub fn set_framework_id(&mut self, framework_id: Option<String>) {
        self.framework_id = framework_id;
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut()
    }

    pub fn ids(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn require(&self, id: &str) -> StateResult<&Node> {
        self.node(id).ok_or_else(|| StateError::NotFound(id.to_string()))
    }

    pub fn require_mut(&mut self, id: &str) -> StateResult<&mut Node> {
        self.node_mut(id)
            .ok_or_else(|| StateError::NotFound(id.to_string()))
    }

    pub fn nodes_of_type(&self, node_type: NodeType) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |n| n.node_type == node_type)
    }

    pub fn nodes_in_state(&self, state: NodeState) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |n| n.state == state)
    }

    /// The single namenode, if one is registered.
    pub fn namenode(&self) -> Option<&Node> {
        self.nodes_of_type(NodeType::Namenode).next()
    }

    /// Node whose current runtime carries `task_id`.
    pub fn node_by_task(&self, task_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.task_id() == Some(task_id))
    }

    pub fn node_by_task_mut(&mut self, task_id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.task_id() == Some(task_id))
    }

    /// Append a node. Ids are unique and at most one namenode exists.
    pub fn add_node(&mut self, node: Node) -> StateResult<&mut Node> {
        if self.node(&node.id).is_some() {
            return Err(StateError::DuplicateNode(node.id));
        }
        if node.node_type == NodeType::Namenode && self.namenode().is_some() {
            return Err(StateError::SecondCoordinator);
        }

        self.nodes.push(node);
        let last = self.nodes.len() - 1;
        Ok(&mut self.nodes[last])
    }

    /// Remove an idle node.
    pub fn remove_node(&mut self, id: &str) -> StateResult<Node> {
        let idx = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| StateError::NotFound(id.to_string()))?;

        if !self.nodes[idx].is_idle() {
            return Err(StateError::NotIdle(id.to_string()));
        }
        Ok(self.nodes.remove(idx))
    }

    /// Expand a node id expression against the registered ids.
    pub fn expand(&self, expression: &str) -> StateResult<Vec<String>> {
        Ok(expr::expand(expression, &self.ids())?)
    }

    /// Drop all nodes and the framework id.
    pub fn reset(&mut self) {
        self.framework_id = None;
        self.nodes.clear();
    }

    pub(crate) fn from_parts(framework_id: Option<String>, nodes: Vec<Node>) -> StateResult<Self> {
        let mut registry = Self {
            framework_id,
            nodes: Vec::with_capacity(nodes.len()),
        };
        for node in nodes {
            registry.add_node(node)?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::tests::runtime;
    use crate::node::Reservation;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.add_node(Node::new("nn", NodeType::Namenode)).unwrap();
        registry.add_node(Node::new("dn0", NodeType::Datanode)).unwrap();
        registry.add_node(Node::new("dn1", NodeType::Datanode)).unwrap();
        registry
    }

    #[test]
    fn add_keeps_order() {
        assert_eq!(registry().ids(), vec!["nn", "dn0", "dn1"]);
    }

    #[test]
    fn add_rejects_duplicates() {
        let mut registry = registry();
        let err = registry
            .add_node(Node::new("dn0", NodeType::Datanode))
            .unwrap_err();
        assert!(matches!(err, StateError::DuplicateNode(id) if id == "dn0"));
        assert_eq!(registry.nodes().len(), 3);
    }

    #[test]
    fn add_rejects_second_namenode() {
        let mut registry = registry();
        let err = registry
            .add_node(Node::new("nn2", NodeType::Namenode))
            .unwrap_err();
        assert!(matches!(err, StateError::SecondCoordinator));
        assert_eq!(err.to_string(), "second name node is not supported");
    }

    #[test]
    fn remove_requires_idle() {
        let mut registry = registry();
        registry.require_mut("dn0").unwrap().start().unwrap();

        assert!(matches!(registry.remove_node("dn0"), Err(StateError::NotIdle(_))));
        assert!(matches!(registry.remove_node("x"), Err(StateError::NotFound(_))));

        let removed = registry.remove_node("dn1").unwrap();
        assert_eq!(removed.id, "dn1");
        assert_eq!(registry.ids(), vec!["nn", "dn0"]);
    }

    #[test]
    fn lookup_by_type_state_and_task() {
        let mut registry = registry();
        assert_eq!(registry.namenode().unwrap().id, "nn");
        assert_eq!(registry.nodes_of_type(NodeType::Datanode).count(), 2);

        let dn1 = registry.require_mut("dn1").unwrap();
        dn1.start().unwrap();
        dn1.attach_runtime(runtime("task-1", "h"), Reservation::default());

        assert_eq!(registry.nodes_in_state(NodeState::Starting).count(), 1);
        assert_eq!(registry.node_by_task("task-1").unwrap().id, "dn1");
        assert!(registry.node_by_task("task-2").is_none());
    }

    #[test]
    fn expand_expressions() {
        let registry = registry();
        assert_eq!(registry.expand("*").unwrap(), vec!["nn", "dn0", "dn1"]);
        assert_eq!(registry.expand("dn*").unwrap(), vec!["dn0", "dn1"]);
        assert!(matches!(registry.expand("dn3..1"), Err(StateError::InvalidExpr(_))));
    }

    #[test]
    fn reset_clears_everything() {
        let mut registry = registry();
        registry.set_framework_id(Some("fw".into()));
        registry.reset();
        assert!(registry.framework_id().is_none());
        assert!(registry.nodes().is_empty());
    }
}
