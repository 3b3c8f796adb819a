//! `NodeContainer`: an ordered set of node handles.

use crate::error::{SimError, SimResult};
use crate::world::World;

use super::id::NodeId;

/// Node handles in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeContainer {
    nodes: Vec<NodeId>,
}

impl NodeContainer {
    pub fn new() -> Self {
        NodeContainer { nodes: Vec::new() }
    }

    /// Create `count` fresh nodes in `world`.
    pub fn create(world: &mut World, count: u32) -> SimResult<Self> {
        if count == 0 {
            return Err(SimError::InvalidScenario(
                "node count must be positive".into(),
            ));
        }
        let nodes = (0..count).map(|_| world.add_node()).collect();
        Ok(NodeContainer { nodes })
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = NodeId>) -> Self {
        NodeContainer {
            nodes: nodes.into_iter().collect(),
        }
    }

    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.nodes.get(index).copied()
    }

    pub fn first(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    pub fn last(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }

    /// A container holding only `self[index]`.
    pub fn single(&self, index: usize) -> SimResult<NodeContainer> {
        let node = self.get(index).ok_or(SimError::IndexOutOfRange {
            collection: "node",
            index,
            len: self.nodes.len(),
        })?;
        Ok(NodeContainer { nodes: vec![node] })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }
}
