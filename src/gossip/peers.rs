use std::collections::HashMap;

use crate::network::message::NodeId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Peers {
    pub members: Vec<NodeId>,
}

impl Peers {
    /// Neighbors of `id` in a topology map. Self-loops and repeats are dropped,
    /// order is kept.
    pub fn from_topology(id: &NodeId, topology: &HashMap<NodeId, Vec<NodeId>>) -> Self {
        let mut members: Vec<NodeId> = Vec::new();
        for peer in topology.get(id).into_iter().flatten() {
            if peer != id && !members.contains(peer) {
                members.push(peer.clone());
            }
        }
        Peers { members }
    }

    pub fn is_member(&self, id: &NodeId) -> bool {
        self.members.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
