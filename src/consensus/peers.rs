use std::collections::BTreeSet;

use crate::common::NodeId;

/// Participants a node knows about. Announcements only ever add members.
#[derive(Debug, Clone, Default)]
pub struct Peers {
    members: BTreeSet<NodeId>,
}

impl Peers {
    pub fn new() -> Self {
        Peers::default()
    }

    /// Union with an announced peer list. Returns how many ids were new.
    pub fn merge(&mut self, announced: &BTreeSet<NodeId>) -> usize {
        let before = self.members.len();
        self.members.extend(announced.iter().copied());
        self.members.len() - before
    }

    #[cfg(test)]
    pub fn is_member(&self, id: &NodeId) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.members.iter().copied()
    }

    /// Every known peer other than `me`.
    pub fn others(&self, me: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.iter().filter(move |id| *id != me)
    }
}
