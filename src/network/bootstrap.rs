use std::collections::BTreeSet;

use rand::{seq::SliceRandom, Rng};
use tracing::info;

use crate::common::NodeId;
use crate::config::SimulationConfig;

/// Orchestrator decisions taken before a run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bootstrap {
    /// Nodes that receive EnableFaultProneness.
    pub fault_prone: BTreeSet<NodeId>,
    /// The only node never put on hold.
    pub leader: NodeId,
}

impl Bootstrap {
    /// Picks `faulty` fault-prone nodes at random and a leader among the
    /// rest. If every node is fault-prone the leader is one of them.
    pub fn plan<R: Rng>(config: &SimulationConfig, rng: &mut R) -> Self {
        let mut ids: Vec<NodeId> = NodeId::all(config.nodes).collect();
        ids.shuffle(rng);
        let (prone, normal) = ids.split_at(config.faulty.min(ids.len()));

        let leader = normal.choose(rng).or_else(|| prone.choose(rng)).copied().unwrap_or(NodeId(1));
        let fault_prone: BTreeSet<NodeId> = prone.iter().copied().collect();
        info!(?fault_prone, %leader, "bootstrap planned");
        Bootstrap { fault_prone, leader }
    }

    /// Every node that receives Hold once the hold delay expires.
    pub fn held(&self, nodes: usize) -> impl Iterator<Item = NodeId> + '_ {
        NodeId::all(nodes).filter(move |id| *id != self.leader)
    }
}
