use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use tracing::info;

use crate::common::{Decision, NodeError, NodeId, SafetyViolation, Value};
use crate::consensus::NodeReport;
use super::bootstrap::Bootstrap;

/// Outcome of one run, assembled from the reports of every node.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub nodes: usize,
    pub decisions: BTreeMap<NodeId, Decision>,
    pub latencies: BTreeMap<NodeId, Duration>,
    pub crashed: BTreeSet<NodeId>,
    pub fault_prone: BTreeSet<NodeId>,
    pub leader: Option<NodeId>,
    /// Every value some node proposed during the run.
    pub proposed: BTreeSet<Value>,
    /// Number of proposal rounds started across all nodes.
    pub rounds: usize,
    pub failures: Vec<NodeError>,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn new(nodes: usize, bootstrap: &Bootstrap) -> Self {
        RunReport {
            nodes,
            decisions: BTreeMap::new(),
            latencies: BTreeMap::new(),
            crashed: BTreeSet::new(),
            fault_prone: bootstrap.fault_prone.clone(),
            leader: Some(bootstrap.leader),
            proposed: BTreeSet::new(),
            rounds: 0,
            failures: Vec::new(),
            timed_out: false,
            elapsed: Duration::ZERO,
        }
    }

    pub fn record(&mut self, report: NodeReport) {
        match report {
            NodeReport::Proposed { value, .. } => {
                self.proposed.insert(value);
                self.rounds += 1;
            }
            NodeReport::Decided {
                node,
                decision,
                latency,
            } => {
                self.decisions.insert(node, decision);
                if let Some(latency) = latency {
                    self.latencies.insert(node, latency);
                }
            }
            NodeReport::Crashed { node } => {
                self.crashed.insert(node);
            }
            NodeReport::Failed { error, .. } => self.failures.push(error),
        }
    }

    /// Every node has either decided or crashed.
    pub fn is_complete(&self) -> bool {
        NodeId::all(self.nodes)
            .all(|id| self.decisions.contains_key(&id) || self.crashed.contains(&id))
    }

    /// Non-crashed nodes that have not learned a decision.
    pub fn undecided(&self) -> Vec<NodeId> {
        NodeId::all(self.nodes)
            .filter(|id| !self.decisions.contains_key(id) && !self.crashed.contains(id))
            .collect()
    }

    /// Checks agreement and validity over every decision made in the run
    /// and returns the agreed value, if any node decided.
    pub fn check(&self) -> Result<Option<Value>, SafetyViolation> {
        let mut agreed: Option<(NodeId, Value)> = None;
        for (node, decision) in &self.decisions {
            if !self.proposed.contains(&decision.value) {
                return Err(SafetyViolation::InvalidValue {
                    node: *node,
                    value: decision.value,
                });
            }
            match agreed {
                None => agreed = Some((*node, decision.value)),
                Some((first, value)) if value != decision.value => {
                    return Err(SafetyViolation::Disagreement {
                        first,
                        first_value: value,
                        second: *node,
                        second_value: decision.value,
                    });
                }
                Some(_) => {}
            }
        }
        Ok(agreed.map(|(_, value)| value))
    }

    pub fn log_summary(&self) {
        info!(
            nodes = self.nodes,
            decided = self.decisions.len(),
            crashed = self.crashed.len(),
            rounds = self.rounds,
            timed_out = self.timed_out,
            elapsed = ?self.elapsed,
            "run finished"
        );
    }
}
