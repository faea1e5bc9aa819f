use std::time::Duration;

use crate::common::{Ballot, Decision, NodeError, NodeId, Value};
use super::message::Envelope;

/// Facts a node reports to whoever is running it.
#[derive(Debug)]
pub enum NodeReport {
    Proposed {
        node: NodeId,
        ballot: Ballot,
        value: Value,
    },
    Decided {
        node: NodeId,
        decision: Decision,
        latency: Option<Duration>,
    },
    Crashed {
        node: NodeId,
    },
    Failed {
        node: NodeId,
        error: NodeError,
    },
}

/// Side effects of the state machine. The node never touches channels or
/// timers itself; the runtime it is embedded in supplies this.
pub trait Outbox {
    /// Deliver `envelope` to node `to`.
    fn send(&mut self, to: NodeId, envelope: Envelope);

    /// Deliver `envelope` to node `to` after `delay`.
    fn schedule(&mut self, to: NodeId, delay: Duration, envelope: Envelope);

    fn report(&mut self, report: NodeReport);
}

/// Outbox that just records everything, for driving a node by hand.
#[derive(Debug, Default)]
pub struct RecordingOutbox {
    pub sent: Vec<(NodeId, Envelope)>,
    pub scheduled: Vec<(NodeId, Duration, Envelope)>,
    pub reports: Vec<NodeReport>,
}

impl RecordingOutbox {
    pub fn new() -> Self {
        RecordingOutbox::default()
    }

    /// Drain what was sent since the last call.
    pub fn take_sent(&mut self) -> Vec<(NodeId, Envelope)> {
        std::mem::take(&mut self.sent)
    }

    pub fn is_quiet(&self) -> bool {
        self.sent.is_empty() && self.scheduled.is_empty()
    }
}

impl Outbox for RecordingOutbox {
    fn send(&mut self, to: NodeId, envelope: Envelope) {
        self.sent.push((to, envelope));
    }

    fn schedule(&mut self, to: NodeId, delay: Duration, envelope: Envelope) {
        self.scheduled.push((to, delay, envelope));
    }

    fn report(&mut self, report: NodeReport) {
        self.reports.push(report);
    }
}
