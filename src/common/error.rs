use super::types::{Decision, NodeId, Value};

/// Errors raised by a node while handling an inbound event.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NodeError {
    /// Two different values were learned as decided. Unreachable with a
    /// correct quorum rule.
    #[error("{node}: conflicting decision (held {held}, received {incoming} from {from})")]
    ConflictingDecision {
        node: NodeId,
        from: NodeId,
        held: Decision,
        incoming: Decision,
    },
    /// The event is not accepted from this origin.
    #[error("{node}: unsupported event {kind} from {origin}")]
    UnsupportedEvent {
        node: NodeId,
        kind: &'static str,
        origin: String,
    },
    /// A protocol message claims to come from outside the membership.
    #[error("{node}: {kind} from unknown sender {sender}")]
    UnknownSender {
        node: NodeId,
        kind: &'static str,
        sender: NodeId,
    },
}

impl NodeError {
    /// Fatal errors stop the node and abort the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, NodeError::ConflictingDecision { .. })
    }
}

/// Invalid run configuration.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("a run needs at least one node")]
    NoNodes,
    #[error("cannot make {faulty} of {nodes} nodes fault-prone")]
    TooManyFaulty { faulty: usize, nodes: usize },
    #[error("failure probability {0} is outside [0, 1]")]
    InvalidFailProb(f64),
}

/// Agreement or validity broken in a finished run.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum SafetyViolation {
    #[error("{first} decided {first_value} but {second} decided {second_value}")]
    Disagreement {
        first: NodeId,
        first_value: Value,
        second: NodeId,
        second_value: Value,
    },
    #[error("{node} decided {value}, which no node proposed")]
    InvalidValue { node: NodeId, value: Value },
}

/// Why a run could not produce a report.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("run aborted: {0}")]
    Fatal(#[from] NodeError),
}
