use std::{collections::BTreeSet, fmt};

use tokio::time::Instant;

use crate::common::{Ballot, Decision, NodeId, Value};

/*
    Every event a node can see. The first group is delivered by the
    orchestrator (or, for Launch, by the node to itself as a retry). The
    second group is the protocol proper and only travels between nodes.
*/

#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    PeerListUpdate(BTreeSet<NodeId>),
    EnableFaultProneness,
    Hold,
    Launch,
    StartTimeMark(Instant),

    Read(Ballot),
    Gather(Gather),
    Impose(Impose),
    Ack(Ballot),
    Abort(Ballot),
    Decide(Decision),
}

/// Acceptor's answer to a Read: the ballot it promised plus its last
/// accepted estimate (if any) and the ballot it was accepted at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Gather {
    pub ballot: Ballot,
    pub accepted_ballot: Ballot,
    pub estimate: Option<Value>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Impose {
    pub ballot: Ballot,
    pub value: Value,
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::PeerListUpdate(_) => "PeerListUpdate",
            Message::EnableFaultProneness => "EnableFaultProneness",
            Message::Hold => "Hold",
            Message::Launch => "Launch",
            Message::StartTimeMark(_) => "StartTimeMark",
            Message::Read(_) => "Read",
            Message::Gather(_) => "Gather",
            Message::Impose(_) => "Impose",
            Message::Ack(_) => "Ack",
            Message::Abort(_) => "Abort",
            Message::Decide(_) => "Decide",
        }
    }

    /// Protocol messages must carry a node as their origin.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Message::Read(_)
                | Message::Gather(_)
                | Message::Impose(_)
                | Message::Ack(_)
                | Message::Abort(_)
                | Message::Decide(_)
        )
    }
}

/// Where an inbound event came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Origin {
    Orchestrator,
    Node(NodeId),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Orchestrator => write!(f, "orchestrator"),
            Origin::Node(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub origin: Origin,
    pub message: Message,
}

impl Envelope {
    pub fn from_node(id: NodeId, message: Message) -> Self {
        Envelope {
            origin: Origin::Node(id),
            message,
        }
    }

    pub fn control(message: Message) -> Self {
        Envelope {
            origin: Origin::Orchestrator,
            message,
        }
    }
}
