use crate::common::{Decision, NodeId};
use super::{
    message::{Envelope, Message},
    outbox::Outbox,
    peers::Peers,
};

/// Floods a learned decision to every known peer, once per node.
///
/// Works as reliable dissemination only because every node knows every
/// other node; in a sparser graph a crashed relay could cut the flood.
#[derive(Debug, Clone, Default)]
pub struct Disseminator {
    sent: bool,
}

impl Disseminator {
    pub fn new() -> Self {
        Disseminator::default()
    }

    pub fn has_sent(&self) -> bool {
        self.sent
    }

    /// Sends `Decide(decision)` to all peers except `me`. Returns the
    /// number of messages sent, which is zero on every call but the first.
    pub fn broadcast<O: Outbox>(
        &mut self,
        me: NodeId,
        peers: &Peers,
        decision: Decision,
        outbox: &mut O,
    ) -> usize {
        if self.has_sent() {
            return 0;
        }
        self.sent = true;
        let mut count = 0;
        for peer in peers.others(me) {
            outbox.send(peer, Envelope::from_node(me, Message::Decide(decision)));
            count += 1;
        }
        count
    }
}
