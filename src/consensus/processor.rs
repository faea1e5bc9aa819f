use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::{sync::mpsc::UnboundedReceiver, time::Instant};
use tracing::{debug, error, info, trace, warn};

use crate::common::{is_majority, Ballot, Decision, NodeError, NodeId, Value};
use crate::config::NodeConfig;
use super::{
    coordinator::RoundCoordinator,
    disseminator::Disseminator,
    fault::FaultInjector,
    message::{Envelope, Gather, Impose, Message, Origin},
    outbox::{NodeReport, Outbox},
    peers::Peers,
};

/*
    One participant of the Synod protocol. Every node is proposer and
    acceptor at once. Events are handled one at a time to completion, so
    there is no locking anywhere; all effects go through the Outbox.

    Proposer: Launch -> Read(b) to all, majority of Gather -> Impose(b, v)
    to all, majority of Ack -> Decide. An Abort re-launches through the
    round coordinator. Acceptor: answer Read/Impose for ballots at least as
    high as everything promised or accepted, Abort otherwise.
*/

pub struct Node {
    id: NodeId,
    n: usize,
    repick_proposal: bool,

    p_ballot: Ballot,
    r_ballot: Ballot,
    i_ballot: Ballot,
    g_ballot: Option<Ballot>,

    estimate: Option<Value>,
    proposal: Value,
    decision: Option<Decision>,
    acks_received: usize,
    responses: Vec<(NodeId, Gather)>,

    peers: Peers,
    fault: FaultInjector,
    coordinator: RoundCoordinator,
    disseminator: Disseminator,
    rng: ChaCha8Rng,
    started_at: Option<Instant>,
}

impl Node {
    pub fn new(id: NodeId, config: &NodeConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed_for(id));
        let proposal = Value::random(&mut rng);
        Node {
            id,
            n: config.nodes,
            repick_proposal: config.repick_proposal,
            p_ballot: Ballot::initial(id, config.nodes),
            r_ballot: Ballot(0),
            i_ballot: Ballot::initial(id, config.nodes),
            g_ballot: None,
            estimate: None,
            proposal,
            decision: None,
            acks_received: 0,
            responses: Vec::new(),
            peers: Peers::new(),
            fault: FaultInjector::new(config.fail_prob),
            coordinator: RoundCoordinator::new(config.retry_backoff),
            disseminator: Disseminator::new(),
            rng,
            started_at: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn proposal(&self) -> Value {
        self.proposal
    }

    pub fn estimate(&self) -> Option<Value> {
        self.estimate
    }

    pub fn decision(&self) -> Option<Decision> {
        self.decision
    }

    pub fn is_decided(&self) -> bool {
        self.decision.is_some()
    }

    pub fn is_crashed(&self) -> bool {
        self.fault.is_crashed()
    }

    pub fn is_fault_prone(&self) -> bool {
        self.fault.is_armed()
    }

    pub fn is_on_hold(&self) -> bool {
        self.coordinator.is_on_hold()
    }

    pub fn proposer_ballot(&self) -> Ballot {
        self.p_ballot
    }

    pub fn read_ballot(&self) -> Ballot {
        self.r_ballot
    }

    pub fn impose_ballot(&self) -> Ballot {
        self.i_ballot
    }

    pub fn peers(&self) -> &Peers {
        &self.peers
    }

    /// Handles one inbound event to completion.
    ///
    /// A crashed node drops the event without looking at it. Otherwise the
    /// fault injector gets its coin flip first, then the event is checked
    /// against its origin and dispatched.
    pub fn handle<O: Outbox>(
        &mut self,
        envelope: Envelope,
        outbox: &mut O,
    ) -> Result<(), NodeError> {
        if self.fault.is_crashed() {
            return Ok(());
        }
        if self.fault.on_event(&mut self.rng) {
            info!(node = %self.id, "crashed");
            outbox.report(NodeReport::Crashed { node: self.id });
            return Ok(());
        }

        let Envelope { origin, message } = envelope;
        let sender = self.check_origin(origin, &message)?;

        match message {
            Message::PeerListUpdate(announced) => {
                let added = self.peers.merge(&announced);
                debug!(node = %self.id, added, known = self.peers.len(), "peer list updated");
            }
            Message::EnableFaultProneness => {
                self.fault.arm();
                debug!(node = %self.id, "fault-prone");
            }
            Message::Hold => {
                self.coordinator.hold();
                debug!(node = %self.id, "on hold");
            }
            Message::Launch => self.propose(outbox),
            Message::StartTimeMark(at) => self.started_at = Some(at),
            Message::Read(ballot) => self.on_read(sender, ballot, outbox),
            Message::Gather(gather) => self.on_gather(sender, gather, outbox),
            Message::Impose(impose) => self.on_impose(sender, impose, outbox),
            Message::Ack(ballot) => self.on_ack(ballot, outbox),
            Message::Abort(ballot) => self.on_abort(ballot, outbox),
            Message::Decide(decision) => self.on_decide(sender, decision, outbox)?,
        }
        Ok(())
    }

    /// Protocol messages must come from a member node; control events from
    /// the orchestrator or from this node itself.
    fn check_origin(&self, origin: Origin, message: &Message) -> Result<NodeId, NodeError> {
        match (origin, message.is_protocol()) {
            (Origin::Node(sender), true) if sender.is_member(self.n) => Ok(sender),
            (Origin::Node(sender), true) => Err(NodeError::UnknownSender {
                node: self.id,
                kind: message.kind(),
                sender,
            }),
            (Origin::Orchestrator, false) => Ok(self.id),
            (Origin::Node(sender), false) if sender == self.id => Ok(self.id),
            (origin, _) => Err(NodeError::UnsupportedEvent {
                node: self.id,
                kind: message.kind(),
                origin: origin.to_string(),
            }),
        }
    }

    fn propose<O: Outbox>(&mut self, outbox: &mut O) {
        if !self.coordinator.may_propose(self.is_decided()) {
            debug!(node = %self.id, hold = self.is_on_hold(), "launch ignored");
            return;
        }
        if self.peers.is_empty() {
            warn!(node = %self.id, "proposing before any peer list arrived");
        }
        if self.repick_proposal {
            self.proposal = Value::random(&mut self.rng);
        }
        self.p_ballot = self.p_ballot.next(self.n);
        self.responses.clear();
        self.acks_received = 0;

        debug!(node = %self.id, ballot = %self.p_ballot, value = %self.proposal, "proposing");
        outbox.report(NodeReport::Proposed {
            node: self.id,
            ballot: self.p_ballot,
            value: self.proposal,
        });
        for peer in self.peers.iter() {
            outbox.send(peer, Envelope::from_node(self.id, Message::Read(self.p_ballot)));
        }
    }

    fn is_stale(&self, ballot: Ballot) -> bool {
        ballot < self.r_ballot || ballot < self.i_ballot
    }

    fn on_read<O: Outbox>(&mut self, from: NodeId, ballot: Ballot, outbox: &mut O) {
        if self.is_stale(ballot) {
            debug!(
                node = %self.id,
                %from,
                %ballot,
                read = %self.r_ballot,
                imposed = %self.i_ballot,
                "read aborted"
            );
            outbox.send(from, Envelope::from_node(self.id, Message::Abort(ballot)));
            return;
        }
        self.r_ballot = ballot;
        let gather = Gather {
            ballot,
            accepted_ballot: self.i_ballot,
            estimate: self.estimate,
        };
        outbox.send(from, Envelope::from_node(self.id, Message::Gather(gather)));
    }

    fn on_gather<O: Outbox>(&mut self, from: NodeId, gather: Gather, outbox: &mut O) {
        if gather.ballot != self.p_ballot {
            debug!(
                node = %self.id,
                %from,
                ballot = %gather.ballot,
                current = %self.p_ballot,
                "stale gather"
            );
            return;
        }
        match self.responses.iter_mut().find(|(peer, _)| *peer == from) {
            Some(slot) => slot.1 = gather,
            None => self.responses.push((from, gather)),
        }

        // Gathers keep arriving after the quorum was reached; impose once per ballot.
        if !is_majority(self.responses.len(), self.n) || self.g_ballot == Some(gather.ballot) {
            return;
        }
        self.g_ballot = Some(gather.ballot);
        self.proposal = self.highest_accepted().unwrap_or(self.proposal);
        self.responses.clear();

        debug!(node = %self.id, ballot = %self.p_ballot, value = %self.proposal, "imposing");
        let impose = Impose {
            ballot: self.p_ballot,
            value: self.proposal,
        };
        for peer in self.peers.iter() {
            outbox.send(peer, Envelope::from_node(self.id, Message::Impose(impose)));
        }
    }

    /// Estimate accepted at the strictly highest ballot among the gathered
    /// responses. The first response wins a tie.
    fn highest_accepted(&self) -> Option<Value> {
        let mut best: Option<(Ballot, Value)> = None;
        for (_, gather) in &self.responses {
            let Some(value) = gather.estimate else {
                continue;
            };
            if best.map_or(true, |(ballot, _)| gather.accepted_ballot > ballot) {
                best = Some((gather.accepted_ballot, value));
            }
        }
        best.map(|(_, value)| value)
    }

    fn on_impose<O: Outbox>(&mut self, from: NodeId, impose: Impose, outbox: &mut O) {
        if self.is_stale(impose.ballot) {
            debug!(
                node = %self.id,
                %from,
                ballot = %impose.ballot,
                read = %self.r_ballot,
                imposed = %self.i_ballot,
                "impose aborted"
            );
            outbox.send(from, Envelope::from_node(self.id, Message::Abort(impose.ballot)));
            return;
        }
        self.estimate = Some(impose.value);
        self.i_ballot = impose.ballot;
        outbox.send(from, Envelope::from_node(self.id, Message::Ack(impose.ballot)));
    }

    fn on_ack<O: Outbox>(&mut self, ballot: Ballot, outbox: &mut O) {
        if ballot != self.p_ballot {
            debug!(node = %self.id, %ballot, current = %self.p_ballot, "stale ack");
            return;
        }
        self.acks_received += 1;
        if !is_majority(self.acks_received, self.n) || self.is_decided() {
            return;
        }
        self.acks_received = 0;
        let decision = Decision {
            ballot: self.p_ballot,
            value: self.proposal,
        };
        self.learn(decision, outbox);
    }

    fn on_abort<O: Outbox>(&mut self, ballot: Ballot, outbox: &mut O) {
        let decided = self.is_decided();
        if let Some(delay) = self.coordinator.on_abort(ballot, decided, &mut self.rng) {
            debug!(node = %self.id, %ballot, ?delay, "aborted, retrying");
            outbox.schedule(self.id, delay, Envelope::from_node(self.id, Message::Launch));
        } else {
            let threshold = self.coordinator.aborted();
            trace!(node = %self.id, %ballot, %threshold, "abort ignored");
        }
    }

    fn on_decide<O: Outbox>(
        &mut self,
        from: NodeId,
        decision: Decision,
        outbox: &mut O,
    ) -> Result<(), NodeError> {
        match self.decision {
            None => {
                debug!(node = %self.id, %from, %decision, "decision received");
                self.learn(decision, outbox);
                Ok(())
            }
            Some(held) if held.value != decision.value => {
                error!(node = %self.id, %from, %held, incoming = %decision, "conflicting decision");
                Err(NodeError::ConflictingDecision {
                    node: self.id,
                    from,
                    held,
                    incoming: decision,
                })
            }
            Some(_) => Ok(()),
        }
    }

    /// Transition into the decided state: record, report and flood once.
    fn learn<O: Outbox>(&mut self, decision: Decision, outbox: &mut O) {
        self.decision = Some(decision);
        let latency = self.started_at.map(|at| at.elapsed());
        info!(node = %self.id, %decision, ?latency, "decided");
        outbox.report(NodeReport::Decided {
            node: self.id,
            decision,
            latency,
        });
        self.disseminator.broadcast(self.id, &self.peers, decision, outbox);
    }
}

/// Event loop of a node running as its own task.
pub struct ConsensusProcessor<O: Outbox> {
    pub node: Node,
    pub msg_rx: UnboundedReceiver<Envelope>,
    pub outbox: O,
}

impl<O: Outbox> ConsensusProcessor<O> {
    pub fn new(node: Node, msg_rx: UnboundedReceiver<Envelope>, outbox: O) -> Self {
        ConsensusProcessor { node, msg_rx, outbox }
    }

    /// Runs until the inbox closes or a fatal invariant violation occurs.
    pub async fn run(mut self) -> Result<Node, NodeError> {
        debug!(node = %self.node.id(), "running consensus processor");
        while let Some(envelope) = self.msg_rx.recv().await {
            let kind = envelope.message.kind();
            match self.node.handle(envelope, &mut self.outbox) {
                Ok(()) => {}
                Err(err) if err.is_fatal() => {
                    error!(node = %self.node.id(), %err, "stopping node");
                    self.outbox.report(NodeReport::Failed {
                        node: self.node.id(),
                        error: err.clone(),
                    });
                    return Err(err);
                }
                Err(err) => warn!(node = %self.node.id(), kind, %err, "event rejected"),
            }
        }
        Ok(self.node)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::consensus::outbox::RecordingOutbox;

    fn config(n: usize) -> NodeConfig {
        NodeConfig {
            nodes: n,
            fail_prob: 0.0,
            retry_backoff: Duration::from_millis(2),
            repick_proposal: false,
            seed: 11,
        }
    }

    fn node_with_peers(id: u32, n: usize) -> Node {
        let mut node = Node::new(NodeId(id), &config(n));
        let mut outbox = RecordingOutbox::new();
        node.handle(
            Envelope::control(Message::PeerListUpdate(NodeId::all(n).collect())),
            &mut outbox,
        )
        .unwrap();
        node
    }

    fn from(id: u32, message: Message) -> Envelope {
        Envelope::from_node(NodeId(id), message)
    }

    fn gather(ballot: i64, accepted: i64, estimate: Option<Value>) -> Message {
        Message::Gather(Gather {
            ballot: Ballot(ballot),
            accepted_ballot: Ballot(accepted),
            estimate,
        })
    }

    fn messages(outbox: &mut RecordingOutbox) -> Vec<(NodeId, Message)> {
        outbox
            .take_sent()
            .into_iter()
            .map(|(to, env)| (to, env.message))
            .collect()
    }

    #[test]
    fn test_initial_state() {
        let node = Node::new(NodeId(1), &config(3));
        assert_eq!(node.proposer_ballot(), Ballot(-2));
        assert_eq!(node.impose_ballot(), Ballot(-2));
        assert_eq!(node.read_ballot(), Ballot(0));
        assert_eq!(node.estimate(), None);
        assert!(!node.is_decided());
    }

    #[test]
    fn test_launch_reads_every_peer_with_next_ballot() {
        let mut node = node_with_peers(1, 3);
        let mut outbox = RecordingOutbox::new();
        node.handle(Envelope::control(Message::Launch), &mut outbox).unwrap();

        assert_eq!(node.proposer_ballot(), Ballot(1));
        assert_eq!(
            messages(&mut outbox),
            vec![
                (NodeId(1), Message::Read(Ballot(1))),
                (NodeId(2), Message::Read(Ballot(1))),
                (NodeId(3), Message::Read(Ballot(1))),
            ]
        );

        node.handle(from(1, Message::Launch), &mut outbox).unwrap();
        assert_eq!(node.proposer_ballot(), Ballot(4));
    }

    #[test]
    fn test_read_promises_or_aborts() {
        let mut node = node_with_peers(2, 3);
        let mut outbox = RecordingOutbox::new();

        node.handle(from(1, Message::Read(Ballot(10))), &mut outbox).unwrap();
        assert_eq!(node.read_ballot(), Ballot(10));
        assert_eq!(messages(&mut outbox), vec![(NodeId(1), gather(10, -1, None))]);

        // A competing proposer reading with a lower ballot is turned away.
        node.handle(from(3, Message::Read(Ballot(7))), &mut outbox).unwrap();
        assert_eq!(node.read_ballot(), Ballot(10));
        assert_eq!(messages(&mut outbox), vec![(NodeId(3), Message::Abort(Ballot(7)))]);
    }

    #[test]
    fn test_impose_accepts_or_aborts() {
        let mut node = node_with_peers(2, 3);
        let mut outbox = RecordingOutbox::new();

        node.handle(from(1, Message::Read(Ballot(4))), &mut outbox).unwrap();
        outbox.take_sent();

        let impose = |b, value| Message::Impose(Impose { ballot: Ballot(b), value });
        node.handle(from(3, impose(3, Value::Zero)), &mut outbox).unwrap();
        assert_eq!(messages(&mut outbox), vec![(NodeId(3), Message::Abort(Ballot(3)))]);
        assert_eq!(node.estimate(), None);

        node.handle(from(1, impose(4, Value::One)), &mut outbox).unwrap();
        assert_eq!(messages(&mut outbox), vec![(NodeId(1), Message::Ack(Ballot(4)))]);
        assert_eq!(node.estimate(), Some(Value::One));
        assert_eq!(node.impose_ballot(), Ballot(4));

        // Accepted ballot now bounds reads as well.
        node.handle(from(3, Message::Read(Ballot(3))), &mut outbox).unwrap();
        assert_eq!(messages(&mut outbox), vec![(NodeId(3), Message::Abort(Ballot(3)))]);
    }

    #[test]
    fn test_acceptor_never_answers_below_promise() {
        let mut node = node_with_peers(1, 5);
        let mut outbox = RecordingOutbox::new();
        let ballots = [6, 3, 11, 8, 11, 2, 16, 12];
        for (i, b) in ballots.iter().enumerate() {
            let (read, imposed) = (node.read_ballot(), node.impose_ballot());
            let before = read.max(imposed);
            let message = if i % 2 == 0 {
                Message::Read(Ballot(*b))
            } else {
                Message::Impose(Impose { ballot: Ballot(*b), value: Value::Zero })
            };
            node.handle(from(2, message), &mut outbox).unwrap();
            for (_, reply) in messages(&mut outbox) {
                match reply {
                    Message::Gather(g) => assert!(g.ballot >= before),
                    Message::Ack(a) => assert!(a >= before),
                    Message::Abort(a) => assert!(a < before),
                    other => panic!("unexpected reply {other:?}"),
                }
            }
            assert!(node.read_ballot() >= read);
            assert!(node.impose_ballot() >= imposed);
        }
    }

    #[test]
    fn test_gather_majority_imposes_highest_accepted_value() {
        let mut node = node_with_peers(1, 5);
        let mut outbox = RecordingOutbox::new();
        node.handle(Envelope::control(Message::Launch), &mut outbox).unwrap();
        outbox.take_sent();
        let ballot = node.proposer_ballot().0;

        node.handle(from(2, gather(ballot, -3, None)), &mut outbox).unwrap();
        node.handle(from(3, gather(ballot, 3, Some(Value::Zero))), &mut outbox).unwrap();
        assert!(outbox.is_quiet());
        node.handle(from(4, gather(ballot, 5, Some(Value::One))), &mut outbox).unwrap();

        assert_eq!(node.proposal(), Value::One);
        let sent = messages(&mut outbox);
        assert_eq!(sent.len(), 5);
        let expected = Message::Impose(Impose { ballot: Ballot(ballot), value: Value::One });
        assert!(sent.iter().all(|(_, m)| *m == expected));

        // A late gather for the same round does not impose twice.
        node.handle(from(5, gather(ballot, 0, None)), &mut outbox).unwrap();
        node.handle(from(1, gather(ballot, -4, None)), &mut outbox).unwrap();
        node.handle(from(2, gather(ballot, -3, None)), &mut outbox).unwrap();
        assert!(outbox.is_quiet());
    }

    #[test]
    fn test_gather_without_estimates_keeps_own_proposal() {
        let mut node = node_with_peers(3, 3);
        let own = node.proposal();
        let mut outbox = RecordingOutbox::new();
        node.handle(Envelope::control(Message::Launch), &mut outbox).unwrap();
        outbox.take_sent();
        let ballot = node.proposer_ballot().0;

        node.handle(from(1, gather(ballot, -2, None)), &mut outbox).unwrap();
        node.handle(from(2, gather(ballot, -1, None)), &mut outbox).unwrap();
        assert_eq!(node.proposal(), own);
        let sent = messages(&mut outbox);
        assert_eq!(sent.len(), 3);
        assert!(matches!(sent[0].1, Message::Impose(Impose { value, .. }) if value == own));
    }

    #[test]
    fn test_duplicate_gathers_from_one_peer_do_not_form_majority() {
        let mut node = node_with_peers(1, 3);
        let mut outbox = RecordingOutbox::new();
        node.handle(Envelope::control(Message::Launch), &mut outbox).unwrap();
        outbox.take_sent();
        node.handle(from(2, gather(1, -1, None)), &mut outbox).unwrap();
        node.handle(from(2, gather(1, -1, None)), &mut outbox).unwrap();
        assert!(outbox.is_quiet());
    }

    #[test]
    fn test_stale_gather_ignored() {
        let mut node = node_with_peers(1, 3);
        let mut outbox = RecordingOutbox::new();
        node.handle(Envelope::control(Message::Launch), &mut outbox).unwrap();
        node.handle(Envelope::control(Message::Launch), &mut outbox).unwrap();
        outbox.take_sent();
        assert_eq!(node.proposer_ballot(), Ballot(4));

        node.handle(from(2, gather(1, -1, None)), &mut outbox).unwrap();
        node.handle(from(3, gather(1, 0, None)), &mut outbox).unwrap();
        assert!(outbox.is_quiet());
    }

    #[test]
    fn test_ack_majority_decides_and_floods_others() {
        let mut node = node_with_peers(1, 3);
        let mut outbox = RecordingOutbox::new();
        node.handle(Envelope::control(Message::Launch), &mut outbox).unwrap();
        outbox.take_sent();
        let proposal = node.proposal();

        node.handle(from(2, Message::Ack(Ballot(1))), &mut outbox).unwrap();
        assert!(!node.is_decided());
        node.handle(from(3, Message::Ack(Ballot(1))), &mut outbox).unwrap();

        let decision = Decision { ballot: Ballot(1), value: proposal };
        assert_eq!(node.decision(), Some(decision));
        assert_eq!(
            messages(&mut outbox),
            vec![
                (NodeId(2), Message::Decide(decision)),
                (NodeId(3), Message::Decide(decision)),
            ]
        );
        assert!(outbox
            .reports
            .iter()
            .any(|r| matches!(r, NodeReport::Decided { decision: d, .. } if *d == decision)));

        node.handle(from(1, Message::Ack(Ballot(1))), &mut outbox).unwrap();
        assert!(outbox.is_quiet());

        // Decided nodes never start another round.
        node.handle(Envelope::control(Message::Launch), &mut outbox).unwrap();
        assert!(outbox.is_quiet());
        assert_eq!(node.proposer_ballot(), Ballot(1));
    }

    #[test]
    fn test_stale_acks_do_not_count() {
        let mut node = node_with_peers(1, 3);
        let mut outbox = RecordingOutbox::new();
        node.handle(Envelope::control(Message::Launch), &mut outbox).unwrap();
        node.handle(Envelope::control(Message::Launch), &mut outbox).unwrap();
        node.handle(from(2, Message::Ack(Ballot(1))), &mut outbox).unwrap();
        node.handle(from(3, Message::Ack(Ballot(1))), &mut outbox).unwrap();
        assert!(!node.is_decided());
    }

    #[test]
    fn test_abort_schedules_single_relaunch() {
        let mut node = node_with_peers(1, 3);
        let mut outbox = RecordingOutbox::new();
        node.handle(Envelope::control(Message::Launch), &mut outbox).unwrap();
        node.handle(from(2, Message::Abort(Ballot(1))), &mut outbox).unwrap();
        node.handle(from(3, Message::Abort(Ballot(1))), &mut outbox).unwrap();

        assert_eq!(outbox.scheduled.len(), 1);
        let (to, delay, env) = &outbox.scheduled[0];
        assert_eq!(*to, NodeId(1));
        assert!(*delay <= Duration::from_millis(2));
        assert_eq!(env.message, Message::Launch);
    }

    #[test]
    fn test_decide_adopts_and_forwards_once() {
        let mut node = node_with_peers(2, 4);
        let mut outbox = RecordingOutbox::new();
        let decision = Decision { ballot: Ballot(5), value: Value::Zero };

        node.handle(from(1, Message::Decide(decision)), &mut outbox).unwrap();
        assert_eq!(node.decision(), Some(decision));
        let targets: Vec<NodeId> = messages(&mut outbox).into_iter().map(|(to, _)| to).collect();
        assert_eq!(targets, vec![NodeId(1), NodeId(3), NodeId(4)]);

        node.handle(from(3, Message::Decide(decision)), &mut outbox).unwrap();
        assert!(outbox.is_quiet());

        // Aborts after deciding do not trigger retries.
        node.handle(from(3, Message::Abort(Ballot(9))), &mut outbox).unwrap();
        assert!(outbox.is_quiet());
    }

    #[test]
    fn test_conflicting_decision_is_fatal() {
        let mut node = node_with_peers(2, 3);
        let mut outbox = RecordingOutbox::new();
        let first = Decision { ballot: Ballot(1), value: Value::Zero };
        let second = Decision { ballot: Ballot(3), value: Value::One };

        node.handle(from(1, Message::Decide(first)), &mut outbox).unwrap();
        let err = node.handle(from(3, Message::Decide(second)), &mut outbox).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            NodeError::ConflictingDecision { held, incoming, .. }
                if held == first && incoming == second
        ));
        assert_eq!(node.decision(), Some(first));
    }

    #[test]
    fn test_hold_makes_launch_a_no_op() {
        let mut node = node_with_peers(2, 3);
        let mut outbox = RecordingOutbox::new();
        node.handle(Envelope::control(Message::Hold), &mut outbox).unwrap();
        let (p, r, i, estimate) = (
            node.proposer_ballot(),
            node.read_ballot(),
            node.impose_ballot(),
            node.estimate(),
        );

        node.handle(Envelope::control(Message::Launch), &mut outbox).unwrap();
        node.handle(from(2, Message::Launch), &mut outbox).unwrap();

        assert!(outbox.is_quiet());
        assert!(outbox.reports.is_empty());
        assert_eq!(
            (node.proposer_ballot(), node.read_ballot(), node.impose_ballot(), node.estimate()),
            (p, r, i, estimate)
        );

        // Held nodes still act as acceptors.
        node.handle(from(1, Message::Read(Ballot(1))), &mut outbox).unwrap();
        assert_eq!(outbox.sent.len(), 1);
    }

    #[test]
    fn test_crashed_node_drops_everything() {
        let mut cfg = config(3);
        cfg.fail_prob = 1.0;
        let mut node = Node::new(NodeId(1), &cfg);
        let mut outbox = RecordingOutbox::new();
        let everyone = NodeId::all(3).collect();
        node.handle(Envelope::control(Message::PeerListUpdate(everyone)), &mut outbox)
            .unwrap();
        node.handle(Envelope::control(Message::EnableFaultProneness), &mut outbox)
            .unwrap();
        assert!(node.is_fault_prone());
        assert!(!node.is_crashed());

        node.handle(Envelope::control(Message::Launch), &mut outbox).unwrap();
        assert!(node.is_crashed());
        assert!(matches!(
            outbox.reports.as_slice(),
            [NodeReport::Crashed { node }] if *node == NodeId(1)
        ));

        node.handle(from(2, Message::Read(Ballot(2))), &mut outbox).unwrap();
        node.handle(from(1, Message::Launch), &mut outbox).unwrap();
        node.handle(Envelope::control(Message::Hold), &mut outbox).unwrap();
        assert!(outbox.is_quiet());
        assert_eq!(outbox.reports.len(), 1);
        assert_eq!(node.read_ballot(), Ballot(0));
    }

    #[test]
    fn test_origin_checks() {
        let mut node = node_with_peers(1, 3);
        let mut outbox = RecordingOutbox::new();

        let err = node
            .handle(Envelope::control(Message::Read(Ballot(1))), &mut outbox)
            .unwrap_err();
        assert!(matches!(err, NodeError::UnsupportedEvent { kind: "Read", .. }));
        assert!(!err.is_fatal());

        let err = node.handle(from(2, Message::Hold), &mut outbox).unwrap_err();
        assert!(matches!(err, NodeError::UnsupportedEvent { kind: "Hold", .. }));
        assert!(!node.is_on_hold());

        let err = node.handle(from(9, Message::Ack(Ballot(1))), &mut outbox).unwrap_err();
        assert!(matches!(err, NodeError::UnknownSender { sender, .. } if sender == NodeId(9)));
        assert!(outbox.is_quiet());
    }

    #[test]
    fn test_repick_proposal_draws_per_round() {
        let mut cfg = config(3);
        cfg.repick_proposal = true;
        let mut node = Node::new(NodeId(1), &cfg);
        let mut outbox = RecordingOutbox::new();
        for _ in 0..32 {
            node.handle(Envelope::control(Message::Launch), &mut outbox).unwrap();
        }
        let values: Vec<Value> = outbox
            .reports
            .iter()
            .filter_map(|r| match r {
                NodeReport::Proposed { value, .. } => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(values.len(), 32);
        assert!(values.contains(&Value::Zero) && values.contains(&Value::One));
    }

    #[tokio::test]
    async fn test_processor_stops_on_conflicting_decision() {
        let node = node_with_peers(2, 3);
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let processor = ConsensusProcessor::new(node, rx, RecordingOutbox::new());

        let zero = Decision { ballot: Ballot(1), value: Value::Zero };
        tx.send(from(1, Message::Decide(zero))).unwrap();
        tx.send(Envelope::control(Message::Read(Ballot(1)))).unwrap();
        let one = Decision { ballot: Ballot(3), value: Value::One };
        tx.send(from(3, Message::Decide(one))).unwrap();

        let result = tokio::spawn(processor.run()).await.unwrap();
        assert!(matches!(result, Err(NodeError::ConflictingDecision { .. })));
    }

    #[tokio::test]
    async fn test_processor_returns_node_when_inbox_closes() {
        let node = node_with_peers(2, 3);
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let processor = ConsensusProcessor::new(node, rx, RecordingOutbox::new());

        tx.send(from(1, Message::Read(Ballot(4)))).unwrap();
        drop(tx);

        let node = processor.run().await.unwrap();
        assert_eq!(node.read_ballot(), Ballot(4));
    }
}
