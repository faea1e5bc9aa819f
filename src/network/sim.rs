//! Deterministic simulated network.
//!
//! All nodes live in one thread and share a virtual clock. Every message
//! gets a random latency drawn from a seeded RNG, but delivery between any
//! ordered pair of endpoints stays FIFO. Given the same seed, a run replays
//! identically.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    time::Duration,
};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace, warn};

use crate::common::{majority_size, NodeId, RunError};
use crate::config::SimulationConfig;
use crate::consensus::{Envelope, Message, Node, NodeReport, Origin, RecordingOutbox};
use super::{bootstrap::Bootstrap, report::RunReport};

/// Latency range of the simulated links.
#[derive(Debug, Clone)]
pub struct LatencyConfig {
    pub min: Duration,
    pub max: Duration,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        LatencyConfig {
            min: Duration::from_millis(1),
            max: Duration::from_millis(10),
        }
    }
}

/// Events are ordered by delivery time, then by insertion.
type EventKey = (Duration, u64);

pub struct SimulatedNetwork {
    config: SimulationConfig,
    latency: LatencyConfig,
    nodes: BTreeMap<NodeId, Node>,
    queue: BTreeMap<EventKey, (NodeId, Envelope)>,
    /// Latest scheduled delivery per (origin, target), to keep links FIFO.
    last_delivery: HashMap<(Origin, NodeId), Duration>,
    now: Duration,
    sequence: u64,
    rng: ChaCha8Rng,
    events_processed: u64,
}

impl SimulatedNetwork {
    pub fn new(config: SimulationConfig) -> Result<Self, RunError> {
        config.validate()?;
        let node_config = config.node_config();
        let nodes = NodeId::all(config.nodes)
            .map(|id| (id, Node::new(id, &node_config)))
            .collect();
        Ok(SimulatedNetwork {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            latency: LatencyConfig::default(),
            nodes,
            queue: BTreeMap::new(),
            last_delivery: HashMap::new(),
            now: Duration::ZERO,
            sequence: 0,
            events_processed: 0,
        })
    }

    pub fn with_latency(mut self, latency: LatencyConfig) -> Self {
        self.latency = latency;
        self
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// The full orchestrated run: peer lists, fault-proneness, launch,
    /// hold after the configured delay, then events until completion.
    pub fn run(&mut self) -> Result<RunReport, RunError> {
        let bootstrap = Bootstrap::plan(&self.config, &mut self.rng);
        let mut report = RunReport::new(self.config.nodes, &bootstrap);

        debug!(
            nodes = self.config.nodes,
            quorum = majority_size(self.config.nodes),
            leader = %bootstrap.leader,
            "simulation starting"
        );
        self.connect();
        for id in &bootstrap.fault_prone {
            self.inject_at(self.now, *id, Envelope::control(Message::EnableFaultProneness));
        }
        for id in NodeId::all(self.config.nodes) {
            self.inject_at(self.now, id, Envelope::control(Message::Launch));
        }
        let hold_at = self.now + self.config.hold_delay;
        for id in bootstrap.held(self.config.nodes) {
            self.inject_at(hold_at, id, Envelope::control(Message::Hold));
        }

        self.drive(&mut report)?;
        report.log_summary();
        Ok(report)
    }

    /// Announces the full membership to every node.
    pub fn connect(&mut self) {
        let everyone: BTreeSet<NodeId> = NodeId::all(self.config.nodes).collect();
        for id in NodeId::all(self.config.nodes) {
            let update = Envelope::control(Message::PeerListUpdate(everyone.clone()));
            self.inject_at(self.now, id, update);
        }
    }

    /// Queues `envelope` for delivery to `to` at virtual time `at`.
    pub fn inject_at(&mut self, at: Duration, to: NodeId, envelope: Envelope) {
        let key = (at, self.sequence);
        self.sequence += 1;
        self.queue.insert(key, (to, envelope));
    }

    /// Processes events until every node decided or crashed, the queue
    /// runs dry, or virtual time passes the configured timeout.
    pub fn drive(&mut self, report: &mut RunReport) -> Result<(), RunError> {
        while let Some(((at, _), (to, envelope))) = self.queue.pop_first() {
            if at > self.config.timeout {
                warn!(undecided = ?report.undecided(), "simulation timed out");
                report.timed_out = true;
                break;
            }
            self.now = at;
            self.dispatch(to, envelope, report)?;
            if report.is_complete() {
                break;
            }
        }
        if !report.is_complete() && !report.timed_out {
            debug!(undecided = ?report.undecided(), "no events left");
            report.timed_out = true;
        }
        report.elapsed = self.now;
        Ok(())
    }

    fn dispatch(
        &mut self,
        to: NodeId,
        envelope: Envelope,
        report: &mut RunReport,
    ) -> Result<(), RunError> {
        let Some(node) = self.nodes.get_mut(&to) else {
            trace!(%to, "no such node");
            return Ok(());
        };
        self.events_processed += 1;

        let mut outbox = RecordingOutbox::new();
        match node.handle(envelope, &mut outbox) {
            Ok(()) => {}
            Err(err) if err.is_fatal() => return Err(RunError::Fatal(err)),
            Err(err) => warn!(%err, "event rejected"),
        }

        for (target, envelope) in outbox.sent {
            self.send(target, envelope);
        }
        for (target, delay, envelope) in outbox.scheduled {
            self.inject_at(self.now + delay, target, envelope);
        }
        for node_report in outbox.reports {
            let node_report = match node_report {
                NodeReport::Decided { node, decision, .. } => NodeReport::Decided {
                    node,
                    decision,
                    latency: Some(self.now),
                },
                other => other,
            };
            report.record(node_report);
        }
        Ok(())
    }

    fn send(&mut self, to: NodeId, envelope: Envelope) {
        let latency = self.sample_latency();
        let link = (envelope.origin, to);
        let earliest = self.last_delivery.get(&link).copied().unwrap_or(Duration::ZERO);
        let at = (self.now + latency).max(earliest);
        self.last_delivery.insert(link, at);
        self.inject_at(at, to, envelope);
    }

    fn sample_latency(&mut self) -> Duration {
        let min = self.latency.min.as_micros() as u64;
        let max = (self.latency.max.as_micros() as u64).max(min);
        Duration::from_micros(self.rng.gen_range(min..=max))
    }
}
