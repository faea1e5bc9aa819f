use std::collections::BTreeSet;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::{task::JoinSet, time::Instant};
use tracing::{debug, error, info, warn};

use crate::common::{majority_size, NodeError, NodeId, RunError};
use crate::config::SimulationConfig;
use crate::consensus::{ConsensusProcessor, Envelope, Message, Node, NodeReport};
use super::{
    bootstrap::Bootstrap,
    report::RunReport,
    router::{ChannelOutbox, Router},
};

/// Runs every node as its own tokio task, connected by unbounded channels.
pub struct Cluster {
    config: SimulationConfig,
}

impl Cluster {
    pub fn new(config: SimulationConfig) -> Result<Self, RunError> {
        config.validate()?;
        Ok(Cluster { config })
    }

    /// Bootstraps the nodes, launches them, and collects reports until
    /// every node decided or crashed, or the timeout expires.
    pub async fn run(&self) -> Result<RunReport, RunError> {
        let n = self.config.nodes;
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let bootstrap = Bootstrap::plan(&self.config, &mut rng);
        let mut report = RunReport::new(n, &bootstrap);

        let (router, inboxes) = Router::new(n);
        let (report_tx, mut report_rx) = tokio::sync::mpsc::unbounded_channel();
        let node_config = self.config.node_config();

        let mut tasks: JoinSet<Result<Node, NodeError>> = JoinSet::new();
        for (id, inbox) in inboxes {
            let node = Node::new(id, &node_config);
            let outbox = ChannelOutbox::new(router.clone(), report_tx.clone());
            tasks.spawn(ConsensusProcessor::new(node, inbox, outbox).run());
        }
        drop(report_tx);

        let start = Instant::now();
        let everyone: BTreeSet<NodeId> = NodeId::all(n).collect();
        for id in NodeId::all(n) {
            router.deliver(id, Envelope::control(Message::PeerListUpdate(everyone.clone())));
            router.deliver(id, Envelope::control(Message::StartTimeMark(start)));
        }
        for id in &bootstrap.fault_prone {
            router.deliver(*id, Envelope::control(Message::EnableFaultProneness));
            debug!(node = %id, "fault-proneness enabled");
        }
        for id in NodeId::all(n) {
            router.deliver(id, Envelope::control(Message::Launch));
        }
        info!(
            nodes = n,
            faulty = self.config.faulty,
            quorum = majority_size(n),
            leader = %bootstrap.leader,
            "launched"
        );

        for id in bootstrap.held(n) {
            router.deliver_after(id, self.config.hold_delay, Envelope::control(Message::Hold));
        }

        let deadline = start + self.config.timeout;
        let outcome = loop {
            tokio::select! {
                received = report_rx.recv() => match received {
                    Some(NodeReport::Failed { node, error }) => {
                        error!(%node, %error, "aborting run");
                        break Err(RunError::Fatal(error));
                    }
                    Some(node_report) => {
                        report.record(node_report);
                        if report.is_complete() {
                            break Ok(());
                        }
                    }
                    None => break Ok(()),
                },
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(undecided = ?report.undecided(), "run timed out");
                    report.timed_out = true;
                    break Ok(());
                }
            }
        };

        tasks.abort_all();
        outcome?;
        report.elapsed = start.elapsed();
        report.log_summary();
        Ok(report)
    }
}
