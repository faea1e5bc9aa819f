use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::trace;

use crate::common::NodeId;
use crate::consensus::{Envelope, NodeReport, Outbox};

/// Inbound queue of every node, keyed by id. Built once before the run
/// and never changed, so it is shared read-only between tasks.
#[derive(Clone, Debug)]
pub struct Router {
    routes: Arc<HashMap<NodeId, UnboundedSender<Envelope>>>,
}

impl Router {
    /// Creates one unbounded queue per node of a system of size `n`.
    pub fn new(n: usize) -> (Self, Vec<(NodeId, UnboundedReceiver<Envelope>)>) {
        let mut routes = HashMap::with_capacity(n);
        let mut inboxes = Vec::with_capacity(n);
        for id in NodeId::all(n) {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            routes.insert(id, tx);
            inboxes.push((id, rx));
        }
        (
            Router {
                routes: Arc::new(routes),
            },
            inboxes,
        )
    }

    /// Returns false when the target is unknown or no longer running.
    pub fn deliver(&self, to: NodeId, envelope: Envelope) -> bool {
        match self.routes.get(&to) {
            Some(tx) => tx.send(envelope).is_ok(),
            None => false,
        }
    }

    /// Delivers after `delay` from a detached timer task. There is no way
    /// to cancel it; if the target is gone by then the envelope is lost.
    pub fn deliver_after(&self, to: NodeId, delay: Duration, envelope: Envelope) {
        let router = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !router.deliver(to, envelope) {
                trace!(%to, "timed delivery dropped");
            }
        });
    }
}

/// Outbox of a node running as a tokio task.
pub struct ChannelOutbox {
    router: Router,
    reports: UnboundedSender<NodeReport>,
}

impl ChannelOutbox {
    pub fn new(router: Router, reports: UnboundedSender<NodeReport>) -> Self {
        ChannelOutbox { router, reports }
    }
}

impl Outbox for ChannelOutbox {
    fn send(&mut self, to: NodeId, envelope: Envelope) {
        if !self.router.deliver(to, envelope) {
            trace!(%to, "delivery dropped");
        }
    }

    fn schedule(&mut self, to: NodeId, delay: Duration, envelope: Envelope) {
        self.router.deliver_after(to, delay, envelope);
    }

    fn report(&mut self, report: NodeReport) {
        // The orchestrator may already be gone at the end of a run.
        let _ = self.reports.send(report);
    }
}
