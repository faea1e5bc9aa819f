use std::time::Duration;

use tracing::warn;

use crate::common::{ConfigError, NodeId};

/// Parameters of one simulation run.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Number of nodes, N.
    pub nodes: usize,
    /// Number of nodes made fault-prone, f.
    pub faulty: usize,
    /// Per-event crash probability of a fault-prone node.
    pub fail_prob: f64,
    /// Delay before every node but the leader is put on hold.
    pub hold_delay: Duration,
    /// Upper bound of the random delay before re-proposing after an abort.
    pub retry_backoff: Duration,
    /// The run is cut off after this long.
    pub timeout: Duration,
    pub seed: u64,
    /// Draw a fresh proposal at every new round instead of keeping the first.
    pub repick_proposal: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            nodes: 7,
            faulty: 3,
            fail_prob: 0.4,
            hold_delay: Duration::from_millis(300),
            retry_backoff: Duration::from_millis(5),
            timeout: Duration::from_secs(10),
            seed: 42,
            repick_proposal: false,
        }
    }
}

impl SimulationConfig {
    pub fn new(nodes: usize, faulty: usize) -> Self {
        SimulationConfig {
            nodes,
            faulty,
            ..Default::default()
        }
    }

    pub fn with_fail_prob(mut self, fail_prob: f64) -> Self {
        self.fail_prob = fail_prob;
        self
    }

    pub fn with_hold_delay(mut self, delay: Duration) -> Self {
        self.hold_delay = delay;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_repick_proposal(mut self, repick: bool) -> Self {
        self.repick_proposal = repick;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes == 0 {
            return Err(ConfigError::NoNodes);
        }
        if self.faulty > self.nodes {
            return Err(ConfigError::TooManyFaulty {
                faulty: self.faulty,
                nodes: self.nodes,
            });
        }
        if !(0.0..=1.0).contains(&self.fail_prob) {
            return Err(ConfigError::InvalidFailProb(self.fail_prob));
        }
        if 2 * self.faulty >= self.nodes && self.faulty > 0 && self.fail_prob > 0.0 {
            warn!(
                nodes = self.nodes,
                faulty = self.faulty,
                "fault-prone nodes may reach half the system, the run may not terminate"
            );
        }
        Ok(())
    }

    pub fn node_config(&self) -> NodeConfig {
        NodeConfig {
            nodes: self.nodes,
            fail_prob: self.fail_prob,
            retry_backoff: self.retry_backoff,
            repick_proposal: self.repick_proposal,
            seed: self.seed,
        }
    }
}

/// What a single node needs to know at construction.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub nodes: usize,
    pub fail_prob: f64,
    pub retry_backoff: Duration,
    pub repick_proposal: bool,
    pub seed: u64,
}

impl NodeConfig {
    /// Per-node seed derived from the run seed.
    pub fn seed_for(&self, id: NodeId) -> u64 {
        self.seed
            .wrapping_add(u64::from(id.0))
            .wrapping_mul(0x517cc1b727220a95)
    }
}
