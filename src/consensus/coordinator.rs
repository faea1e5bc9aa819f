use std::time::Duration;

use rand::Rng;

use crate::common::Ballot;

/*
    Retry policy of the proposer. An Abort for a ballot above the highest
    one already reacted to schedules a fresh proposal after a short random
    backoff, which spreads competing proposers apart. A node put on hold
    never proposes again; hold is set once and never cleared.
*/

#[derive(Debug, Clone)]
pub struct RoundCoordinator {
    aborted: Ballot,
    on_hold: bool,
    max_backoff: Duration,
}

impl RoundCoordinator {
    pub fn new(max_backoff: Duration) -> Self {
        RoundCoordinator {
            aborted: Ballot(0),
            on_hold: false,
            max_backoff,
        }
    }

    pub fn hold(&mut self) {
        self.on_hold = true;
    }

    pub fn is_on_hold(&self) -> bool {
        self.on_hold
    }

    /// Highest abort ballot reacted to so far.
    pub fn aborted(&self) -> Ballot {
        self.aborted
    }

    pub fn may_propose(&self, decided: bool) -> bool {
        !self.on_hold && !decided
    }

    /// Returns the delay after which to relaunch, or `None` if this abort
    /// does not call for a retry.
    pub fn on_abort<R: Rng>(
        &mut self,
        ballot: Ballot,
        decided: bool,
        rng: &mut R,
    ) -> Option<Duration> {
        if decided || ballot <= self.aborted {
            return None;
        }
        self.aborted = ballot;
        Some(self.backoff(rng))
    }

    fn backoff<R: Rng>(&self, rng: &mut R) -> Duration {
        let max = self.max_backoff.as_micros() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(rng.gen_range(0..=max))
    }
}
