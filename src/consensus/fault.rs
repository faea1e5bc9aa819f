use rand::Rng;

/*
    Crash-fault model. A node is only fault-prone after it is armed; from
    then on every inbound event flips a coin and with probability
    `fail_prob` the node crashes for good. A crashed node drops everything.
*/

#[derive(Debug, Clone)]
pub struct FaultInjector {
    fail_prob: f64,
    armed: bool,
    crashed: bool,
}

impl FaultInjector {
    pub fn new(fail_prob: f64) -> Self {
        FaultInjector {
            fail_prob: fail_prob.clamp(0.0, 1.0),
            armed: false,
            crashed: false,
        }
    }

    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn is_crashed(&self) -> bool {
        self.crashed
    }

    /// Called before an inbound event is processed. Returns `true` when the
    /// node crashes on this very event.
    pub fn on_event<R: Rng>(&mut self, rng: &mut R) -> bool {
        if !self.armed || self.crashed {
            return false;
        }
        if rng.gen::<f64>() < self.fail_prob {
            self.crashed = true;
            return true;
        }
        false
    }
}
