use std::fmt;

use rand::Rng;

use super::ballot::Ballot;

/// Identity of a participant, in `[1, N]`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(pub u32);

impl NodeId {
    /// All ids of a system with `n` nodes.
    pub fn all(n: usize) -> impl Iterator<Item = NodeId> {
        (1..=n as u32).map(NodeId)
    }

    pub fn is_member(self, n: usize) -> bool {
        self.0 >= 1 && self.0 as usize <= n
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// The binary value agreed on by a run.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Value {
    Zero,
    One,
}

impl Value {
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        if rng.gen::<bool>() {
            Value::One
        } else {
            Value::Zero
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Zero => write!(f, "0"),
            Value::One => write!(f, "1"),
        }
    }
}

/// A learned decision: the value and the ballot it was decided at.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Decision {
    pub ballot: Ballot,
    pub value: Value,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value={} ballot={}", self.value, self.ballot)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn test_membership() {
        assert!(NodeId(1).is_member(3));
        assert!(NodeId(3).is_member(3));
        assert!(!NodeId(0).is_member(3));
        assert!(!NodeId(4).is_member(3));
        assert_eq!(NodeId::all(3).collect::<Vec<_>>(), vec![NodeId(1), NodeId(2), NodeId(3)]);
    }

    #[test]
    fn test_random_value_draws_both() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let draws: Vec<Value> = (0..64).map(|_| Value::random(&mut rng)).collect();
        assert!(draws.contains(&Value::Zero));
        assert!(draws.contains(&Value::One));
    }
}
