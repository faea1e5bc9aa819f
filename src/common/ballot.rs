use std::fmt;

use super::types::NodeId;

/*
    Ballots are plain integers ordered the natural way. Node i starts at
    i - N and every new round adds N, so all ballots of node i are
    congruent to i modulo N. Two nodes can never produce the same ballot
    and a single node's ballots strictly increase.
*/

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Ballot(pub i64);

impl Ballot {
    /// Starting point for node `id` in a system of `n` nodes. Always `<= 0`,
    /// so it sorts below any ballot a node actually proposes with.
    pub fn initial(id: NodeId, n: usize) -> Self {
        Ballot(i64::from(id.0) - n as i64)
    }

    /// The ballot of the next round started by the same node.
    pub fn next(self, n: usize) -> Self {
        Ballot(self.0 + n as i64)
    }

    /// Id of the node that owns this ballot.
    pub fn owner(self, n: usize) -> NodeId {
        let n = n as i64;
        let rem = self.0.rem_euclid(n);
        NodeId(if rem == 0 { n as u32 } else { rem as u32 })
    }
}

impl fmt::Display for Ballot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
