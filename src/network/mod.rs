pub mod bootstrap;
pub mod cluster;
pub mod report;
pub mod router;
pub mod sim;

pub use bootstrap::*;
pub use cluster::*;
pub use report::*;
pub use router::*;
pub use sim::*;

/*
    The orchestrator side of a run. Nodes only exchange messages; the
    network delivers them with per sender/receiver FIFO order and no bound
    on latency. Two drivers share the same bootstrap: the tokio cluster,
    where every node is its own task, and a single-threaded simulated
    network with virtual time that replays identically for a given seed.
*/
