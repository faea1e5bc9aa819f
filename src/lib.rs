/*
    Simulation harness for single-decree, ballot-based consensus (Synod).

    A fixed set of N nodes, each both proposer and acceptor, agree on one
    binary value by exchanging Read / Gather / Impose / Ack / Abort / Decide
    messages. Up to f of them can be made fault-prone, after which they may
    crash on any event. Agreement and validity hold regardless; termination
    is helped by putting every node but one on hold after a delay.
*/

pub mod common;
pub mod config;
pub mod consensus;
pub mod network;

pub use config::{NodeConfig, SimulationConfig};
