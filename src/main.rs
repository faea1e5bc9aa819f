//! Synod consensus simulator.
//!
//! ```bash
//! # 7 nodes, 3 of them fault-prone, on tokio tasks
//! synod-sim --nodes 7 --faulty 3 --fail-prob 0.4
//!
//! # Same run on the deterministic simulated network
//! synod-sim --nodes 7 --faulty 3 --deterministic --seed 7
//! ```

use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use synod_sim::{
    network::{Cluster, RunReport, SimulatedNetwork},
    SimulationConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "synod-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of nodes
    #[arg(short = 'n', long, default_value = "7")]
    nodes: usize,

    /// Number of nodes made fault-prone
    #[arg(short = 'f', long, default_value = "3")]
    faulty: usize,

    /// Crash probability per event of a fault-prone node
    #[arg(long, default_value = "0.4")]
    fail_prob: f64,

    /// Delay before all nodes but the leader are put on hold
    #[arg(long, default_value = "300")]
    hold_delay_ms: u64,

    /// Upper bound of the random delay before retrying after an abort
    #[arg(long, default_value = "5")]
    retry_backoff_ms: u64,

    /// Give up after this long
    #[arg(long, default_value = "10000")]
    timeout_ms: u64,

    /// Random seed
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Draw a new proposal at every round
    #[arg(long)]
    repick_proposal: bool,

    /// Run on the deterministic simulated network instead of tokio tasks
    #[arg(long)]
    deterministic: bool,
}

impl Args {
    fn config(&self) -> SimulationConfig {
        SimulationConfig::new(self.nodes, self.faulty)
            .with_fail_prob(self.fail_prob)
            .with_hold_delay(Duration::from_millis(self.hold_delay_ms))
            .with_retry_backoff(Duration::from_millis(self.retry_backoff_ms))
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_seed(self.seed)
            .with_repick_proposal(self.repick_proposal)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.config();
    info!(?config, deterministic = args.deterministic, "starting run");

    let report = if args.deterministic {
        SimulatedNetwork::new(config)?.run()?
    } else {
        Cluster::new(config)?.run().await?
    };

    print_summary(&report);
    let value = report.check().context("safety violated")?;
    info!(?value, "run checked");
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!("\n=== Run Complete ===");
    println!("Nodes:       {}", report.nodes);
    println!("Fault-prone: {:?}", report.fault_prone);
    println!("Crashed:     {:?}", report.crashed);
    if let Some(leader) = report.leader {
        println!("Leader:      {leader}");
    }
    println!("Rounds:      {}", report.rounds);
    println!("Elapsed:     {:?}", report.elapsed);
    println!("Timed out:   {}", report.timed_out);
    for (node, decision) in &report.decisions {
        match report.latencies.get(node) {
            Some(latency) => println!("  {node}: {decision} after {latency:?}"),
            None => println!("  {node}: {decision}"),
        }
    }
    let undecided = report.undecided();
    if !undecided.is_empty() {
        println!("Undecided:   {undecided:?}");
    }
}
