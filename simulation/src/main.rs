//! payroute simulator
//!
//! Runs canned scenarios of payment-channel-aware route discovery and
//! prints what happened.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use payroute_logging::{ConsoleFormat, LogConfig, PayrouteSubscriberBuilder};

use payroute_simulation::{MeshBuilder, Simulation, scenarios};

#[derive(Parser)]
#[command(
    name = "payroute-sim",
    about = "Simulate route discovery and HTLC payments over payment channels",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Also write JSONL logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Print run statistics as JSON after the summary
    #[arg(long, global = true)]
    stats_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// A pays C through B
    Abc {
        #[arg(short, long, default_value = "10")]
        amount: u64,
        /// Deposit on each side of A-B
        #[arg(long, default_value = "15")]
        a_to_b: u64,
        /// Deposit on each side of B-C
        #[arg(long, default_value = "20")]
        b_to_c: u64,
    },

    /// A-B-C with too little capacity between B and C
    Shortfall {
        #[arg(short, long, default_value = "10")]
        amount: u64,
    },

    /// Break the link a route uses and pay again
    LinkFailure {
        #[arg(short, long, default_value = "10")]
        amount: u64,
    },

    /// Random mesh with hello-opened channels and random payments
    Random {
        /// Number of nodes (max 26)
        #[arg(short, long, default_value = "8")]
        nodes: usize,
        #[arg(short, long, default_value = "0.35")]
        connection_prob: f64,
        #[arg(short, long, default_value = "5")]
        payments: usize,
        #[arg(short, long, default_value = "1")]
        seed: u64,
    },

    /// Print a topology
    Topology {
        #[arg(short, long, value_enum, default_value = "ring")]
        kind: TopologyKind,
        /// Number of nodes (max 26)
        #[arg(short, long, default_value = "6")]
        nodes: usize,
        /// Connection probability for random topologies
        #[arg(short, long, default_value = "0.4")]
        connection_prob: f64,
        #[arg(short, long, default_value = "1")]
        seed: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TopologyKind {
    Line,
    Ring,
    Star,
    Full,
    Random,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.log_dir {
        Some(dir) => LogConfig::simulation(dir, "payroute-sim"),
        None => LogConfig::default().with_console_format(ConsoleFormat::Pretty),
    };
    if cli.verbose {
        config = config.with_level("debug");
    }
    config.console.ansi = !cli.json;
    if cli.json {
        config = config.with_console_format(ConsoleFormat::Jsonl);
    }
    let _log_guard = PayrouteSubscriberBuilder::new().with_config(config).init()?;

    let sim = match cli.command {
        Commands::Abc {
            amount,
            a_to_b,
            b_to_c,
        } => scenarios::run_abc_scenario(amount, a_to_b, b_to_c)?,
        Commands::Shortfall { amount } => scenarios::run_capacity_shortfall_scenario(amount)?,
        Commands::LinkFailure { amount } => scenarios::run_link_failure_scenario(amount)?,
        Commands::Random {
            nodes,
            connection_prob,
            payments,
            seed,
        } => scenarios::run_random_scenario(nodes, connection_prob, payments, seed)?,
        Commands::Topology {
            kind,
            nodes,
            connection_prob,
            seed,
        } => {
            let builder = MeshBuilder::new(nodes)?;
            let mesh = match kind {
                TopologyKind::Line => builder.line(),
                TopologyKind::Ring => builder.ring(),
                TopologyKind::Star => builder.star(),
                TopologyKind::Full => builder.full_mesh(),
                TopologyKind::Random => builder.random(connection_prob, seed),
            };
            println!("{}", mesh.visualize());
            return Ok(());
        }
    };

    report(&sim, cli.stats_json)
}

fn report(sim: &Simulation, stats_json: bool) -> anyhow::Result<()> {
    println!("{}", sim.mesh().visualize());
    println!("{}", sim.summary());
    if stats_json {
        println!("{}", serde_json::to_string_pretty(&sim.stats)?);
    }
    Ok(())
}
