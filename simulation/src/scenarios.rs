//! Pre-defined simulation scenarios
//!
//! Each scenario builds a topology, opens channels, starts every node and
//! runs the payments it describes, returning the finished [`Simulation`]
//! for inspection.

use std::time::Duration;

use payroute_core::SimulationIdentity;
use payroute_node::NodeConfig;
use payroute_routing::RoutingConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, info_span, warn};

use crate::error::{SimError, SimResult};
use crate::simulation::{SimConfig, Simulation};
use crate::topology::{MeshBuilder, NodeId, from_edges};

fn node(c: char) -> SimResult<NodeId> {
    SimulationIdentity::new(c).ok_or(SimError::InvalidNode(c))
}

/// Node settings for scenarios with explicitly funded channels: no hellos,
/// so balances only move with payments, and channels that outlive the run
pub fn funded_channels_config() -> SimConfig {
    SimConfig::default().with_node_config(
        NodeConfig::default()
            .with_routing(RoutingConfig::default().with_hello(false))
            .with_channel_lifetime(Duration::from_secs(3600)),
    )
}

/// A - B - C: A pays C through B
///
/// ```text
/// A --(a_to_b)--> B --(b_to_c)--> C
/// ```
///
/// Each channel is funded symmetrically. With enough capacity on both legs
/// the request reaches C, the reply returns a two-hop route and the payment
/// settles; if B's side toward C is short the request dies at B.
pub fn run_abc_scenario(amount: u64, a_to_b: u64, b_to_c: u64) -> SimResult<Simulation> {
    let _span = info_span!("scenario", name = "abc", amount, a_to_b, b_to_c).entered();

    let (a, b, c) = (node('A')?, node('B')?, node('C')?);
    let mesh = from_edges(&[('A', 'B'), ('B', 'C')])?;
    let mut sim = Simulation::new(mesh, funded_channels_config());
    sim.open_channel(a, a_to_b, b, a_to_b)?;
    sim.open_channel(b, b_to_c, c, b_to_c)?;
    sim.start_all()?;

    let start = sim.pay(a, c, amount)?;
    info!(?start, "A asked to pay C");
    sim.run();
    Ok(sim)
}

/// The A-B-C line where B only has 5 toward C
pub fn run_capacity_shortfall_scenario(amount: u64) -> SimResult<Simulation> {
    run_abc_scenario(amount, 15, 5)
}

/// Diamond A-{B,C}-D: pay, break the link the route used, pay again
///
/// The broken channel closes at the next purge, the upstream hop
/// invalidates its route and sends a route error back to A, and the second
/// payment discovers the path through the other side.
pub fn run_link_failure_scenario(amount: u64) -> SimResult<Simulation> {
    let _span = info_span!("scenario", name = "link_failure", amount).entered();

    let (a, b, c, d) = (node('A')?, node('B')?, node('C')?, node('D')?);
    let mesh = from_edges(&[('A', 'B'), ('A', 'C'), ('B', 'D'), ('C', 'D')])?;
    let mut sim = Simulation::new(mesh, funded_channels_config());
    for (x, y) in [(a, b), (a, c), (b, d), (c, d)] {
        sim.open_channel(x, 100, y, 100)?;
    }
    sim.start_all()?;

    sim.pay(a, d, amount)?;
    sim.run_for(Duration::from_secs(1));

    let Some(first_hop) = sim.route(a, d).and_then(|r| r.next_hop) else {
        info!("No route to D after the first payment");
        sim.run();
        return Ok(sim);
    };
    info!(via = %first_hop, "First payment routed");
    sim.break_link(first_hop, d)?;

    // the purge timer runs every hello interval
    sim.run_for(Duration::from_secs(2));
    sim.pay(a, d, amount)?;
    sim.run();
    Ok(sim)
}

/// Random mesh, channels opened by hello handshakes, random payments
pub fn run_random_scenario(
    node_count: usize,
    connection_probability: f64,
    payments: usize,
    seed: u64,
) -> SimResult<Simulation> {
    let _span = info_span!("scenario", name = "random", node_count, payments, seed).entered();

    let mesh = MeshBuilder::new(node_count)?.random(connection_probability, seed);
    let ids = mesh.node_ids();
    let mut sim = Simulation::new(mesh, SimConfig::default().with_seed(seed));
    sim.start_all()?;
    // let the hello handshakes open channels
    sim.run_for(Duration::from_secs(3));

    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
    if ids.len() >= 2 {
        for _ in 0..payments {
            let from = ids[rng.random_range(0..ids.len())];
            let to = ids[rng.random_range(0..ids.len())];
            if from == to {
                continue;
            }
            let amount = rng.random_range(1..=30);
            if let Err(e) = sim.pay(from, to, amount) {
                warn!(from = %from, to = %to, amount, error = %e, "Payment not started");
            }
            sim.run_for(Duration::from_millis(500));
        }
    }
    sim.run();
    Ok(sim)
}
