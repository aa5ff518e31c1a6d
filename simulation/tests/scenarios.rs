//! End-to-end scenarios over the simulated medium

use std::time::Duration;

use payroute_node::{NodeEvent, PaymentStart};
use payroute_simulation::scenarios::{
    funded_channels_config, run_abc_scenario, run_capacity_shortfall_scenario,
    run_link_failure_scenario,
};
use payroute_simulation::{NodeId, SimConfig, Simulation, SimulationIdentity, from_edges};

fn node(c: char) -> NodeId {
    SimulationIdentity::new(c).unwrap()
}

/// (my_available, peer_available) as `owner` records it toward `peer`
fn balances(sim: &Simulation, owner: char, peer: char) -> (u64, u64) {
    let entry = sim
        .channel(node(owner), node(peer))
        .unwrap_or_else(|| panic!("{owner} has no channel to {peer}"));
    (entry.my_available, entry.peer_available)
}

fn completed(sim: &Simulation, at: char) -> Vec<u64> {
    sim.events_for(node(at))
        .into_iter()
        .filter_map(|e| match e {
            NodeEvent::PaymentCompleted { amount, .. } => Some(*amount),
            _ => None,
        })
        .collect()
}

// ============================================================================
// A - B - C with sufficient capacity
// ============================================================================

#[test]
fn test_abc_discovers_two_hop_route_and_settles() {
    let sim = run_abc_scenario(10, 15, 20).unwrap();

    let a_events = sim.events_for(node('A'));
    assert!(a_events.contains(&&NodeEvent::RouteDiscovered {
        dst: node('C'),
        next_hop: node('B'),
        hop_count: 2,
        reward: 0,
    }));
    assert_eq!(completed(&sim, 'A'), vec![10]);

    let received: Vec<_> = sim
        .events_for(node('C'))
        .into_iter()
        .filter(|e| matches!(e, NodeEvent::PaymentReceived { .. }))
        .collect();
    assert_eq!(received.len(), 1);
    match received[0] {
        NodeEvent::PaymentReceived {
            initiator, amount, ..
        } => {
            assert_eq!(*initiator, node('A'));
            assert_eq!(*amount, 10);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_abc_balances_move_in_opposite_directions_at_b() {
    let sim = run_abc_scenario(10, 15, 20).unwrap();

    assert_eq!(balances(&sim, 'A', 'B'), (5, 25));
    assert_eq!(balances(&sim, 'B', 'A'), (25, 5));
    assert_eq!(balances(&sim, 'B', 'C'), (10, 30));
    assert_eq!(balances(&sim, 'C', 'B'), (30, 10));

    // the paying side's commit reached each receiver
    let at_b = sim.channel(node('B'), node('A')).unwrap();
    assert!(at_b.latest_received_proof.unwrap().is_signed());
    let at_c = sim.channel(node('C'), node('B')).unwrap();
    assert!(at_c.latest_received_proof.unwrap().is_signed());
}

#[test]
fn test_abc_exchanges_the_full_payment_protocol() {
    let sim = run_abc_scenario(10, 15, 20).unwrap();
    let count = |kind: &str| sim.stats.by_kind.get(kind).copied().unwrap_or(0);

    // A -> B and B -> C
    assert_eq!(count("lock"), 2);
    assert_eq!(count("secret_reveal"), 2);
    assert_eq!(count("bp_commit"), 2);
    assert_eq!(count("secret_req"), 2);
    assert_eq!(count("abort"), 0);
    assert_eq!(sim.stats.decode_failures, 0);
    assert_eq!(sim.stats.out_of_range, 0);
}

// ============================================================================
// A - B - C with B short toward C
// ============================================================================

#[test]
fn test_shortfall_stops_request_at_b_and_reports_route_not_found() {
    let sim = run_capacity_shortfall_scenario(10).unwrap();

    assert!(sim.events_for(node('A')).contains(&&NodeEvent::RouteNotFound {
        dst: node('C'),
        amount: 10,
    }));
    assert!(completed(&sim, 'A').is_empty());
    assert!(sim.events_for(node('C')).is_empty());

    // one flood plus two retries, none forwarded by B
    assert_eq!(sim.stats.by_kind.get("rreq").copied(), Some(3));
    assert_eq!(sim.stats.by_kind.get("rrep").copied(), None);

    assert_eq!(balances(&sim, 'A', 'B'), (15, 15));
    assert_eq!(balances(&sim, 'B', 'C'), (5, 5));
}

// ============================================================================
// Route repair after a link failure
// ============================================================================

#[test]
fn test_link_failure_closes_channel_and_second_payment_reroutes() {
    let sim = run_link_failure_scenario(10).unwrap();

    assert_eq!(completed(&sim, 'A'), vec![10, 10]);

    let closed: Vec<NodeId> = ['B', 'C']
        .into_iter()
        .map(node)
        .filter(|hop| {
            sim.events_for(*hop).iter().any(|e| {
                matches!(e, NodeEvent::ChannelClosed { peer, .. } if *peer == node('D'))
            })
        })
        .collect();
    assert_eq!(closed.len(), 1, "exactly one relay lost its link to D");

    // one payment over each side of the diamond
    assert_eq!(balances(&sim, 'A', 'B').0, 90);
    assert_eq!(balances(&sim, 'A', 'C').0, 90);
    assert!(sim.stats.by_kind.get("rerr").copied().unwrap_or(0) >= 1);
}

// ============================================================================
// Driving the simulation directly
// ============================================================================

#[test]
fn test_cached_route_locks_immediately() {
    let (a, b, c) = (node('A'), node('B'), node('C'));
    let mesh = from_edges(&[('A', 'B'), ('B', 'C')]).unwrap();
    let config = SimConfig {
        wire_encoding: false,
        ..funded_channels_config()
    };
    let mut sim = Simulation::new(mesh, config);
    sim.open_channel(a, 15, b, 15).unwrap();
    sim.open_channel(b, 20, c, 20).unwrap();
    sim.start_all().unwrap();

    assert_eq!(sim.pay(a, c, 5).unwrap(), PaymentStart::Discovering);
    sim.run_for(Duration::from_secs(1));

    let second = sim.pay(a, c, 5).unwrap();
    let PaymentStart::Locked(payment_id) = second else {
        panic!("expected a cached route, got {second:?}");
    };
    assert!(sim.trace(&payment_id).is_some());
    sim.run_for(Duration::from_secs(1));

    assert_eq!(completed(&sim, 'A'), vec![5, 5]);
    assert_eq!(balances(&sim, 'A', 'B'), (5, 25));
    assert_eq!(balances(&sim, 'C', 'B'), (30, 10));
}

/// A - B - C with a route to C already discovered by a first payment of 10
fn line_with_route(a_to_b: u64, b_to_c: u64) -> Simulation {
    let (a, b, c) = (node('A'), node('B'), node('C'));
    let mesh = from_edges(&[('A', 'B'), ('B', 'C')]).unwrap();
    let config = SimConfig {
        wire_encoding: false,
        ..funded_channels_config()
    };
    let mut sim = Simulation::new(mesh, config);
    sim.open_channel(a, a_to_b, b, a_to_b).unwrap();
    sim.open_channel(b, b_to_c, c, b_to_c).unwrap();
    sim.start_all().unwrap();
    sim.pay(a, c, 10).unwrap();
    sim.run_for(Duration::from_secs(1));
    assert_eq!(completed(&sim, 'A'), vec![10]);
    sim
}

/// Nothing locked and both sides sum to the deposits
fn assert_settled(sim: &Simulation, owner: char, peer: char) {
    let entry = sim.channel(node(owner), node(peer)).unwrap();
    assert_eq!((entry.locked_out, entry.locked_in), (0, 0), "{owner}->{peer} still locked");
    assert_eq!(entry.my_available + entry.peer_available, entry.capacity());
}

#[test]
fn test_back_to_back_payments_cannot_overdraw_mediator() {
    let mut sim = line_with_route(50, 25);
    // B has 15 left toward C: room for one more payment of 10
    assert!(matches!(sim.pay(node('A'), node('C'), 10).unwrap(), PaymentStart::Locked(_)));
    assert!(matches!(sim.pay(node('A'), node('C'), 10).unwrap(), PaymentStart::Locked(_)));
    sim.run_for(Duration::from_secs(1));

    assert_eq!(completed(&sim, 'A'), vec![10, 10]);
    let failed = sim
        .events_for(node('A'))
        .into_iter()
        .filter(|e| matches!(e, NodeEvent::PaymentFailed { .. }))
        .count();
    assert_eq!(failed, 1);

    assert_eq!(balances(&sim, 'A', 'B'), (30, 70));
    assert_eq!(balances(&sim, 'B', 'A'), (70, 30));
    assert_eq!(balances(&sim, 'B', 'C'), (5, 45));
    assert_eq!(balances(&sim, 'C', 'B'), (45, 5));
    for (owner, peer) in [('A', 'B'), ('B', 'A'), ('B', 'C'), ('C', 'B')] {
        assert_settled(&sim, owner, peer);
    }
}

#[test]
fn test_back_to_back_payments_keep_proofs_cumulative() {
    let mut sim = line_with_route(50, 50);
    sim.pay(node('A'), node('C'), 10).unwrap();
    sim.pay(node('A'), node('C'), 10).unwrap();
    sim.run_for(Duration::from_secs(1));
    assert_eq!(completed(&sim, 'A'), vec![10, 10, 10]);

    for (payer, payee) in [('A', 'B'), ('B', 'C')] {
        let sent = sim.channel(node(payer), node(payee)).unwrap();
        let received = sim.channel(node(payee), node(payer)).unwrap();
        assert_eq!((sent.sent_total, received.received_total), (30, 30));
        assert_eq!(
            sent.latest_sent_proof.unwrap().payload.transferred_amount,
            sent.sent_total
        );
        let proof = received.latest_received_proof.unwrap();
        assert_eq!(proof.payload.transferred_amount, received.received_total);
        assert!(proof.is_signed());
        assert_settled(&sim, payer, payee);
        assert_settled(&sim, payee, payer);
    }
}

#[test]
fn test_payment_to_self_is_rejected() {
    let mesh = from_edges(&[('A', 'B')]).unwrap();
    let mut sim = Simulation::new(mesh, funded_channels_config());
    sim.start_all().unwrap();
    assert!(sim.pay(node('A'), node('A'), 5).is_err());
}
