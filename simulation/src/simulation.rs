//! Discrete-event simulation engine
//!
//! Every node is a [`PaymentNode`] driven through a [`NodeRuntime`] that
//! borrows the shared event queue for the length of one dispatch. Events
//! are processed in (virtual time, insertion order), so a run is fully
//! determined by the topology, the seed and the calls made on it.
//!
//! The medium is a lossy broadcast radio: a broadcast reaches every mesh
//! neighbor, a unicast reaches its target only when it is in range, and
//! each copy is independently dropped with `loss_probability`. Frames are
//! carried as encoded bytes unless `wire_encoding` is off.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::time::Duration;

use payroute_core::{
    Destination, Envelope, Message, PaymentId, Runtime, SimTime, TaskHandle, Timer,
};
use payroute_ledger::ChannelEntry;
use payroute_logging::{NodeContextGuard, PaymentTrace};
use payroute_node::{NodeConfig, NodeEvent, PaymentNode, PaymentStart};
use payroute_routing::RouteEntry;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::error::{SimError, SimResult};
use crate::topology::{Mesh, NodeId};

/// Configuration for the simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// One-hop propagation delay
    pub latency: Duration,
    /// Uniform extra delay in `[0, jitter]` per copy
    pub jitter: Duration,
    /// Chance each transmitted copy is lost
    pub loss_probability: f64,
    pub seed: u64,
    /// Events after this virtual time are never processed
    pub time_limit: Duration,
    /// Round-trip every frame through its byte encoding
    pub wire_encoding: bool,
    /// Configuration shared by every node
    pub node: NodeConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(5),
            jitter: Duration::ZERO,
            loss_probability: 0.0,
            seed: 0,
            time_limit: Duration::from_secs(60),
            wire_encoding: true,
            node: NodeConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_loss(mut self, probability: f64) -> Self {
        self.loss_probability = probability.clamp(0.0, 1.0);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = limit;
        self
    }

    pub fn with_node_config(mut self, node: NodeConfig) -> Self {
        self.node = node;
        self
    }
}

/// Simulation statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimStats {
    /// Copies put on the medium, one per receiver
    pub transmissions: u64,
    pub delivered: u64,
    pub lost: u64,
    /// Unicasts addressed to a node out of radio range
    pub out_of_range: u64,
    pub decode_failures: u64,
    pub timers_fired: u64,
    pub timers_cancelled: u64,
    /// Messages sent, by kind
    pub by_kind: BTreeMap<String, u64>,
}

/// A node event stamped with when and where it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimEvent {
    pub at: SimTime,
    pub node: NodeId,
    pub event: NodeEvent<NodeId>,
}

/// One side's view of a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelView {
    pub owner: NodeId,
    pub peer: NodeId,
    pub my_available: u64,
    pub peer_available: u64,
}

#[derive(Debug, Clone)]
enum Frame {
    Bytes(Vec<u8>),
    Envelope(Envelope<NodeId>),
}

#[derive(Debug)]
enum Action {
    Deliver {
        to: NodeId,
        frame: Frame,
    },
    Fire {
        node: NodeId,
        handle: u64,
        timer: Timer<NodeId>,
    },
}

#[derive(Debug)]
struct Scheduled {
    at: SimTime,
    seq: u64,
    action: Action,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // reversed: BinaryHeap is a max-heap and we want the earliest first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
struct EventQueue {
    heap: BinaryHeap<Scheduled>,
    next_seq: u64,
    next_handle: u64,
    cancelled: HashSet<u64>,
}

impl EventQueue {
    fn push(&mut self, at: SimTime, action: Action) {
        self.next_seq += 1;
        self.heap.push(Scheduled {
            at,
            seq: self.next_seq,
            action,
        });
    }

    fn allocate_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn peek_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|s| s.at)
    }
}

/// The runtime one node sees while handling a single event
struct NodeRuntime<'a> {
    node: NodeId,
    now: SimTime,
    mesh: &'a Mesh,
    queue: &'a mut EventQueue,
    rng: &'a mut StdRng,
    config: &'a SimConfig,
    stats: &'a mut SimStats,
    next_packet: &'a mut u32,
}

impl NodeRuntime<'_> {
    fn copy_delay(&mut self) -> Duration {
        let jitter = self.config.jitter.as_micros() as u64;
        if jitter == 0 {
            self.config.latency
        } else {
            self.config.latency + Duration::from_micros(self.rng.random_range(0..=jitter))
        }
    }
}

impl Runtime<NodeId> for NodeRuntime<'_> {
    fn now(&self) -> SimTime {
        self.now
    }

    fn send(&mut self, destination: Destination<NodeId>, message: Message<NodeId>) {
        *self.next_packet = self.next_packet.wrapping_add(1);
        let envelope = Envelope::new(self.node, *self.next_packet, message);
        *self
            .stats
            .by_kind
            .entry(envelope.message.kind().to_string())
            .or_default() += 1;

        let receivers: Vec<NodeId> = match destination {
            Destination::Unicast(peer) if self.mesh.are_connected(self.node, peer) => vec![peer],
            Destination::Unicast(peer) => {
                trace!(from = %self.node, to = %peer, "Unicast out of range");
                self.stats.out_of_range += 1;
                Vec::new()
            }
            Destination::Broadcast => self.mesh.neighbors(self.node).collect(),
        };
        if receivers.is_empty() {
            return;
        }

        let frame = if self.config.wire_encoding {
            match envelope.to_bytes() {
                Ok(bytes) => Frame::Bytes(bytes),
                Err(e) => {
                    warn!(error = %e, "Dropping unencodable message");
                    return;
                }
            }
        } else {
            Frame::Envelope(envelope)
        };

        for to in receivers {
            self.stats.transmissions += 1;
            if self.config.loss_probability > 0.0
                && self.rng.random_bool(self.config.loss_probability)
            {
                trace!(from = %self.node, to = %to, "Copy lost");
                self.stats.lost += 1;
                continue;
            }
            let at = self.now + self.copy_delay();
            self.queue.push(
                at,
                Action::Deliver {
                    to,
                    frame: frame.clone(),
                },
            );
        }
    }

    fn schedule(&mut self, delay: Duration, timer: Timer<NodeId>) -> TaskHandle {
        let handle = self.queue.allocate_handle();
        self.queue.push(
            self.now + delay,
            Action::Fire {
                node: self.node,
                handle,
                timer,
            },
        );
        TaskHandle::new(handle)
    }

    fn cancel(&mut self, handle: TaskHandle) {
        if self.queue.cancelled.insert(handle.id()) {
            self.stats.timers_cancelled += 1;
        }
    }
}

/// The simulation state
pub struct Simulation {
    mesh: Mesh,
    nodes: BTreeMap<NodeId, PaymentNode<NodeId>>,
    packet_counters: BTreeMap<NodeId, u32>,
    queue: EventQueue,
    rng: StdRng,
    config: SimConfig,
    now: SimTime,
    events: Vec<SimEvent>,
    traces: HashMap<PaymentId, PaymentTrace>,
    pub stats: SimStats,
}

impl Simulation {
    /// One node per mesh vertex, all sharing `config.node`
    pub fn new(mesh: Mesh, config: SimConfig) -> Self {
        let nodes = mesh
            .node_ids()
            .into_iter()
            .map(|id| (id, PaymentNode::new(id, config.node.clone())))
            .collect();
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            mesh,
            nodes,
            packet_counters: BTreeMap::new(),
            queue: EventQueue::default(),
            config,
            now: SimTime::ZERO,
            events: Vec::new(),
            traces: HashMap::new(),
            stats: SimStats::default(),
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn node(&self, id: NodeId) -> Option<&PaymentNode<NodeId>> {
        self.nodes.get(&id)
    }

    /// Every node event so far, in order
    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    pub fn events_for(&self, id: NodeId) -> Vec<&NodeEvent<NodeId>> {
        self.events
            .iter()
            .filter(|e| e.node == id)
            .map(|e| &e.event)
            .collect()
    }

    /// Queued deliveries and timers, cancelled ones included
    pub fn pending(&self) -> usize {
        self.queue.heap.len()
    }

    pub fn trace(&self, payment_id: &PaymentId) -> Option<&PaymentTrace> {
        self.traces.get(payment_id)
    }

    /// `owner`'s record of its channel to `peer`
    pub fn channel(&self, owner: NodeId, peer: NodeId) -> Option<ChannelEntry<NodeId>> {
        self.nodes.get(&owner)?.ledger().get(&peer).ok()
    }

    /// `owner`'s current valid route to `dst`
    pub fn route(&self, owner: NodeId, dst: NodeId) -> Option<RouteEntry<NodeId>> {
        self.nodes
            .get(&owner)?
            .table()
            .lookup_valid(&dst, self.now)
            .ok()
    }

    /// Every open channel, from both sides
    pub fn channels(&self) -> Vec<ChannelView> {
        let mut views = Vec::new();
        for (owner, node) in &self.nodes {
            for peer in node.ledger().neighbors() {
                if let Ok(entry) = node.ledger().get(&peer) {
                    views.push(ChannelView {
                        owner: *owner,
                        peer,
                        my_available: entry.my_available,
                        peer_available: entry.peer_available,
                    });
                }
            }
        }
        views
    }

    /// Start every node: first hellos and periodic timers
    pub fn start_all(&mut self) -> SimResult<()> {
        for id in self.mesh.node_ids() {
            self.with_node(id, |node, rt| node.start(rt))?;
        }
        info!(nodes = self.nodes.len(), "Simulation started");
        Ok(())
    }

    /// Open a channel with explicit deposits on both sides
    pub fn open_channel(
        &mut self,
        a: NodeId,
        a_deposit: u64,
        b: NodeId,
        b_deposit: u64,
    ) -> SimResult<()> {
        if !self.mesh.are_connected(a, b) {
            return Err(SimError::NotInRange(a, b));
        }
        let now = self.now;
        self.nodes
            .get(&a)
            .ok_or(SimError::UnknownNode(a))?
            .open_channel(b, a_deposit, b_deposit, now)?;
        self.nodes
            .get(&b)
            .ok_or(SimError::UnknownNode(b))?
            .open_channel(a, b_deposit, a_deposit, now)?;
        debug!(a = %a, b = %b, a_deposit, b_deposit, "Channel opened");
        Ok(())
    }

    /// Ask `from` to pay `to`
    pub fn pay(&mut self, from: NodeId, to: NodeId, amount: u64) -> SimResult<PaymentStart> {
        let start = self.with_node(from, |node, rt| node.initiate_payment(to, amount, rt))??;
        if let PaymentStart::Locked(payment_id) = start {
            let trace = self.trace_for(payment_id);
            trace.span().in_scope(|| {
                info!(from = %from, to = %to, amount, "Payment locked");
            });
        }
        Ok(start)
    }

    /// Take `a` and `b` out of range and fail their channel on both sides;
    /// the next purge closes it and reports the broken routes
    pub fn break_link(&mut self, a: NodeId, b: NodeId) -> SimResult<()> {
        if !self.mesh.disconnect(a, b) {
            return Err(SimError::NotInRange(a, b));
        }
        for (owner, peer) in [(a, b), (b, a)] {
            let node = self.nodes.get(&owner).ok_or(SimError::UnknownNode(owner))?;
            if let Err(e) = node.ledger().mark_failed(&peer) {
                debug!(owner = %owner, peer = %peer, error = %e, "No channel to fail");
            }
        }
        info!(a = %a, b = %b, "Link broken");
        Ok(())
    }

    /// Process the next event; false when nothing is left before the limit
    pub fn step(&mut self) -> bool {
        let deadline = SimTime::from_duration(self.config.time_limit);
        match self.queue.peek_time() {
            Some(at) if at <= deadline => {}
            _ => return false,
        }
        let Some(next) = self.queue.heap.pop() else {
            return false;
        };
        self.now = next.at;

        match next.action {
            Action::Deliver { to, frame } => self.deliver(to, frame),
            Action::Fire {
                node,
                handle,
                timer,
            } => {
                if self.queue.cancelled.remove(&handle) {
                    return true;
                }
                self.stats.timers_fired += 1;
                if let Err(e) = self.with_node(node, |n, rt| n.handle_timer(timer, rt)) {
                    warn!(error = %e, "Timer for missing node");
                }
            }
        }
        true
    }

    /// Run until `until` or the time limit, whichever is first
    pub fn run_until(&mut self, until: SimTime) -> usize {
        let mut steps = 0;
        while self.queue.peek_time().is_some_and(|at| at <= until) && self.step() {
            steps += 1;
        }
        if self.now < until {
            self.now = until.min(SimTime::from_duration(self.config.time_limit));
        }
        steps
    }

    pub fn run_for(&mut self, duration: Duration) -> usize {
        self.run_until(self.now + duration)
    }

    /// Run to the time limit or until nothing is queued
    pub fn run(&mut self) -> usize {
        let mut steps = 0;
        while self.step() {
            steps += 1;
        }
        info!(steps, now = %self.now, "Simulation complete");
        steps
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Simulated time: {}\n", self.now));
        out.push_str(&format!(
            "Transmissions: {} (delivered {}, lost {}, out of range {})\n",
            self.stats.transmissions,
            self.stats.delivered,
            self.stats.lost,
            self.stats.out_of_range
        ));
        for (kind, count) in &self.stats.by_kind {
            out.push_str(&format!("  {kind}: {count}\n"));
        }
        out.push_str("Channels (owner -> peer: mine / theirs):\n");
        for view in self.channels() {
            out.push_str(&format!(
                "  {} -> {}: {} / {}\n",
                view.owner, view.peer, view.my_available, view.peer_available
            ));
        }
        out.push_str("Events:\n");
        for e in &self.events {
            out.push_str(&format!("  [{}] {}: {:?}\n", e.at, e.node, e.event));
        }
        out
    }

    fn deliver(&mut self, to: NodeId, frame: Frame) {
        let envelope = match frame {
            Frame::Envelope(envelope) => envelope,
            Frame::Bytes(bytes) => match Envelope::from_bytes(&bytes) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(to = %to, error = %e, "Undecodable frame");
                    self.stats.decode_failures += 1;
                    return;
                }
            },
        };
        self.stats.delivered += 1;
        if let Err(e) = self.with_node(to, |n, rt| n.handle_envelope(envelope, rt)) {
            warn!(error = %e, "Frame for missing node");
        }
    }

    /// Run `f` against node `id` with a runtime bound to the shared queue,
    /// then collect whatever events it raised
    fn with_node<T>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut PaymentNode<NodeId>, &mut NodeRuntime<'_>) -> T,
    ) -> SimResult<T> {
        let _context = NodeContextGuard::at(&id, self.now);
        let Self {
            mesh,
            nodes,
            packet_counters,
            queue,
            rng,
            config,
            now,
            stats,
            ..
        } = &mut *self;
        let node = nodes.get_mut(&id).ok_or(SimError::UnknownNode(id))?;
        let mut rt = NodeRuntime {
            node: id,
            now: *now,
            mesh,
            queue,
            rng,
            config,
            stats,
            next_packet: packet_counters.entry(id).or_default(),
        };
        let out = f(node, &mut rt);
        let raised = node.drain_events();
        self.record(id, raised);
        Ok(out)
    }

    fn record(&mut self, node: NodeId, raised: Vec<NodeEvent<NodeId>>) {
        for event in raised {
            match &event {
                NodeEvent::PaymentCompleted { payment_id, .. }
                | NodeEvent::PaymentReceived { payment_id, .. } => {
                    let trace = self.trace_for(*payment_id);
                    trace.span().in_scope(|| info!(node = %node, event = ?event, "Payment settled"));
                }
                NodeEvent::PaymentFailed { reason, .. } => {
                    warn!(node = %node, reason = %reason, "Payment failed");
                }
                NodeEvent::BalanceDisagreement { peer, recorded, claimed } => {
                    warn!(node = %node, peer = %peer, recorded, claimed, "Balance disagreement");
                }
                _ => debug!(node = %node, event = ?event, "Node event"),
            }
            self.events.push(SimEvent {
                at: self.now,
                node,
                event,
            });
        }
    }

    fn trace_for(&mut self, payment_id: PaymentId) -> PaymentTrace {
        self.traces
            .entry(payment_id)
            .or_insert_with(|| PaymentTrace::root(payment_id))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::from_edges;
    use payroute_core::SimulationIdentity;

    fn node(c: char) -> NodeId {
        SimulationIdentity::new(c).unwrap()
    }

    fn quiet() -> SimConfig {
        SimConfig::default().with_node_config(
            NodeConfig::default().with_channel_lifetime(Duration::from_secs(600)),
        )
    }

    #[test]
    fn test_queue_orders_by_time_then_insertion() {
        let mut queue = EventQueue::default();
        let fire = |h| Action::Fire {
            node: node('A'),
            handle: h,
            timer: Timer::Purge,
        };
        queue.push(SimTime::from_secs(2), fire(1));
        queue.push(SimTime::from_secs(1), fire(2));
        queue.push(SimTime::from_secs(1), fire(3));

        let order: Vec<u64> = std::iter::from_fn(|| queue.heap.pop())
            .map(|s| match s.action {
                Action::Fire { handle, .. } => handle,
                Action::Deliver { .. } => 0,
            })
            .collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn test_open_channel_requires_range() {
        let mesh = from_edges(&[('A', 'B'), ('B', 'C')]).unwrap();
        let mut sim = Simulation::new(mesh, quiet());
        sim.open_channel(node('A'), 15, node('B'), 10).unwrap();

        let a_side = sim.channel(node('A'), node('B')).unwrap();
        assert_eq!((a_side.my_available, a_side.peer_available), (15, 10));
        let b_side = sim.channel(node('B'), node('A')).unwrap();
        assert_eq!((b_side.my_available, b_side.peer_available), (10, 15));

        assert!(matches!(
            sim.open_channel(node('A'), 1, node('C'), 1),
            Err(SimError::NotInRange(_, _))
        ));
    }

    #[test]
    fn test_cancelled_timers_do_not_fire() {
        let mesh = from_edges(&[('A', 'B')]).unwrap();
        let mut sim = Simulation::new(mesh, quiet());
        sim.start_all().unwrap();
        sim.with_node(node('A'), |n, rt| n.stop(rt)).unwrap();

        let before = sim.stats.timers_fired;
        sim.run_for(Duration::from_millis(1500));
        // B keeps its hello, purge and rate timers; A only its rate timer
        assert!(sim.stats.timers_fired > before);
        assert!(sim.stats.timers_cancelled >= 2);
        assert!(!sim.node(node('A')).unwrap().is_started());
    }

    #[test]
    fn test_unicast_out_of_range_is_counted() {
        let mesh = from_edges(&[('A', 'B'), ('C', 'D')]).unwrap();
        let mut sim = Simulation::new(mesh, quiet());
        sim.with_node(node('A'), |_, rt| {
            rt.send(Destination::Unicast(node('C')), Message::RouteReplyAck)
        })
        .unwrap();
        assert_eq!(sim.stats.out_of_range, 1);
        assert_eq!(sim.pending(), 0);
    }

    #[test]
    fn test_total_loss_drops_everything() {
        let mesh = from_edges(&[('A', 'B'), ('A', 'C')]).unwrap();
        let mut sim = Simulation::new(mesh, quiet().with_loss(1.0));
        sim.with_node(node('A'), |_, rt| rt.send(Destination::Broadcast, Message::RouteReplyAck))
            .unwrap();
        assert_eq!(sim.stats.transmissions, 2);
        assert_eq!(sim.stats.lost, 2);
        assert_eq!(sim.pending(), 0);
    }

    #[test]
    fn test_hello_handshake_over_the_medium() {
        let mesh = from_edges(&[('A', 'B')]).unwrap();
        let mut sim = Simulation::new(mesh, SimConfig::default());
        sim.start_all().unwrap();
        sim.run_for(Duration::from_millis(100));

        let a_side = sim.channel(node('A'), node('B')).unwrap();
        let b_side = sim.channel(node('B'), node('A')).unwrap();
        assert_eq!(a_side.my_available, b_side.peer_available);
        assert_eq!(a_side.peer_available, b_side.my_available);
        assert!(sim.stats.by_kind.get("hello").copied().unwrap_or(0) >= 2);
        assert_eq!(sim.stats.decode_failures, 0);
    }
}
