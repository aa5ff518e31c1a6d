//! The protocol instance
//!
//! A [`PaymentNode`] owns one node's ledger and routing table and the two
//! engines that share them. It is driven entirely from outside: the
//! runtime hands it envelopes and fired timers, and it answers by sending
//! messages, arming timers and queueing [`NodeEvent`]s.

use std::collections::HashMap;
use std::sync::Arc;

use payroute_core::{Envelope, Message, PaymentId, PeerIdentity, Runtime, SimTime, TaskHandle, Timer};
use payroute_ledger::ChannelLedger;
use payroute_payment::{LockOutcome, PaymentEngine, PaymentEvent};
use payroute_routing::{
    DiscoveryEngine, DiscoveryStatus, DuplicatePacketDetection, RelayPolicy, ReplyOutcome,
    RouteResolved, RoutingTable,
};
use tracing::{debug, info, trace, warn};

use crate::config::NodeConfig;
use crate::error::{NodeError, NodeResult};
use crate::event::NodeEvent;

/// How `initiate_payment` proceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStart {
    /// A route was cached; the lock is on its way
    Locked(PaymentId),
    /// Waiting for discovery; the payment starts when a route is found
    ///
    /// Payments to the same destination share one discovery. A larger
    /// amount re-floods it, but a reply to the earlier request can still
    /// resolve first; a queued payment the route cannot carry then ends in
    /// [`NodeEvent::PaymentFailed`].
    Discovering,
}

pub struct PaymentNode<I: PeerIdentity> {
    address: I,
    config: NodeConfig,
    pub(crate) ledger: Arc<ChannelLedger<I>>,
    table: Arc<RoutingTable<I>>,
    pub(crate) discovery: DiscoveryEngine<I>,
    payments: PaymentEngine<I>,
    packet_filter: DuplicatePacketDetection<I>,
    /// Payment amounts queued behind a discovery, per destination
    awaiting_route: HashMap<I, Vec<u64>>,
    pub(crate) events: Vec<NodeEvent<I>>,
    hello_timer: Option<TaskHandle>,
    purge_timer: Option<TaskHandle>,
    started: bool,
}

impl<I: PeerIdentity> PaymentNode<I> {
    pub fn new(address: I, config: NodeConfig) -> Self {
        let ledger = Arc::new(ChannelLedger::new(config.ledger.clone()));
        let table = Arc::new(RoutingTable::new());
        let discovery = DiscoveryEngine::new(
            address.clone(),
            config.routing.clone(),
            table.clone(),
            ledger.clone(),
        );
        let payments = PaymentEngine::new(
            address.clone(),
            config.payment.clone(),
            table.clone(),
            ledger.clone(),
        );
        let packet_filter = DuplicatePacketDetection::new(config.duplicate_lifetime);
        Self {
            address,
            config,
            ledger,
            table,
            discovery,
            payments,
            packet_filter,
            awaiting_route: HashMap::new(),
            events: Vec::new(),
            hello_timer: None,
            purge_timer: None,
            started: false,
        }
    }

    /// Replace the relay policy used when forwarding discoveries
    pub fn with_policy(mut self, policy: impl RelayPolicy<I> + 'static) -> Self {
        self.discovery = self.discovery.with_policy(policy);
        self
    }

    pub fn address(&self) -> &I {
        &self.address
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<ChannelLedger<I>> {
        &self.ledger
    }

    pub fn table(&self) -> &Arc<RoutingTable<I>> {
        &self.table
    }

    pub fn discovery(&self) -> &DiscoveryEngine<I> {
        &self.discovery
    }

    pub fn payments(&self) -> &PaymentEngine<I> {
        &self.payments
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Arm the periodic timers and send the first hello
    pub fn start<R: Runtime<I>>(&mut self, rt: &mut R) {
        if self.started {
            return;
        }
        self.started = true;
        self.discovery.start(rt);

        let interval = self.config.routing.hello_interval;
        if self.config.routing.enable_hello {
            self.send_hellos(rt);
            self.hello_timer = Some(rt.schedule(interval, Timer::Hello));
        }
        self.purge_timer = Some(rt.schedule(interval, Timer::Purge));
        info!(node = %self.address, hello = self.config.routing.enable_hello, "Node started");
    }

    /// Cancel the periodic timers; the node stops announcing itself and
    /// its neighbors' channels lapse
    pub fn stop<R: Runtime<I>>(&mut self, rt: &mut R) {
        for timer in [self.hello_timer.take(), self.purge_timer.take()]
            .into_iter()
            .flatten()
        {
            rt.cancel(timer);
        }
        self.started = false;
        info!(node = %self.address, "Node stopped");
    }

    /// Open a channel with explicit deposits
    pub fn open_channel(
        &self,
        peer: I,
        my_deposit: u64,
        peer_deposit: u64,
        now: SimTime,
    ) -> NodeResult<()> {
        let lifetime = self.config.effective_channel_lifetime();
        self.ledger
            .open(peer, my_deposit, peer_deposit, lifetime, now)?;
        Ok(())
    }

    /// Pay `amount` to `dst`, discovering a route first if needed
    ///
    /// A failed discovery surfaces later as [`NodeEvent::RouteNotFound`].
    pub fn initiate_payment<R: Runtime<I>>(
        &mut self,
        dst: I,
        amount: u64,
        rt: &mut R,
    ) -> NodeResult<PaymentStart> {
        if !self.started {
            return Err(NodeError::NotStarted);
        }
        match self.discovery.initiate(dst.clone(), amount, rt)? {
            DiscoveryStatus::Cached(route) => {
                trace!(dst = %dst, hops = route.hop_count, "Paying over cached route");
                let payment_id = self.payments.initiate(dst, amount, rt)?;
                Ok(PaymentStart::Locked(payment_id))
            }
            DiscoveryStatus::Searching | DiscoveryStatus::Deferred => {
                self.awaiting_route.entry(dst).or_default().push(amount);
                Ok(PaymentStart::Discovering)
            }
        }
    }

    /// Take the events queued since the last call
    pub fn drain_events(&mut self) -> Vec<NodeEvent<I>> {
        std::mem::take(&mut self.events)
    }

    /// Dispatch one received datagram
    pub fn handle_envelope<R: Runtime<I>>(&mut self, envelope: Envelope<I>, rt: &mut R) {
        if let Err(e) = envelope.validate() {
            warn!(node = %self.address, sender = %envelope.sender, error = %e, "Dropping malformed envelope");
            return;
        }
        let now = rt.now();
        if self
            .packet_filter
            .is_duplicate(&envelope.sender, envelope.packet_id, now)
        {
            trace!(sender = %envelope.sender, packet_id = envelope.packet_id, "Duplicate packet");
            return;
        }

        let sender = envelope.sender;
        trace!(
            node = %self.address,
            sender = %sender,
            class = %envelope.class,
            kind = envelope.message.kind(),
            "Received"
        );
        match envelope.message {
            Message::Hello(hello) => self.on_hello(sender, hello, rt),
            Message::RouteRequest(req) => {
                self.discovery.on_request(sender, req, rt);
            }
            Message::RouteReply(rep) => {
                if let ReplyOutcome::DestinedForMe(Some(resolved)) =
                    self.discovery.on_reply(sender, rep, rt)
                {
                    self.on_route_resolved(resolved, rt);
                }
            }
            Message::RouteReplyAck => self.discovery.on_reply_ack(&sender, rt),
            Message::RouteError(rerr) => {
                self.discovery.on_route_error(&sender, rerr, rt);
            }
            Message::Lock(lock) => {
                if let LockOutcome::Refused(reason) = self.payments.on_lock(sender, lock, rt) {
                    debug!(node = %self.address, reason = %reason, "Lock refused");
                }
            }
            Message::PaymentAbort(abort) => {
                let event = self.payments.on_abort(&sender, abort, rt);
                self.push_payment_event(event);
            }
            Message::SecretRequest(req) => self.payments.on_secret_request(&sender, req, rt),
            Message::SecretAck(ack) => {
                let event = self.payments.on_secret_ack(&sender, ack, rt);
                self.push_payment_event(event);
            }
            Message::SecretReveal(reveal) => {
                let event = self.payments.on_reveal(&sender, reveal, rt);
                self.push_payment_event(event);
            }
            Message::BalanceProofCommit(commit) => {
                self.payments.on_commit(&sender, commit);
            }
        }
    }

    /// Dispatch one fired timer
    pub fn handle_timer<R: Runtime<I>>(&mut self, timer: Timer<I>, rt: &mut R) {
        let now = rt.now();
        match timer {
            Timer::Hello => {
                self.send_hellos(rt);
                self.hello_timer = Some(rt.schedule(self.config.routing.hello_interval, Timer::Hello));
            }
            Timer::Purge => {
                self.purge(rt);
                self.purge_timer = Some(rt.schedule(self.config.routing.hello_interval, Timer::Purge));
            }
            Timer::RateLimitReset => self.discovery.on_rate_limit_reset(rt),
            Timer::RouteRequestRetry { dst } => {
                if let Some(failed) = self.discovery.on_retry_timer(&dst, rt) {
                    self.on_route_not_found(failed.dst);
                }
            }
            Timer::DeferredRequest { dst } => self.discovery.on_deferred_request(&dst, rt),
            Timer::ReplyAck { neighbor } => self.discovery.on_ack_timeout(&neighbor, now),
            Timer::PaymentTimeout { payment_id } => {
                let event = self.payments.on_payment_timeout(&payment_id);
                self.push_payment_event(event);
            }
            Timer::LockExpiry { payment_id } => self.payments.on_lock_expiry(&payment_id),
        }
    }

    /// Close dead channels, expire routes and reap duplicate caches
    pub fn purge<R: Runtime<I>>(&mut self, rt: &mut R) {
        let now = rt.now();
        let discovery = &mut self.discovery;
        let events = &mut self.events;
        self.ledger.purge(now, |channel| {
            info!(peer = %channel.peer, "Channel closed");
            discovery.on_neighbor_link_failed(&channel.peer, rt);
            events.push(NodeEvent::ChannelClosed {
                peer: channel.peer.clone(),
                latest_proof: channel.latest_received_proof.clone(),
            });
        });
        self.discovery.purge(now);
        self.packet_filter.purge(now);
    }

    fn on_route_resolved<R: Runtime<I>>(&mut self, resolved: RouteResolved<I>, rt: &mut R) {
        info!(
            node = %self.address,
            dst = %resolved.dst,
            hops = resolved.hop_count,
            reward = resolved.reward,
            "Route discovered"
        );
        let dst = resolved.dst.clone();
        self.events.push(NodeEvent::RouteDiscovered {
            dst: resolved.dst,
            next_hop: resolved.next_hop,
            hop_count: resolved.hop_count,
            reward: resolved.reward,
        });

        for amount in self.awaiting_route.remove(&dst).unwrap_or_default() {
            if let Err(e) = self.payments.initiate(dst.clone(), amount, rt) {
                warn!(dst = %dst, amount, error = %e, "Payment could not start after discovery");
                self.events.push(NodeEvent::PaymentFailed {
                    payment_id: None,
                    target: dst.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    fn on_route_not_found(&mut self, dst: I) {
        let amounts = self.awaiting_route.remove(&dst).unwrap_or_default();
        for amount in amounts {
            self.events.push(NodeEvent::RouteNotFound {
                dst: dst.clone(),
                amount,
            });
        }
    }

    fn push_payment_event(&mut self, event: Option<PaymentEvent<I>>) {
        let Some(event) = event else {
            return;
        };
        let event = match event {
            PaymentEvent::Completed {
                payment_id,
                target,
                amount,
            } => {
                info!(node = %self.address, target = %target, amount, "Payment completed");
                NodeEvent::PaymentCompleted {
                    payment_id,
                    target,
                    amount,
                }
            }
            PaymentEvent::Received {
                payment_id,
                initiator,
                amount,
            } => {
                info!(node = %self.address, initiator = %initiator, amount, "Payment received");
                NodeEvent::PaymentReceived {
                    payment_id,
                    initiator,
                    amount,
                }
            }
            PaymentEvent::Failed {
                payment_id,
                target,
                reason,
            } => NodeEvent::PaymentFailed {
                payment_id: Some(payment_id),
                target,
                reason: reason.to_string(),
            },
        };
        self.events.push(event);
    }
}
