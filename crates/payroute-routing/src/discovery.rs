//! Route discovery engine
//!
//! Drives the request/reply protocol for one node. A destination moves
//! through IDLE → IN_SEARCH → VALID → INVALID and back to IN_SEARCH on a
//! fresh request.
//!
//! # Capacity-aware flooding
//!
//! Every request carries the transaction amount. A node re-floods a request
//! only to neighbors toward which its own available channel balance covers
//! that amount, so any path a reply travels back along can carry the
//! payment.
//!
//! # Timers
//!
//! All waiting is expressed as owned [`TaskHandle`]s:
//! - a retry timer per searched destination (binary exponential backoff)
//! - a deferred-request timer when the request rate limit is hit
//! - an acknowledgment timer per neighbor we sent an ack-required reply to
//! - the rate-limit window timer

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use payroute_core::{
    Destination, Message, PeerIdentity, RequestFlags, RouteError, RouteReply, RouteRequest,
    Runtime, SimTime, TaskHandle, Timer, UnreachableDestination,
};
use payroute_ledger::ChannelLedger;
use tracing::{debug, instrument, trace, warn};

use crate::config::RoutingConfig;
use crate::error::{RoutingError, RoutingResult};
use crate::id_cache::IdCache;
use crate::policy::{NoFeePolicy, RelayPolicy};
use crate::seqno::{freshest, is_fresher};
use crate::table::{InvalidatedRoute, RouteEntry, RouteState, RoutingTable};

/// Result of asking for a route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryStatus<I: PeerIdentity> {
    /// A valid route with enough first-hop capacity already exists
    Cached(RouteEntry<I>),
    /// A request has been flooded (or one is already outstanding)
    Searching,
    /// Held back by the rate limit; will be sent when the window ends
    Deferred,
}

/// Why a request was dropped without propagation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// (originator, request id) already seen
    Duplicate,
    /// Sender is blacklisted as unidirectional
    Blacklisted,
    /// Relay policy declined to serve
    Declined,
    /// Our route to the destination goes back through the sender
    Loop,
}

/// What happened to a received route request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Suppressed(SuppressReason),
    /// We are the destination and replied
    DestinedForMe,
    /// Re-flooded to this many capacity-sufficient neighbors
    Forwarded { neighbors: usize },
    /// Answered from our own fresh route to the destination
    RepliedOnBehalf,
}

/// Why a reply was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyDrop {
    /// No usable reverse route toward the originator
    NoReverseRoute,
}

/// A completed discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteResolved<I: PeerIdentity> {
    pub dst: I,
    pub next_hop: I,
    pub hop_count: u8,
    /// Sum of per-hop rewards charged along the path
    pub reward: u64,
}

/// What happened to a received route reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome<I: PeerIdentity> {
    Dropped(ReplyDrop),
    /// We originated the request; `Some` if this reply resolved an
    /// outstanding discovery
    DestinedForMe(Option<RouteResolved<I>>),
    Forwarded,
}

/// A discovery that ran out of retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryFailed<I: PeerIdentity> {
    pub dst: I,
    pub attempts: u32,
}

struct PendingDiscovery {
    amount: u64,
    requests_sent: u32,
    retry_timer: Option<TaskHandle>,
    deferred_timer: Option<TaskHandle>,
}

pub struct DiscoveryEngine<I: PeerIdentity> {
    address: I,
    config: RoutingConfig,
    table: Arc<RoutingTable<I>>,
    ledger: Arc<ChannelLedger<I>>,
    policy: Box<dyn RelayPolicy<I>>,
    request_cache: IdCache<I>,
    seq_no: u32,
    request_id: u32,
    rreq_count: u16,
    rerr_count: u16,
    window_ends: SimTime,
    rate_timer: Option<TaskHandle>,
    pending: HashMap<I, PendingDiscovery>,
    ack_timers: HashMap<I, TaskHandle>,
}

impl<I: PeerIdentity> DiscoveryEngine<I> {
    pub fn new(
        address: I,
        config: RoutingConfig,
        table: Arc<RoutingTable<I>>,
        ledger: Arc<ChannelLedger<I>>,
    ) -> Self {
        let request_cache = IdCache::new(config.path_discovery_time());
        Self {
            address,
            config,
            table,
            ledger,
            policy: Box::new(NoFeePolicy),
            request_cache,
            seq_no: 0,
            request_id: 0,
            rreq_count: 0,
            rerr_count: 0,
            window_ends: SimTime::ZERO,
            rate_timer: None,
            pending: HashMap::new(),
            ack_timers: HashMap::new(),
        }
    }

    /// Replace the relay policy
    pub fn with_policy(mut self, policy: impl RelayPolicy<I> + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn address(&self) -> &I {
        &self.address
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn table(&self) -> &Arc<RoutingTable<I>> {
        &self.table
    }

    /// Our own destination sequence number
    pub fn seq_no(&self) -> u32 {
        self.seq_no
    }

    pub fn is_searching(&self, dst: &I) -> bool {
        self.pending.contains_key(dst)
    }

    /// Open the first rate-limit window
    pub fn start<R: Runtime<I>>(&mut self, rt: &mut R) {
        self.on_rate_limit_reset(rt);
    }

    /// Find a route to `dst` able to carry `amount`
    pub fn initiate<R: Runtime<I>>(
        &mut self,
        dst: I,
        amount: u64,
        rt: &mut R,
    ) -> RoutingResult<DiscoveryStatus<I>> {
        if dst == self.address {
            return Err(RoutingError::SelfDestination);
        }
        if amount == 0 {
            return Err(RoutingError::ZeroAmount);
        }

        let now = rt.now();
        if let Ok(route) = self.table.lookup_valid(&dst, now) {
            let capacity = route
                .next_hop
                .as_ref()
                .and_then(|hop| self.ledger.my_available(hop).ok())
                .unwrap_or(0);
            if capacity >= amount {
                trace!(dst = %dst, amount, "Using cached route");
                return Ok(DiscoveryStatus::Cached(route));
            }
        }

        if let Some(pending) = self.pending.get_mut(&dst) {
            if amount <= pending.amount {
                return Ok(DiscoveryStatus::Searching);
            }
            // the outstanding request asked for too little
            debug!(dst = %dst, was = pending.amount, amount, "Re-discovering for a larger amount");
            pending.amount = amount;
            pending.requests_sent = 0;
            return Ok(self.send_request(&dst, rt));
        }
        self.pending.insert(
            dst.clone(),
            PendingDiscovery {
                amount,
                requests_sent: 0,
                retry_timer: None,
                deferred_timer: None,
            },
        );
        Ok(self.send_request(&dst, rt))
    }

    fn send_request<R: Runtime<I>>(&mut self, dst: &I, rt: &mut R) -> DiscoveryStatus<I> {
        let now = rt.now();
        let Some(amount) = self.pending.get(dst).map(|p| p.amount) else {
            return DiscoveryStatus::Searching;
        };

        if self.rreq_count >= self.config.rreq_rate_limit {
            let mut delay = now.until(self.window_ends);
            if delay.is_zero() {
                delay = self.config.rate_limit_window;
            }
            if let Some(pending) = self.pending.get_mut(dst) {
                if pending.deferred_timer.is_none() {
                    debug!(dst = %dst, delay_ms = delay.as_millis() as u64, "Route request rate limited");
                    pending.deferred_timer =
                        Some(rt.schedule(delay, Timer::DeferredRequest { dst: dst.clone() }));
                }
            }
            return DiscoveryStatus::Deferred;
        }
        self.rreq_count += 1;

        let mut flags = RequestFlags {
            gratuitous: self.config.gratuitous_reply,
            destination_only: self.config.destination_only,
            unknown_seq: false,
        };
        let mut dst_seq = 0;
        let mut hop_count = 0;
        match self.table.lookup(dst) {
            Ok(mut entry) => {
                if entry.valid_seq {
                    dst_seq = entry.seq;
                } else {
                    flags.unknown_seq = true;
                }
                hop_count = entry.hop_count;
                entry.state = RouteState::InSearch;
                entry.reserved_amount = amount;
                self.write_back(entry);
            }
            Err(_) => {
                flags.unknown_seq = true;
                let entry = RouteEntry::new(dst.clone(), None, 0, now)
                    .with_state(RouteState::InSearch)
                    .with_amount(amount);
                self.table.add_route(entry);
            }
        }

        self.seq_no = self.seq_no.wrapping_add(1);
        self.request_id = self.request_id.wrapping_add(1);
        self.request_cache
            .is_duplicate(&self.address, self.request_id, now);

        let request = RouteRequest {
            flags,
            hop_count: 0,
            request_id: self.request_id,
            dst: dst.clone(),
            dst_seq,
            origin: self.address.clone(),
            origin_seq: self.seq_no,
            amount,
        };
        debug!(
            dst = %dst,
            amount,
            request_id = self.request_id,
            last_hops = hop_count,
            "Flooding route request"
        );
        rt.send(Destination::Broadcast, Message::RouteRequest(request));

        if let Some(pending) = self.pending.get_mut(dst) {
            pending.requests_sent += 1;
            let backoff = self.config.retry_backoff(pending.requests_sent);
            if let Some(old) = pending.retry_timer.take() {
                rt.cancel(old);
            }
            pending.retry_timer =
                Some(rt.schedule(backoff, Timer::RouteRequestRetry { dst: dst.clone() }));
        }
        DiscoveryStatus::Searching
    }

    /// Retry timer fired with no accepted reply
    pub fn on_retry_timer<R: Runtime<I>>(&mut self, dst: &I, rt: &mut R) -> Option<DiscoveryFailed<I>> {
        let now = rt.now();
        let pending = self.pending.get_mut(dst)?;
        // this handle has fired
        pending.retry_timer = None;

        if self.table.lookup_valid(dst, now).is_ok() {
            self.pending.remove(dst);
            return None;
        }

        if pending.requests_sent > self.config.rreq_retries {
            let attempts = pending.requests_sent;
            if let Some(mut pending) = self.pending.remove(dst) {
                if let Some(timer) = pending.deferred_timer.take() {
                    rt.cancel(timer);
                }
            }
            if let Ok(mut entry) = self.table.lookup(dst) {
                if entry.state == RouteState::InSearch {
                    entry.state = RouteState::Invalid;
                    entry.expires_at = now + self.config.delete_period();
                    self.write_back(entry);
                }
            }
            warn!(dst = %dst, attempts, "Route discovery failed");
            return Some(DiscoveryFailed {
                dst: dst.clone(),
                attempts,
            });
        }

        trace!(dst = %dst, sent = pending.requests_sent, "Retrying route request");
        self.send_request(dst, rt);
        None
    }

    /// A rate-limited request may now be sent
    pub fn on_deferred_request<R: Runtime<I>>(&mut self, dst: &I, rt: &mut R) {
        let Some(pending) = self.pending.get_mut(dst) else {
            return;
        };
        pending.deferred_timer = None;
        self.send_request(dst, rt);
    }

    /// Start a new rate-limit window
    pub fn on_rate_limit_reset<R: Runtime<I>>(&mut self, rt: &mut R) {
        self.rreq_count = 0;
        self.rerr_count = 0;
        self.window_ends = rt.now() + self.config.rate_limit_window;
        if let Some(old) = self.rate_timer.take() {
            rt.cancel(old);
        }
        self.rate_timer = Some(rt.schedule(self.config.rate_limit_window, Timer::RateLimitReset));
    }

    #[instrument(
        skip(self, req, rt),
        fields(node = %self.address, origin = %req.origin, dst = %req.dst, id = req.request_id)
    )]
    pub fn on_request<R: Runtime<I>>(
        &mut self,
        sender: I,
        mut req: RouteRequest<I>,
        rt: &mut R,
    ) -> RequestOutcome {
        let now = rt.now();

        if self.table.is_blacklisted(&sender, now) {
            trace!(sender = %sender, "Ignoring request from blacklisted neighbor");
            return RequestOutcome::Suppressed(SuppressReason::Blacklisted);
        }
        if self
            .request_cache
            .is_duplicate(&req.origin, req.request_id, now)
        {
            trace!("Duplicate route request");
            return RequestOutcome::Suppressed(SuppressReason::Duplicate);
        }

        self.update_route_to_neighbor(&sender, now);

        if req.dst != self.address && !self.policy.accept_request(&req.origin, req.amount) {
            debug!(amount = req.amount, "Relay policy declined request");
            return RequestOutcome::Suppressed(SuppressReason::Declined);
        }

        let eligible: Vec<I> = self
            .ledger
            .neighbors_with_capacity(req.amount)
            .into_iter()
            .filter(|n| *n != sender && *n != req.origin)
            .collect();

        req.hop_count = req.hop_count.saturating_add(1);

        let lifetime = now + self.config.reverse_route_lifetime(req.hop_count);
        match self.table.lookup(&req.origin) {
            Ok(mut entry) => {
                entry.seq = if entry.valid_seq {
                    freshest(entry.seq, req.origin_seq)
                } else {
                    req.origin_seq
                };
                entry.valid_seq = true;
                entry.next_hop = Some(sender.clone());
                entry.hop_count = req.hop_count;
                entry.state = RouteState::Valid;
                entry.reserved_amount = req.amount;
                entry.expires_at = entry.expires_at.max(lifetime);
                self.write_back(entry);
            }
            Err(_) => {
                let entry = RouteEntry::new(req.origin.clone(), Some(sender.clone()), req.hop_count, lifetime)
                    .with_seq(req.origin_seq)
                    .with_amount(req.amount);
                self.table.add_route(entry);
            }
        }

        if req.dst == self.address {
            self.send_reply(&req, rt);
            return RequestOutcome::DestinedForMe;
        }

        if let Ok(to_dst) = self.table.lookup_valid(&req.dst, now) {
            if to_dst.next_hop.as_ref() == Some(&sender) {
                debug!("Dropping request that would loop back through sender");
                return RequestOutcome::Suppressed(SuppressReason::Loop);
            }
            let fresh_enough = req.flags.unknown_seq || !is_fresher(req.dst_seq, to_dst.seq);
            if self.config.intermediate_reply
                && !req.flags.destination_only
                && to_dst.valid_seq
                && fresh_enough
                && to_dst.reserved_amount >= req.amount
            {
                self.reply_on_behalf(to_dst, &req, rt);
                return RequestOutcome::RepliedOnBehalf;
            }
        }

        for neighbor in &eligible {
            rt.send(
                Destination::Unicast(neighbor.clone()),
                Message::RouteRequest(req.clone()),
            );
        }
        debug!(
            hops = req.hop_count,
            amount = req.amount,
            neighbors = eligible.len(),
            "Forwarded route request"
        );
        RequestOutcome::Forwarded {
            neighbors: eligible.len(),
        }
    }

    fn send_reply<R: Runtime<I>>(&mut self, req: &RouteRequest<I>, rt: &mut R) {
        if !req.flags.unknown_seq && req.dst_seq == self.seq_no.wrapping_add(1) {
            self.seq_no = self.seq_no.wrapping_add(1);
        }
        let Some(next_hop) = self
            .table
            .lookup(&req.origin)
            .ok()
            .and_then(|entry| entry.next_hop)
        else {
            return;
        };

        let reply = RouteReply {
            hop_count: 0,
            dst: self.address.clone(),
            dst_seq: self.seq_no,
            origin: req.origin.clone(),
            lifetime: self.config.my_route_timeout(),
            ack_required: self.config.reply_ack_required,
            accumulated_reward: 0,
        };
        debug!(origin = %req.origin, via = %next_hop, seq = self.seq_no, "Replying as destination");
        rt.send(
            Destination::Unicast(next_hop.clone()),
            Message::RouteReply(reply),
        );
        if self.config.reply_ack_required {
            self.arm_ack_timer(next_hop, rt);
        }
    }

    fn reply_on_behalf<R: Runtime<I>>(
        &mut self,
        to_dst: RouteEntry<I>,
        req: &RouteRequest<I>,
        rt: &mut R,
    ) {
        let now = rt.now();
        let Ok(to_origin) = self.table.lookup(&req.origin) else {
            return;
        };
        let (Some(origin_hop), Some(dst_hop)) = (to_origin.next_hop.clone(), to_dst.next_hop.clone())
        else {
            return;
        };

        let ack_required = to_dst.hop_count == 1;
        let reply = RouteReply {
            hop_count: to_dst.hop_count,
            dst: to_dst.destination.clone(),
            dst_seq: to_dst.seq,
            origin: req.origin.clone(),
            lifetime: to_dst.remaining_lifetime(now),
            ack_required,
            accumulated_reward: self.policy.reward_for(&req.origin, req.amount),
        };
        self.table.insert_precursor(&to_dst.destination, origin_hop.clone());
        self.table.insert_precursor(&req.origin, dst_hop.clone());

        debug!(dst = %to_dst.destination, origin = %req.origin, "Replying on behalf of destination");
        rt.send(
            Destination::Unicast(origin_hop.clone()),
            Message::RouteReply(reply),
        );
        if ack_required {
            self.arm_ack_timer(origin_hop, rt);
        }

        if req.flags.gratuitous {
            let gratuitous = RouteReply {
                hop_count: to_origin.hop_count,
                dst: req.origin.clone(),
                dst_seq: to_origin.seq,
                origin: to_dst.destination.clone(),
                lifetime: to_origin.remaining_lifetime(now),
                ack_required: false,
                accumulated_reward: 0,
            };
            rt.send(Destination::Unicast(dst_hop), Message::RouteReply(gratuitous));
        }
    }

    #[instrument(
        skip(self, rep, rt),
        fields(node = %self.address, origin = %rep.origin, dst = %rep.dst)
    )]
    pub fn on_reply<R: Runtime<I>>(
        &mut self,
        sender: I,
        mut rep: RouteReply<I>,
        rt: &mut R,
    ) -> ReplyOutcome<I> {
        let now = rt.now();
        self.update_route_to_neighbor(&sender, now);

        rep.hop_count = rep.hop_count.saturating_add(1);
        let fresh = RouteEntry::new(rep.dst.clone(), Some(sender.clone()), rep.hop_count, now + rep.lifetime)
            .with_seq(rep.dst_seq);

        match self.table.lookup(&rep.dst) {
            Ok(stored) => {
                if should_replace(&stored, &fresh) {
                    let mut merged = fresh;
                    merged.precursors = stored.precursors;
                    merged.reserved_amount = stored.reserved_amount;
                    self.write_back(merged);
                } else {
                    trace!(stored_seq = stored.seq, reply_seq = rep.dst_seq, "Reply not fresher than stored route");
                }
            }
            Err(_) => {
                self.table.add_route(fresh);
            }
        }

        if rep.ack_required {
            rt.send(Destination::Unicast(sender.clone()), Message::RouteReplyAck);
            rep.ack_required = false;
        }

        if rep.origin == self.address {
            return ReplyOutcome::DestinedForMe(self.resolve(&rep, rt));
        }

        let to_origin = match self.table.lookup(&rep.origin) {
            Ok(entry) if entry.state != RouteState::InSearch && entry.next_hop.is_some() => entry,
            _ => {
                debug!("No reverse route for reply");
                return ReplyOutcome::Dropped(ReplyDrop::NoReverseRoute);
            }
        };
        let Some(origin_hop) = to_origin.next_hop.clone() else {
            return ReplyOutcome::Dropped(ReplyDrop::NoReverseRoute);
        };

        let mut refreshed = to_origin.clone();
        refreshed.expires_at = refreshed
            .expires_at
            .max(now + self.config.active_route_timeout);
        self.write_back(refreshed);

        let dst_hop = self
            .table
            .lookup(&rep.dst)
            .ok()
            .and_then(|entry| entry.next_hop)
            .unwrap_or_else(|| sender.clone());
        self.table.insert_precursor(&rep.dst, origin_hop.clone());
        self.table.insert_precursor(&dst_hop, origin_hop.clone());
        self.table.insert_precursor(&rep.origin, dst_hop.clone());
        self.table.insert_precursor(&origin_hop, dst_hop);

        rep.accumulated_reward = rep
            .accumulated_reward
            .saturating_add(self.policy.reward_for(&rep.origin, to_origin.reserved_amount));

        debug!(
            via = %origin_hop,
            hops = rep.hop_count,
            reward = rep.accumulated_reward,
            "Forwarding route reply"
        );
        rt.send(Destination::Unicast(origin_hop), Message::RouteReply(rep));
        ReplyOutcome::Forwarded
    }

    fn resolve<R: Runtime<I>>(&mut self, rep: &RouteReply<I>, rt: &mut R) -> Option<RouteResolved<I>> {
        let now = rt.now();
        if !self.pending.contains_key(&rep.dst) {
            return None;
        }
        let route = self.table.lookup_valid(&rep.dst, now).ok()?;
        let next_hop = route.next_hop.clone()?;

        if let Some(mut pending) = self.pending.remove(&rep.dst) {
            if let Some(timer) = pending.retry_timer.take() {
                rt.cancel(timer);
            }
            if let Some(timer) = pending.deferred_timer.take() {
                rt.cancel(timer);
            }
        }
        debug!(
            dst = %rep.dst,
            hops = route.hop_count,
            reward = rep.accumulated_reward,
            "Route discovered"
        );
        Some(RouteResolved {
            dst: rep.dst.clone(),
            next_hop,
            hop_count: route.hop_count,
            reward: rep.accumulated_reward,
        })
    }

    /// RREP-ACK received from `sender`
    pub fn on_reply_ack<R: Runtime<I>>(&mut self, sender: &I, rt: &mut R) {
        if let Some(timer) = self.ack_timers.remove(sender) {
            trace!(neighbor = %sender, "Reply acknowledged");
            rt.cancel(timer);
        }
    }

    /// No RREP-ACK from `neighbor` within NextHopWait
    pub fn on_ack_timeout(&mut self, neighbor: &I, now: SimTime) {
        self.ack_timers.remove(neighbor);
        let until = now + self.config.blacklist_timeout();
        if self.table.mark_unidirectional(neighbor, until).is_err() {
            debug!(neighbor = %neighbor, "No route entry to blacklist");
        }
    }

    fn arm_ack_timer<R: Runtime<I>>(&mut self, neighbor: I, rt: &mut R) {
        if let Some(old) = self.ack_timers.remove(&neighbor) {
            rt.cancel(old);
        }
        let timer = rt.schedule(
            self.config.next_hop_wait(),
            Timer::ReplyAck {
                neighbor: neighbor.clone(),
            },
        );
        self.ack_timers.insert(neighbor, timer);
    }

    /// Channel to `neighbor` closed: tear down routes through it and tell
    /// the nodes that depended on them
    pub fn on_neighbor_link_failed<R: Runtime<I>>(
        &mut self,
        neighbor: &I,
        rt: &mut R,
    ) -> Vec<InvalidatedRoute<I>> {
        let now = rt.now();
        if let Some(timer) = self.ack_timers.remove(neighbor) {
            rt.cancel(timer);
        }
        let broken = self
            .table
            .invalidate_via(neighbor, now, self.config.delete_period());
        if !broken.is_empty() {
            debug!(neighbor = %neighbor, routes = broken.len(), "Link failure invalidated routes");
        }
        self.send_route_error(&broken, rt);
        broken
    }

    /// RERR from `sender`; returns the number of routes invalidated here
    pub fn on_route_error<R: Runtime<I>>(
        &mut self,
        sender: &I,
        rerr: RouteError<I>,
        rt: &mut R,
    ) -> usize {
        let now = rt.now();
        let mut broken = Vec::new();
        for unreachable in rerr.unreachable {
            let via_sender = self
                .table
                .lookup(&unreachable.dst)
                .map(|entry| {
                    entry.state == RouteState::Valid && entry.next_hop.as_ref() == Some(sender)
                })
                .unwrap_or(false);
            if !via_sender {
                continue;
            }
            if let Some(route) =
                self.table
                    .invalidate(&unreachable.dst, now, self.config.delete_period())
            {
                broken.push(route);
            }
        }
        self.send_route_error(&broken, rt);
        broken.len()
    }

    fn send_route_error<R: Runtime<I>>(&mut self, broken: &[InvalidatedRoute<I>], rt: &mut R) {
        let precursors: HashSet<I> = broken
            .iter()
            .flat_map(|route| route.precursors.iter().cloned())
            .collect();
        if precursors.is_empty() {
            return;
        }
        if self.rerr_count >= self.config.rerr_rate_limit {
            debug!("Route error rate limited");
            return;
        }
        self.rerr_count += 1;

        let rerr = RouteError {
            unreachable: broken
                .iter()
                .map(|route| UnreachableDestination {
                    dst: route.destination.clone(),
                    seq: route.seq,
                })
                .collect(),
        };
        let destination = if precursors.len() == 1 {
            precursors
                .into_iter()
                .next()
                .map(Destination::Unicast)
                .unwrap_or(Destination::Broadcast)
        } else {
            Destination::Broadcast
        };
        rt.send(destination, Message::RouteError(rerr));
    }

    /// Reap expired routes and request-cache entries
    pub fn purge(&self, now: SimTime) {
        self.table.purge(now, self.config.delete_period());
        self.request_cache.purge(now);
    }

    /// Store an entry read from the table earlier in the same handler
    fn write_back(&self, entry: RouteEntry<I>) {
        let dst = entry.destination.clone();
        if let Err(e) = self.table.update(entry) {
            debug!(dst = %dst, error = %e, "Route gone before write-back");
        }
    }

    fn update_route_to_neighbor(&self, neighbor: &I, now: SimTime) {
        let lifetime = now + self.config.active_route_timeout;
        match self.table.lookup(neighbor) {
            Ok(mut entry) => {
                let direct = entry.valid_seq
                    && entry.hop_count == 1
                    && entry.next_hop.as_ref() == Some(neighbor);
                entry.expires_at = entry.expires_at.max(lifetime);
                if !direct {
                    entry.next_hop = Some(neighbor.clone());
                    entry.hop_count = 1;
                    entry.state = RouteState::Valid;
                }
                self.write_back(entry);
            }
            Err(_) => {
                self.table
                    .add_route(RouteEntry::new(neighbor.clone(), Some(neighbor.clone()), 1, lifetime));
            }
        }
    }
}

/// Whether `fresh` should replace `stored`
///
/// Precedence: stored sequence number unknown, fresher sequence number,
/// equal sequence number with stored route not VALID, equal sequence number
/// with fewer hops.
fn should_replace<I: PeerIdentity>(stored: &RouteEntry<I>, fresh: &RouteEntry<I>) -> bool {
    !stored.valid_seq
        || is_fresher(fresh.seq, stored.seq)
        || (fresh.seq == stored.seq && stored.state != RouteState::Valid)
        || (fresh.seq == stored.seq && fresh.hop_count < stored.hop_count)
}
