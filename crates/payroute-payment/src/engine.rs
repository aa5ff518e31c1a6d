//! Payment execution engine
//!
//! Runs the lock → secret request → secret ack → reveal → commit pipeline
//! for every payment this node takes part in.
//!
//! ```text
//!   A (initiator)        B (mediator)          C (target)
//!     ── Lock ──────────▶  ── Lock ──────────▶
//!     ◀────────── SecretRequest ◀────────────
//!     ── SecretAck ─────▶  ── SecretAck ─────▶   commit B→C
//!     ◀── SecretReveal ──  ◀── SecretReveal ──   commit at B both sides
//!   commit A→B
//!     ── ProofCommit ───▶  ── ProofCommit ───▶
//! ```
//!
//! Every lock reserves its amount on the paying side of the channel and
//! holds it on the receiving side, so payments overlapping on a channel can
//! never promise more than it carries. Value only changes sides after the
//! secret a hop was handed hashes to the lock it stored. An abort, timeout
//! or expiry before that point gives the reservation back.

use std::collections::HashMap;
use std::sync::Arc;

use payroute_core::{
    AbortReason, BalancePayload, BalanceProof, BalanceProofCommit, Destination, HashTimeLock, Lock,
    Message, PaymentAbort, PaymentId, PeerIdentity, Runtime, Secret, SecretMessage, SecretRequest,
    SimTime, TaskHandle, Timer,
};
use payroute_ledger::{ChannelLedger, LedgerError};
use payroute_routing::RoutingTable;
use tracing::{debug, instrument, trace, warn};

use crate::config::PaymentConfig;
use crate::error::{PaymentError, PaymentResult};
use crate::pending::{FailureReason, LockLeg, PaymentEvent, PaymentRole, PendingPayment};

/// What a hop did with an incoming lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome<I: PeerIdentity> {
    /// Re-locked toward the next hop
    Forwarded { next_hop: I },
    /// We are the target; a secret request went back upstream
    AwaitingSecret,
    /// Refused; an abort went back upstream
    Refused(AbortReason),
    /// Already pending here
    Duplicate,
}

pub struct PaymentEngine<I: PeerIdentity> {
    address: I,
    config: PaymentConfig,
    table: Arc<RoutingTable<I>>,
    ledger: Arc<ChannelLedger<I>>,
    pending: HashMap<PaymentId, PendingPayment<I>>,
}

impl<I: PeerIdentity> PaymentEngine<I> {
    pub fn new(
        address: I,
        config: PaymentConfig,
        table: Arc<RoutingTable<I>>,
        ledger: Arc<ChannelLedger<I>>,
    ) -> Self {
        Self {
            address,
            config,
            table,
            ledger,
            pending: HashMap::new(),
        }
    }

    pub fn address(&self) -> &I {
        &self.address
    }

    pub fn config(&self) -> &PaymentConfig {
        &self.config
    }

    pub fn pending(&self, payment_id: &PaymentId) -> Option<&PendingPayment<I>> {
        self.pending.get(payment_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Lock `amount` toward `target` along the current valid route
    ///
    /// The route must already exist; discovery runs first.
    pub fn initiate<R: Runtime<I>>(
        &mut self,
        target: I,
        amount: u64,
        rt: &mut R,
    ) -> PaymentResult<PaymentId> {
        if amount == 0 {
            return Err(PaymentError::ZeroAmount);
        }
        if target == self.address {
            return Err(PaymentError::SelfPayment);
        }

        let now = rt.now();
        let next_hop = self
            .table
            .lookup_valid(&target, now)
            .ok()
            .and_then(|route| route.next_hop)
            .ok_or_else(|| PaymentError::NoRoute(target.to_string()))?;

        let committed_total = self
            .ledger
            .lock_outgoing(&next_hop, amount)
            .map_err(|e| match e {
                LedgerError::InsufficientBalance { available, .. } => {
                    PaymentError::InsufficientCapacity {
                        peer: next_hop.to_string(),
                        requested: amount,
                        available,
                    }
                }
                other => other.into(),
            })?;

        let payment_id = PaymentId::new();
        let secret = Secret::random();
        let secret_hash = secret.hash();
        let lock = HashTimeLock::new(amount, secret_hash, now + self.config.payment_timeout);
        let proof =
            BalanceProof::unsigned(BalancePayload::new(committed_total, amount, &secret_hash));

        debug!(
            payment_id = %payment_id.short(),
            target = %target,
            via = %next_hop,
            amount,
            secret_hash = %secret_hash,
            "Locking payment"
        );
        rt.send(
            Destination::Unicast(next_hop.clone()),
            Message::Lock(Lock {
                payment_id,
                target: target.clone(),
                initiator: self.address.clone(),
                lock: lock.clone(),
                proof: proof.clone(),
            }),
        );
        let timer = rt.schedule(
            self.config.payment_timeout,
            Timer::PaymentTimeout { payment_id },
        );

        self.pending.insert(
            payment_id,
            PendingPayment {
                payment_id,
                initiator: self.address.clone(),
                target,
                incoming: None,
                outgoing: Some(LockLeg {
                    peer: next_hop,
                    lock,
                    proof,
                }),
                secret: Some(secret),
                timer: Some(timer),
            },
        );
        Ok(payment_id)
    }

    #[instrument(
        skip(self, msg, rt),
        fields(node = %self.address, payment_id = %msg.payment_id.short(), amount = msg.lock.amount)
    )]
    pub fn on_lock<R: Runtime<I>>(&mut self, sender: I, msg: Lock<I>, rt: &mut R) -> LockOutcome<I> {
        let now = rt.now();
        if self.pending.contains_key(&msg.payment_id) {
            trace!("Lock already pending");
            return LockOutcome::Duplicate;
        }

        let amount = msg.lock.amount;
        let payload = &msg.proof.payload;
        if !payload.is_bound_to(&msg.lock.secret_hash) || payload.locked_amount != amount {
            warn!(sender = %sender, "Balance proof does not match lock");
            return self.refuse(&sender, &msg, AbortReason::InvalidProof, rt);
        }
        if msg.lock.is_expired(now) {
            return self.refuse(&sender, &msg, AbortReason::LockExpired, rt);
        }
        if let Err(e) = self
            .ledger
            .hold_incoming(&sender, amount, payload.transferred_amount)
        {
            let reason = match e {
                LedgerError::InsufficientBalance { .. } => AbortReason::InsufficientCapacity,
                LedgerError::ProofMismatch(_) => {
                    warn!(
                        sender = %sender,
                        transferred = payload.transferred_amount,
                        "Lock understates the channel's committed transfer"
                    );
                    AbortReason::InvalidProof
                }
                _ => {
                    warn!(sender = %sender, error = %e, "Lock from a non-neighbor");
                    AbortReason::InvalidProof
                }
            };
            return self.refuse(&sender, &msg, reason, rt);
        }

        let incoming = LockLeg {
            peer: sender.clone(),
            lock: msg.lock.clone(),
            proof: msg.proof.clone(),
        };

        if msg.target == self.address {
            let expiry = self.schedule_expiry(&msg, now, rt);
            debug!(initiator = %msg.initiator, "Lock reached target, requesting secret");
            rt.send(
                Destination::Unicast(sender),
                Message::SecretRequest(SecretRequest {
                    payment_id: msg.payment_id,
                    target: self.address.clone(),
                    initiator: msg.initiator.clone(),
                    lock: msg.lock.clone(),
                }),
            );
            self.pending.insert(
                msg.payment_id,
                PendingPayment {
                    payment_id: msg.payment_id,
                    initiator: msg.initiator,
                    target: msg.target,
                    incoming: Some(incoming),
                    outgoing: None,
                    secret: None,
                    timer: Some(expiry),
                },
            );
            return LockOutcome::AwaitingSecret;
        }

        let outgoing = match self.derive_outgoing(&msg, now) {
            Ok(leg) => leg,
            Err(reason) => {
                self.release_incoming(&sender, amount);
                return self.refuse(&sender, &msg, reason, rt);
            }
        };
        let expiry = self.schedule_expiry(&msg, now, rt);

        debug!(next_hop = %outgoing.peer, "Forwarding lock");
        rt.send(
            Destination::Unicast(outgoing.peer.clone()),
            Message::Lock(Lock {
                payment_id: msg.payment_id,
                target: msg.target.clone(),
                initiator: msg.initiator.clone(),
                lock: outgoing.lock.clone(),
                proof: outgoing.proof.clone(),
            }),
        );
        let next_hop = outgoing.peer.clone();
        self.pending.insert(
            msg.payment_id,
            PendingPayment {
                payment_id: msg.payment_id,
                initiator: msg.initiator,
                target: msg.target,
                incoming: Some(incoming),
                outgoing: Some(outgoing),
                secret: None,
                timer: Some(expiry),
            },
        );
        LockOutcome::Forwarded { next_hop }
    }

    fn derive_outgoing(&self, msg: &Lock<I>, now: SimTime) -> Result<LockLeg<I>, AbortReason> {
        let next_hop = self
            .table
            .lookup_valid(&msg.target, now)
            .ok()
            .and_then(|route| route.next_hop)
            .ok_or(AbortReason::NoRoute)?;
        let lock = msg
            .lock
            .derive_next(self.config.lock_expiry_delta, now)
            .ok_or(AbortReason::LockExpired)?;
        let committed_total = self
            .ledger
            .lock_outgoing(&next_hop, lock.amount)
            .map_err(|e| match e {
                LedgerError::InsufficientBalance { .. } => AbortReason::InsufficientCapacity,
                _ => AbortReason::NoRoute,
            })?;
        let proof = BalanceProof::unsigned(BalancePayload::new(
            committed_total,
            lock.amount,
            &lock.secret_hash,
        ));
        Ok(LockLeg {
            peer: next_hop,
            lock,
            proof,
        })
    }

    fn refuse<R: Runtime<I>>(
        &self,
        sender: &I,
        msg: &Lock<I>,
        reason: AbortReason,
        rt: &mut R,
    ) -> LockOutcome<I> {
        debug!(reason = %reason, "Refusing lock");
        rt.send(
            Destination::Unicast(sender.clone()),
            Message::PaymentAbort(PaymentAbort {
                payment_id: msg.payment_id,
                origin: self.address.clone(),
                reason,
            }),
        );
        LockOutcome::Refused(reason)
    }

    fn schedule_expiry<R: Runtime<I>>(&self, msg: &Lock<I>, now: SimTime, rt: &mut R) -> TaskHandle {
        rt.schedule(
            now.until(msg.lock.expires_at),
            Timer::LockExpiry {
                payment_id: msg.payment_id,
            },
        )
    }

    fn release_incoming(&self, peer: &I, amount: u64) {
        if let Err(e) = self.ledger.release_incoming(peer, amount) {
            warn!(peer = %peer, amount, error = %e, "Could not release incoming hold");
        }
    }

    /// Give back whatever an unresolved payment still has locked
    fn release_legs(&self, entry: &PendingPayment<I>) {
        if let Some(leg) = &entry.outgoing {
            if let Err(e) = self.ledger.release(&leg.peer, leg.lock.amount) {
                warn!(peer = %leg.peer, amount = leg.lock.amount, error = %e, "Could not release reservation");
            }
        }
        if let Some(leg) = &entry.incoming {
            self.release_incoming(&leg.peer, leg.lock.amount);
        }
    }

    /// A downstream hop refused the lock
    pub fn on_abort<R: Runtime<I>>(
        &mut self,
        sender: &I,
        abort: PaymentAbort<I>,
        rt: &mut R,
    ) -> Option<PaymentEvent<I>> {
        let from_next = self
            .pending
            .get(&abort.payment_id)
            .map(|entry| entry.next_hop() == Some(sender))
            .unwrap_or(false);
        if !from_next {
            trace!(payment_id = %abort.payment_id.short(), "Ignoring unrelated abort");
            return None;
        }
        let mut entry = self.pending.remove(&abort.payment_id)?;
        if let Some(timer) = entry.timer.take() {
            rt.cancel(timer);
        }
        self.release_legs(&entry);

        match entry.incoming {
            Some(leg) => {
                debug!(payment_id = %abort.payment_id.short(), upstream = %leg.peer, "Propagating abort");
                rt.send(Destination::Unicast(leg.peer), Message::PaymentAbort(abort));
                None
            }
            None => {
                debug!(
                    payment_id = %abort.payment_id.short(),
                    by = %abort.origin,
                    reason = %abort.reason,
                    "Payment aborted"
                );
                Some(PaymentEvent::Failed {
                    payment_id: abort.payment_id,
                    target: entry.target,
                    reason: FailureReason::Aborted {
                        by: abort.origin,
                        reason: abort.reason,
                    },
                })
            }
        }
    }

    /// The target asks for the secret; relayed upstream to the initiator
    pub fn on_secret_request<R: Runtime<I>>(&mut self, sender: &I, req: SecretRequest<I>, rt: &mut R) {
        let Some(entry) = self.pending.get(&req.payment_id) else {
            return;
        };
        let Some(outgoing) = entry.outgoing.as_ref() else {
            return;
        };
        if &outgoing.peer != sender {
            warn!(sender = %sender, "Secret request from unexpected hop");
            return;
        }

        match (&entry.incoming, &entry.secret) {
            (Some(incoming), _) => {
                rt.send(
                    Destination::Unicast(incoming.peer.clone()),
                    Message::SecretRequest(req),
                );
            }
            (None, Some(secret)) => {
                let consistent = req.target == entry.target
                    && req.lock.secret_hash == outgoing.lock.secret_hash
                    && req.lock.amount == outgoing.lock.amount;
                if !consistent {
                    warn!(payment_id = %req.payment_id.short(), "Secret request does not match payment");
                    return;
                }
                debug!(payment_id = %req.payment_id.short(), "Releasing secret");
                rt.send(
                    Destination::Unicast(outgoing.peer.clone()),
                    Message::SecretAck(SecretMessage {
                        payment_id: req.payment_id,
                        dst: entry.target.clone(),
                        origin: self.address.clone(),
                        secret: secret.clone(),
                        secret_hash: outgoing.lock.secret_hash,
                    }),
                );
            }
            (None, None) => {}
        }
    }

    /// The secret travelling downstream; the target commits and reveals
    pub fn on_secret_ack<R: Runtime<I>>(
        &mut self,
        sender: &I,
        msg: SecretMessage<I>,
        rt: &mut R,
    ) -> Option<PaymentEvent<I>> {
        let entry = self.pending.get(&msg.payment_id)?;
        let incoming = entry.incoming.as_ref()?;
        if &incoming.peer != sender {
            warn!(sender = %sender, "Secret ack from unexpected hop");
            return None;
        }

        if let Some(outgoing) = entry.outgoing.as_ref() {
            rt.send(
                Destination::Unicast(outgoing.peer.clone()),
                Message::SecretAck(msg),
            );
            return None;
        }

        if !incoming.lock.verify(&msg.secret) {
            warn!(payment_id = %msg.payment_id.short(), "Secret does not match lock");
            return None;
        }
        if incoming.lock.is_expired(rt.now()) {
            debug!(payment_id = %msg.payment_id.short(), "Secret arrived after lock expiry");
            return None;
        }

        let mut entry = self.pending.remove(&msg.payment_id)?;
        if let Some(timer) = entry.timer.take() {
            rt.cancel(timer);
        }
        let incoming = entry.incoming?;
        let amount = incoming.lock.amount;
        if let Err(e) = self
            .ledger
            .commit_incoming(&incoming.peer, amount, &incoming.lock.secret_hash)
        {
            warn!(error = %e, "Incoming commit failed");
            return None;
        }

        debug!(payment_id = %msg.payment_id.short(), amount, "Payment received");
        rt.send(
            Destination::Unicast(incoming.peer),
            Message::SecretReveal(SecretMessage {
                payment_id: msg.payment_id,
                dst: entry.initiator.clone(),
                origin: self.address.clone(),
                secret: msg.secret,
                secret_hash: msg.secret_hash,
            }),
        );
        Some(PaymentEvent::Received {
            payment_id: msg.payment_id,
            initiator: entry.initiator,
            amount,
        })
    }

    /// The secret travelling back upstream
    ///
    /// A secret that does not hash to our outgoing lock leaves everything
    /// as it was.
    #[instrument(skip(self, msg, rt), fields(node = %self.address, payment_id = %msg.payment_id.short()))]
    pub fn on_reveal<R: Runtime<I>>(
        &mut self,
        sender: &I,
        msg: SecretMessage<I>,
        rt: &mut R,
    ) -> Option<PaymentEvent<I>> {
        let entry = self.pending.get(&msg.payment_id)?;
        let outgoing = entry.outgoing.as_ref()?;
        if &outgoing.peer != sender {
            warn!(sender = %sender, "Reveal from unexpected hop");
            return None;
        }
        if !outgoing.lock.verify(&msg.secret) {
            warn!(expected = %outgoing.lock.secret_hash, "Revealed secret does not match lock");
            return None;
        }

        let mut entry = self.pending.remove(&msg.payment_id)?;
        if let Some(timer) = entry.timer.take() {
            rt.cancel(timer);
        }
        let outgoing = entry.outgoing?;
        let amount = outgoing.lock.amount;

        let committed = match self.ledger.commit_outgoing(
            &outgoing.peer,
            amount,
            &outgoing.lock.secret_hash,
        ) {
            Ok(proof) => proof,
            Err(e) => {
                warn!(error = %e, next_hop = %outgoing.peer, "Outgoing commit failed");
                return match entry.incoming {
                    Some(incoming) => {
                        self.release_incoming(&incoming.peer, amount);
                        rt.send(
                            Destination::Unicast(incoming.peer),
                            Message::PaymentAbort(PaymentAbort {
                                payment_id: msg.payment_id,
                                origin: self.address.clone(),
                                reason: AbortReason::CommitFailed,
                            }),
                        );
                        None
                    }
                    None => Some(PaymentEvent::Failed {
                        payment_id: msg.payment_id,
                        target: entry.target,
                        reason: FailureReason::CommitFailed {
                            peer: outgoing.peer,
                            error: e.to_string(),
                        },
                    }),
                };
            }
        };
        rt.send(
            Destination::Unicast(outgoing.peer.clone()),
            Message::BalanceProofCommit(BalanceProofCommit {
                payment_id: msg.payment_id,
                dst: outgoing.peer.clone(),
                origin: self.address.clone(),
                secret: msg.secret.clone(),
                secret_hash: msg.secret_hash,
                proof: committed.sign(&self.address),
            }),
        );

        match entry.incoming {
            Some(incoming) => {
                // downstream is already paid; a failure here is our loss
                if let Err(e) = self.ledger.commit_incoming(
                    &incoming.peer,
                    amount,
                    &incoming.lock.secret_hash,
                ) {
                    warn!(error = %e, prev_hop = %incoming.peer, "Incoming commit failed after paying downstream");
                }
                debug!(prev_hop = %incoming.peer, amount, "Settled both channels");
                rt.send(Destination::Unicast(incoming.peer), Message::SecretReveal(msg));
                None
            }
            None => {
                debug!(target = %entry.target, amount, "Payment completed");
                Some(PaymentEvent::Completed {
                    payment_id: msg.payment_id,
                    target: entry.target,
                    amount,
                })
            }
        }
    }

    /// Sealed proof from the paying side of a committed channel
    pub fn on_commit(&self, sender: &I, msg: BalanceProofCommit<I>) -> bool {
        if msg.secret.hash() != msg.secret_hash || !msg.proof.payload.is_bound_to(&msg.secret_hash) {
            warn!(sender = %sender, "Balance proof commit does not match its secret");
            return false;
        }
        match self.ledger.record_sealed_proof(sender, msg.proof) {
            Ok(true) => {
                trace!(sender = %sender, "Recorded sealed proof");
                true
            }
            Ok(false) => {
                trace!(sender = %sender, "Sealed proof superseded by a later commit");
                true
            }
            Err(e) => {
                warn!(sender = %sender, error = %e, "Sealed proof rejected");
                false
            }
        }
    }

    /// Initiator gave up waiting; the reservation comes back here and the
    /// lock lapses downstream on its own
    pub fn on_payment_timeout(&mut self, payment_id: &PaymentId) -> Option<PaymentEvent<I>> {
        if self.pending.get(payment_id)?.role() != PaymentRole::Initiator {
            return None;
        }
        let entry = self.pending.remove(payment_id)?;
        self.release_legs(&entry);
        warn!(payment_id = %payment_id.short(), target = %entry.target, "Payment timed out");
        Some(PaymentEvent::Failed {
            payment_id: *payment_id,
            target: entry.target,
            reason: FailureReason::TimedOut,
        })
    }

    /// A lock held here expired unresolved
    pub fn on_lock_expiry(&mut self, payment_id: &PaymentId) {
        let is_held = self
            .pending
            .get(payment_id)
            .map(|entry| entry.role() != PaymentRole::Initiator)
            .unwrap_or(false);
        if is_held {
            if let Some(entry) = self.pending.remove(payment_id) {
                self.release_legs(&entry);
                debug!(payment_id = %payment_id.short(), role = %entry.role(), "Lock lapsed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payroute_core::{RecordingRuntime, SimulationIdentity};
    use payroute_ledger::LedgerConfig;
    use payroute_routing::RouteEntry;
    use std::collections::BTreeMap;
    use std::time::Duration;

    type Id = SimulationIdentity;

    fn peer(c: char) -> Id {
        SimulationIdentity::new(c).unwrap()
    }

    struct Hop {
        engine: PaymentEngine<Id>,
        ledger: Arc<ChannelLedger<Id>>,
        rt: RecordingRuntime<Id>,
        events: Vec<PaymentEvent<Id>>,
    }

    /// A-B-C line with channels opened both ways and routes installed
    fn line(ab: u64, bc: u64) -> BTreeMap<char, Hop> {
        let mut hops: BTreeMap<char, Hop> = "ABC"
            .chars()
            .map(|c| {
                let ledger = Arc::new(ChannelLedger::new(LedgerConfig::default()));
                let table = Arc::new(RoutingTable::new());
                let engine = PaymentEngine::new(peer(c), PaymentConfig::default(), table, ledger.clone());
                let hop = Hop {
                    engine,
                    ledger,
                    rt: RecordingRuntime::new(),
                    events: Vec::new(),
                };
                (c, hop)
            })
            .collect();

        let life = Duration::from_secs(60);
        let open = |hops: &mut BTreeMap<char, Hop>, a: char, b: char, deposit: u64| {
            hops[&a].ledger.open(peer(b), deposit, deposit, life, SimTime::ZERO).unwrap();
            hops[&b].ledger.open(peer(a), deposit, deposit, life, SimTime::ZERO).unwrap();
        };
        open(&mut hops, 'A', 'B', ab);
        open(&mut hops, 'B', 'C', bc);

        let route = |dst: char, via: char, hops_away: u8| {
            RouteEntry::new(peer(dst), Some(peer(via)), hops_away, SimTime::from_secs(30)).with_seq(1)
        };
        hops[&'A'].engine.table.add_route(route('C', 'B', 2));
        hops[&'B'].engine.table.add_route(route('C', 'C', 1));
        hops[&'B'].engine.table.add_route(route('A', 'A', 1));
        hops[&'C'].engine.table.add_route(route('A', 'B', 2));
        hops
    }

    /// Deliver everything in flight, optionally rewriting messages first
    fn pump(hops: &mut BTreeMap<char, Hop>, mut tamper: impl FnMut(char, &mut Message<Id>)) {
        loop {
            let mut batch = Vec::new();
            for (&from, hop) in hops.iter_mut() {
                for (dst, msg) in hop.rt.take_sent() {
                    if let Destination::Unicast(to) = dst {
                        batch.push((from, to.as_char(), msg));
                    }
                }
            }
            if batch.is_empty() {
                break;
            }
            for (from, to, mut msg) in batch {
                tamper(to, &mut msg);
                let hop = hops.get_mut(&to).unwrap();
                let sender = peer(from);
                let event = match msg {
                    Message::Lock(lock) => {
                        hop.engine.on_lock(sender, lock, &mut hop.rt);
                        None
                    }
                    Message::PaymentAbort(abort) => hop.engine.on_abort(&sender, abort, &mut hop.rt),
                    Message::SecretRequest(req) => {
                        hop.engine.on_secret_request(&sender, req, &mut hop.rt);
                        None
                    }
                    Message::SecretAck(ack) => hop.engine.on_secret_ack(&sender, ack, &mut hop.rt),
                    Message::SecretReveal(reveal) => hop.engine.on_reveal(&sender, reveal, &mut hop.rt),
                    Message::BalanceProofCommit(commit) => {
                        hop.engine.on_commit(&sender, commit);
                        None
                    }
                    other => panic!("unexpected {:?}", other),
                };
                hop.events.extend(event);
            }
        }
    }

    fn balances(hops: &BTreeMap<char, Hop>, at: char, toward: char) -> (u64, u64) {
        let entry = hops[&at].ledger.get(&peer(toward)).unwrap();
        (entry.my_available, entry.peer_available)
    }

    #[test]
    fn test_three_hop_payment_settles() {
        let mut hops = line(50, 50);
        let a = hops.get_mut(&'A').unwrap();
        let id = a.engine.initiate(peer('C'), 10, &mut a.rt).unwrap();
        pump(&mut hops, |_, _| {});

        assert_eq!(
            hops[&'A'].events,
            vec![PaymentEvent::Completed { payment_id: id, target: peer('C'), amount: 10 }]
        );
        assert_eq!(
            hops[&'C'].events,
            vec![PaymentEvent::Received { payment_id: id, initiator: peer('A'), amount: 10 }]
        );

        assert_eq!(balances(&hops, 'A', 'B'), (40, 60));
        assert_eq!(balances(&hops, 'B', 'A'), (60, 40));
        assert_eq!(balances(&hops, 'B', 'C'), (40, 60));
        assert_eq!(balances(&hops, 'C', 'B'), (60, 40));

        for hop in hops.values() {
            assert_eq!(hop.engine.pending_count(), 0);
        }
        // sealed proofs reached the receiving sides
        let at_b = hops[&'B'].ledger.get(&peer('A')).unwrap();
        assert_eq!(at_b.latest_received_proof.unwrap().sender(), Some(&peer('A')));
        let at_c = hops[&'C'].ledger.get(&peer('B')).unwrap();
        assert!(at_c.latest_received_proof.unwrap().is_signed());
    }

    #[test]
    fn test_reveal_at_mediator_moves_channels_opposite() {
        let mut hops = line(50, 50);
        let a = hops.get_mut(&'A').unwrap();
        a.engine.initiate(peer('C'), 10, &mut a.rt).unwrap();

        let before_a = balances(&hops, 'B', 'A');
        let before_c = balances(&hops, 'B', 'C');
        pump(&mut hops, |_, _| {});
        let after_a = balances(&hops, 'B', 'A');
        let after_c = balances(&hops, 'B', 'C');

        let delta_a = after_a.0 as i64 - before_a.0 as i64;
        let delta_c = after_c.0 as i64 - before_c.0 as i64;
        assert_eq!(delta_a, 10);
        assert_eq!(delta_c, -10);
    }

    #[test]
    fn test_corrupted_secret_at_mediator_leaves_channels_unchanged() {
        let mut hops = line(50, 50);
        let a = hops.get_mut(&'A').unwrap();
        let id = a.engine.initiate(peer('C'), 10, &mut a.rt).unwrap();

        pump(&mut hops, |to, msg| {
            if to == 'B' {
                if let Message::SecretReveal(reveal) = msg {
                    reveal.secret = Secret::from_bytes([9u8; 32]);
                }
            }
        });

        // C committed on the genuine secret before revealing
        assert_eq!(balances(&hops, 'C', 'B'), (60, 40));
        // B rejected the corrupted reveal: nothing changed sides and both
        // locks are still held
        let from_a = hops[&'B'].ledger.get(&peer('A')).unwrap();
        assert_eq!((from_a.my_available, from_a.peer_available, from_a.locked_in), (50, 40, 10));
        let to_c = hops[&'B'].ledger.get(&peer('C')).unwrap();
        assert_eq!((to_c.my_available, to_c.peer_available, to_c.locked_out), (40, 50, 10));
        assert_eq!((to_c.sent_total, from_a.received_total), (0, 0));
        assert!(hops[&'B'].engine.pending(&id).is_some());
        assert!(hops[&'A'].events.is_empty());
    }

    #[test]
    fn test_insufficient_downstream_capacity_aborts_to_initiator() {
        let mut hops = line(50, 5);
        let a = hops.get_mut(&'A').unwrap();
        let id = a.engine.initiate(peer('C'), 10, &mut a.rt).unwrap();
        pump(&mut hops, |_, _| {});

        assert_eq!(
            hops[&'A'].events,
            vec![PaymentEvent::Failed {
                payment_id: id,
                target: peer('C'),
                reason: FailureReason::Aborted {
                    by: peer('B'),
                    reason: AbortReason::InsufficientCapacity,
                },
            }]
        );
        assert_eq!(balances(&hops, 'A', 'B'), (50, 50));
        assert_eq!(hops[&'A'].engine.pending_count(), 0);
    }

    #[test]
    fn test_initiate_requires_route_and_capacity() {
        let mut hops = line(5, 50);
        let a = hops.get_mut(&'A').unwrap();
        assert!(matches!(
            a.engine.initiate(peer('D'), 1, &mut a.rt),
            Err(PaymentError::NoRoute(_))
        ));
        assert!(matches!(
            a.engine.initiate(peer('C'), 10, &mut a.rt),
            Err(PaymentError::InsufficientCapacity { requested: 10, available: 5, .. })
        ));
        assert_eq!(a.engine.initiate(peer('C'), 0, &mut a.rt), Err(PaymentError::ZeroAmount));
    }

    #[test]
    fn test_lock_with_wrong_cumulative_amount_refused() {
        let mut hops = line(50, 50);
        let a = hops.get_mut(&'A').unwrap();
        a.engine.initiate(peer('C'), 10, &mut a.rt).unwrap();

        pump(&mut hops, |to, msg| {
            if to == 'B' {
                if let Message::Lock(lock) = msg {
                    let hash = lock.lock.secret_hash;
                    // claims less than the lock itself
                    lock.proof = BalanceProof::unsigned(BalancePayload::new(5, 10, &hash));
                }
            }
        });
        assert!(matches!(
            hops[&'A'].events[0],
            PaymentEvent::Failed {
                reason: FailureReason::Aborted { reason: AbortReason::InvalidProof, .. },
                ..
            }
        ));
    }

    #[test]
    fn test_timeout_lapses_without_mutation() {
        let mut hops = line(50, 50);
        let a = hops.get_mut(&'A').unwrap();
        let id = a.engine.initiate(peer('C'), 10, &mut a.rt).unwrap();
        // the target never answers
        a.rt.take_sent();

        let a = hops.get_mut(&'A').unwrap();
        let event = a.engine.on_payment_timeout(&id).unwrap();
        assert_eq!(
            event,
            PaymentEvent::Failed { payment_id: id, target: peer('C'), reason: FailureReason::TimedOut }
        );
        assert_eq!(balances(&hops, 'A', 'B'), (50, 50));
        assert!(hops[&'A'].engine.pending(&id).is_none());
    }

    #[test]
    fn test_mediator_lock_expiry_removes_entry() {
        let mut hops = line(50, 50);
        let a = hops.get_mut(&'A').unwrap();
        let id = a.engine.initiate(peer('C'), 10, &mut a.rt).unwrap();
        let (_, msg) = a.rt.take_sent().remove(0);
        let Message::Lock(lock) = msg else {
            panic!("expected lock");
        };

        let b = hops.get_mut(&'B').unwrap();
        assert_eq!(
            b.engine.on_lock(peer('A'), lock, &mut b.rt),
            LockOutcome::Forwarded { next_hop: peer('C') }
        );
        let forwarded = b.rt.sent_to(&peer('C'));
        let Message::Lock(out) = forwarded[0] else {
            panic!("expected lock");
        };
        assert_eq!(out.lock.expires_at, SimTime::from_secs(9));
        assert_eq!(b.engine.pending(&id).unwrap().role(), PaymentRole::Mediator);

        assert_eq!(balances(&hops, 'B', 'A'), (50, 40));
        assert_eq!(balances(&hops, 'B', 'C'), (40, 50));

        let b = hops.get_mut(&'B').unwrap();
        b.engine.on_lock_expiry(&id);
        assert!(b.engine.pending(&id).is_none());
        // both locks handed back
        assert_eq!(balances(&hops, 'B', 'A'), (50, 50));
        assert_eq!(balances(&hops, 'B', 'C'), (50, 50));
    }

    fn assert_settled(hops: &BTreeMap<char, Hop>, at: char, toward: char) {
        let entry = hops[&at].ledger.get(&peer(toward)).unwrap();
        assert_eq!((entry.locked_out, entry.locked_in), (0, 0), "{at}->{toward} still locked");
        assert_eq!(entry.my_available + entry.peer_available, entry.capacity());
    }

    fn completed(hops: &BTreeMap<char, Hop>) -> usize {
        hops[&'A']
            .events
            .iter()
            .filter(|e| matches!(e, PaymentEvent::Completed { .. }))
            .count()
    }

    #[test]
    fn test_second_payment_over_short_first_hop_is_refused() {
        let mut hops = line(15, 50);
        let a = hops.get_mut(&'A').unwrap();
        a.engine.initiate(peer('C'), 10, &mut a.rt).unwrap();
        assert!(matches!(
            a.engine.initiate(peer('C'), 10, &mut a.rt),
            Err(PaymentError::InsufficientCapacity { requested: 10, available: 5, .. })
        ));
        pump(&mut hops, |_, _| {});

        assert_eq!(completed(&hops), 1);
        assert_eq!(hops[&'C'].events.len(), 1);
        assert_eq!(balances(&hops, 'A', 'B'), (5, 25));
        assert_eq!(balances(&hops, 'B', 'A'), (25, 5));
        assert_eq!(balances(&hops, 'B', 'C'), (40, 60));
        assert_eq!(balances(&hops, 'C', 'B'), (60, 40));
        for (at, toward) in [('A', 'B'), ('B', 'A'), ('B', 'C'), ('C', 'B')] {
            assert_settled(&hops, at, toward);
        }
    }

    #[test]
    fn test_overlapping_locks_beyond_mediator_capacity_abort_one() {
        let mut hops = line(50, 15);
        let a = hops.get_mut(&'A').unwrap();
        let first = a.engine.initiate(peer('C'), 10, &mut a.rt).unwrap();
        let second = a.engine.initiate(peer('C'), 10, &mut a.rt).unwrap();
        pump(&mut hops, |_, _| {});

        assert!(hops[&'A'].events.contains(&PaymentEvent::Completed {
            payment_id: first,
            target: peer('C'),
            amount: 10,
        }));
        assert!(hops[&'A'].events.contains(&PaymentEvent::Failed {
            payment_id: second,
            target: peer('C'),
            reason: FailureReason::Aborted {
                by: peer('B'),
                reason: AbortReason::InsufficientCapacity,
            },
        }));
        assert_eq!(completed(&hops), 1);

        // only the settled payment moved, and nothing is left locked
        assert_eq!(balances(&hops, 'A', 'B'), (40, 60));
        assert_eq!(balances(&hops, 'B', 'A'), (60, 40));
        assert_eq!(balances(&hops, 'B', 'C'), (5, 25));
        assert_eq!(balances(&hops, 'C', 'B'), (25, 5));
        for (at, toward) in [('A', 'B'), ('B', 'A'), ('B', 'C'), ('C', 'B')] {
            assert_settled(&hops, at, toward);
        }
        for hop in hops.values() {
            assert_eq!(hop.engine.pending_count(), 0);
        }
    }

    #[test]
    fn test_concurrent_payments_carry_cumulative_proofs() {
        let mut hops = line(50, 50);
        let a = hops.get_mut(&'A').unwrap();
        a.engine.initiate(peer('C'), 10, &mut a.rt).unwrap();
        a.engine.initiate(peer('C'), 10, &mut a.rt).unwrap();

        // the second lock claims both
        let locks: Vec<u64> = a
            .rt
            .sent_to(&peer('B'))
            .into_iter()
            .filter_map(|m| match m {
                Message::Lock(lock) => Some(lock.proof.payload.transferred_amount),
                _ => None,
            })
            .collect();
        assert_eq!(locks, vec![10, 20]);

        pump(&mut hops, |_, _| {});
        assert_eq!(completed(&hops), 2);
        assert_eq!(hops[&'C'].events.len(), 2);

        for (payer, payee) in [('A', 'B'), ('B', 'C')] {
            let sent = hops[&payer].ledger.get(&peer(payee)).unwrap();
            let received = hops[&payee].ledger.get(&peer(payer)).unwrap();
            assert_eq!(sent.sent_total, 20);
            assert_eq!(received.received_total, 20);

            let sent_proof = sent.latest_sent_proof.unwrap();
            let received_proof = received.latest_received_proof.unwrap();
            assert_eq!(sent_proof.payload.transferred_amount, sent.sent_total);
            assert_eq!(received_proof.payload.transferred_amount, received.received_total);
            assert_eq!(received_proof.sender(), Some(&peer(payer)));
            assert_eq!(received_proof.payload, sent_proof.payload);

            assert_settled(&hops, payer, payee);
            assert_settled(&hops, payee, payer);
        }
        assert_eq!(balances(&hops, 'A', 'B'), (30, 70));
        assert_eq!(balances(&hops, 'C', 'B'), (70, 30));
    }

    #[test]
    fn test_failed_commit_at_initiator_is_not_completed() {
        let mut hops = line(50, 50);
        let a_ledger = hops[&'A'].ledger.clone();
        let a = hops.get_mut(&'A').unwrap();
        let id = a.engine.initiate(peer('C'), 10, &mut a.rt).unwrap();

        // the reservation vanishes before the secret gets back
        pump(&mut hops, |to, msg| {
            if to == 'A' && matches!(msg, Message::SecretReveal(_)) {
                a_ledger.release(&peer('B'), 10).unwrap();
            }
        });

        assert!(matches!(
            &hops[&'A'].events[..],
            [PaymentEvent::Failed {
                payment_id,
                reason: FailureReason::CommitFailed { peer: by, .. },
                ..
            }] if *payment_id == id && *by == peer('B')
        ));
        assert_eq!(balances(&hops, 'A', 'B'), (50, 50));
        // no sealed proof went out for a transfer that never happened
        let at_b = hops[&'B'].ledger.get(&peer('A')).unwrap();
        assert!(!at_b.latest_received_proof.unwrap().is_signed());
    }

    #[test]
    fn test_failed_commit_at_mediator_aborts_upstream() {
        let mut hops = line(50, 50);
        let b_ledger = hops[&'B'].ledger.clone();
        let a = hops.get_mut(&'A').unwrap();
        let id = a.engine.initiate(peer('C'), 10, &mut a.rt).unwrap();

        pump(&mut hops, |to, msg| {
            if to == 'B' && matches!(msg, Message::SecretReveal(_)) {
                b_ledger.release(&peer('C'), 10).unwrap();
            }
        });

        assert_eq!(
            hops[&'A'].events,
            vec![PaymentEvent::Failed {
                payment_id: id,
                target: peer('C'),
                reason: FailureReason::Aborted {
                    by: peer('B'),
                    reason: AbortReason::CommitFailed,
                },
            }]
        );
        assert_eq!(balances(&hops, 'A', 'B'), (50, 50));
        assert_settled(&hops, 'A', 'B');
        assert_settled(&hops, 'B', 'A');
    }
}
