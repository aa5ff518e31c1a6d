//! Per-neighbor channel ledger
//!
//! The [`ChannelLedger`] records, for every neighbor we share a payment
//! channel with, both deposits and both live balances. Route discovery reads
//! it to restrict flooding to neighbors that can carry an amount; payment
//! execution mutates it when a lock is committed.
//!
//! Balances on one channel are conserved: `my_available + peer_available +
//! locked_out + locked_in` always equals `my_deposit + peer_deposit`. A lock
//! sets value aside on the paying side; the commit hands it to the other
//! side and an abort or expiry gives it back. A debit never takes a side
//! below zero; it fails with [`LedgerError::InsufficientBalance`] instead.

use std::cmp::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use payroute_core::{BalancePayload, BalanceProof, PeerIdentity, SecretHash, SimTime};
use tracing::{debug, warn};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};

/// State of one payment channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntry<I: PeerIdentity> {
    pub peer: I,
    pub expires_at: SimTime,
    pub my_deposit: u64,
    pub my_available: u64,
    pub peer_deposit: u64,
    pub peer_available: u64,
    /// Our balance reserved under outgoing locks
    pub locked_out: u64,
    /// The peer's balance held under its locks toward us
    pub locked_in: u64,
    /// Cumulative value committed from us to the peer
    pub sent_total: u64,
    /// Cumulative value committed from the peer to us
    pub received_total: u64,
    /// Marked failed; removed at the next purge and never reused
    pub closed: bool,
    pub latest_sent_proof: Option<BalanceProof<I>>,
    pub latest_received_proof: Option<BalanceProof<I>>,
}

impl<I: PeerIdentity> ChannelEntry<I> {
    fn new(peer: I, my_deposit: u64, peer_deposit: u64, expires_at: SimTime) -> Self {
        Self {
            peer,
            expires_at,
            my_deposit,
            my_available: my_deposit,
            peer_deposit,
            peer_available: peer_deposit,
            locked_out: 0,
            locked_in: 0,
            sent_total: 0,
            received_total: 0,
            closed: false,
            latest_sent_proof: None,
            latest_received_proof: None,
        }
    }

    /// Total value locked in the channel
    pub fn capacity(&self) -> u64 {
        self.my_deposit + self.peer_deposit
    }

    pub fn is_expired(&self, now: SimTime) -> bool {
        now >= self.expires_at
    }

    /// What the peer is owed once every outgoing lock commits
    pub fn outgoing_commitment(&self) -> u64 {
        self.sent_total + self.locked_out
    }

    /// What we are owed once every incoming lock commits
    pub fn incoming_commitment(&self) -> u64 {
        self.received_total + self.locked_in
    }

    fn debit_mine(&mut self, amount: u64) -> LedgerResult<()> {
        if amount > self.my_available {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available: self.my_available,
            });
        }
        self.my_available -= amount;
        Ok(())
    }

    fn unlock_mine(&mut self, amount: u64) -> LedgerResult<()> {
        if amount > self.locked_out {
            return Err(LedgerError::CapacityExceeded {
                would_be: self.my_available + amount,
                capacity: self.my_available + self.locked_out,
            });
        }
        self.locked_out -= amount;
        self.my_available += amount;
        Ok(())
    }

    fn unlock_peer(&mut self, amount: u64) -> LedgerResult<()> {
        if amount > self.locked_in {
            return Err(LedgerError::CapacityExceeded {
                would_be: self.peer_available + amount,
                capacity: self.peer_available + self.locked_in,
            });
        }
        self.locked_in -= amount;
        self.peer_available += amount;
        Ok(())
    }
}

/// Outcome of a successful [`ChannelLedger::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Existing channel's liveness was extended
    Refreshed,
    /// A new channel was opened with the default deposit
    Opened,
}

pub struct ChannelLedger<I: PeerIdentity> {
    channels: DashMap<I, ChannelEntry<I>>,
    config: LedgerConfig,
}

impl<I: PeerIdentity> ChannelLedger<I> {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            channels: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Open a channel with explicit deposits on both sides
    pub fn open(
        &self,
        peer: I,
        my_deposit: u64,
        peer_deposit: u64,
        lifetime: Duration,
        now: SimTime,
    ) -> LedgerResult<()> {
        if self.channels.contains_key(&peer) {
            return Err(LedgerError::ChannelExists(peer.to_string()));
        }
        debug!(peer = %peer, my_deposit, peer_deposit, "Channel opened");
        let entry = ChannelEntry::new(peer.clone(), my_deposit, peer_deposit, now + lifetime);
        self.channels.insert(peer, entry);
        Ok(())
    }

    /// Whether an open (not closed) channel exists with `peer`
    pub fn is_neighbor(&self, peer: &I) -> bool {
        self.channels
            .get(peer)
            .map(|entry| !entry.closed)
            .unwrap_or(false)
    }

    /// Snapshot of the channel with `peer`
    pub fn get(&self, peer: &I) -> LedgerResult<ChannelEntry<I>> {
        self.channels
            .get(peer)
            .map(|entry| entry.clone())
            .ok_or_else(|| LedgerError::NeighborNotFound(peer.to_string()))
    }

    pub fn my_available(&self, peer: &I) -> LedgerResult<u64> {
        self.get(peer).map(|entry| entry.my_available)
    }

    pub fn peer_available(&self, peer: &I) -> LedgerResult<u64> {
        self.get(peer).map(|entry| entry.peer_available)
    }

    /// All open neighbors, sorted
    pub fn neighbors(&self) -> Vec<I> {
        let mut peers: Vec<I> = self
            .channels
            .iter()
            .filter(|entry| !entry.closed)
            .map(|entry| entry.key().clone())
            .collect();
        peers.sort();
        peers
    }

    /// Open neighbors toward which we can pay at least `amount`, sorted
    pub fn neighbors_with_capacity(&self, amount: u64) -> Vec<I> {
        let mut peers: Vec<I> = self
            .channels
            .iter()
            .filter(|entry| !entry.closed && entry.my_available >= amount)
            .map(|entry| entry.key().clone())
            .collect();
        peers.sort();
        peers
    }

    /// Set aside `amount` of our balance toward `peer`
    ///
    /// Returns the remaining available balance.
    pub fn reserve(&self, peer: &I, amount: u64) -> LedgerResult<u64> {
        let mut entry = self.entry_mut(peer)?;
        entry.debit_mine(amount)?;
        entry.locked_out += amount;
        Ok(entry.my_available)
    }

    /// Return a previously reserved `amount` to our balance toward `peer`
    ///
    /// Releasing more than is reserved fails with `CapacityExceeded`.
    pub fn release(&self, peer: &I, amount: u64) -> LedgerResult<u64> {
        let mut entry = self.entry_mut(peer)?;
        entry.unlock_mine(amount)?;
        Ok(entry.my_available)
    }

    /// Reserve `amount` under a new outgoing lock
    ///
    /// Returns the cumulative transfer the lock's proof must claim: every
    /// committed transfer plus every outstanding lock, this one included.
    pub fn lock_outgoing(&self, peer: &I, amount: u64) -> LedgerResult<u64> {
        let mut entry = self.entry_mut(peer)?;
        if entry.closed {
            return Err(LedgerError::NeighborNotFound(peer.to_string()));
        }
        entry.debit_mine(amount)?;
        entry.locked_out += amount;
        Ok(entry.outgoing_commitment())
    }

    /// Hold `amount` of the peer's balance under its lock toward us
    ///
    /// `claimed_total` is the cumulative transfer in the lock's proof. The
    /// peer may not understate what it already owes us.
    pub fn hold_incoming(&self, peer: &I, amount: u64, claimed_total: u64) -> LedgerResult<()> {
        let mut entry = self.entry_mut(peer)?;
        if entry.closed {
            return Err(LedgerError::NeighborNotFound(peer.to_string()));
        }
        if claimed_total < entry.incoming_commitment() + amount {
            return Err(LedgerError::ProofMismatch(peer.to_string()));
        }
        if amount > entry.peer_available {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available: entry.peer_available,
            });
        }
        entry.peer_available -= amount;
        entry.locked_in += amount;
        Ok(())
    }

    /// Give a held `amount` back to the peer's side
    pub fn release_incoming(&self, peer: &I, amount: u64) -> LedgerResult<()> {
        let mut entry = self.entry_mut(peer)?;
        entry.unlock_peer(amount)
    }

    /// Refresh a channel from a neighbor's hello, or open one on an
    /// acknowledged open request
    ///
    /// For an existing channel, `claimed_peer_available` must equal our
    /// record of the neighbor's balance. A mismatch rejects the update
    /// (liveness is not extended) and reports the disagreement.
    pub fn update(
        &self,
        peer: &I,
        claimed_peer_available: u64,
        lifetime: Duration,
        ack_required: bool,
        now: SimTime,
    ) -> LedgerResult<UpdateOutcome> {
        if let Some(mut entry) = self.channels.get_mut(peer) {
            if entry.closed {
                return Err(LedgerError::NeighborNotFound(peer.to_string()));
            }
            if entry.peer_available != claimed_peer_available {
                warn!(
                    peer = %peer,
                    recorded = entry.peer_available,
                    claimed = claimed_peer_available,
                    "Neighbor balance disagrees with ledger"
                );
                return Err(LedgerError::BalanceDisagreement {
                    peer: peer.to_string(),
                    recorded: entry.peer_available,
                    claimed: claimed_peer_available,
                });
            }
            entry.expires_at = entry.expires_at.max(now + lifetime);
            return Ok(UpdateOutcome::Refreshed);
        }

        if !ack_required {
            return Err(LedgerError::NeighborNotFound(peer.to_string()));
        }

        let deposit = self.config.default_deposit;
        debug!(peer = %peer, deposit, peer_deposit = claimed_peer_available, "Channel opened by hello");
        self.channels.insert(
            peer.clone(),
            ChannelEntry::new(peer.clone(), deposit, claimed_peer_available, now + lifetime),
        );
        Ok(UpdateOutcome::Opened)
    }

    /// Commit a locked payment from us to `peer`
    ///
    /// Hands the reserved `amount` to the peer and returns the proof of the
    /// new cumulative transfer, bound to the lock's `secret_hash` with
    /// nothing left locked under it.
    pub fn commit_outgoing(
        &self,
        peer: &I,
        amount: u64,
        secret_hash: &SecretHash,
    ) -> LedgerResult<BalanceProof<I>> {
        let mut entry = self.entry_mut(peer)?;
        if amount > entry.locked_out {
            return Err(LedgerError::NotLocked {
                requested: amount,
                locked: entry.locked_out,
            });
        }
        entry.locked_out -= amount;
        entry.peer_available += amount;
        entry.sent_total += amount;
        let proof = BalanceProof::unsigned(BalancePayload::new(entry.sent_total, 0, secret_hash));
        entry.latest_sent_proof = Some(proof.clone());
        debug!(
            peer = %peer,
            amount,
            sent_total = entry.sent_total,
            my_available = entry.my_available,
            "Committed outgoing transfer"
        );
        Ok(proof)
    }

    /// Commit a held payment from `peer` to us
    ///
    /// The returned proof is what the peer's sealed commit must match.
    pub fn commit_incoming(
        &self,
        peer: &I,
        amount: u64,
        secret_hash: &SecretHash,
    ) -> LedgerResult<BalanceProof<I>> {
        let mut entry = self.entry_mut(peer)?;
        if amount > entry.locked_in {
            return Err(LedgerError::NotLocked {
                requested: amount,
                locked: entry.locked_in,
            });
        }
        entry.locked_in -= amount;
        entry.my_available += amount;
        entry.received_total += amount;
        let proof =
            BalanceProof::unsigned(BalancePayload::new(entry.received_total, 0, secret_hash));
        entry.latest_received_proof = Some(proof.clone());
        debug!(
            peer = %peer,
            amount,
            received_total = entry.received_total,
            my_available = entry.my_available,
            "Committed incoming transfer"
        );
        Ok(proof)
    }

    /// Replace the latest received proof from `peer` with its sealed form
    ///
    /// Returns `false` for a sealed proof already superseded by a later
    /// commit. A proof claiming the latest total must carry exactly the
    /// payload we committed, and none may claim more.
    pub fn record_sealed_proof(&self, peer: &I, proof: BalanceProof<I>) -> LedgerResult<bool> {
        let mut entry = self.entry_mut(peer)?;
        if proof.sender() != Some(peer) {
            return Err(LedgerError::ProofMismatch(peer.to_string()));
        }
        let Some(current) = entry.latest_received_proof.as_ref() else {
            return Err(LedgerError::ProofMismatch(peer.to_string()));
        };
        match proof
            .payload
            .transferred_amount
            .cmp(&current.payload.transferred_amount)
        {
            Ordering::Less => Ok(false),
            Ordering::Equal if proof.payload == current.payload => {
                entry.latest_received_proof = Some(proof);
                Ok(true)
            }
            _ => Err(LedgerError::ProofMismatch(peer.to_string())),
        }
    }

    /// Mark the channel with `peer` as failed; it is closed at the next purge
    pub fn mark_failed(&self, peer: &I) -> LedgerResult<()> {
        let mut entry = self.entry_mut(peer)?;
        entry.closed = true;
        Ok(())
    }

    /// Close every expired or failed channel
    ///
    /// `on_close` is invoked with each closing entry before it is removed.
    /// Returns the number of channels closed.
    pub fn purge(&self, now: SimTime, mut on_close: impl FnMut(&ChannelEntry<I>)) -> usize {
        let mut closing: Vec<ChannelEntry<I>> = self
            .channels
            .iter()
            .filter(|entry| entry.closed || entry.is_expired(now))
            .map(|entry| entry.clone())
            .collect();
        closing.sort_by(|a, b| a.peer.cmp(&b.peer));

        for entry in &closing {
            debug!(peer = %entry.peer, expired = entry.is_expired(now), "Closing channel");
            on_close(entry);
            self.channels.remove(&entry.peer);
        }
        closing.len()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    fn entry_mut(
        &self,
        peer: &I,
    ) -> LedgerResult<dashmap::mapref::one::RefMut<'_, I, ChannelEntry<I>>> {
        self.channels
            .get_mut(peer)
            .ok_or_else(|| LedgerError::NeighborNotFound(peer.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payroute_core::{BalancePayload, Secret, SimulationIdentity};

    fn peer(c: char) -> SimulationIdentity {
        SimulationIdentity::new(c).unwrap()
    }

    fn proof(transferred: u64) -> BalanceProof<SimulationIdentity> {
        BalanceProof::unsigned(BalancePayload::new(transferred, 0, &Secret::random().hash()))
    }

    fn ledger_with(b_mine: u64, b_peer: u64) -> ChannelLedger<SimulationIdentity> {
        let ledger = ChannelLedger::new(LedgerConfig::default());
        ledger
            .open(peer('B'), b_mine, b_peer, Duration::from_secs(2), SimTime::ZERO)
            .unwrap();
        ledger
    }

    #[test]
    fn test_lookup_missing_neighbor() {
        let ledger = ChannelLedger::<SimulationIdentity>::new(LedgerConfig::default());
        assert!(!ledger.is_neighbor(&peer('B')));
        assert_eq!(
            ledger.my_available(&peer('B')),
            Err(LedgerError::NeighborNotFound("B".into()))
        );
    }

    #[test]
    fn test_reserve_never_underflows() {
        let ledger = ledger_with(15, 15);
        assert_eq!(ledger.reserve(&peer('B'), 10).unwrap(), 5);
        assert_eq!(
            ledger.reserve(&peer('B'), 6),
            Err(LedgerError::InsufficientBalance {
                requested: 6,
                available: 5
            })
        );
        assert_eq!(ledger.my_available(&peer('B')).unwrap(), 5);
        assert_eq!(ledger.release(&peer('B'), 10).unwrap(), 15);
        assert!(matches!(
            ledger.release(&peer('B'), 1),
            Err(LedgerError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_update_rejects_disagreement() {
        let ledger = ledger_with(50, 40);
        let err = ledger
            .update(&peer('B'), 45, Duration::from_secs(10), false, SimTime::ZERO)
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::BalanceDisagreement {
                recorded: 40,
                claimed: 45,
                ..
            }
        ));
        // liveness not extended
        assert_eq!(ledger.get(&peer('B')).unwrap().expires_at, SimTime::from_secs(2));
    }

    #[test]
    fn test_update_refreshes_expiry_monotonically() {
        let ledger = ledger_with(50, 40);
        let outcome = ledger
            .update(&peer('B'), 40, Duration::from_secs(5), false, SimTime::from_secs(1))
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Refreshed);
        assert_eq!(ledger.get(&peer('B')).unwrap().expires_at, SimTime::from_secs(6));

        ledger
            .update(&peer('B'), 40, Duration::from_secs(1), false, SimTime::from_secs(2))
            .unwrap();
        assert_eq!(ledger.get(&peer('B')).unwrap().expires_at, SimTime::from_secs(6));
    }

    #[test]
    fn test_update_opens_only_when_acknowledged() {
        let ledger = ChannelLedger::new(LedgerConfig::default().with_default_deposit(70));
        assert!(ledger
            .update(&peer('C'), 30, Duration::from_secs(2), false, SimTime::ZERO)
            .is_err());

        let outcome = ledger
            .update(&peer('C'), 30, Duration::from_secs(2), true, SimTime::ZERO)
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Opened);
        let entry = ledger.get(&peer('C')).unwrap();
        assert_eq!(entry.my_deposit, 70);
        assert_eq!(entry.my_available, 70);
        assert_eq!(entry.peer_available, 30);
    }

    fn assert_conserved(entry: &ChannelEntry<SimulationIdentity>) {
        assert_eq!(
            entry.my_available + entry.peer_available + entry.locked_out + entry.locked_in,
            entry.capacity()
        );
    }

    #[test]
    fn test_commits_conserve_capacity() {
        let ledger = ledger_with(20, 10);
        let hash = Secret::random().hash();
        assert_eq!(ledger.lock_outgoing(&peer('B'), 15).unwrap(), 15);
        let entry = ledger.get(&peer('B')).unwrap();
        assert_eq!((entry.my_available, entry.locked_out), (5, 15));
        assert_conserved(&entry);

        let proof = ledger.commit_outgoing(&peer('B'), 15, &hash).unwrap();
        assert_eq!(proof.payload.transferred_amount, 15);
        let entry = ledger.get(&peer('B')).unwrap();
        assert_eq!((entry.my_available, entry.peer_available), (5, 25));
        assert_eq!(entry.sent_total, 15);
        assert_conserved(&entry);

        ledger.hold_incoming(&peer('B'), 25, 25).unwrap();
        ledger.commit_incoming(&peer('B'), 25, &hash).unwrap();
        let entry = ledger.get(&peer('B')).unwrap();
        assert_eq!((entry.my_available, entry.peer_available), (30, 0));
        assert_conserved(&entry);

        // nothing is locked any more
        assert_eq!(
            ledger.commit_incoming(&peer('B'), 1, &hash),
            Err(LedgerError::NotLocked { requested: 1, locked: 0 })
        );
        assert!(ledger.commit_outgoing(&peer('B'), 1, &hash).is_err());
    }

    #[test]
    fn test_overlapping_locks_cannot_overdraw() {
        let ledger = ledger_with(15, 15);
        assert_eq!(ledger.lock_outgoing(&peer('B'), 10).unwrap(), 10);
        assert_eq!(
            ledger.lock_outgoing(&peer('B'), 10),
            Err(LedgerError::InsufficientBalance { requested: 10, available: 5 })
        );
        // a second lock that fits claims both
        assert_eq!(ledger.lock_outgoing(&peer('B'), 5).unwrap(), 15);
        assert_eq!(ledger.my_available(&peer('B')).unwrap(), 0);

        ledger.release(&peer('B'), 5).unwrap();
        let entry = ledger.get(&peer('B')).unwrap();
        assert_eq!((entry.my_available, entry.locked_out), (5, 10));
        assert_conserved(&entry);
    }

    #[test]
    fn test_incoming_hold_checks_claim_and_balance() {
        let ledger = ledger_with(20, 20);
        ledger.hold_incoming(&peer('B'), 10, 10).unwrap();
        // the second lock must claim both
        assert_eq!(
            ledger.hold_incoming(&peer('B'), 5, 10),
            Err(LedgerError::ProofMismatch("B".into()))
        );
        ledger.hold_incoming(&peer('B'), 5, 15).unwrap();
        assert!(matches!(
            ledger.hold_incoming(&peer('B'), 6, 21),
            Err(LedgerError::InsufficientBalance { requested: 6, available: 5 })
        ));

        ledger.release_incoming(&peer('B'), 10).unwrap();
        let entry = ledger.get(&peer('B')).unwrap();
        assert_eq!((entry.peer_available, entry.locked_in), (15, 5));
        assert_conserved(&entry);
        assert!(matches!(
            ledger.release_incoming(&peer('B'), 6),
            Err(LedgerError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_sealed_proof_must_match_commit() {
        let ledger = ledger_with(20, 20);
        let hash = Secret::random().hash();
        ledger.hold_incoming(&peer('B'), 10, 10).unwrap();
        let committed = ledger.commit_incoming(&peer('B'), 10, &hash).unwrap();

        assert!(ledger
            .record_sealed_proof(&peer('B'), proof(10).sign(&peer('B')))
            .is_err());
        assert!(ledger
            .record_sealed_proof(&peer('B'), committed.clone().sign(&peer('C')))
            .is_err());
        assert!(ledger
            .record_sealed_proof(&peer('B'), proof(11).sign(&peer('B')))
            .is_err());
        assert!(ledger
            .record_sealed_proof(&peer('B'), committed.sign(&peer('B')))
            .unwrap());
        assert!(ledger
            .get(&peer('B'))
            .unwrap()
            .latest_received_proof
            .unwrap()
            .is_signed());
    }

    #[test]
    fn test_superseded_sealed_proof_is_ignored() {
        let ledger = ledger_with(20, 20);
        let (first, second) = (Secret::random().hash(), Secret::random().hash());
        ledger.hold_incoming(&peer('B'), 5, 5).unwrap();
        ledger.hold_incoming(&peer('B'), 7, 12).unwrap();
        let early = ledger.commit_incoming(&peer('B'), 5, &first).unwrap();
        let late = ledger.commit_incoming(&peer('B'), 7, &second).unwrap();
        assert_eq!(late.payload.transferred_amount, 12);

        assert!(!ledger
            .record_sealed_proof(&peer('B'), early.sign(&peer('B')))
            .unwrap());
        let entry = ledger.get(&peer('B')).unwrap();
        let latest = entry.latest_received_proof.unwrap();
        assert!(!latest.is_signed());
        assert_eq!(latest.payload.transferred_amount, entry.received_total);
    }

    #[test]
    fn test_purge_notifies_before_removal() {
        let ledger = ledger_with(20, 20);
        ledger
            .open(peer('C'), 5, 5, Duration::from_secs(60), SimTime::ZERO)
            .unwrap();
        ledger
            .open(peer('D'), 5, 5, Duration::from_secs(60), SimTime::ZERO)
            .unwrap();
        ledger.mark_failed(&peer('D')).unwrap();
        assert!(!ledger.is_neighbor(&peer('D')));

        let mut closed = Vec::new();
        let count = ledger.purge(SimTime::from_secs(3), |entry| {
            assert!(ledger.get(&entry.peer).is_ok());
            closed.push(entry.peer);
        });

        assert_eq!(count, 2);
        assert_eq!(closed, vec![peer('B'), peer('D')]);
        assert_eq!(ledger.neighbors(), vec![peer('C')]);
    }

    #[test]
    fn test_neighbors_with_capacity() {
        let ledger = ledger_with(20, 20);
        ledger
            .open(peer('C'), 5, 50, Duration::from_secs(60), SimTime::ZERO)
            .unwrap();
        assert_eq!(ledger.neighbors_with_capacity(10), vec![peer('B')]);
        assert_eq!(ledger.neighbors_with_capacity(5), vec![peer('B'), peer('C')]);
        assert!(ledger.neighbors_with_capacity(21).is_empty());
    }
}
