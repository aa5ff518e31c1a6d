//! Routing table
//!
//! Exactly one [`RouteEntry`] per destination. Entries past their lifetime
//! are treated as expired by [`RoutingTable::lookup_valid`] immediately and
//! reaped by [`RoutingTable::purge`]: a VALID entry first becomes INVALID for
//! the delete period, then disappears.

use std::collections::HashSet;
use std::time::Duration;

use dashmap::DashMap;
use derive_more::Display;
use payroute_core::{PeerIdentity, SimTime};
use tracing::{debug, trace};

use crate::error::{RoutingError, RoutingResult};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteState {
    #[display("valid")]
    Valid,
    #[display("invalid")]
    Invalid,
    #[display("in_search")]
    InSearch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry<I: PeerIdentity> {
    pub destination: I,
    /// Whether `seq` carries information
    pub valid_seq: bool,
    pub seq: u32,
    /// `None` while a search has no candidate yet
    pub next_hop: Option<I>,
    pub hop_count: u8,
    pub expires_at: SimTime,
    /// Neighbors that route through us toward `destination`
    pub precursors: HashSet<I>,
    pub state: RouteState,
    /// Transaction amount the discovery that produced this route carried
    pub reserved_amount: u64,
    /// Link toward this neighbor is considered unidirectional until then
    pub blacklisted_until: Option<SimTime>,
}

impl<I: PeerIdentity> RouteEntry<I> {
    /// A VALID route with no sequence information
    pub fn new(destination: I, next_hop: Option<I>, hop_count: u8, expires_at: SimTime) -> Self {
        Self {
            destination,
            valid_seq: false,
            seq: 0,
            next_hop,
            hop_count,
            expires_at,
            precursors: HashSet::new(),
            state: RouteState::Valid,
            reserved_amount: 0,
            blacklisted_until: None,
        }
    }

    pub fn with_seq(mut self, seq: u32) -> Self {
        self.valid_seq = true;
        self.seq = seq;
        self
    }

    pub fn with_state(mut self, state: RouteState) -> Self {
        self.state = state;
        self
    }

    pub fn with_amount(mut self, amount: u64) -> Self {
        self.reserved_amount = amount;
        self
    }

    pub fn is_expired(&self, now: SimTime) -> bool {
        now >= self.expires_at
    }

    /// VALID and within lifetime
    pub fn is_usable(&self, now: SimTime) -> bool {
        self.state == RouteState::Valid && !self.is_expired(now)
    }

    pub fn is_blacklisted(&self, now: SimTime) -> bool {
        self.blacklisted_until.map(|until| now < until).unwrap_or(false)
    }

    /// Time left before expiry
    pub fn remaining_lifetime(&self, now: SimTime) -> Duration {
        now.until(self.expires_at)
    }

    fn invalidate(&mut self, now: SimTime, delete_period: Duration) {
        self.state = RouteState::Invalid;
        if self.valid_seq {
            self.seq = self.seq.wrapping_add(1);
        }
        self.expires_at = now + delete_period;
    }
}

/// A route torn down because its next hop became unreachable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidatedRoute<I: PeerIdentity> {
    pub destination: I,
    pub seq: u32,
    pub precursors: HashSet<I>,
}

/// Counts from one purge pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub invalidated: usize,
    pub removed: usize,
}

pub struct RoutingTable<I: PeerIdentity> {
    routes: DashMap<I, RouteEntry<I>>,
}

impl<I: PeerIdentity> RoutingTable<I> {
    pub fn new() -> Self {
        Self {
            routes: DashMap::new(),
        }
    }

    /// Entry for `dst` in any state
    pub fn lookup(&self, dst: &I) -> RoutingResult<RouteEntry<I>> {
        self.routes
            .get(dst)
            .map(|entry| entry.clone())
            .ok_or_else(|| RoutingError::RouteNotFound(dst.to_string()))
    }

    /// Entry for `dst` only if VALID and not past its lifetime
    pub fn lookup_valid(&self, dst: &I, now: SimTime) -> RoutingResult<RouteEntry<I>> {
        let entry = self.lookup(dst)?;
        if !entry.is_usable(now) {
            let state = if entry.state == RouteState::Valid {
                "expired".to_string()
            } else {
                entry.state.to_string()
            };
            return Err(RoutingError::RouteNotValid {
                dst: dst.to_string(),
                state,
            });
        }
        Ok(entry)
    }

    /// Insert a route for a destination that has none
    ///
    /// Returns `false` and leaves the table untouched if one exists.
    pub fn add_route(&self, entry: RouteEntry<I>) -> bool {
        match self.routes.entry(entry.destination.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                trace!(dst = %entry.destination, state = %entry.state, "Route added");
                slot.insert(entry);
                true
            }
        }
    }

    /// Replace the stored entry for `entry.destination`
    pub fn update(&self, entry: RouteEntry<I>) -> RoutingResult<()> {
        let mut stored = self
            .routes
            .get_mut(&entry.destination)
            .ok_or_else(|| RoutingError::RouteNotFound(entry.destination.to_string()))?;
        trace!(dst = %entry.destination, state = %entry.state, seq = entry.seq, hops = entry.hop_count, "Route updated");
        *stored = entry;
        Ok(())
    }

    pub fn insert_precursor(&self, dst: &I, precursor: I) -> bool {
        self.routes
            .get_mut(dst)
            .map(|mut entry| entry.precursors.insert(precursor))
            .unwrap_or(false)
    }

    pub fn remove_precursor(&self, dst: &I, precursor: &I) -> bool {
        self.routes
            .get_mut(dst)
            .map(|mut entry| entry.precursors.remove(precursor))
            .unwrap_or(false)
    }

    pub fn set_state(&self, dst: &I, state: RouteState) -> RoutingResult<()> {
        let mut entry = self
            .routes
            .get_mut(dst)
            .ok_or_else(|| RoutingError::RouteNotFound(dst.to_string()))?;
        entry.state = state;
        Ok(())
    }

    /// Blacklist the link toward `neighbor` until `until`
    pub fn mark_unidirectional(&self, neighbor: &I, until: SimTime) -> RoutingResult<()> {
        let mut entry = self
            .routes
            .get_mut(neighbor)
            .ok_or_else(|| RoutingError::RouteNotFound(neighbor.to_string()))?;
        debug!(neighbor = %neighbor, until = %until, "Neighbor blacklisted");
        entry.blacklisted_until = Some(until);
        Ok(())
    }

    pub fn is_blacklisted(&self, neighbor: &I, now: SimTime) -> bool {
        self.routes
            .get(neighbor)
            .map(|entry| entry.is_blacklisted(now))
            .unwrap_or(false)
    }

    /// Invalidate the VALID route to `dst`, if any
    pub fn invalidate(
        &self,
        dst: &I,
        now: SimTime,
        delete_period: Duration,
    ) -> Option<InvalidatedRoute<I>> {
        let mut entry = self.routes.get_mut(dst)?;
        if entry.state != RouteState::Valid {
            return None;
        }
        entry.invalidate(now, delete_period);
        Some(InvalidatedRoute {
            destination: entry.destination.clone(),
            seq: entry.seq,
            precursors: entry.precursors.clone(),
        })
    }

    /// Invalidate every VALID route whose next hop is `next_hop`
    pub fn invalidate_via(
        &self,
        next_hop: &I,
        now: SimTime,
        delete_period: Duration,
    ) -> Vec<InvalidatedRoute<I>> {
        let mut invalidated: Vec<InvalidatedRoute<I>> = self
            .routes
            .iter_mut()
            .filter(|entry| {
                entry.state == RouteState::Valid && entry.next_hop.as_ref() == Some(next_hop)
            })
            .map(|mut entry| {
                entry.invalidate(now, delete_period);
                InvalidatedRoute {
                    destination: entry.destination.clone(),
                    seq: entry.seq,
                    precursors: entry.precursors.clone(),
                }
            })
            .collect();
        invalidated.sort_by(|a, b| a.destination.cmp(&b.destination));
        invalidated
    }

    /// Expire VALID routes past their lifetime and remove INVALID ones past
    /// the delete period. Searches in progress are left alone.
    pub fn purge(&self, now: SimTime, delete_period: Duration) -> PurgeStats {
        let mut stats = PurgeStats::default();
        self.routes.retain(|_, entry| {
            if !entry.is_expired(now) {
                return true;
            }
            match entry.state {
                RouteState::Valid => {
                    entry.invalidate(now, delete_period);
                    stats.invalidated += 1;
                    true
                }
                RouteState::Invalid => {
                    stats.removed += 1;
                    false
                }
                RouteState::InSearch => true,
            }
        });
        if stats.invalidated + stats.removed > 0 {
            debug!(invalidated = stats.invalidated, removed = stats.removed, "Purged routing table");
        }
        stats
    }

    /// Destinations with an entry, sorted
    pub fn destinations(&self) -> Vec<I> {
        let mut dsts: Vec<I> = self.routes.iter().map(|e| e.key().clone()).collect();
        dsts.sort();
        dsts
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<I: PeerIdentity> Default for RoutingTable<I> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payroute_core::SimulationIdentity;

    fn peer(c: char) -> SimulationIdentity {
        SimulationIdentity::new(c).unwrap()
    }

    fn route(dst: char, via: char, expires: u64) -> RouteEntry<SimulationIdentity> {
        RouteEntry::new(peer(dst), Some(peer(via)), 2, SimTime::from_secs(expires)).with_seq(4)
    }

    #[test]
    fn test_one_entry_per_destination() {
        let table = RoutingTable::new();
        assert!(table.add_route(route('C', 'B', 10)));
        assert!(!table.add_route(route('C', 'D', 10)));
        assert_eq!(table.lookup(&peer('C')).unwrap().next_hop, Some(peer('B')));

        table.update(route('C', 'D', 10)).unwrap();
        assert_eq!(table.lookup(&peer('C')).unwrap().next_hop, Some(peer('D')));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let table = RoutingTable::new();
        assert_eq!(
            table.update(route('C', 'B', 10)),
            Err(RoutingError::RouteNotFound("C".into()))
        );
    }

    #[test]
    fn test_expired_route_excluded_from_lookup_valid() {
        let table = RoutingTable::new();
        table.add_route(route('C', 'B', 10));
        assert!(table.lookup_valid(&peer('C'), SimTime::from_secs(9)).is_ok());

        let err = table.lookup_valid(&peer('C'), SimTime::from_secs(10)).unwrap_err();
        assert!(matches!(err, RoutingError::RouteNotValid { ref state, .. } if state == "expired"));
        // still physically present until purged
        assert!(table.lookup(&peer('C')).is_ok());
    }

    #[test]
    fn test_in_search_is_not_valid() {
        let table = RoutingTable::new();
        table.add_route(route('C', 'B', 10).with_state(RouteState::InSearch));
        assert!(table.lookup_valid(&peer('C'), SimTime::ZERO).is_err());
    }

    #[test]
    fn test_purge_two_phase() {
        let table = RoutingTable::new();
        let delete_period = Duration::from_secs(15);
        table.add_route(route('C', 'B', 10));
        table.add_route(route('D', 'B', 100).with_state(RouteState::InSearch));

        let stats = table.purge(SimTime::from_secs(11), delete_period);
        assert_eq!(stats, PurgeStats { invalidated: 1, removed: 0 });
        let entry = table.lookup(&peer('C')).unwrap();
        assert_eq!(entry.state, RouteState::Invalid);
        assert_eq!(entry.seq, 5);

        let stats = table.purge(SimTime::from_secs(26), delete_period);
        assert_eq!(stats.removed, 1);
        assert!(table.lookup(&peer('C')).is_err());
        assert!(table.lookup(&peer('D')).is_ok());
    }

    #[test]
    fn test_invalidate_via_collects_precursors() {
        let table = RoutingTable::new();
        table.add_route(route('C', 'B', 10));
        table.add_route(route('D', 'B', 10));
        table.add_route(route('E', 'F', 10));
        table.insert_precursor(&peer('C'), peer('A'));

        let broken = table.invalidate_via(&peer('B'), SimTime::from_secs(1), Duration::from_secs(15));
        assert_eq!(broken.len(), 2);
        assert_eq!(broken[0].destination, peer('C'));
        assert!(broken[0].precursors.contains(&peer('A')));
        assert_eq!(broken[0].seq, 5);
        assert!(table.lookup_valid(&peer('E'), SimTime::from_secs(1)).is_ok());
    }

    #[test]
    fn test_blacklist_window() {
        let table = RoutingTable::new();
        table.add_route(RouteEntry::new(peer('B'), Some(peer('B')), 1, SimTime::from_secs(10)));
        table.mark_unidirectional(&peer('B'), SimTime::from_secs(5)).unwrap();
        assert!(table.is_blacklisted(&peer('B'), SimTime::from_secs(4)));
        assert!(!table.is_blacklisted(&peer('B'), SimTime::from_secs(5)));
        assert!(!table.is_blacklisted(&peer('Z'), SimTime::ZERO));
    }

    #[test]
    fn test_precursor_insert_remove() {
        let table = RoutingTable::new();
        table.add_route(route('C', 'B', 10));
        assert!(table.insert_precursor(&peer('C'), peer('A')));
        assert!(!table.insert_precursor(&peer('C'), peer('A')));
        assert!(table.remove_precursor(&peer('C'), &peer('A')));
        assert!(!table.insert_precursor(&peer('X'), peer('A')));
    }
}
