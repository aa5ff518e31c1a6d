//! Duplicate filters
//!
//! Two sliding-window caches share one implementation:
//!
//! - [`IdCache`] keyed by (originator, request id), suppressing re-flooded
//!   route requests
//! - [`DuplicatePacketDetection`] keyed by (sender, packet id), suppressing
//!   replayed datagrams of any kind
//!
//! Both have first-seen semantics: the check and the insert are one
//! operation, so the first caller for a given key is told "not a duplicate"
//! and every later caller within the lifetime is told "duplicate".

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use payroute_core::{PeerIdentity, SimTime};

/// (context address, id) → expiry
pub struct IdCache<I: PeerIdentity> {
    entries: DashMap<(I, u32), SimTime>,
    lifetime: Duration,
}

impl<I: PeerIdentity> IdCache<I> {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            lifetime,
        }
    }

    /// Check whether (context, id) was seen within the lifetime, recording
    /// it if not
    pub fn is_duplicate(&self, context: &I, id: u32, now: SimTime) -> bool {
        match self.entries.entry((context.clone(), id)) {
            Entry::Occupied(mut seen) => {
                if *seen.get() > now {
                    true
                } else {
                    // expired but not yet purged: first sighting again
                    seen.insert(now + self.lifetime);
                    false
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(now + self.lifetime);
                false
            }
        }
    }

    /// Remove expired entries, returning how many were removed
    pub fn purge(&self, now: SimTime) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at > now);
        before - self.entries.len()
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Replay suppression for received datagrams
pub struct DuplicatePacketDetection<I: PeerIdentity> {
    cache: IdCache<I>,
}

impl<I: PeerIdentity> DuplicatePacketDetection<I> {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            cache: IdCache::new(lifetime),
        }
    }

    /// Check and record the datagram `packet_id` from `sender`
    pub fn is_duplicate(&self, sender: &I, packet_id: u32, now: SimTime) -> bool {
        self.cache.is_duplicate(sender, packet_id, now)
    }

    pub fn purge(&self, now: SimTime) -> usize {
        self.cache.purge(now)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
