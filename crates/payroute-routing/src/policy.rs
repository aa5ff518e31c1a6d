//! Relay policy
//!
//! Decides whether an intermediate node serves a route request and what it
//! charges for carrying the payment. The charge is added to the reply's
//! accumulated reward on its way back to the originator.

use payroute_core::PeerIdentity;

pub trait RelayPolicy<I: PeerIdentity>: Send + Sync {
    /// Whether to take part in a discovery from `origin` for `amount`
    fn accept_request(&self, _origin: &I, _amount: u64) -> bool {
        true
    }

    /// Reward this hop adds to a reply travelling back to `origin`
    fn reward_for(&self, origin: &I, amount: u64) -> u64;
}

/// Relays everything for free
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFeePolicy;

impl<I: PeerIdentity> RelayPolicy<I> for NoFeePolicy {
    fn reward_for(&self, _origin: &I, _amount: u64) -> u64 {
        0
    }
}

/// Charges a fixed fee per hop
#[derive(Debug, Clone, Copy)]
pub struct FlatFeePolicy {
    pub fee: u64,
}

impl FlatFeePolicy {
    pub fn new(fee: u64) -> Self {
        Self { fee }
    }
}

impl<I: PeerIdentity> RelayPolicy<I> for FlatFeePolicy {
    fn reward_for(&self, _origin: &I, _amount: u64) -> u64 {
        self.fee
    }
}
