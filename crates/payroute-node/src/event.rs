//! Caller-facing node events

use payroute_core::{BalanceProof, PaymentId, PeerIdentity};

/// Something the application should know about
///
/// Failures visible to the caller are always one of `RouteNotFound`,
/// `PaymentFailed` or `BalanceDisagreement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent<I: PeerIdentity> {
    /// A discovery we started found a route
    RouteDiscovered {
        dst: I,
        next_hop: I,
        hop_count: u8,
        /// Sum of relay rewards along the path
        reward: u64,
    },
    /// Discovery exhausted its retries; the queued payment is dropped
    RouteNotFound { dst: I, amount: u64 },
    PaymentCompleted {
        payment_id: PaymentId,
        target: I,
        amount: u64,
    },
    PaymentReceived {
        payment_id: PaymentId,
        initiator: I,
        amount: u64,
    },
    /// `payment_id` is `None` when the payment failed before a lock was sent
    PaymentFailed {
        payment_id: Option<PaymentId>,
        target: I,
        reason: String,
    },
    /// A neighbor's claimed balance disagrees with our ledger; the channel
    /// needs redeeming on the settlement layer
    BalanceDisagreement {
        peer: I,
        recorded: u64,
        claimed: u64,
    },
    /// A channel was closed; `latest_proof` is the last proof received on
    /// it, for settlement
    ChannelClosed {
        peer: I,
        latest_proof: Option<BalanceProof<I>>,
    },
}
