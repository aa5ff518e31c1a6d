//! Per-hop payment state

use derive_more::Display;
use payroute_core::{
    AbortReason, BalanceProof, HashTimeLock, PaymentId, PeerIdentity, Secret, TaskHandle,
};

/// Where this node sits on a payment's path
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum PaymentRole {
    #[display("initiator")]
    Initiator,
    #[display("mediator")]
    Mediator,
    #[display("target")]
    Target,
}

/// One channel a lock travels over, as seen from this node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLeg<I: PeerIdentity> {
    pub peer: I,
    pub lock: HashTimeLock,
    /// Unsigned proof of the prospective channel state
    pub proof: BalanceProof<I>,
}

/// An unresolved payment at one hop
///
/// The initiator holds only an outgoing leg and the secret. The target holds
/// only an incoming leg. Mediators hold both.
#[derive(Debug)]
pub struct PendingPayment<I: PeerIdentity> {
    pub payment_id: PaymentId,
    pub initiator: I,
    pub target: I,
    /// Lock received from the previous hop
    pub incoming: Option<LockLeg<I>>,
    /// Lock sent to the next hop
    pub outgoing: Option<LockLeg<I>>,
    pub secret: Option<Secret>,
    /// Payment timeout at the initiator, lock expiry elsewhere
    pub(crate) timer: Option<TaskHandle>,
}

impl<I: PeerIdentity> PendingPayment<I> {
    pub fn role(&self) -> PaymentRole {
        match (&self.incoming, &self.outgoing) {
            (None, _) => PaymentRole::Initiator,
            (Some(_), Some(_)) => PaymentRole::Mediator,
            (Some(_), None) => PaymentRole::Target,
        }
    }

    pub fn amount(&self) -> u64 {
        self.incoming
            .as_ref()
            .or(self.outgoing.as_ref())
            .map(|leg| leg.lock.amount)
            .unwrap_or(0)
    }

    pub fn prev_hop(&self) -> Option<&I> {
        self.incoming.as_ref().map(|leg| &leg.peer)
    }

    pub fn next_hop(&self) -> Option<&I> {
        self.outgoing.as_ref().map(|leg| &leg.peer)
    }
}

/// Why a payment failed at the initiator
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum FailureReason<I: PeerIdentity> {
    #[display("aborted by {by}: {reason}")]
    Aborted { by: I, reason: AbortReason },
    #[display("timed out waiting for reveal")]
    TimedOut,
    /// The secret came back but our channel refused the commit
    #[display("commit toward {peer} failed: {error}")]
    CommitFailed { peer: I, error: String },
}

/// Terminal results surfaced to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent<I: PeerIdentity> {
    /// Initiator: the secret came back and the first channel is committed
    Completed {
        payment_id: PaymentId,
        target: I,
        amount: u64,
    },
    /// Target: the secret verified and the last channel is committed
    Received {
        payment_id: PaymentId,
        initiator: I,
        amount: u64,
    },
    /// Initiator: the payment will not complete
    Failed {
        payment_id: PaymentId,
        target: I,
        reason: FailureReason<I>,
    },
}
