//! The scheduling and transport collaborator
//!
//! Protocol engines never block. They read the virtual clock, hand outgoing
//! messages to the transport, and arm [`Timer`]s whose expiry is delivered
//! back to the node as an independent event. Each armed timer is owned
//! through its [`TaskHandle`]; cancelling the handle guarantees the timer
//! never fires.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::htlc::PaymentId;
use crate::identity::PeerIdentity;
use crate::message::{Destination, Message};
use crate::time::SimTime;

/// Owned handle to an armed timer
///
/// Not `Clone`: the holder is the only party that may cancel it.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

impl TaskHandle {
    /// Create a handle; only runtimes should call this
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Timer kinds understood by a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub enum Timer<I: PeerIdentity> {
    /// Periodic hello broadcast and channel refresh
    Hello,
    /// Periodic purge of ledger, routing table and duplicate caches
    Purge,
    /// Start of a new RREQ/RERR rate-limit window
    RateLimitReset,
    /// No reply to a route request yet
    RouteRequestRetry { dst: I },
    /// Route request held back by the rate limit
    DeferredRequest { dst: I },
    /// No RREP-ACK from a neighbor we replied through
    ReplyAck { neighbor: I },
    /// Initiator gives up on an unrevealed payment
    PaymentTimeout { payment_id: PaymentId },
    /// A forwarded or received lock lapses
    LockExpiry { payment_id: PaymentId },
}

/// Clock, transport and scheduler as seen by one node
pub trait Runtime<I: PeerIdentity> {
    /// Current virtual time
    fn now(&self) -> SimTime;

    /// Hand a message to the transport
    ///
    /// Delivery is unordered and lossy; the transport stamps the sender and
    /// a packet id.
    fn send(&mut self, destination: Destination<I>, message: Message<I>);

    /// Arm a timer firing `delay` from now
    fn schedule(&mut self, delay: Duration, timer: Timer<I>) -> TaskHandle;

    /// Disarm a timer. A cancelled timer never fires.
    fn cancel(&mut self, handle: TaskHandle);
}
