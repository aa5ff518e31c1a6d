//! Protocol messages
//!
//! Every message travels inside an [`Envelope`] tagged with its
//! [`TrafficClass`], so a receiver can demultiplex routing, hello, lock and
//! settlement traffic the way separate ports would.

use std::time::Duration;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::htlc::{HashTimeLock, PaymentId, Secret, SecretHash};
use crate::identity::PeerIdentity;
use crate::proof::BalanceProof;

/// Logical channel a message belongs to
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrafficClass {
    /// Route requests, replies, errors and reply acknowledgments
    #[display("routing")]
    Routing,
    /// Neighbor liveness and channel open/refresh
    #[display("hello")]
    Hello,
    /// Lock placement and refusal
    #[display("lock")]
    Lock,
    /// Secret exchange, reveal and balance-proof commit
    #[display("settlement")]
    Settlement,
}

/// Channel liveness beacon and open request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct Hello<I: PeerIdentity> {
    /// Addressee, `None` when broadcast
    pub dst: Option<I>,
    pub dst_seq: u32,
    pub origin: I,
    pub lifetime: Duration,
    /// Sender's available balance toward the addressee (its deposit when
    /// opening)
    pub available_deposit: u64,
    pub ack_required: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFlags {
    pub gratuitous: bool,
    pub destination_only: bool,
    pub unknown_seq: bool,
}

/// RREQ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct RouteRequest<I: PeerIdentity> {
    pub flags: RequestFlags,
    pub hop_count: u8,
    pub request_id: u32,
    pub dst: I,
    pub dst_seq: u32,
    pub origin: I,
    pub origin_seq: u32,
    /// Amount every channel along the path must be able to carry
    pub amount: u64,
}

/// RREP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct RouteReply<I: PeerIdentity> {
    pub hop_count: u8,
    pub dst: I,
    pub dst_seq: u32,
    pub origin: I,
    pub lifetime: Duration,
    pub ack_required: bool,
    pub accumulated_reward: u64,
}

/// One destination lost because of a broken link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct UnreachableDestination<I: PeerIdentity> {
    pub dst: I,
    pub seq: u32,
}

/// RERR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct RouteError<I: PeerIdentity> {
    pub unreachable: Vec<UnreachableDestination<I>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct Lock<I: PeerIdentity> {
    pub payment_id: PaymentId,
    pub target: I,
    pub initiator: I,
    pub lock: HashTimeLock,
    /// Prospective state of the channel this lock travels over
    pub proof: BalanceProof<I>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct SecretRequest<I: PeerIdentity> {
    pub payment_id: PaymentId,
    pub target: I,
    pub initiator: I,
    pub lock: HashTimeLock,
}

/// Body shared by secret acks and reveals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct SecretMessage<I: PeerIdentity> {
    pub payment_id: PaymentId,
    pub dst: I,
    pub origin: I,
    pub secret: Secret,
    pub secret_hash: SecretHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct BalanceProofCommit<I: PeerIdentity> {
    pub payment_id: PaymentId,
    pub dst: I,
    pub origin: I,
    pub secret: Secret,
    pub secret_hash: SecretHash,
    /// Sealed proof for the committed channel state
    pub proof: BalanceProof<I>,
}

/// Why a hop refused a lock
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    #[display("no route to target")]
    NoRoute,
    #[display("insufficient channel capacity")]
    InsufficientCapacity,
    #[display("lock expired in transit")]
    LockExpired,
    #[display("balance proof rejected")]
    InvalidProof,
    #[display("channel commit failed")]
    CommitFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct PaymentAbort<I: PeerIdentity> {
    pub payment_id: PaymentId,
    /// Hop that refused the lock
    pub origin: I,
    pub reason: AbortReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub enum Message<I: PeerIdentity> {
    Hello(Hello<I>),
    RouteRequest(RouteRequest<I>),
    RouteReply(RouteReply<I>),
    RouteReplyAck,
    RouteError(RouteError<I>),
    Lock(Lock<I>),
    PaymentAbort(PaymentAbort<I>),
    SecretRequest(SecretRequest<I>),
    SecretAck(SecretMessage<I>),
    SecretReveal(SecretMessage<I>),
    BalanceProofCommit(BalanceProofCommit<I>),
}

impl<I: PeerIdentity> Message<I> {
    pub fn traffic_class(&self) -> TrafficClass {
        match self {
            Message::Hello(_) => TrafficClass::Hello,
            Message::RouteRequest(_)
            | Message::RouteReply(_)
            | Message::RouteReplyAck
            | Message::RouteError(_) => TrafficClass::Routing,
            Message::Lock(_) | Message::PaymentAbort(_) => TrafficClass::Lock,
            Message::SecretRequest(_)
            | Message::SecretAck(_)
            | Message::SecretReveal(_)
            | Message::BalanceProofCommit(_) => TrafficClass::Settlement,
        }
    }

    /// Short name for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Hello(_) => "hello",
            Message::RouteRequest(_) => "rreq",
            Message::RouteReply(_) => "rrep",
            Message::RouteReplyAck => "rrep_ack",
            Message::RouteError(_) => "rerr",
            Message::Lock(_) => "lock",
            Message::PaymentAbort(_) => "abort",
            Message::SecretRequest(_) => "secret_req",
            Message::SecretAck(_) => "secret_ack",
            Message::SecretReveal(_) => "secret_reveal",
            Message::BalanceProofCommit(_) => "bp_commit",
        }
    }
}

/// Where a message is sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub enum Destination<I: PeerIdentity> {
    Unicast(I),
    Broadcast,
}

/// A received datagram: sender, transport packet id, class tag and message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct Envelope<I: PeerIdentity> {
    pub sender: I,
    pub packet_id: u32,
    pub class: TrafficClass,
    pub message: Message<I>,
}

impl<I: PeerIdentity> Envelope<I> {
    pub fn new(sender: I, packet_id: u32, message: Message<I>) -> Self {
        Self {
            sender,
            packet_id,
            class: message.traffic_class(),
            message,
        }
    }

    /// Reject envelopes whose tag disagrees with their content
    pub fn validate(&self) -> CoreResult<()> {
        let actual = self.message.traffic_class();
        if actual != self.class {
            return Err(CoreError::ClassMismatch {
                tagged: self.class,
                actual,
            });
        }
        Ok(())
    }

    /// Serialize to bytes for carriage by a real transport
    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|e| CoreError::Encode(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let envelope: Self =
            postcard::from_bytes(bytes).map_err(|e| CoreError::Decode(e.to_string()))?;
        envelope.validate()?;
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SimulationIdentity;

    fn peer(c: char) -> SimulationIdentity {
        SimulationIdentity::new(c).unwrap()
    }

    fn request() -> RouteRequest<SimulationIdentity> {
        RouteRequest {
            flags: RequestFlags::default(),
            hop_count: 0,
            request_id: 1,
            dst: peer('C'),
            dst_seq: 0,
            origin: peer('A'),
            origin_seq: 1,
            amount: 10,
        }
    }

    #[test]
    fn test_traffic_classes() {
        assert_eq!(
            Message::RouteRequest(request()).traffic_class(),
            TrafficClass::Routing
        );
        assert_eq!(
            Message::<SimulationIdentity>::RouteReplyAck.traffic_class(),
            TrafficClass::Routing
        );
        let abort = PaymentAbort {
            payment_id: PaymentId::new(),
            origin: peer('B'),
            reason: AbortReason::NoRoute,
        };
        assert_eq!(Message::PaymentAbort(abort).traffic_class(), TrafficClass::Lock);
    }

    #[test]
    fn test_envelope_bytes_preserve_class() {
        let envelope = Envelope::new(peer('A'), 7, Message::RouteRequest(request()));
        let bytes = envelope.to_bytes().unwrap();
        let decoded = Envelope::<SimulationIdentity>::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_mismatched_tag_rejected() {
        let mut envelope = Envelope::new(peer('A'), 7, Message::RouteRequest(request()));
        envelope.class = TrafficClass::Settlement;
        assert!(matches!(
            envelope.validate(),
            Err(CoreError::ClassMismatch { .. })
        ));
        let bytes = envelope.to_bytes().unwrap();
        assert!(Envelope::<SimulationIdentity>::from_bytes(&bytes).is_err());
    }
}
