//! Core types for payment-channel-aware route discovery
//!
//! This crate holds what every other payroute crate agrees on:
//!
//! - [`PeerIdentity`]: node addresses, simulated or IPv4
//! - [`SimTime`]: virtual time
//! - [`Runtime`]: the clock, transport and timer collaborator engines run against
//! - [`Message`] and [`Envelope`]: logical protocol messages tagged by traffic class
//! - [`HashTimeLock`], [`Secret`] and [`BalanceProof`]: payment primitives carried in messages

pub mod error;
pub mod htlc;
pub mod identity;
pub mod message;
pub mod mock_runtime;
pub mod proof;
pub mod runtime;
pub mod time;

pub use error::{CoreError, CoreResult, IdentityError};
pub use htlc::{HashTimeLock, PaymentId, Secret, SecretHash};
pub use identity::{Ipv4Identity, PeerIdentity, SimulationIdentity};
pub use message::{
    AbortReason, BalanceProofCommit, Destination, Envelope, Hello, Lock, Message, PaymentAbort,
    RequestFlags, RouteError, RouteReply, RouteRequest, SecretMessage, SecretRequest,
    TrafficClass, UnreachableDestination,
};
pub use mock_runtime::{RecordingRuntime, ScheduledTimer};
pub use proof::{Authenticator, BalanceHash, BalancePayload, BalanceProof, ProofSeal};
pub use runtime::{Runtime, TaskHandle, Timer};
pub use time::SimTime;
