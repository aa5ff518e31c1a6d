//! # Payroute Payment
//!
//! Multi-hop payments over routes found by `payroute-routing`.
//!
//! A payment is a chain of hash-time locks, one per channel on the path,
//! all bound to the same secret hash. The target pulls the secret from the
//! initiator, commits its own channel, and reveals the secret upstream; each
//! hop commits both of its channels only once the secret verifies.
//!
//! [`PaymentEngine`] keeps one [`PendingPayment`] per in-flight payment and
//! reports terminal results as [`PaymentEvent`]s.

pub mod config;
pub mod engine;
pub mod error;
pub mod pending;

pub use config::PaymentConfig;
pub use engine::{LockOutcome, PaymentEngine};
pub use error::{PaymentError, PaymentResult};
pub use pending::{FailureReason, LockLeg, PaymentEvent, PaymentRole, PendingPayment};
