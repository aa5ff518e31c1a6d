//! Error types for payment execution

use payroute_core::PaymentId;
use payroute_ledger::LedgerError;
use thiserror::Error;

/// Errors raised when starting a payment
///
/// Failures after a lock is in flight are reported as events, not errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// Zero-value payment
    #[error("Payment amount must be positive")]
    ZeroAmount,

    /// Payment to ourselves
    #[error("Cannot pay self")]
    SelfPayment,

    /// No valid route to the target in the routing table
    #[error("No route to {0}")]
    NoRoute(String),

    /// First hop cannot carry the amount
    #[error("Insufficient capacity toward {peer}: requested {requested}, available {available}")]
    InsufficientCapacity {
        peer: String,
        requested: u64,
        available: u64,
    },

    /// A payment with this id is already in flight here
    #[error("Payment {0} already pending")]
    AlreadyPending(PaymentId),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Result type for payment operations
pub type PaymentResult<T> = Result<T, PaymentError>;
