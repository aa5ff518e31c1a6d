//! Error types for the channel ledger

use thiserror::Error;

/// Errors from ledger lookups and mutations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// No open channel with this neighbor
    #[error("No channel with neighbor {0}")]
    NeighborNotFound(String),

    /// A channel with this neighbor is already open
    #[error("Channel with {0} already open")]
    ChannelExists(String),

    /// Debit larger than the balance on that side of the channel
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u64, available: u64 },

    /// Credit would push a side above the channel capacity
    #[error("Capacity exceeded: {would_be} > {capacity}")]
    CapacityExceeded { would_be: u64, capacity: u64 },

    /// Commit of more than is held under locks on that side
    #[error("Nothing locked to commit: requested {requested}, locked {locked}")]
    NotLocked { requested: u64, locked: u64 },

    /// Neighbor's claimed balance differs from our record; the current
    /// balance must be redeemed on the settlement layer
    #[error("Balance disagreement with {peer}: recorded {recorded}, claimed {claimed}")]
    BalanceDisagreement {
        peer: String,
        recorded: u64,
        claimed: u64,
    },

    /// Sealed proof does not match the committed channel state
    #[error("Balance proof does not match committed state with {0}")]
    ProofMismatch(String),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
