//! Error types for the node

use payroute_core::CoreError;
use payroute_ledger::LedgerError;
use payroute_payment::PaymentError;
use payroute_routing::RoutingError;
use thiserror::Error;

/// Errors returned by node entry points
#[derive(Debug, Error)]
pub enum NodeError {
    /// Message or identity error
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// Channel ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Route discovery error
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    /// Payment execution error
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Entry point used before `start`
    #[error("Node not started")]
    NotStarted,
}

/// Result type for node operations
pub type NodeResult<T> = Result<T, NodeError>;
