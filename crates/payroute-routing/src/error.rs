//! Error types for route discovery

use thiserror::Error;

/// Errors that can occur during route lookup and discovery
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// No entry for this destination
    #[error("No route to {0}")]
    RouteNotFound(String),

    /// Entry exists but is not usable (invalid, searching or expired)
    #[error("Route to {dst} is not valid ({state})")]
    RouteNotValid { dst: String, state: String },

    /// Discovery toward ourselves
    #[error("Cannot discover a route to self")]
    SelfDestination,

    /// Zero-value discovery
    #[error("Transaction amount must be positive")]
    ZeroAmount,
}

/// Result type for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;
