//! Payment channel ledger
//!
//! Tracks deposits, live balances and liveness for every neighbor this node
//! shares a payment channel with.

pub mod config;
pub mod error;
pub mod ledger;

pub use config::LedgerConfig;
pub use error::{LedgerError, LedgerResult};
pub use ledger::{ChannelEntry, ChannelLedger, UpdateOutcome};
