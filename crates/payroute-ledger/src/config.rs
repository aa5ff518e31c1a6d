//! Ledger configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Deposit both sides commit when a channel is opened by a hello exchange
    pub default_deposit: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_deposit: 100,
        }
    }
}

impl LedgerConfig {
    pub fn with_default_deposit(mut self, deposit: u64) -> Self {
        self.default_deposit = deposit;
        self
    }
}
