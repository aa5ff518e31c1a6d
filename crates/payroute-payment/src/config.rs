//! Payment timing configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    /// How long the initiator waits for the reveal before giving up; also
    /// the lifetime of the first lock
    pub payment_timeout: Duration,
    /// Each hop's outgoing lock expires this much earlier than its incoming
    /// lock
    pub lock_expiry_delta: Duration,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            payment_timeout: Duration::from_secs(10),
            lock_expiry_delta: Duration::from_secs(1),
        }
    }
}

impl PaymentConfig {
    pub fn with_payment_timeout(mut self, timeout: Duration) -> Self {
        self.payment_timeout = timeout;
        self
    }

    pub fn with_lock_expiry_delta(mut self, delta: Duration) -> Self {
        self.lock_expiry_delta = delta;
        self
    }
}
