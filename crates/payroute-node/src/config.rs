//! Configuration for a payment node

use std::time::Duration;

use payroute_ledger::LedgerConfig;
use payroute_payment::PaymentConfig;
use payroute_routing::RoutingConfig;
use serde::{Deserialize, Serialize};

/// Configuration for a PaymentNode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Protocol timing and flags
    pub routing: RoutingConfig,
    /// Channel defaults
    pub ledger: LedgerConfig,
    /// Lock timing
    pub payment: PaymentConfig,
    /// Window for (sender, packet id) replay suppression
    pub duplicate_lifetime: Duration,
    /// Lifetime of explicitly opened channels; `None` uses the hello
    /// lifetime, so channels only live while hellos keep them alive
    pub channel_lifetime: Option<Duration>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let routing = RoutingConfig::default();
        Self {
            duplicate_lifetime: routing.path_discovery_time(),
            routing,
            ledger: LedgerConfig::default(),
            payment: PaymentConfig::default(),
            channel_lifetime: None,
        }
    }
}

impl NodeConfig {
    /// Set the routing configuration
    pub fn with_routing(mut self, routing: RoutingConfig) -> Self {
        self.routing = routing;
        self
    }

    /// Set the ledger configuration
    pub fn with_ledger(mut self, ledger: LedgerConfig) -> Self {
        self.ledger = ledger;
        self
    }

    /// Set the payment configuration
    pub fn with_payment(mut self, payment: PaymentConfig) -> Self {
        self.payment = payment;
        self
    }

    pub fn with_channel_lifetime(mut self, lifetime: Duration) -> Self {
        self.channel_lifetime = Some(lifetime);
        self
    }

    /// Lifetime given to a channel opened by `open_channel`
    pub fn effective_channel_lifetime(&self) -> Duration {
        self.channel_lifetime
            .unwrap_or_else(|| self.routing.hello_lifetime())
    }
}
