//! Protocol timing and behavior configuration
//!
//! Derived timeouts are computed from the base constants rather than stored,
//! so changing `node_traversal_time` or `net_diameter` keeps every dependent
//! timer consistent.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Retries after the first route request before giving up
    pub rreq_retries: u32,
    /// Route requests originated per rate window
    pub rreq_rate_limit: u16,
    /// Route errors originated per rate window
    pub rerr_rate_limit: u16,
    /// Length of one rate-limit window
    pub rate_limit_window: Duration,
    pub active_route_timeout: Duration,
    /// Maximum hops between two nodes
    pub net_diameter: u32,
    /// Conservative one-hop traversal estimate
    pub node_traversal_time: Duration,
    pub hello_interval: Duration,
    /// Hellos that may be missed before a neighbor is considered gone
    pub allowed_hello_loss: u32,
    pub timeout_buffer: u32,
    /// Send periodic hellos and keep channels alive with them
    pub enable_hello: bool,
    /// Only the destination may answer a request
    pub destination_only: bool,
    /// Intermediate replies also notify the destination
    pub gratuitous_reply: bool,
    /// Allow intermediate nodes with a fresh route to answer
    pub intermediate_reply: bool,
    /// Ask the first hop of a reply to acknowledge it
    pub reply_ack_required: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            rreq_retries: 2,
            rreq_rate_limit: 10,
            rerr_rate_limit: 10,
            rate_limit_window: Duration::from_secs(1),
            active_route_timeout: Duration::from_secs(3),
            net_diameter: 35,
            node_traversal_time: Duration::from_millis(40),
            hello_interval: Duration::from_secs(1),
            allowed_hello_loss: 2,
            timeout_buffer: 2,
            enable_hello: true,
            destination_only: false,
            gratuitous_reply: true,
            intermediate_reply: false,
            reply_ack_required: true,
        }
    }
}

impl RoutingConfig {
    /// `2 * NetDiameter * NodeTraversalTime`
    pub fn net_traversal_time(&self) -> Duration {
        self.node_traversal_time * 2 * self.net_diameter
    }

    /// `2 * NetTraversalTime`
    pub fn path_discovery_time(&self) -> Duration {
        self.net_traversal_time() * 2
    }

    /// Lifetime the destination stamps on its replies
    pub fn my_route_timeout(&self) -> Duration {
        self.path_discovery_time().max(self.active_route_timeout) * 2
    }

    /// How long an invalidated route lingers before removal
    pub fn delete_period(&self) -> Duration {
        self.active_route_timeout.max(self.hello_interval) * 5
    }

    pub fn next_hop_wait(&self) -> Duration {
        self.node_traversal_time + Duration::from_millis(10)
    }

    pub fn blacklist_timeout(&self) -> Duration {
        self.net_traversal_time() * self.rreq_retries
    }

    /// Liveness granted by one hello
    pub fn hello_lifetime(&self) -> Duration {
        self.hello_interval * self.allowed_hello_loss
    }

    /// Lifetime of a reverse route learned from a request that travelled
    /// `hop_count` hops
    pub fn reverse_route_lifetime(&self, hop_count: u8) -> Duration {
        (self.net_traversal_time() * 2)
            .saturating_sub(self.node_traversal_time * 2 * u32::from(hop_count))
    }

    /// Wait before retry number `attempt` (1-based count of requests
    /// already sent)
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.net_traversal_time() * (1u32 << exponent)
    }

    pub fn with_rreq_retries(mut self, retries: u32) -> Self {
        self.rreq_retries = retries;
        self
    }

    pub fn with_rreq_rate_limit(mut self, limit: u16) -> Self {
        self.rreq_rate_limit = limit;
        self
    }

    pub fn with_hello_interval(mut self, interval: Duration) -> Self {
        self.hello_interval = interval;
        self
    }

    pub fn with_hello(mut self, enabled: bool) -> Self {
        self.enable_hello = enabled;
        self
    }

    pub fn with_intermediate_reply(mut self, enabled: bool) -> Self {
        self.intermediate_reply = enabled;
        self
    }

    pub fn with_reply_ack(mut self, required: bool) -> Self {
        self.reply_ack_required = required;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_constants() {
        let config = RoutingConfig::default();
        assert_eq!(config.net_traversal_time(), Duration::from_millis(2800));
        assert_eq!(config.path_discovery_time(), Duration::from_millis(5600));
        assert_eq!(config.my_route_timeout(), Duration::from_millis(11200));
        assert_eq!(config.delete_period(), Duration::from_secs(15));
        assert_eq!(config.next_hop_wait(), Duration::from_millis(50));
        assert_eq!(config.blacklist_timeout(), Duration::from_millis(5600));
        assert_eq!(config.hello_lifetime(), Duration::from_secs(2));
    }

    #[test]
    fn test_reverse_route_lifetime_saturates() {
        let config = RoutingConfig::default();
        assert_eq!(config.reverse_route_lifetime(1), Duration::from_millis(5520));
        assert_eq!(config.reverse_route_lifetime(255), Duration::ZERO);
    }

    #[test]
    fn test_retry_backoff_doubles() {
        let config = RoutingConfig::default();
        assert_eq!(config.retry_backoff(1), config.net_traversal_time());
        assert_eq!(config.retry_backoff(2), config.path_discovery_time());
        assert_eq!(config.retry_backoff(3), config.net_traversal_time() * 4);
    }
}
