//! # Payroute Node
//!
//! One protocol instance: a channel ledger, a routing table, the discovery
//! and payment engines over them, and the hello exchange that keeps
//! channels alive.
//!
//! [`PaymentNode`] is sans-IO. Whatever drives it (the simulator, or a real
//! transport) implements [`payroute_core::Runtime`] and calls
//! [`PaymentNode::handle_envelope`] and [`PaymentNode::handle_timer`].
//! Results the application cares about come out of
//! [`PaymentNode::drain_events`].
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut node = PaymentNode::new(me, NodeConfig::default());
//! node.open_channel(neighbor, 50, 50, rt.now())?;
//! node.start(&mut rt);
//! node.initiate_payment(target, 10, &mut rt)?;
//! // ... deliver envelopes and timers ...
//! for event in node.drain_events() {
//!     if let NodeEvent::PaymentCompleted { amount, .. } = event { /* done */ }
//! }
//! ```

pub mod config;
pub mod error;
pub mod event;
mod hello;
pub mod node;

pub use config::NodeConfig;
pub use error::{NodeError, NodeResult};
pub use event::NodeEvent;
pub use node::{PaymentNode, PaymentStart};
