//! # Payroute Routing
//!
//! On-demand route discovery constrained by payment channel balances.
//!
//! A node that needs to pay a non-neighbor floods a route request carrying
//! the transaction amount. Each relay forwards the request only toward
//! neighbors it could actually pay, records a reverse route toward the
//! originator, and drops duplicates. The destination answers with a route
//! reply that travels the reverse path, collecting per-hop rewards, and
//! installs forward routes as it goes.
//!
//! ## Core Components
//!
//! - [`DiscoveryEngine`]: request/reply state machine, retries and rate limits
//! - [`RoutingTable`]: one entry per destination with lifetime and precursors
//! - [`IdCache`] and [`DuplicatePacketDetection`]: first-seen duplicate filters
//! - [`RelayPolicy`]: whether to relay and what to charge
//!
//! Sequence numbers compare with wrap-around, see [`seqno`].

pub mod config;
pub mod discovery;
pub mod error;
pub mod id_cache;
pub mod policy;
pub mod seqno;
pub mod table;

pub use config::RoutingConfig;
pub use discovery::{
    DiscoveryEngine, DiscoveryFailed, DiscoveryStatus, ReplyDrop, ReplyOutcome, RequestOutcome,
    RouteResolved, SuppressReason,
};
pub use error::{RoutingError, RoutingResult};
pub use id_cache::{DuplicatePacketDetection, IdCache};
pub use policy::{FlatFeePolicy, NoFeePolicy, RelayPolicy};
pub use table::{InvalidatedRoute, PurgeStats, RouteEntry, RouteState, RoutingTable};
