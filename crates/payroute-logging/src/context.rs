//! Node context injection
//!
//! Many simulated nodes share one thread, so log lines need to say which
//! node emitted them. [`NodeContextGuard`] stores the node's identity (and
//! the virtual clock reading) in thread-local storage for a scope and
//! enters a `node` span carrying the same fields, so both the formatters and
//! [`crate::layers::CaptureLayer`] see it.

use std::cell::RefCell;

use payroute_core::{PeerIdentity, SimTime};
use tracing::span::EnteredSpan;
use uuid::Uuid;

/// Node context stored in thread-local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContextData {
    pub node_id: String,
    /// Distinguishes restarts of the same address
    pub instance_id: Uuid,
    /// Virtual time of the dispatch, when driven by a simulator
    pub sim_time: Option<SimTime>,
}

thread_local! {
    static NODE_CONTEXT: RefCell<Option<NodeContextData>> = const { RefCell::new(None) };
}

/// RAII guard for node context
///
/// Restores the previous context (if any) on drop, so guards nest.
///
/// ```ignore
/// use payroute_logging::NodeContextGuard;
/// use payroute_core::SimulationIdentity;
///
/// let node = SimulationIdentity::new('A').unwrap();
/// let _guard = NodeContextGuard::new(&node);
/// tracing::info!("flooding route request"); // carries node = "A"
/// ```
pub struct NodeContextGuard {
    previous: Option<NodeContextData>,
    _span: EnteredSpan,
}

impl NodeContextGuard {
    pub fn new<I: PeerIdentity>(identity: &I) -> Self {
        Self::install(NodeContextData {
            node_id: identity.log_label(),
            instance_id: Uuid::new_v4(),
            sim_time: None,
        })
    }

    /// Context for one simulator dispatch at virtual time `now`
    pub fn at<I: PeerIdentity>(identity: &I, now: SimTime) -> Self {
        Self::install(NodeContextData {
            node_id: identity.log_label(),
            instance_id: Uuid::new_v4(),
            sim_time: Some(now),
        })
    }

    /// Keep a stable instance id across guards for the same node
    pub fn with_instance_id<I: PeerIdentity>(identity: &I, instance_id: Uuid) -> Self {
        Self::install(NodeContextData {
            node_id: identity.log_label(),
            instance_id,
            sim_time: None,
        })
    }

    fn install(data: NodeContextData) -> Self {
        let span = match data.sim_time {
            Some(now) => tracing::info_span!("node", node = %data.node_id, sim_time = %now),
            None => tracing::info_span!("node", node = %data.node_id),
        };
        let previous = NODE_CONTEXT.with(|ctx| ctx.borrow_mut().replace(data));
        Self {
            previous,
            _span: span.entered(),
        }
    }

    pub fn current() -> Option<NodeContextData> {
        NODE_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    pub fn current_node_id() -> Option<String> {
        Self::current().map(|ctx| ctx.node_id)
    }
}

impl Drop for NodeContextGuard {
    fn drop(&mut self) {
        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Run a block with a node context installed
///
/// ```ignore
/// with_node_context!(&node, {
///     tracing::info!("purging expired routes");
/// });
/// ```
#[macro_export]
macro_rules! with_node_context {
    ($identity:expr, $body:block) => {{
        let _guard = $crate::context::NodeContextGuard::new($identity);
        $body
    }};
}
