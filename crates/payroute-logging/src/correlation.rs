//! Payment correlation
//!
//! A payment touches every node on its path. [`PaymentTrace`] gives all the
//! log lines of one payment a shared trace id, with a hop counter that grows
//! as the lock is forwarded, so a JSONL dump can be filtered down to a single
//! payment's journey.

use payroute_core::PaymentId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation context for one payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTrace {
    /// Same on every node for one payment
    pub trace_id: Uuid,
    pub payment_id: PaymentId,
    /// Hops travelled from the initiator
    pub hop: u32,
}

impl PaymentTrace {
    /// Context at the initiator
    pub fn root(payment_id: PaymentId) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            payment_id,
            hop: 0,
        }
    }

    /// Context one hop further along the path
    pub fn child(&self) -> Self {
        Self {
            hop: self.hop + 1,
            ..self.clone()
        }
    }

    /// A `payment` span carrying this context's fields
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "payment",
            trace_id = %self.trace_id,
            payment_id = %self.payment_id.short(),
            hop = self.hop,
        )
    }
}

/// Standard field names for consistency across crates
pub mod fields {
    pub const MESSAGE: &str = "message";
    pub const NODE: &str = "node";
    pub const SIM_TIME: &str = "sim_time";
    pub const TRACE_ID: &str = "trace_id";
    pub const PAYMENT_ID: &str = "payment_id";
    pub const HOP: &str = "hop";
    pub const DST: &str = "dst";
    pub const AMOUNT: &str = "amount";
}
