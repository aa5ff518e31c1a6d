//! Simulation errors

use payroute_node::NodeError;
use thiserror::Error;

use crate::topology::NodeId;

#[derive(Debug, Error)]
pub enum SimError {
    /// Node names are single capital letters
    #[error("invalid node name {0:?}")]
    InvalidNode(char),

    #[error("topology size {0} outside 1..=26")]
    TopologySize(usize),

    #[error("no node {0} in the mesh")]
    UnknownNode(NodeId),

    #[error("{0} and {1} are not in radio range")]
    NotInRange(NodeId, NodeId),

    #[error(transparent)]
    Node(#[from] NodeError),
}

pub type SimResult<T> = Result<T, SimError>;
