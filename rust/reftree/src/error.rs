use thiserror::Error;

use crate::{Key, Reference, TreeId};

/// The common error type used by this crate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReftreeError {
    /// A key that an operation depends on is not present in the tree
    #[error("Node not found: {0}")]
    NodeNotFound(Key),

    /// A proxy node was read after one of the trees it was derived from was
    /// modified
    #[error("Stale proxy node (created at generation {recorded}, tree is at {current})")]
    StaleProxy {
        /// The generation recorded when the proxy was created
        recorded: u64,
        /// The generation of the trees at the time of access
        current: u64,
    },

    /// A reference points at a node that its target tree does not contain
    #[error("Could not resolve reference {0}")]
    ReferenceResolution(Reference),

    /// A reference names a tree that is not available for resolution
    #[error("Tree not available for resolution: {0}")]
    TreeNotFound(TreeId),

    /// A delta cannot be replayed as a tree
    #[error("Malformed delta: {0}")]
    MalformedDelta(String),

    /// An edit would leave the tree in an invalid shape
    #[error("Invalid tree structure: {0}")]
    Structure(String),

    /// A key could not be constructed or derived
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}
