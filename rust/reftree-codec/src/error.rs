use reftree::{ReftreeError, TreeId};
use thiserror::Error;

/// Errors that occur while moving deltas across the wire
#[derive(Error, Debug)]
pub enum CodecError {
    /// A delta could not be written
    #[error("Failed to encode delta: {0}")]
    Encode(String),

    /// Bytes could not be read back as a delta
    #[error("Failed to decode delta: {0}")]
    Decode(String),

    /// The delta was computed against a different version than the tree it
    /// is decoded against
    #[error("Delta is based on {found}, but the local base is {expected}")]
    BaseMismatch {
        /// The id of the local base tree
        expected: TreeId,
        /// The base recorded in the delta
        found: TreeId,
    },

    /// The decoded delta is not valid for the local base tree
    #[error(transparent)]
    Engine(#[from] ReftreeError),
}
