#![warn(missing_docs)]

//! Wire encoding for [`reftree::Delta`].
//!
//! [`CborCodec`] writes a delta as IPLD DAG-CBOR: the base version, the
//! delta tree's id and its nodes in pre-order, each with its parent key.
//! Decoding rebuilds the tree and checks it against the receiver's copy of
//! the base before handing it out.

mod cbor;
pub use cbor::*;

mod error;
pub use error::*;
