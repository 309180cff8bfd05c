#![warn(missing_docs)]

//! Versioned reference trees.
//!
//! A reference tree is an ordered, keyed tree in which any node holds either
//! content or a reference into another tree. A [`Payload::NodeRef`] borrows
//! the content of a single node, and a [`Payload::TreeRef`] stands for a
//! whole subtree. This crate provides:
//!
//! - [`normalize`]: minimize a tree into a reference-heavy delta relative to
//!   one or more donor trees
//! - [`expand_refs`]: turn such a delta back into explicit content
//! - [`ChangeBuffer`]: apply a delta on top of a backing tree, copying only
//!   the subtrees that changed
//! - [`ProxyTree`]: a read-only view that follows references so callers never
//!   see them
//!
//! Every tree implements [`AddressableTree`], and trees that can be edited
//! also implement [`MutableTree`]. [`MemoryTree`] is the in-memory
//! implementation.
//!
//! Computing a delta and applying it on the other side:
//!
//! ```
//! use reftree::{
//!     AddressableTree, ChangeBuffer, Delta, MemoryTree, MutableTree, Payload, Resolver, TreeId,
//!     content_equal, normalize,
//! };
//!
//! # fn main() -> Result<(), reftree::ReftreeError> {
//! let mut base = MemoryTree::<String>::new(TreeId(1));
//! let root = base.set_root("R".into())?;
//! base.append(&root, "x".into())?;
//! let y = base.append(&root, "y".into())?;
//!
//! let mut target = base.clone();
//! target.update(&y, Payload::Content("z".into()))?;
//!
//! let resolver = Resolver::new().with(&base);
//! let normalized = normalize(&[&target], &resolver)?.remove(0);
//! let delta = Delta::from_normalized(base.id(), normalized);
//!
//! let mut buffer = ChangeBuffer::new(&base);
//! buffer.apply_delta(&delta)?;
//!
//! assert!(buffer.is_materialized(&y));
//! assert!(content_equal(&buffer, &target, &resolver)?);
//! # Ok(())
//! # }
//! ```

mod apply;
pub use apply::*;

mod change_buffer;
pub use change_buffer::*;

mod content;
pub use content::*;

mod delta;
pub use delta::*;

mod digest;
pub use digest::*;

mod engine;
pub use engine::*;

mod error;
pub use error::*;

mod expand;
pub use expand::*;

mod key;
pub use key::*;

mod key_map;
pub use key_map::*;

mod memory;
pub use memory::*;

mod merge;
pub use merge::*;

mod node;
pub use node::*;

mod normalize;
pub use normalize::*;

mod proxy;
pub use proxy::*;

mod rekeyed;
pub use rekeyed::*;

mod resolve;
pub use resolve::*;

mod settings;
pub use settings::*;

mod traversal;
pub use traversal::*;

mod tree;
pub use tree::*;
