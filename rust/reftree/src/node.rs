use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{Key, TreeId};

/// Points at a node (or a subtree rooted at a node) of another tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    tree: TreeId,
    key: Key,
}

impl Reference {
    /// Create a new [`Reference`].
    pub fn new(tree: TreeId, key: Key) -> Self {
        Self { tree, key }
    }

    /// The tree this [`Reference`] resolves against.
    pub fn tree(&self) -> TreeId {
        self.tree
    }

    /// The key of the target node within [`Reference::tree`].
    pub fn key(&self) -> &Key {
        &self.key
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.key, self.tree)
    }
}

/// What a node holds: content of its own, or a reference into another tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Payload<C> {
    /// Explicit content
    Content(C),
    /// The content of a single node of another tree; children stay local
    NodeRef(Reference),
    /// A whole subtree of another tree, children included
    TreeRef(Reference),
}

impl<C> Payload<C> {
    /// A node-reference to `key` in `tree`.
    pub fn node_ref(tree: TreeId, key: Key) -> Self {
        Payload::NodeRef(Reference::new(tree, key))
    }

    /// A tree-reference to `key` in `tree`.
    pub fn tree_ref(tree: TreeId, key: Key) -> Self {
        Payload::TreeRef(Reference::new(tree, key))
    }

    /// The explicit content, if this is not a reference.
    pub fn content(&self) -> Option<&C> {
        match self {
            Payload::Content(content) => Some(content),
            Payload::NodeRef(_) | Payload::TreeRef(_) => None,
        }
    }

    /// The reference target, if this is a reference of either kind.
    pub fn reference(&self) -> Option<&Reference> {
        match self {
            Payload::Content(_) => None,
            Payload::NodeRef(reference) | Payload::TreeRef(reference) => Some(reference),
        }
    }

    /// Returns true for node- and tree-references.
    pub fn is_reference(&self) -> bool {
        self.reference().is_some()
    }

    /// Returns true for tree-references.
    pub fn is_tree_ref(&self) -> bool {
        matches!(self, Payload::TreeRef(_))
    }
}

/// A node as returned by tree lookups.
#[derive(Clone, Debug, PartialEq)]
pub struct Node<C> {
    key: Key,
    payload: Payload<C>,
}

impl<C> Node<C> {
    /// Create a new [`Node`].
    pub fn new(key: Key, payload: Payload<C>) -> Self {
        Self { key, payload }
    }

    /// The key of this node.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// The payload of this node.
    pub fn payload(&self) -> &Payload<C> {
        &self.payload
    }

    /// Splits this node into its key and payload.
    pub fn into_parts(self) -> (Key, Payload<C>) {
        (self.key, self.payload)
    }
}
