use crate::{Content, Key, Node, Payload, ReftreeError, TreeId};

/// A lazy sequence of child keys, in sibling order.
pub type Children<'a> = Box<dyn Iterator<Item = Key> + 'a>;

/// A read-only tree that supports lookup by key and navigation to parents
/// and children without a traversal.
pub trait AddressableTree {
    /// The content type held by this tree's nodes.
    type Content: Content;

    /// The identifier of this tree.
    fn id(&self) -> TreeId;

    /// A counter that changes whenever this tree is modified.
    fn generation(&self) -> u64;

    /// The root node, or `None` if the tree is empty.
    fn root(&self) -> Result<Option<Node<Self::Content>>, ReftreeError>;

    /// The node stored under `key`, if any.
    fn node(&self, key: &Key) -> Result<Option<Node<Self::Content>>, ReftreeError>;

    /// The key of the root node, if the tree is not empty.
    fn root_key(&self) -> Result<Option<Key>, ReftreeError> {
        Ok(self.root()?.map(|node| node.into_parts().0))
    }

    /// Returns true if the tree holds a node under `key`.
    fn contains(&self, key: &Key) -> Result<bool, ReftreeError> {
        Ok(self.node(key)?.is_some())
    }

    /// The key of the parent of `key`, or `None` for the root.
    ///
    /// Fails with [`ReftreeError::NodeNotFound`] if `key` is absent.
    fn parent(&self, key: &Key) -> Result<Option<Key>, ReftreeError>;

    /// The keys of the children of `key`, in sibling order. Every call starts
    /// a fresh sequence.
    ///
    /// Fails with [`ReftreeError::NodeNotFound`] if `key` is absent.
    fn children(&self, key: &Key) -> Result<Children<'_>, ReftreeError>;
}

impl<T> AddressableTree for &T
where
    T: AddressableTree + ?Sized,
{
    type Content = T::Content;

    fn id(&self) -> TreeId {
        (**self).id()
    }

    fn generation(&self) -> u64 {
        (**self).generation()
    }

    fn root(&self) -> Result<Option<Node<Self::Content>>, ReftreeError> {
        (**self).root()
    }

    fn node(&self, key: &Key) -> Result<Option<Node<Self::Content>>, ReftreeError> {
        (**self).node(key)
    }

    fn root_key(&self) -> Result<Option<Key>, ReftreeError> {
        (**self).root_key()
    }

    fn contains(&self, key: &Key) -> Result<bool, ReftreeError> {
        (**self).contains(key)
    }

    fn parent(&self, key: &Key) -> Result<Option<Key>, ReftreeError> {
        (**self).parent(key)
    }

    fn children(&self, key: &Key) -> Result<Children<'_>, ReftreeError> {
        (**self).children(key)
    }
}

/// Where a new node goes among its siblings.
///
/// Every variant except [`Placement::Key`] asks the tree to allocate the key.
/// Below a [`crate::PathKey`] parent the allocated key encodes the requested
/// position; below an opaque parent the tree's [`crate::KeyGenerator`] hands
/// out a fresh key and children keep key order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Use this exact key
    Key(Key),
    /// Before all current siblings
    First,
    /// After all current siblings
    Last,
    /// Immediately before the given sibling
    Before(Key),
    /// Immediately after the given sibling
    After(Key),
}

/// A tree that can be edited in place.
pub trait MutableTree: AddressableTree {
    /// Inserts `payload` below `parent` (or as the root when `parent` is
    /// `None`) and returns the key it was stored under.
    ///
    /// Inserting a key that already exists updates that node's payload and
    /// moves it, together with its subtree, below `parent`.
    fn insert(
        &mut self,
        parent: Option<&Key>,
        placement: Placement,
        payload: Payload<Self::Content>,
    ) -> Result<Key, ReftreeError>;

    /// Removes the subtree rooted at `key`.
    fn delete(&mut self, key: &Key) -> Result<(), ReftreeError>;

    /// Replaces the payload of `key`, keeping its key, position and
    /// children.
    fn update(&mut self, key: &Key, payload: Payload<Self::Content>) -> Result<(), ReftreeError>;
}
