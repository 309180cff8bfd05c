use hashbrown::HashSet;

use crate::{
    AddressableTree, Children, Key, KeyMap, Node, Payload, ProxySettings, Reference, ReftreeError,
    Trap, TreeId,
};

/// Which tree a [`ProxyNode`] is read from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// The node lives in the front tree under the proxy's key
    Front,
    /// The node lives in the backing tree under the given key
    Back(Key),
}

/// A handle to one node of a [`ProxyTree`].
///
/// The handle is detached from the view that produced it: it records the
/// node's key, where it was found and the generation of the source trees at
/// the time. Reading it through a view after either source tree changed is
/// an error.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProxyNode {
    key: Key,
    side: Side,
    generation: u64,
}

impl ProxyNode {
    /// The generation of the source trees when this handle was created.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// A merged, reference-free view over a front tree and the backing tree its
/// references point into.
///
/// The view uses the front tree's key space. Front nodes are returned as
/// they are, except that references are followed into the backing tree:
/// node-references lend their target's content, and tree-references stand
/// for the whole backing subtree below their target. Keys that the front
/// tree does not have are looked up in the backing tree through the
/// [`KeyMap`], unless they are listed as deleted.
pub struct ProxyTree<'a, F, B, M>
where
    F: ?Sized,
    B: ?Sized,
{
    front: &'a F,
    back: &'a B,
    keys: M,
    deleted: Option<&'a HashSet<Key>>,
    settings: ProxySettings,
    trap: Option<Trap>,
}

impl<'a, F, B, M> ProxyTree<'a, F, B, M>
where
    F: AddressableTree + ?Sized,
    B: AddressableTree<Content = F::Content> + ?Sized,
    M: KeyMap,
{
    /// Create a new view.
    pub fn new(front: &'a F, back: &'a B, keys: M) -> Self {
        Self {
            front,
            back,
            keys,
            deleted: None,
            settings: ProxySettings::default(),
            trap: None,
        }
    }

    /// Use the given settings.
    pub fn with_settings(mut self, settings: ProxySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Report resolution failures to `trap` instead of returning them.
    pub fn with_trap(mut self, trap: Option<Trap>) -> Self {
        self.trap = trap;
        self
    }

    /// Hide the given backing keys.
    pub fn with_deleted(mut self, deleted: &'a HashSet<Key>) -> Self {
        self.deleted = Some(deleted);
        self
    }

    /// The combined generation of the front and backing trees.
    pub fn current_generation(&self) -> u64 {
        self.front.generation() + self.back.generation()
    }

    /// The node stored under `key`, if it is visible.
    pub fn get(&self, key: &Key) -> Result<Option<ProxyNode>, ReftreeError> {
        let located = self.trapped(self.locate(key))?;
        Ok(located.map(|side| self.handle(key.clone(), side)))
    }

    /// The root node, if the view is not empty.
    pub fn get_root(&self) -> Result<Option<ProxyNode>, ReftreeError> {
        if let Some(root) = self.front.root_key()? {
            return self.get(&root);
        }
        let Some(root) = self.back.root_key()? else {
            return Ok(None);
        };
        if self.is_deleted(&root) {
            return Ok(None);
        }
        Ok(self
            .keys
            .front_key(&root)
            .map(|key| self.handle(key, Side::Back(root))))
    }

    /// The key of a node.
    pub fn key_of(&self, node: &ProxyNode) -> Result<Key, ReftreeError> {
        self.check(node)?;
        Ok(node.key.clone())
    }

    /// The resolved content of a node. This is never a reference.
    ///
    /// Yields `None` only if resolution failed and a [`Trap`] took the
    /// error.
    pub fn content(&self, node: &ProxyNode) -> Result<Option<F::Content>, ReftreeError> {
        self.check(node)?;
        let resolved = match &node.side {
            Side::Front => self.front_content(&node.key),
            Side::Back(back) => self.back_content(back),
        };
        self.trapped(resolved)
    }

    /// The parent of a node, or `None` for the root.
    pub fn parent_of(&self, node: &ProxyNode) -> Result<Option<ProxyNode>, ReftreeError> {
        self.check(node)?;

        let parent = match &node.side {
            Side::Front => self.front.parent(&node.key)?,
            Side::Back(back) => {
                if self.is_front_tree_ref(&node.key)? {
                    self.front.parent(&node.key)?
                } else {
                    match self.back.parent(back)? {
                        Some(parent) => self.keys.front_key(&parent),
                        None => None,
                    }
                }
            }
        };

        match parent {
            Some(parent) => self.get(&parent),
            None => Ok(None),
        }
    }

    /// The children of a node, in sibling order.
    pub fn children_of(&self, node: &ProxyNode) -> Result<Vec<ProxyNode>, ReftreeError> {
        self.check(node)?;

        let mut children = Vec::new();
        match &node.side {
            Side::Front => {
                for child in self.front.children(&node.key)? {
                    if let Some(side) = self.trapped(self.locate(&child))? {
                        children.push(self.handle(child, side));
                    }
                }
            }
            Side::Back(back) => {
                for child in self.back.children(back)? {
                    if self.is_deleted(&child) {
                        continue;
                    }
                    if let Some(key) = self.keys.front_key(&child) {
                        children.push(self.handle(key, Side::Back(child)));
                    }
                }
            }
        }
        Ok(children)
    }

    /// The keys of the children of `key`.
    pub fn child_keys(&self, key: &Key) -> Result<Vec<Key>, ReftreeError> {
        let node = self.require(key)?;
        Ok(self
            .children_of(&node)?
            .into_iter()
            .map(|child| child.key)
            .collect())
    }

    fn require(&self, key: &Key) -> Result<ProxyNode, ReftreeError> {
        self.get(key)?
            .ok_or_else(|| ReftreeError::NodeNotFound(key.clone()))
    }

    fn handle(&self, key: Key, side: Side) -> ProxyNode {
        ProxyNode {
            key,
            side,
            generation: self.current_generation(),
        }
    }

    fn check(&self, node: &ProxyNode) -> Result<(), ReftreeError> {
        let current = self.current_generation();
        if self.settings.check_staleness && node.generation != current {
            return Err(ReftreeError::StaleProxy {
                recorded: node.generation,
                current,
            });
        }
        Ok(())
    }

    fn trapped<T>(
        &self,
        result: Result<Option<T>, ReftreeError>,
    ) -> Result<Option<T>, ReftreeError> {
        match (result, &self.trap) {
            (Err(error @ ReftreeError::ReferenceResolution(_)), Some(trap)) => {
                trap.spring(&error);
                Ok(None)
            }
            (result, _) => result,
        }
    }

    fn is_deleted(&self, back: &Key) -> bool {
        self.deleted.is_some_and(|deleted| deleted.contains(back))
    }

    fn is_front_tree_ref(&self, key: &Key) -> Result<bool, ReftreeError> {
        Ok(self
            .front
            .node(key)?
            .is_some_and(|node| node.payload().is_tree_ref()))
    }

    fn backing_target(&self, reference: &Reference) -> Result<Key, ReftreeError> {
        if reference.tree() != self.back.id() || !self.back.contains(reference.key())? {
            return Err(ReftreeError::ReferenceResolution(reference.clone()));
        }
        Ok(reference.key().clone())
    }

    fn locate(&self, key: &Key) -> Result<Option<Side>, ReftreeError> {
        if let Some(node) = self.front.node(key)? {
            return match node.payload() {
                Payload::TreeRef(reference) => Ok(Some(Side::Back(self.backing_target(reference)?))),
                Payload::Content(_) | Payload::NodeRef(_) => Ok(Some(Side::Front)),
            };
        }

        let Some(back) = self.keys.back_key(key) else {
            return Ok(None);
        };
        if self.is_deleted(&back) || !self.back.contains(&back)? {
            return Ok(None);
        }
        Ok(Some(Side::Back(back)))
    }

    fn front_content(&self, key: &Key) -> Result<Option<F::Content>, ReftreeError> {
        let node = self
            .front
            .node(key)?
            .ok_or_else(|| ReftreeError::NodeNotFound(key.clone()))?;
        match node.into_parts().1 {
            Payload::Content(content) => Ok(Some(content)),
            Payload::NodeRef(reference) | Payload::TreeRef(reference) => {
                let target = self.backing_target(&reference)?;
                match self.back.node(&target)?.map(|node| node.into_parts().1) {
                    Some(Payload::Content(content)) => Ok(Some(content)),
                    _ => Err(ReftreeError::ReferenceResolution(reference)),
                }
            }
        }
    }

    fn back_content(&self, back: &Key) -> Result<Option<F::Content>, ReftreeError> {
        let node = self
            .back
            .node(back)?
            .ok_or_else(|| ReftreeError::NodeNotFound(back.clone()))?;
        match node.into_parts().1 {
            Payload::Content(content) => Ok(Some(content)),
            Payload::NodeRef(reference) | Payload::TreeRef(reference) => {
                Err(ReftreeError::ReferenceResolution(reference))
            }
        }
    }
}

impl<F, B, M> AddressableTree for ProxyTree<'_, F, B, M>
where
    F: AddressableTree + ?Sized,
    B: AddressableTree<Content = F::Content> + ?Sized,
    M: KeyMap,
{
    type Content = F::Content;

    fn id(&self) -> TreeId {
        self.front.id()
    }

    fn generation(&self) -> u64 {
        self.current_generation()
    }

    fn root(&self) -> Result<Option<Node<Self::Content>>, ReftreeError> {
        match self.get_root()? {
            Some(root) => self.materialize(root),
            None => Ok(None),
        }
    }

    fn node(&self, key: &Key) -> Result<Option<Node<Self::Content>>, ReftreeError> {
        match self.get(key)? {
            Some(node) => self.materialize(node),
            None => Ok(None),
        }
    }

    fn contains(&self, key: &Key) -> Result<bool, ReftreeError> {
        Ok(self.get(key)?.is_some())
    }

    fn parent(&self, key: &Key) -> Result<Option<Key>, ReftreeError> {
        let node = self.require(key)?;
        Ok(self.parent_of(&node)?.map(|parent| parent.key))
    }

    fn children(&self, key: &Key) -> Result<Children<'_>, ReftreeError> {
        Ok(Box::new(self.child_keys(key)?.into_iter()))
    }
}

impl<F, B, M> ProxyTree<'_, F, B, M>
where
    F: AddressableTree + ?Sized,
    B: AddressableTree<Content = F::Content> + ?Sized,
    M: KeyMap,
{
    fn materialize(&self, node: ProxyNode) -> Result<Option<Node<F::Content>>, ReftreeError> {
        Ok(self
            .content(&node)?
            .map(|content| Node::new(node.key, Payload::Content(content))))
    }
}
