use hashbrown::HashSet;

use crate::{
    AddressableTree, Children, Content, Delta, IdentityKeyMap, Key, MemoryTree, MutableTree, Node,
    Payload, Placement, ProxySettings, ProxyTree, Reference, ReftreeError, Trap, TreeId,
    dfs_keys_from,
};

/// A mutable overlay that applies changes on top of a backing tree without
/// copying it.
///
/// Every overlay node is either *materialized* (it holds its own content or
/// a node-reference) or *lazy*: a tree-reference into the backing tree at
/// the node's own key, standing for the unchanged backing subtree below it.
/// Backing keys that the current state no longer contains are recorded as
/// deleted. An empty buffer reads exactly like its backing tree.
///
/// Reads go through [`ChangeBuffer::view`], or through the buffer's own
/// [`AddressableTree`] implementation, which never returns references.
pub struct ChangeBuffer<'b, B>
where
    B: AddressableTree + ?Sized,
{
    backing: &'b B,
    overlay: MemoryTree<B::Content>,
    deleted: HashSet<Key>,
    settings: ProxySettings,
    trap: Option<Trap>,
}

impl<'b, B, C> ChangeBuffer<'b, B>
where
    B: AddressableTree<Content = C> + ?Sized,
    C: Content,
{
    /// Create an empty buffer over `backing`.
    pub fn new(backing: &'b B) -> Self {
        Self {
            backing,
            overlay: MemoryTree::new(backing.id()),
            deleted: HashSet::new(),
            settings: ProxySettings::default(),
            trap: None,
        }
    }

    /// Create a buffer whose root is a lazy reference to the backing root.
    pub fn seeded(backing: &'b B) -> Result<Self, ReftreeError> {
        let mut buffer = Self::new(backing);
        buffer.seed()?;
        Ok(buffer)
    }

    /// Use the given settings for views of this buffer.
    pub fn with_settings(mut self, settings: ProxySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Route resolution failures in views of this buffer to `trap`.
    pub fn with_trap(mut self, trap: Option<Trap>) -> Self {
        self.trap = trap;
        self
    }

    /// The backing tree.
    pub fn backing(&self) -> &'b B {
        self.backing
    }

    /// The overlay, with lazy nodes and references left in place.
    pub fn overlay(&self) -> &MemoryTree<C> {
        &self.overlay
    }

    /// The backing keys that are hidden from the current state.
    pub fn deleted(&self) -> &HashSet<Key> {
        &self.deleted
    }

    /// A dereferencing view of the current state.
    pub fn view(&self) -> ProxyTree<'_, MemoryTree<C>, B, IdentityKeyMap> {
        ProxyTree::new(&self.overlay, self.backing, IdentityKeyMap)
            .with_settings(self.settings)
            .with_trap(self.trap.clone())
            .with_deleted(&self.deleted)
    }

    /// Drops all overlay state. The buffer reads like its backing tree
    /// again; the backing tree is not touched.
    pub fn reset(&mut self) {
        self.overlay.clear();
        self.deleted.clear();
    }

    /// Applies a delta whose base is this buffer's backing tree.
    pub fn apply_delta(&mut self, delta: &Delta<C>) -> Result<(), ReftreeError> {
        if delta.base() != self.backing.id() {
            return Err(ReftreeError::MalformedDelta(format!(
                "delta is based on {}, buffer is backed by {}",
                delta.base(),
                self.backing.id()
            )));
        }
        self.apply(delta.tree())
    }

    /// Replaces the buffer's state with `delta`, whose references point
    /// into the backing tree.
    ///
    /// Tree-references to the node's own key become lazy nodes and are not
    /// copied. A tree-reference to a different key copies only the target's
    /// content and leaves its children lazy. Node-references are kept as
    /// they are. Backing nodes that the delta does not cover are marked
    /// deleted.
    pub fn apply<T>(&mut self, delta: &T) -> Result<(), ReftreeError>
    where
        T: AddressableTree<Content = C> + ?Sized,
    {
        self.reset();
        let backing = self.backing;

        let Some(root) = delta.root_key()? else {
            if let Some(root) = backing.root_key()? {
                self.hide_backing_subtree(&root)?;
            }
            return Ok(());
        };

        let mut lazy = 0usize;
        let mut copied = 0usize;
        let mut stack = vec![(root, None::<Key>)];

        while let Some((key, parent)) = stack.pop() {
            let payload = delta
                .node(&key)?
                .ok_or_else(|| ReftreeError::NodeNotFound(key.clone()))?
                .into_parts()
                .1;
            if self.overlay.contains(&key)? {
                return Err(ReftreeError::MalformedDelta(format!(
                    "key {key} appears more than once"
                )));
            }
            self.check_payload(&payload)?;

            match payload {
                Payload::TreeRef(reference) => {
                    if delta.children(&key)?.next().is_some() {
                        return Err(ReftreeError::MalformedDelta(format!(
                            "tree-reference {key} has children of its own"
                        )));
                    }
                    if reference.key() == &key {
                        tracing::trace!(key = %key, "Lazy node");
                        self.overlay.insert(
                            parent.as_ref(),
                            Placement::Key(key),
                            Payload::TreeRef(reference),
                        )?;
                        lazy += 1;
                    } else {
                        tracing::trace!(key = %key, target = %reference, "Copied node");
                        let target = self.backing_payload(reference.key())?;
                        self.overlay
                            .insert(parent.as_ref(), Placement::Key(key.clone()), target)?;
                        copied += 1;
                        for child in backing.children(reference.key())? {
                            if self.overlay.contains(&child)? {
                                return Err(ReftreeError::MalformedDelta(format!(
                                    "key {child} appears more than once"
                                )));
                            }
                            let payload = self.lazy(&child);
                            self.overlay
                                .insert(Some(&key), Placement::Key(child), payload)?;
                            lazy += 1;
                        }
                    }
                }
                payload => {
                    if !payload.is_reference() {
                        copied += 1;
                    }
                    self.overlay
                        .insert(parent.as_ref(), Placement::Key(key.clone()), payload)?;
                    let children: Vec<Key> = delta.children(&key)?.collect();
                    stack.extend(
                        children
                            .into_iter()
                            .rev()
                            .map(|child| (child, Some(key.clone()))),
                    );
                }
            }
        }

        self.reject_keys_inside_lazy_subtrees()?;
        self.hide_uncovered()?;

        tracing::debug!(
            backing = %backing.id(),
            lazy,
            materialized = copied,
            deleted = self.deleted.len(),
            "Applied delta to change buffer"
        );
        Ok(())
    }

    /// Materializes the whole subtree rooted at `key`, including the
    /// content behind node-references.
    pub fn expand_all(&mut self, key: &Key) -> Result<(), ReftreeError> {
        self.reach(key)?;

        let mut stack = vec![key.clone()];
        while let Some(next) = stack.pop() {
            self.expand(&next)?;
            if let Some(Payload::NodeRef(reference)) = self.overlay.payload(&next) {
                let target = self.backing_payload(reference.key())?;
                self.overlay.update(&next, target)?;
            }
            let children: Vec<Key> = self.overlay.children(&next)?.collect();
            stack.extend(children);
        }
        Ok(())
    }

    /// Returns true if the overlay holds explicit content for `key`.
    pub fn is_materialized(&self, key: &Key) -> bool {
        matches!(self.overlay.payload(key), Some(Payload::Content(_)))
    }

    /// Returns true if `key` is a lazy node.
    pub fn is_lazy(&self, key: &Key) -> bool {
        self.overlay
            .payload(key)
            .is_some_and(|payload| self.is_lazy_payload(key, payload))
    }

    /// The number of overlay nodes holding explicit content.
    pub fn materialized_len(&self) -> usize {
        self.overlay
            .iter()
            .filter(|(_, payload)| matches!(payload, Payload::Content(_)))
            .count()
    }

    /// The number of lazy nodes.
    pub fn lazy_len(&self) -> usize {
        self.overlay
            .iter()
            .filter(|(key, payload)| self.is_lazy_payload(key, payload))
            .count()
    }

    fn lazy(&self, key: &Key) -> Payload<C> {
        Payload::tree_ref(self.backing.id(), key.clone())
    }

    fn is_lazy_payload(&self, key: &Key, payload: &Payload<C>) -> bool {
        matches!(
            payload,
            Payload::TreeRef(reference)
                if reference.tree() == self.backing.id() && reference.key() == key
        )
    }

    fn backing_payload(&self, key: &Key) -> Result<Payload<C>, ReftreeError> {
        Ok(self
            .backing
            .node(key)?
            .ok_or_else(|| ReftreeError::NodeNotFound(key.clone()))?
            .into_parts()
            .1)
    }

    fn check_payload(&self, payload: &Payload<C>) -> Result<(), ReftreeError> {
        let Some(reference) = payload.reference() else {
            return Ok(());
        };
        self.check_reference(reference)
    }

    fn check_reference(&self, reference: &Reference) -> Result<(), ReftreeError> {
        if reference.tree() != self.backing.id() {
            return Err(ReftreeError::MalformedDelta(format!(
                "reference {reference} does not point into {}",
                self.backing.id()
            )));
        }
        if !self.backing.contains(reference.key())? {
            return Err(ReftreeError::NodeNotFound(reference.key().clone()));
        }
        Ok(())
    }

    fn seed(&mut self) -> Result<(), ReftreeError> {
        if !self.overlay.is_empty() {
            return Ok(());
        }
        if let Some(root) = self.backing.root_key()? {
            if !self.deleted.contains(&root) {
                let payload = self.lazy(&root);
                self.overlay.insert(None, Placement::Key(root), payload)?;
            }
        }
        Ok(())
    }

    /// Makes a visible key present in the overlay, expanding the lazy nodes
    /// above it. The key itself may remain lazy.
    fn reach(&mut self, key: &Key) -> Result<(), ReftreeError> {
        if self.overlay.contains(key)? {
            return Ok(());
        }
        let not_found = || ReftreeError::NodeNotFound(key.clone());
        if self.deleted.contains(key) || !self.backing.contains(key)? {
            return Err(not_found());
        }

        let mut chain = vec![key.clone()];
        let mut cursor = self.backing.parent(key)?;
        let anchor = loop {
            match cursor {
                Some(parent) if self.overlay.contains(&parent)? => break Some(parent),
                Some(parent) => {
                    if self.deleted.contains(&parent) {
                        return Err(not_found());
                    }
                    cursor = self.backing.parent(&parent)?;
                    chain.push(parent);
                }
                None => break None,
            }
        };

        match anchor {
            Some(anchor) if self.is_lazy(&anchor) => self.expand(&anchor)?,
            Some(_) => return Err(not_found()),
            None if self.overlay.is_empty() => self.seed()?,
            None => return Err(not_found()),
        }

        while let Some(next) = chain.pop() {
            if &next == key {
                break;
            }
            self.expand(&next)?;
        }

        if self.overlay.contains(key)? {
            Ok(())
        } else {
            Err(not_found())
        }
    }

    /// Turns a lazy node into a materialized one whose backing children are
    /// lazy. Other nodes are left alone.
    fn expand(&mut self, key: &Key) -> Result<(), ReftreeError> {
        if !self.is_lazy(key) {
            return Ok(());
        }
        let backing = self.backing;

        let payload = self.backing_payload(key)?;
        self.overlay.update(key, payload)?;

        for child in backing.children(key)? {
            if self.deleted.contains(&child) || self.overlay.contains(&child)? {
                continue;
            }
            let payload = self.lazy(&child);
            self.overlay
                .insert(Some(key), Placement::Key(child), payload)?;
        }
        tracing::trace!(key = %key, "Expanded lazy node");
        Ok(())
    }

    fn hide_backing_subtree(&mut self, key: &Key) -> Result<(), ReftreeError> {
        for hidden in dfs_keys_from(self.backing, key.clone()) {
            self.deleted.insert(hidden?);
        }
        Ok(())
    }

    /// Removes an overlay subtree, hiding every backing node it stood for.
    fn remove_overlay_subtree(&mut self, key: &Key) -> Result<(), ReftreeError> {
        let keys = dfs_keys_from(&self.overlay, key.clone()).collect::<Result<Vec<_>, _>>()?;
        for removed in &keys {
            if self.is_lazy(removed) {
                self.hide_backing_subtree(removed)?;
            } else if self.backing.contains(removed)? {
                self.deleted.insert(removed.clone());
            }
        }
        self.overlay.delete(key)
    }

    /// Makes `key`, which already holds a lazy payload, stand for its whole
    /// backing subtree again.
    fn relazy(&mut self, key: &Key) -> Result<(), ReftreeError> {
        let children: Vec<Key> = self.overlay.children(key)?.collect();
        for child in children {
            self.remove_overlay_subtree(&child)?;
        }

        for covered in dfs_keys_from(self.backing, key.clone()) {
            let covered = covered?;
            if &covered == key {
                self.deleted.remove(&covered);
            } else if self.overlay.contains(&covered)? {
                self.deleted.insert(covered);
            } else {
                self.deleted.remove(&covered);
            }
        }
        Ok(())
    }

    fn reject_keys_inside_lazy_subtrees(&self) -> Result<(), ReftreeError> {
        for (key, _) in self.overlay.iter() {
            if !self.backing.contains(key)? {
                continue;
            }
            let mut cursor = self.backing.parent(key)?;
            while let Some(ancestor) = cursor {
                if self.is_lazy(&ancestor) {
                    return Err(ReftreeError::MalformedDelta(format!(
                        "{key} also lies inside the unchanged subtree at {ancestor}"
                    )));
                }
                cursor = self.backing.parent(&ancestor)?;
            }
        }
        Ok(())
    }

    fn hide_uncovered(&mut self) -> Result<(), ReftreeError> {
        let backing = self.backing;
        let Some(root) = backing.root_key()? else {
            return Ok(());
        };

        let mut stack = vec![root];
        while let Some(key) = stack.pop() {
            if self.is_lazy(&key) {
                continue;
            }
            if !self.overlay.contains(&key)? {
                self.deleted.insert(key.clone());
            }
            stack.extend(backing.children(&key)?);
        }
        Ok(())
    }

    fn prepare_tree_ref(&self, key: &Key, payload: &Payload<C>) -> Result<bool, ReftreeError> {
        match payload {
            Payload::TreeRef(reference) if reference.key() == key => Ok(true),
            Payload::TreeRef(reference) => Err(ReftreeError::Structure(format!(
                "{key} cannot hold a tree-reference to {reference}; a change buffer keeps \
                 tree-references at their target key"
            ))),
            Payload::Content(_) | Payload::NodeRef(_) => Ok(false),
        }
    }
}

impl<B, C> AddressableTree for ChangeBuffer<'_, B>
where
    B: AddressableTree<Content = C> + ?Sized,
    C: Content,
{
    type Content = C;

    fn id(&self) -> TreeId {
        self.overlay.id()
    }

    fn generation(&self) -> u64 {
        self.view().current_generation()
    }

    fn root(&self) -> Result<Option<Node<C>>, ReftreeError> {
        AddressableTree::root(&self.view())
    }

    fn node(&self, key: &Key) -> Result<Option<Node<C>>, ReftreeError> {
        AddressableTree::node(&self.view(), key)
    }

    fn contains(&self, key: &Key) -> Result<bool, ReftreeError> {
        AddressableTree::contains(&self.view(), key)
    }

    fn parent(&self, key: &Key) -> Result<Option<Key>, ReftreeError> {
        AddressableTree::parent(&self.view(), key)
    }

    fn children(&self, key: &Key) -> Result<Children<'_>, ReftreeError> {
        Ok(Box::new(self.view().child_keys(key)?.into_iter()))
    }
}

impl<B, C> MutableTree for ChangeBuffer<'_, B>
where
    B: AddressableTree<Content = C> + ?Sized,
    C: Content,
{
    fn insert(
        &mut self,
        parent: Option<&Key>,
        placement: Placement,
        payload: Payload<C>,
    ) -> Result<Key, ReftreeError> {
        self.check_payload(&payload)?;

        let explicit = match (&placement, parent) {
            (Placement::Key(key), _) => Some(key.clone()),
            (_, None) => Some(Key::root()),
            _ => None,
        };
        if let Payload::TreeRef(reference) = &payload {
            if explicit.as_ref() != Some(reference.key()) {
                return Err(ReftreeError::Structure(format!(
                    "a tree-reference to {reference} must be stored under its target key"
                )));
            }
        }

        match parent {
            Some(parent) => {
                self.reach(parent)?;
                self.expand(parent)?;
            }
            None => self.seed()?,
        }

        let mut existed = false;
        if let Some(key) = &explicit {
            if !self.overlay.contains(key)?
                && !self.deleted.contains(key)
                && self.backing.contains(key)?
            {
                self.reach(key)?;
            }
            existed = self.overlay.contains(key)?;
        }

        let lazy = payload.is_tree_ref();
        if let Some(key) = explicit.as_ref().filter(|_| existed && !lazy) {
            self.expand(key)?;
        }
        let key = self.overlay.insert(parent, placement, payload)?;

        if !existed && self.backing.contains(&key)? && !self.deleted.contains(&key) && !lazy {
            self.overlay.delete(&key)?;
            return Err(ReftreeError::Structure(format!(
                "generated key {key} is already in use"
            )));
        }
        if lazy {
            self.relazy(&key)?;
        }
        Ok(key)
    }

    fn delete(&mut self, key: &Key) -> Result<(), ReftreeError> {
        self.reach(key)?;
        self.remove_overlay_subtree(key)
    }

    fn update(&mut self, key: &Key, payload: Payload<C>) -> Result<(), ReftreeError> {
        self.check_payload(&payload)?;
        let lazy = self.prepare_tree_ref(key, &payload)?;

        self.reach(key)?;
        if lazy {
            self.overlay.update(key, payload)?;
            self.relazy(key)
        } else {
            self.expand(key)?;
            self.overlay.update(key, payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{Resolver, content_equal, dfs_keys};

    /// `R(A("x"), B("y"))`, with `A` holding two leaves.
    fn backing() -> Result<MemoryTree<String>> {
        let mut tree = MemoryTree::new(TreeId(1));
        let root = tree.set_root("R".into())?;
        let a = tree.append(&root, "x".into())?;
        tree.append(&a, "x.1".into())?;
        tree.append(&a, "x.2".into())?;
        tree.append(&root, "y".into())?;
        Ok(tree)
    }

    fn keys<T: AddressableTree + ?Sized>(tree: &T) -> Result<Vec<Key>> {
        Ok(dfs_keys(tree).collect::<Result<Vec<_>, _>>()?)
    }

    fn contents<T: AddressableTree<Content = String> + ?Sized>(
        tree: &T,
    ) -> Result<Vec<Option<String>>> {
        let mut contents = Vec::new();
        for key in dfs_keys(tree) {
            let node = tree.node(&key?)?;
            contents.push(node.and_then(|node| node.payload().content().cloned()));
        }
        Ok(contents)
    }

    #[test]
    fn it_reads_like_the_backing_tree_when_empty() -> Result<()> {
        let backing = backing()?;
        let empty = ChangeBuffer::new(&backing);
        let seeded = ChangeBuffer::seeded(&backing)?;

        assert_eq!(keys(&empty)?, keys(&backing)?);
        assert_eq!(contents(&seeded)?, contents(&backing)?);
        assert_eq!(seeded.lazy_len(), 1);
        assert_eq!(seeded.materialized_len(), 0);
        Ok(())
    }

    #[test]
    fn it_materializes_only_what_changed() -> Result<()> {
        let backing = backing()?;
        let a = Key::path(&[1])?;
        let b = Key::path(&[3])?;

        let mut delta = MemoryTree::<String>::new(TreeId(1));
        let root = delta.insert(
            None,
            Placement::Key(Key::root()),
            Payload::node_ref(TreeId(1), Key::root()),
        )?;
        delta.insert(
            Some(&root),
            Placement::Key(a.clone()),
            Payload::tree_ref(TreeId(1), a.clone()),
        )?;
        delta.insert(
            Some(&root),
            Placement::Key(b.clone()),
            Payload::Content("z".into()),
        )?;

        let mut buffer = ChangeBuffer::new(&backing);
        buffer.apply(&delta)?;

        assert!(buffer.is_lazy(&a));
        assert!(buffer.is_materialized(&b));
        assert!(!buffer.is_materialized(&Key::root()));
        assert_eq!(buffer.lazy_len(), 1);
        assert_eq!(buffer.materialized_len(), 1);
        assert_eq!(
            contents(&buffer)?,
            ["R", "x", "x.1", "x.2", "z"]
                .into_iter()
                .map(|content| Some(content.to_string()))
                .collect::<Vec<_>>()
        );
        Ok(())
    }

    #[test]
    fn it_hides_backing_nodes_the_delta_leaves_out() -> Result<()> {
        let backing = backing()?;
        let a = Key::path(&[1])?;
        let b = Key::path(&[3])?;

        let mut delta = MemoryTree::<String>::new(TreeId(1));
        let root = delta.insert(
            None,
            Placement::Key(Key::root()),
            Payload::node_ref(TreeId(1), Key::root()),
        )?;
        delta.insert(
            Some(&root),
            Placement::Key(b.clone()),
            Payload::tree_ref(TreeId(1), b.clone()),
        )?;

        let mut buffer = ChangeBuffer::new(&backing);
        buffer.apply(&delta)?;

        assert!(!buffer.contains(&a)?);
        assert!(!buffer.contains(&Key::path(&[1, 1])?)?);
        assert_eq!(keys(&buffer)?, vec![Key::root(), b]);
        assert!(buffer.deleted().contains(&a));
        Ok(())
    }

    #[test]
    fn it_copies_renamed_tree_references_shallowly() -> Result<()> {
        let backing = backing()?;
        let a = Key::path(&[1])?;

        let mut delta = MemoryTree::<String>::new(TreeId(1));
        let root = delta.insert(
            None,
            Placement::Key(Key::root()),
            Payload::node_ref(TreeId(1), Key::root()),
        )?;
        delta.insert(
            Some(&root),
            Placement::Key(Key::text("copy")),
            Payload::tree_ref(TreeId(1), a.clone()),
        )?;

        let mut buffer = ChangeBuffer::new(&backing);
        buffer.apply(&delta)?;

        assert!(buffer.is_materialized(&Key::text("copy")));
        assert_eq!(buffer.lazy_len(), 2);
        assert_eq!(
            buffer.children(&Key::text("copy"))?.collect::<Vec<_>>(),
            vec![Key::path(&[1, 1])?, Key::path(&[1, 3])?]
        );
        assert_eq!(
            buffer.parent(&Key::path(&[1, 1])?)?,
            Some(Key::text("copy"))
        );
        assert!(!buffer.contains(&a)?);
        Ok(())
    }

    #[test]
    fn it_rejects_malformed_deltas() -> Result<()> {
        let backing = backing()?;
        let a = Key::path(&[1])?;

        let mut foreign = MemoryTree::<String>::new(TreeId(1));
        foreign.insert(
            None,
            Placement::Key(Key::root()),
            Payload::node_ref(TreeId(9), Key::root()),
        )?;
        let mut buffer = ChangeBuffer::new(&backing);
        assert!(matches!(
            buffer.apply(&foreign),
            Err(ReftreeError::MalformedDelta(_))
        ));

        let mut dangling = MemoryTree::<String>::new(TreeId(1));
        dangling.insert(
            None,
            Placement::Key(Key::root()),
            Payload::node_ref(TreeId(1), Key::number(404)),
        )?;
        assert_eq!(
            buffer.apply(&dangling),
            Err(ReftreeError::NodeNotFound(Key::number(404)))
        );

        let mut overlapping = MemoryTree::<String>::new(TreeId(1));
        let root = overlapping.insert(
            None,
            Placement::Key(Key::root()),
            Payload::node_ref(TreeId(1), Key::root()),
        )?;
        overlapping.insert(
            Some(&root),
            Placement::Key(a.clone()),
            Payload::tree_ref(TreeId(1), a),
        )?;
        overlapping.insert(
            Some(&root),
            Placement::Key(Key::path(&[1, 1])?),
            Payload::Content("again".into()),
        )?;
        assert!(matches!(
            buffer.apply(&overlapping),
            Err(ReftreeError::MalformedDelta(_))
        ));
        Ok(())
    }

    #[test]
    fn it_expands_lazy_ancestors_on_edit() -> Result<()> {
        let backing = backing()?;
        let leaf = Key::path(&[1, 3])?;

        let mut buffer = ChangeBuffer::new(&backing);
        buffer.update(&leaf, Payload::Content("edited".into()))?;

        assert!(buffer.is_materialized(&Key::root()));
        assert!(buffer.is_materialized(&Key::path(&[1])?));
        assert!(buffer.is_materialized(&leaf));
        assert!(buffer.is_lazy(&Key::path(&[1, 1])?));
        assert!(buffer.is_lazy(&Key::path(&[3])?));
        assert_eq!(keys(&buffer)?, keys(&backing)?);
        assert_eq!(
            buffer.node(&leaf)?.map(|node| node.into_parts().1),
            Some(Payload::Content("edited".to_string()))
        );
        Ok(())
    }

    #[test]
    fn it_inserts_and_deletes_through_lazy_nodes() -> Result<()> {
        let backing = backing()?;
        let a = Key::path(&[1])?;
        let b = Key::path(&[3])?;

        let mut buffer = ChangeBuffer::seeded(&backing)?;
        let added = buffer.insert(Some(&a), Placement::Last, Payload::Content("x.3".into()))?;
        assert_eq!(added, Key::path(&[1, 5])?);

        buffer.delete(&b)?;
        assert!(!buffer.contains(&b)?);
        assert!(buffer.deleted().contains(&b));

        let inserted_again = buffer.insert(
            Some(&Key::root()),
            Placement::Key(b.clone()),
            Payload::Content("fresh".into()),
        )?;
        assert_eq!(inserted_again, b);
        assert_eq!(buffer.children(&b)?.count(), 0);
        assert_eq!(
            keys(&buffer)?,
            vec![
                Key::root(),
                a,
                Key::path(&[1, 1])?,
                Key::path(&[1, 3])?,
                Key::path(&[1, 5])?,
                b,
            ]
        );
        Ok(())
    }

    #[test]
    fn it_restores_a_subtree_with_a_tree_reference() -> Result<()> {
        let backing = backing()?;
        let a = Key::path(&[1])?;

        let mut buffer = ChangeBuffer::new(&backing);
        buffer.delete(&Key::path(&[1, 1])?)?;
        buffer.update(&a, Payload::Content("changed".into()))?;
        assert!(!buffer.contains(&Key::path(&[1, 1])?)?);

        buffer.update(&a, Payload::tree_ref(TreeId(1), a.clone()))?;
        assert!(buffer.is_lazy(&a));
        assert_eq!(keys(&buffer)?, keys(&backing)?);
        assert_eq!(contents(&buffer)?, contents(&backing)?);
        Ok(())
    }

    #[test]
    fn it_expands_whole_subtrees_and_resets() -> Result<()> {
        let backing = backing()?;
        let mut buffer = ChangeBuffer::seeded(&backing)?;

        buffer.expand_all(&Key::root())?;
        assert_eq!(buffer.lazy_len(), 0);
        assert_eq!(buffer.materialized_len(), backing.len());

        let resolver = Resolver::<String>::new().with(&backing);
        assert!(content_equal(buffer.overlay(), &backing, &resolver)?);

        buffer.reset();
        assert!(buffer.overlay().is_empty());
        assert_eq!(keys(&buffer)?, keys(&backing)?);
        Ok(())
    }

    #[test]
    fn it_detects_stale_views_after_edits() -> Result<()> {
        let backing = backing()?;
        let b = Key::path(&[3])?;
        let mut buffer = ChangeBuffer::seeded(&backing)?;

        let node = buffer
            .view()
            .get(&b)?
            .ok_or(ReftreeError::NodeNotFound(b.clone()))?;
        buffer.update(&b, Payload::Content("z".into()))?;

        assert!(matches!(
            buffer.view().content(&node),
            Err(ReftreeError::StaleProxy { .. })
        ));
        Ok(())
    }
}
