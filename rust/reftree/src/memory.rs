use std::{collections::BTreeSet, marker::PhantomData};

use hashbrown::HashMap;

use crate::{
    AddressableTree, Children, Content, Key, KeyGenerator, MutableTree, Node, PathKey, Payload,
    Placement, ReftreeError, TreeId,
};

/// Builder for [`MemoryTree`]; see [`MemoryTree::builder`].
#[derive(Clone, Debug)]
pub struct MemoryTreeBuilder<C> {
    id: TreeId,
    keys: KeyGenerator,
    content: PhantomData<C>,
}

impl<C> MemoryTreeBuilder<C>
where
    C: Content,
{
    /// The generator used for automatically keyed children of opaque
    /// parents.
    pub fn keys(mut self, keys: KeyGenerator) -> Self {
        self.keys = keys;
        self
    }

    /// Builds the empty tree.
    pub fn build(self) -> MemoryTree<C> {
        MemoryTree::with_key_generator(self.id, self.keys)
    }
}

#[derive(Clone, Debug)]
struct Slot<C> {
    payload: Payload<C>,
    parent: Option<Key>,
    children: BTreeSet<Key>,
}

/// An in-memory [`MutableTree`].
///
/// Nodes are stored in a flat map keyed by [`Key`], so lookups, parent and
/// child navigation are all direct. Siblings are kept in key order, which for
/// [`PathKey`] children is their position.
#[derive(Clone, Debug)]
pub struct MemoryTree<C> {
    id: TreeId,
    root: Option<Key>,
    slots: HashMap<Key, Slot<C>>,
    keys: KeyGenerator,
    generation: u64,
}

impl<C> MemoryTree<C>
where
    C: Content,
{
    /// Create an empty tree.
    pub fn new(id: TreeId) -> Self {
        Self::with_key_generator(id, KeyGenerator::default())
    }

    /// Create an empty tree that draws keys for children of opaque parents
    /// from `keys`.
    pub fn with_key_generator(id: TreeId, keys: KeyGenerator) -> Self {
        Self {
            id,
            root: None,
            slots: HashMap::new(),
            keys,
            generation: 0,
        }
    }

    /// Start building a tree with non-default settings.
    pub fn builder(id: TreeId) -> MemoryTreeBuilder<C> {
        MemoryTreeBuilder {
            id,
            keys: KeyGenerator::default(),
            content: PhantomData,
        }
    }

    /// The number of nodes in this tree.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if this tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates over all keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.slots.keys()
    }

    /// Iterates over all keys and their payloads, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Payload<C>)> {
        self.slots.iter().map(|(key, slot)| (key, &slot.payload))
    }

    /// The payload stored under `key`, without cloning it.
    pub fn payload(&self, key: &Key) -> Option<&Payload<C>> {
        self.slots.get(key).map(|slot| &slot.payload)
    }

    /// Removes all nodes. The generation still advances.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.root = None;
        self.generation += 1;
    }

    /// Appends a content node as the last child of `parent`.
    pub fn append(&mut self, parent: &Key, content: C) -> Result<Key, ReftreeError> {
        self.insert(Some(parent), Placement::Last, Payload::Content(content))
    }

    /// Stores `content` as the root of an empty tree, under the root path key.
    pub fn set_root(&mut self, content: C) -> Result<Key, ReftreeError> {
        self.insert(None, Placement::First, Payload::Content(content))
    }

    fn slot(&self, key: &Key) -> Result<&Slot<C>, ReftreeError> {
        self.slots
            .get(key)
            .ok_or_else(|| ReftreeError::NodeNotFound(key.clone()))
    }

    fn is_ancestor_or_self(&self, ancestor: &Key, key: &Key) -> bool {
        let mut cursor = Some(key.clone());
        while let Some(current) = cursor {
            if &current == ancestor {
                return true;
            }
            cursor = self.slots.get(&current).and_then(|slot| slot.parent.clone());
        }
        false
    }

    fn allocate(&mut self, parent: &Key, placement: Placement) -> Result<Key, ReftreeError> {
        let Some(parent_path) = parent.as_path() else {
            return Ok(match placement {
                Placement::Key(key) => key,
                _ => self.keys.next_key(),
            });
        };

        let siblings: Vec<&PathKey> = self
            .slot(parent)?
            .children
            .iter()
            .filter_map(Key::as_path)
            .filter(|child| parent_path.is_parent_of(child))
            .collect();

        let sibling_of = |anchor: &Key| -> Result<usize, ReftreeError> {
            let anchor_path = anchor.as_path().ok_or_else(|| {
                ReftreeError::InvalidKey(format!("{anchor} has no position below {parent}"))
            })?;
            siblings
                .iter()
                .position(|sibling| *sibling == anchor_path)
                .ok_or_else(|| {
                    ReftreeError::Structure(format!("{anchor} is not a child of {parent}"))
                })
        };

        let key = match placement {
            Placement::Key(key) => return Ok(key),
            Placement::First => match siblings.first() {
                Some(first) => first.before()?,
                None => parent_path.first_child(),
            },
            Placement::Last => match siblings.last() {
                Some(last) => last.after()?,
                None => parent_path.first_child(),
            },
            Placement::Before(anchor) => {
                let index = sibling_of(&anchor)?;
                match index.checked_sub(1).map(|index| siblings[index]) {
                    Some(previous) => PathKey::between(previous, siblings[index])?,
                    None => siblings[index].before()?,
                }
            }
            Placement::After(anchor) => {
                let index = sibling_of(&anchor)?;
                match siblings.get(index + 1) {
                    Some(next) => PathKey::between(siblings[index], next)?,
                    None => siblings[index].after()?,
                }
            }
        };

        let key = Key::Path(key);
        if self.slots.contains_key(&key) {
            return Err(ReftreeError::Structure(format!(
                "allocated key {key} is already in use"
            )));
        }
        Ok(key)
    }

    fn insert_root(&mut self, placement: Placement, payload: Payload<C>) -> Result<Key, ReftreeError> {
        let key = match placement {
            Placement::Key(key) => key,
            _ => Key::root(),
        };

        match &self.root {
            Some(root) if root == &key => {
                if let Some(slot) = self.slots.get_mut(&key) {
                    slot.payload = payload;
                }
            }
            Some(root) => {
                return Err(ReftreeError::Structure(format!(
                    "cannot add root {key}: tree already has root {root}"
                )));
            }
            None if self.slots.contains_key(&key) => {
                return Err(ReftreeError::Structure(format!(
                    "{key} is already in the tree"
                )));
            }
            None => {
                self.slots.insert(
                    key.clone(),
                    Slot {
                        payload,
                        parent: None,
                        children: BTreeSet::new(),
                    },
                );
                self.root = Some(key.clone());
            }
        }

        self.generation += 1;
        Ok(key)
    }
}

impl<C> AddressableTree for MemoryTree<C>
where
    C: Content,
{
    type Content = C;

    fn id(&self) -> TreeId {
        self.id
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn root(&self) -> Result<Option<Node<C>>, ReftreeError> {
        match &self.root {
            Some(root) => self.node(root),
            None => Ok(None),
        }
    }

    fn node(&self, key: &Key) -> Result<Option<Node<C>>, ReftreeError> {
        Ok(self
            .slots
            .get(key)
            .map(|slot| Node::new(key.clone(), slot.payload.clone())))
    }

    fn root_key(&self) -> Result<Option<Key>, ReftreeError> {
        Ok(self.root.clone())
    }

    fn contains(&self, key: &Key) -> Result<bool, ReftreeError> {
        Ok(self.slots.contains_key(key))
    }

    fn parent(&self, key: &Key) -> Result<Option<Key>, ReftreeError> {
        Ok(self.slot(key)?.parent.clone())
    }

    fn children(&self, key: &Key) -> Result<Children<'_>, ReftreeError> {
        Ok(Box::new(self.slot(key)?.children.iter().cloned()))
    }
}

impl<C> MutableTree for MemoryTree<C>
where
    C: Content,
{
    fn insert(
        &mut self,
        parent: Option<&Key>,
        placement: Placement,
        payload: Payload<C>,
    ) -> Result<Key, ReftreeError> {
        let Some(parent) = parent else {
            return self.insert_root(placement, payload);
        };

        if !self.slots.contains_key(parent) {
            return Err(ReftreeError::NodeNotFound(parent.clone()));
        }

        let key = self.allocate(parent, placement)?;

        match self.slots.get(&key).map(|slot| slot.parent.clone()) {
            Some(None) => {
                return Err(ReftreeError::Structure(format!(
                    "cannot move root {key} below {parent}"
                )));
            }
            Some(Some(previous)) => {
                if self.is_ancestor_or_self(&key, parent) {
                    return Err(ReftreeError::Structure(format!(
                        "cannot move {key} below its own descendant {parent}"
                    )));
                }
                if let Some(slot) = self.slots.get_mut(&previous) {
                    slot.children.remove(&key);
                }
                if let Some(slot) = self.slots.get_mut(&key) {
                    slot.payload = payload;
                    slot.parent = Some(parent.clone());
                }
            }
            None => {
                self.slots.insert(
                    key.clone(),
                    Slot {
                        payload,
                        parent: Some(parent.clone()),
                        children: BTreeSet::new(),
                    },
                );
            }
        }

        if let Some(slot) = self.slots.get_mut(parent) {
            slot.children.insert(key.clone());
        }

        self.generation += 1;
        Ok(key)
    }

    fn delete(&mut self, key: &Key) -> Result<(), ReftreeError> {
        let parent = self.slot(key)?.parent.clone();

        match parent {
            Some(parent) => {
                if let Some(slot) = self.slots.get_mut(&parent) {
                    slot.children.remove(key);
                }
            }
            None => self.root = None,
        }

        let mut pending = vec![key.clone()];
        while let Some(next) = pending.pop() {
            if let Some(slot) = self.slots.remove(&next) {
                pending.extend(slot.children);
            }
        }

        self.generation += 1;
        Ok(())
    }

    fn update(&mut self, key: &Key, payload: Payload<C>) -> Result<(), ReftreeError> {
        let slot = self
            .slots
            .get_mut(key)
            .ok_or_else(|| ReftreeError::NodeNotFound(key.clone()))?;
        slot.payload = payload;
        self.generation += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    use super::*;

    fn child_keys(tree: &MemoryTree<String>, key: &Key) -> Result<Vec<Key>> {
        Ok(tree.children(key)?.collect())
    }

    #[test]
    fn it_allocates_positional_keys_for_each_placement() -> Result<()> {
        let mut tree = MemoryTree::<String>::new(TreeId(1));
        let root = tree.set_root("root".into())?;
        assert_eq!(root, Key::root());

        let b = tree.append(&root, "b".into())?;
        let d = tree.append(&root, "d".into())?;
        let a = tree.insert(Some(&root), Placement::First, Payload::Content("a".into()))?;
        let c = tree.insert(
            Some(&root),
            Placement::After(b.clone()),
            Payload::Content("c".into()),
        )?;
        let e = tree.insert(
            Some(&root),
            Placement::After(d.clone()),
            Payload::Content("e".into()),
        )?;
        let bb = tree.insert(
            Some(&root),
            Placement::Before(c.clone()),
            Payload::Content("bb".into()),
        )?;

        assert_eq!(child_keys(&tree, &root)?, vec![a, b, bb, c, d, e]);
        Ok(())
    }

    #[test]
    fn it_draws_opaque_child_keys_from_the_generator() -> Result<()> {
        let mut tree: MemoryTree<String> = MemoryTree::builder(TreeId(1))
            .keys(KeyGenerator::starting_at(100))
            .build();
        let root = tree.insert(
            None,
            Placement::Key(Key::text("root")),
            Payload::Content("root".into()),
        )?;
        let first = tree.append(&root, "first".into())?;
        let second = tree.append(&root, "second".into())?;

        assert_eq!(first, Key::number(100));
        assert_eq!(second, Key::number(101));
        assert_eq!(tree.parent(&second)?, Some(root));
        Ok(())
    }

    #[test]
    fn it_moves_an_existing_key_on_insert() -> Result<()> {
        let mut tree = MemoryTree::<String>::new(TreeId(1));
        let root = tree.set_root("root".into())?;
        let left = tree.append(&root, "left".into())?;
        let right = tree.append(&root, "right".into())?;
        let leaf = tree.append(&left, "leaf".into())?;

        tree.insert(
            Some(&right),
            Placement::Key(leaf.clone()),
            Payload::Content("moved".into()),
        )?;

        assert_eq!(tree.parent(&leaf)?, Some(right.clone()));
        assert_eq!(child_keys(&tree, &left)?, Vec::<Key>::new());
        assert_eq!(child_keys(&tree, &right)?, vec![leaf.clone()]);
        assert_eq!(
            tree.node(&leaf)?.map(|node| node.into_parts().1),
            Some(Payload::Content("moved".into()))
        );
        Ok(())
    }

    #[test]
    fn it_refuses_cycles_and_second_roots() -> Result<()> {
        let mut tree = MemoryTree::<String>::new(TreeId(1));
        let root = tree.set_root("root".into())?;
        let child = tree.append(&root, "child".into())?;
        let grandchild = tree.append(&child, "grandchild".into())?;

        let cycle = tree.insert(
            Some(&grandchild),
            Placement::Key(child.clone()),
            Payload::Content("child".into()),
        );
        assert!(matches!(cycle, Err(ReftreeError::Structure(_))));

        let second_root = tree.insert(
            None,
            Placement::Key(Key::number(9)),
            Payload::Content("other".into()),
        );
        assert!(matches!(second_root, Err(ReftreeError::Structure(_))));
        Ok(())
    }

    #[test]
    fn it_deletes_whole_subtrees() -> Result<()> {
        let mut tree = MemoryTree::<String>::new(TreeId(1));
        let root = tree.set_root("root".into())?;
        let child = tree.append(&root, "child".into())?;
        let grandchild = tree.append(&child, "grandchild".into())?;
        let sibling = tree.append(&root, "sibling".into())?;

        tree.delete(&child)?;

        assert!(!tree.contains(&child)?);
        assert!(!tree.contains(&grandchild)?);
        assert_eq!(child_keys(&tree, &root)?, vec![sibling]);
        assert_eq!(tree.len(), 2);

        tree.delete(&root)?;
        assert!(tree.is_empty());
        assert_eq!(tree.root()?, None);
        Ok(())
    }

    #[test]
    fn it_reports_missing_nodes() -> Result<()> {
        let mut tree = MemoryTree::<String>::new(TreeId(1));
        let missing = Key::number(1);

        assert_eq!(
            tree.parent(&missing),
            Err(ReftreeError::NodeNotFound(missing.clone()))
        );
        assert!(tree.children(&missing).is_err());
        assert!(tree.delete(&missing).is_err());
        assert!(tree.update(&missing, Payload::Content("x".into())).is_err());
        assert!(tree.append(&missing, "x".into()).is_err());
        Ok(())
    }

    #[test]
    fn it_advances_the_generation_on_every_edit() -> Result<()> {
        let mut tree = MemoryTree::<String>::new(TreeId(1));
        let start = tree.generation();
        let root = tree.set_root("root".into())?;
        tree.update(&root, Payload::Content("renamed".into()))?;
        tree.clear();

        assert_eq!(tree.generation(), start + 3);
        Ok(())
    }
}
