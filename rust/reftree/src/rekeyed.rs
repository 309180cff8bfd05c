use crate::{AddressableTree, Children, Key, KeyMap, Node, ReftreeError, TreeId};

/// A read-only view of a tree whose keys are rewritten through a [`KeyMap`].
///
/// The wrapped tree lives in the map's back key space and the view exposes
/// front keys. Nodes whose back key has no front counterpart are invisible.
/// Payloads are passed through untouched; references keep addressing their
/// own target trees.
#[derive(Clone, Debug)]
pub struct RekeyedTree<T, M> {
    inner: T,
    keys: M,
}

impl<T, M> RekeyedTree<T, M>
where
    T: AddressableTree,
    M: KeyMap,
{
    /// Create a new view of `inner` through `keys`.
    pub fn new(inner: T, keys: M) -> Self {
        Self { inner, keys }
    }

    /// The wrapped tree.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn back_key(&self, front: &Key) -> Result<Key, ReftreeError> {
        self.keys
            .back_key(front)
            .ok_or_else(|| ReftreeError::NodeNotFound(front.clone()))
    }

    fn translate(&self, node: Node<T::Content>) -> Option<Node<T::Content>> {
        let (back, payload) = node.into_parts();
        self.keys
            .front_key(&back)
            .map(|front| Node::new(front, payload))
    }
}

impl<T, M> AddressableTree for RekeyedTree<T, M>
where
    T: AddressableTree,
    M: KeyMap,
{
    type Content = T::Content;

    fn id(&self) -> TreeId {
        self.inner.id()
    }

    fn generation(&self) -> u64 {
        self.inner.generation()
    }

    fn root(&self) -> Result<Option<Node<Self::Content>>, ReftreeError> {
        Ok(self.inner.root()?.and_then(|node| self.translate(node)))
    }

    fn node(&self, key: &Key) -> Result<Option<Node<Self::Content>>, ReftreeError> {
        let Some(back) = self.keys.back_key(key) else {
            return Ok(None);
        };
        Ok(self
            .inner
            .node(&back)?
            .map(|node| Node::new(key.clone(), node.into_parts().1)))
    }

    fn parent(&self, key: &Key) -> Result<Option<Key>, ReftreeError> {
        let back = self.back_key(key)?;
        Ok(self
            .inner
            .parent(&back)?
            .and_then(|parent| self.keys.front_key(&parent)))
    }

    fn children(&self, key: &Key) -> Result<Children<'_>, ReftreeError> {
        let back = self.back_key(key)?;
        let children = self.inner.children(&back)?;
        Ok(Box::new(
            children.filter_map(move |child| self.keys.front_key(&child)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{BiKeyMap, MemoryTree, Payload};

    #[test]
    fn it_translates_keys_in_both_directions() -> Result<()> {
        let mut tree = MemoryTree::<String>::new(TreeId(1));
        let root = tree.set_root("root".into())?;
        let mapped = tree.append(&root, "mapped".into())?;
        let hidden = tree.append(&root, "hidden".into())?;

        let keys: BiKeyMap = [
            (Key::text("root"), root.clone()),
            (Key::text("mapped"), mapped.clone()),
        ]
        .into_iter()
        .collect();
        let view = RekeyedTree::new(&tree, keys);

        assert_eq!(view.root_key()?, Some(Key::text("root")));
        assert_eq!(
            view.node(&Key::text("mapped"))?,
            Some(Node::new(
                Key::text("mapped"),
                Payload::Content("mapped".to_string())
            ))
        );
        assert_eq!(view.parent(&Key::text("mapped"))?, Some(Key::text("root")));
        assert_eq!(
            view.children(&Key::text("root"))?.collect::<Vec<_>>(),
            vec![Key::text("mapped")]
        );
        assert!(!view.contains(&hidden)?);
        assert!(view.parent(&Key::text("hidden")).is_err());
        Ok(())
    }
}
