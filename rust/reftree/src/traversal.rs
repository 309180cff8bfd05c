use crate::{AddressableTree, Children, Key, Node, ReftreeError};

/// A lazy pre-order walk over the keys of an [`AddressableTree`].
///
/// The walk stops after the first error.
pub struct DfsKeys<'a, T>
where
    T: AddressableTree + ?Sized,
{
    tree: &'a T,
    pending: Option<Key>,
    started: bool,
    stack: Vec<Children<'a>>,
    done: bool,
}

impl<'a, T> DfsKeys<'a, T>
where
    T: AddressableTree + ?Sized,
{
    fn new(tree: &'a T, from: Option<Key>) -> Self {
        Self {
            tree,
            started: from.is_some(),
            pending: from,
            stack: Vec::new(),
            done: false,
        }
    }

    fn fail(&mut self, error: ReftreeError) -> Option<Result<Key, ReftreeError>> {
        self.done = true;
        self.stack.clear();
        Some(Err(error))
    }
}

impl<'a, T> Iterator for DfsKeys<'a, T>
where
    T: AddressableTree + ?Sized,
{
    type Item = Result<Key, ReftreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let key = if let Some(key) = self.pending.take() {
            key
        } else if !self.started {
            self.started = true;
            match self.tree.root_key() {
                Ok(Some(key)) => key,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(error) => return self.fail(error),
            }
        } else {
            loop {
                let Some(top) = self.stack.last_mut() else {
                    self.done = true;
                    return None;
                };
                match top.next() {
                    Some(key) => break key,
                    None => {
                        self.stack.pop();
                    }
                }
            }
        };

        let tree: &'a T = self.tree;
        match tree.children(&key) {
            Ok(children) => {
                self.stack.push(children);
                Some(Ok(key))
            }
            Err(error) => self.fail(error),
        }
    }
}

/// Walks all keys of `tree` in pre-order, starting at the root.
pub fn dfs_keys<T>(tree: &T) -> DfsKeys<'_, T>
where
    T: AddressableTree + ?Sized,
{
    DfsKeys::new(tree, None)
}

/// Walks the keys of the subtree rooted at `from` in pre-order.
pub fn dfs_keys_from<T>(tree: &T, from: Key) -> DfsKeys<'_, T>
where
    T: AddressableTree + ?Sized,
{
    DfsKeys::new(tree, Some(from))
}

/// Walks the nodes of the subtree rooted at `from` in pre-order.
pub fn dfs_nodes<T>(
    tree: &T,
    from: Key,
) -> impl Iterator<Item = Result<Node<T::Content>, ReftreeError>> + '_
where
    T: AddressableTree + ?Sized,
{
    dfs_keys_from(tree, from).map(move |key| {
        let key = key?;
        tree.node(&key)?.ok_or(ReftreeError::NodeNotFound(key))
    })
}
