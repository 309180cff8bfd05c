use hashbrown::HashSet;

use crate::{
    AddressableTree, Content, Key, MutableTree, Payload, Placement, ReftreeError, dfs_keys,
};

/// Replaces the contents of `destination` with those of `source`, editing
/// only what differs.
///
/// Nodes are written in pre-order so every parent exists before its
/// children. A node whose payload and parent already match is left alone.
/// Payloads are compared as stored, without resolving references, so a
/// node-reference in `source` is written over equal content in
/// `destination`. Keys that `source` does not have are deleted afterwards,
/// and a differing root clears `destination` first.
///
/// A destination may dereference a tree-reference it is given, the way a
/// [`ChangeBuffer`](crate::ChangeBuffer) reads the referenced backing
/// subtree through. Everything such a destination then shows below that
/// key belongs to the reference and is kept. Otherwise both trees hold
/// exactly the same keys when this returns.
pub fn apply<D, S, C>(destination: &mut D, source: &S) -> Result<(), ReftreeError>
where
    D: MutableTree<Content = C> + ?Sized,
    S: AddressableTree<Content = C> + ?Sized,
    C: Content,
{
    let source_root = source.root_key()?;
    if let Some(root) = destination.root_key()? {
        if Some(&root) != source_root.as_ref() {
            destination.delete(&root)?;
        }
    }

    let mut seen = HashSet::new();
    let mut covered = HashSet::new();
    let mut written = 0usize;

    for key in dfs_keys(source) {
        let key = key?;
        let node = source
            .node(&key)?
            .ok_or_else(|| ReftreeError::NodeNotFound(key.clone()))?;
        let parent = source.parent(&key)?;

        let unchanged = match destination.node(&key)? {
            Some(existing) => {
                existing.payload() == node.payload() && destination.parent(&key)? == parent
            }
            None => false,
        };

        if !unchanged {
            tracing::trace!(key = %key, "Writing node");
            let payload = node.into_parts().1;
            let reference = match &payload {
                Payload::TreeRef(_) => Some(payload.clone()),
                _ => None,
            };
            destination.insert(parent.as_ref(), Placement::Key(key.clone()), payload)?;
            if let Some(reference) = reference {
                let dereferenced = destination
                    .node(&key)?
                    .is_some_and(|stored| stored.payload() != &reference);
                if dereferenced {
                    covered.insert(key.clone());
                }
            }
            written += 1;
        }
        seen.insert(key);
    }

    // A stale node takes its subtree with it, and nothing below a covered
    // key is stale.
    let mut stale = Vec::new();
    let mut pending: Vec<Key> = destination.root_key()?.into_iter().collect();
    while let Some(key) = pending.pop() {
        if !seen.contains(&key) {
            stale.push(key);
        } else if !covered.contains(&key) {
            pending.extend(destination.children(&key)?);
        }
    }

    let deleted = stale.len();
    for key in stale {
        destination.delete(&key)?;
    }

    tracing::debug!(
        tree = %destination.id(),
        written,
        deleted,
        covered = covered.len(),
        "Applied tree"
    );
    Ok(())
}
