use crate::{
    AddressableTree, Content, Key, MemoryTree, MutableTree, Payload, Placement, ReftreeError,
    Resolver, TreeId,
};

enum Source {
    Local(Key),
    Donor(TreeId, Key),
}

/// Rebuilds `tree` with references materialized as explicit content.
///
/// A reference node is kept as it is when `allowed_refs` accepts its key or
/// `allowed_content_refs` accepts the key it points at; every other
/// reference is replaced by the content it resolves to. A materialized
/// tree-reference also brings in the target's descendants under their donor
/// keys, and each of those is subject to the same rule: it is emitted as a
/// tree-reference to itself when allowed, otherwise its donor payload is
/// copied as it is and its children follow.
///
/// The result has the id of `tree`. Fails with
/// [`ReftreeError::MalformedDelta`] if two nodes end up with the same key.
pub fn expand_refs<T, C, R, A>(
    tree: &T,
    allowed_refs: R,
    allowed_content_refs: A,
    resolver: &Resolver<'_, C>,
) -> Result<MemoryTree<C>, ReftreeError>
where
    T: AddressableTree<Content = C> + ?Sized,
    C: Content,
    R: Fn(&Key) -> bool,
    A: Fn(&Key) -> bool,
{
    let mut expanded = MemoryTree::new(tree.id());
    let Some(root) = tree.root_key()? else {
        return Ok(expanded);
    };

    let mut materialized = 0usize;
    let mut stack = vec![(Source::Local(root), None::<Key>)];

    while let Some((source, parent)) = stack.pop() {
        let (key, payload, children) = match source {
            Source::Local(key) => {
                let payload = tree
                    .node(&key)?
                    .ok_or_else(|| ReftreeError::NodeNotFound(key.clone()))?
                    .into_parts()
                    .1;

                match payload {
                    Payload::Content(content) => {
                        let children = local_children(tree, &key)?;
                        (key, Payload::Content(content), children)
                    }
                    Payload::NodeRef(reference)
                        if allowed_refs(&key) || allowed_content_refs(reference.key()) =>
                    {
                        let children = local_children(tree, &key)?;
                        (key, Payload::NodeRef(reference), children)
                    }
                    Payload::TreeRef(reference)
                        if allowed_refs(&key) || allowed_content_refs(reference.key()) =>
                    {
                        (key, Payload::TreeRef(reference), Vec::new())
                    }
                    Payload::NodeRef(reference) => {
                        materialized += 1;
                        let content = resolver.resolve(&Payload::NodeRef(reference))?;
                        let children = local_children(tree, &key)?;
                        (key, Payload::Content(content), children)
                    }
                    Payload::TreeRef(reference) => {
                        materialized += 1;
                        let donor = resolver.tree(reference.tree())?;
                        let content = resolver.resolve(&Payload::TreeRef(reference.clone()))?;
                        let children = donor
                            .children(reference.key())?
                            .map(|child| Source::Donor(reference.tree(), child))
                            .collect();
                        (key, Payload::Content(content), children)
                    }
                }
            }
            Source::Donor(tree_id, key) => {
                if allowed_refs(&key) || allowed_content_refs(&key) {
                    let payload = Payload::tree_ref(tree_id, key.clone());
                    (key, payload, Vec::new())
                } else {
                    let donor = resolver.tree(tree_id)?;
                    let payload = donor
                        .node(&key)?
                        .ok_or_else(|| ReftreeError::NodeNotFound(key.clone()))?
                        .into_parts()
                        .1;
                    let children = donor
                        .children(&key)?
                        .map(|child| Source::Donor(tree_id, child))
                        .collect();
                    materialized += 1;
                    (key, payload, children)
                }
            }
        };

        if expanded.contains(&key)? {
            return Err(ReftreeError::MalformedDelta(format!(
                "key {key} is produced more than once"
            )));
        }
        tracing::trace!(key = %key, reference = payload.is_reference(), "Expanded node");
        expanded.insert(parent.as_ref(), Placement::Key(key.clone()), payload)?;

        stack.extend(
            children
                .into_iter()
                .rev()
                .map(|child| (child, Some(key.clone()))),
        );
    }

    tracing::debug!(
        tree = %tree.id(),
        nodes = expanded.len(),
        materialized,
        "Expanded references"
    );
    Ok(expanded)
}

fn local_children<T>(tree: &T, key: &Key) -> Result<Vec<Source>, ReftreeError>
where
    T: AddressableTree + ?Sized,
{
    Ok(tree.children(key)?.map(Source::Local).collect())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{content_equal, dfs_keys, normalize};

    fn donor() -> Result<MemoryTree<String>> {
        let mut tree = MemoryTree::new(TreeId(1));
        let root = tree.set_root("R".into())?;
        let a = tree.append(&root, "x".into())?;
        tree.append(&a, "x.1".into())?;
        tree.append(&root, "y".into())?;
        Ok(tree)
    }

    #[test]
    fn it_materializes_a_whole_tree_reference() -> Result<()> {
        let donor = donor()?;
        let resolver = Resolver::<String>::new().with(&donor);

        let mut delta = MemoryTree::<String>::new(TreeId(2));
        delta.insert(
            None,
            Placement::Key(Key::root()),
            Payload::tree_ref(TreeId(1), Key::root()),
        )?;

        let expanded = expand_refs(&delta, |_| false, |_| false, &resolver)?;

        assert_eq!(expanded.id(), TreeId(2));
        assert!(content_equal(&expanded, &donor, &resolver)?);
        assert!(
            dfs_keys(&expanded)
                .map(|key| expanded.node(&key?))
                .all(|node| matches!(node, Ok(Some(node)) if !node.payload().is_reference()))
        );
        Ok(())
    }

    #[test]
    fn it_keeps_allowed_references() -> Result<()> {
        let donor = donor()?;
        let resolver = Resolver::<String>::new().with(&donor);
        let a = Key::path(&[1])?;

        let mut delta = MemoryTree::<String>::new(TreeId(2));
        delta.insert(
            None,
            Placement::Key(Key::root()),
            Payload::tree_ref(TreeId(1), Key::root()),
        )?;

        let expanded = expand_refs(&delta, |_| false, |key| key == &a, &resolver)?;

        assert_eq!(
            expanded.node(&a)?.map(|node| node.into_parts().1),
            Some(Payload::tree_ref(TreeId(1), a.clone()))
        );
        assert_eq!(expanded.children(&a)?.count(), 0);
        assert_eq!(expanded.len(), 3);
        Ok(())
    }

    #[test]
    fn it_inverts_normalize() -> Result<()> {
        let donor = donor()?;
        let mut target = donor.clone();
        let y = Key::path(&[3])?;
        target.update(&y, Payload::Content("z".into()))?;
        target.append(&y, "new".into())?;

        let resolver = Resolver::<String>::new().with(&donor);
        let normalized = normalize(&[&target], &resolver)?.remove(0);
        assert!(!normalized.references.is_empty());

        let expanded = expand_refs(&normalized.tree, |_| false, |_| false, &resolver)?;
        assert!(content_equal(&expanded, &target, &resolver)?);
        Ok(())
    }

    #[test]
    fn it_rejects_duplicate_keys() -> Result<()> {
        let donor = donor()?;
        let resolver = Resolver::<String>::new().with(&donor);
        let a = Key::path(&[1])?;

        let mut delta = MemoryTree::<String>::new(TreeId(2));
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
            Placement::Key(Key::path(&[1, 1])?),
            Payload::Content("clash".into()),
        )?;

        let result = expand_refs(&delta, |_| false, |_| false, &resolver);
        assert!(matches!(result, Err(ReftreeError::MalformedDelta(_))));
        Ok(())
    }
}
