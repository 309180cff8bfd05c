use hashbrown::HashSet;

use crate::{
    AddressableTree, Content, DonorIndex, Key, MemoryTree, MutableTree, Payload, Placement,
    ReftreeError, Resolver,
};

/// The result of normalizing one tree against a set of donors.
#[derive(Clone, Debug)]
pub struct Normalized<C> {
    /// The normalized tree: same id and keys as the input, with matching
    /// nodes replaced by references into the donors
    pub tree: MemoryTree<C>,
    /// The keys of all nodes that were turned into references
    pub references: HashSet<Key>,
}

/// A target tree for [`normalize`].
pub type Target<'a, C> = &'a dyn AddressableTree<Content = C>;

/// Minimizes each target tree into a reference-heavy tree relative to the
/// donors of `resolver`.
///
/// Targets are walked in pre-order. A node whose whole resolved subtree
/// (content, shape and descendant keys) equals a donor subtree becomes a
/// [`Payload::TreeRef`] and is not descended into. Otherwise a node whose
/// own resolved content equals some donor node becomes a
/// [`Payload::NodeRef`]; anything else keeps explicit content. When several
/// donor nodes match, the first donor in resolver order wins, and within it
/// the first node in pre-order.
pub fn normalize<C>(
    targets: &[Target<'_, C>],
    resolver: &Resolver<'_, C>,
) -> Result<Vec<Normalized<C>>, ReftreeError>
where
    C: Content,
{
    let index = DonorIndex::build(resolver)?;
    targets
        .iter()
        .map(|target| normalize_one(*target, &index, resolver))
        .collect()
}

fn normalize_one<C>(
    target: Target<'_, C>,
    index: &DonorIndex,
    resolver: &Resolver<'_, C>,
) -> Result<Normalized<C>, ReftreeError>
where
    C: Content,
{
    let digests = index.digest(target, resolver)?;
    let mut tree = MemoryTree::new(target.id());
    let mut references = HashSet::new();

    let Some(root) = target.root_key()? else {
        return Ok(Normalized { tree, references });
    };

    let mut stack: Vec<(Key, Option<Key>)> = vec![(root, None)];
    while let Some((key, parent)) = stack.pop() {
        let node = target
            .node(&key)?
            .ok_or_else(|| ReftreeError::NodeNotFound(key.clone()))?;
        let digest = digests
            .get(&key)
            .ok_or_else(|| ReftreeError::NodeNotFound(key.clone()))?;

        let (payload, descend) = if let Some(reference) = index.subtree_match(&digest.subtree) {
            tracing::trace!(key = %key, target = %reference, "Subtree matched");
            (Payload::TreeRef(reference.clone()), false)
        } else if let Payload::TreeRef(reference) = node.payload() {
            (Payload::TreeRef(reference.clone()), false)
        } else {
            let own = node.into_parts().1;
            match index.content_match(&digest.content) {
                Some(reference)
                    if resolver.content_eq(&own, &Payload::NodeRef(reference.clone()))? =>
                {
                    tracing::trace!(key = %key, target = %reference, "Content matched");
                    (Payload::NodeRef(reference.clone()), true)
                }
                _ => (Payload::Content(resolver.resolve(&own)?), true),
            }
        };

        if payload.is_reference() {
            references.insert(key.clone());
        }
        tree.insert(parent.as_ref(), Placement::Key(key.clone()), payload)?;

        if descend {
            let children: Vec<Key> = target.children(&key)?.collect();
            stack.extend(children.into_iter().rev().map(|child| (child, Some(key.clone()))));
        }
    }

    tracing::debug!(
        tree = %target.id(),
        nodes = tree.len(),
        references = references.len(),
        "Normalized tree"
    );
    Ok(Normalized { tree, references })
}
