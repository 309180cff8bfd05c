use itertools::{EitherOrBoth, Itertools};

use crate::{AddressableTree, Content, Node, Payload, Reference, ReftreeError, TreeId, dfs_keys};

/// A donor tree, as held by a [`Resolver`].
pub type Donor<'a, C> = &'a dyn AddressableTree<Content = C>;

/// An ordered list of donor trees against which references are resolved.
///
/// Lookups by [`TreeId`] return the first donor with that id. The order also
/// decides which match [`crate::normalize`] picks when several donors hold
/// equal content.
pub struct Resolver<'a, C> {
    donors: Vec<Donor<'a, C>>,
}

impl<'a, C> Resolver<'a, C>
where
    C: Content,
{
    /// Create a resolver with no donors.
    pub fn new() -> Self {
        Self { donors: Vec::new() }
    }

    /// Adds a donor and returns the resolver.
    pub fn with(mut self, donor: Donor<'a, C>) -> Self {
        self.push(donor);
        self
    }

    /// Adds a donor after all current donors.
    pub fn push(&mut self, donor: Donor<'a, C>) {
        self.donors.push(donor);
    }

    /// The donors, in priority order.
    pub fn donors(&self) -> &[Donor<'a, C>] {
        &self.donors
    }

    /// The donor tree with the given id.
    pub fn tree(&self, id: TreeId) -> Result<Donor<'a, C>, ReftreeError> {
        self.donors
            .iter()
            .find(|donor| donor.id() == id)
            .copied()
            .ok_or(ReftreeError::TreeNotFound(id))
    }

    /// The node a reference points at.
    pub fn target(&self, reference: &Reference) -> Result<Node<C>, ReftreeError> {
        self.tree(reference.tree())?
            .node(reference.key())?
            .ok_or_else(|| ReftreeError::ReferenceResolution(reference.clone()))
    }

    /// The content a payload stands for. References are followed exactly
    /// one hop; a reference whose target is itself a reference fails.
    pub fn resolve(&self, payload: &Payload<C>) -> Result<C, ReftreeError> {
        match payload {
            Payload::Content(content) => Ok(content.clone()),
            Payload::NodeRef(reference) | Payload::TreeRef(reference) => {
                match self.target(reference)?.into_parts().1 {
                    Payload::Content(content) => Ok(content),
                    Payload::NodeRef(_) | Payload::TreeRef(_) => {
                        Err(ReftreeError::ReferenceResolution(reference.clone()))
                    }
                }
            }
        }
    }

    /// Returns true if both payloads resolve to equal content.
    pub fn content_eq(&self, left: &Payload<C>, right: &Payload<C>) -> Result<bool, ReftreeError> {
        if left == right {
            return Ok(true);
        }
        Ok(self.resolve(left)? == self.resolve(right)?)
    }
}

impl<C> Default for Resolver<'_, C>
where
    C: Content,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Compares two trees by key, shape and resolved content.
///
/// The trees are equal if they have the same root, every node has the same
/// children in the same order in both trees, and payloads at the same key
/// resolve to equal content. A tree-reference counts as its resolved content
/// only; its referenced descendants are not visited.
pub fn content_equal<L, R, C>(
    left: &L,
    right: &R,
    resolver: &Resolver<'_, C>,
) -> Result<bool, ReftreeError>
where
    L: AddressableTree<Content = C> + ?Sized,
    R: AddressableTree<Content = C> + ?Sized,
    C: Content,
{
    if left.root_key()? != right.root_key()? {
        return Ok(false);
    }

    for key in dfs_keys(left) {
        let key = key?;
        let (Some(ours), Some(theirs)) = (left.node(&key)?, right.node(&key)?) else {
            return Ok(false);
        };
        if !resolver.content_eq(ours.payload(), theirs.payload())? {
            return Ok(false);
        }
        for pair in left.children(&key)?.zip_longest(right.children(&key)?) {
            match pair {
                EitherOrBoth::Both(ours, theirs) if ours == theirs => {}
                _ => return Ok(false),
            }
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::tree::MutableTree;
    use crate::{Key, MemoryTree};

    fn donor() -> Result<(MemoryTree<String>, Key)> {
        let mut tree = MemoryTree::new(TreeId(7));
        let root = tree.set_root("root".into())?;
        let child = tree.append(&root, "child".into())?;
        Ok((tree, child))
    }

    #[test]
    fn it_resolves_references_one_hop() -> Result<()> {
        let (tree, child) = donor()?;
        let resolver = Resolver::<String>::new().with(&tree);

        let reference = Payload::node_ref(TreeId(7), child);
        assert_eq!(resolver.resolve(&reference)?, "child".to_string());
        assert!(resolver.content_eq(&reference, &Payload::Content("child".into()))?);
        assert!(!resolver.content_eq(&reference, &Payload::Content("other".into()))?);
        Ok(())
    }

    #[test]
    fn it_reports_unknown_trees_and_missing_targets() -> Result<()> {
        let (tree, _) = donor()?;
        let resolver = Resolver::<String>::new().with(&tree);

        let foreign = Payload::<String>::tree_ref(TreeId(8), Key::root());
        assert_eq!(
            resolver.resolve(&foreign),
            Err(ReftreeError::TreeNotFound(TreeId(8)))
        );

        let dangling = Reference::new(TreeId(7), Key::number(99));
        assert_eq!(
            resolver.resolve(&Payload::NodeRef(dangling.clone())),
            Err(ReftreeError::ReferenceResolution(dangling))
        );
        Ok(())
    }

    #[test]
    fn it_compares_trees_by_resolved_content() -> Result<()> {
        let (tree, child) = donor()?;
        let resolver = Resolver::<String>::new().with(&tree);

        let mut copy = MemoryTree::<String>::new(TreeId(8));
        let root = copy.insert(
            None,
            crate::Placement::Key(Key::root()),
            Payload::node_ref(TreeId(7), Key::root()),
        )?;
        copy.insert(
            Some(&root),
            crate::Placement::Key(child.clone()),
            Payload::Content("child".into()),
        )?;
        assert!(content_equal(&tree, &copy, &resolver)?);

        copy.update(&child, Payload::Content("changed".into()))?;
        assert!(!content_equal(&tree, &copy, &resolver)?);

        copy.append(&root, "extra".into())?;
        assert!(!content_equal(&tree, &copy, &resolver)?);
        Ok(())
    }
}
