use crate::{Content, Donor, MemoryTree, Normalized, ReftreeError, Resolver, TreeId, expand_refs};

/// A delta tree tagged with the version it was computed against.
///
/// The tree's nodes are predominantly references into the base tree. A
/// receiver checks the tag against its own copy of the base before
/// expanding the delta or applying it to a
/// [`ChangeBuffer`](crate::ChangeBuffer).
#[derive(Clone, Debug)]
pub struct Delta<C> {
    base: TreeId,
    tree: MemoryTree<C>,
}

impl<C> Delta<C>
where
    C: Content,
{
    /// Pair a delta tree with its base version.
    pub fn new(base: TreeId, tree: MemoryTree<C>) -> Self {
        Self { base, tree }
    }

    /// Wraps the output of [`crate::normalize`] for a single donor.
    pub fn from_normalized(base: TreeId, normalized: Normalized<C>) -> Self {
        Self::new(base, normalized.tree)
    }

    /// The version this delta was computed against.
    pub fn base(&self) -> TreeId {
        self.base
    }

    /// The delta tree.
    pub fn tree(&self) -> &MemoryTree<C> {
        &self.tree
    }

    /// Unwraps the delta tree.
    pub fn into_tree(self) -> MemoryTree<C> {
        self.tree
    }

    /// Checks that `base_tree` is this delta's base and that every reference
    /// points at a node it contains.
    pub fn verify(&self, base_tree: Donor<'_, C>) -> Result<(), ReftreeError> {
        if base_tree.id() != self.base {
            return Err(ReftreeError::MalformedDelta(format!(
                "delta is based on {}, not {}",
                self.base,
                base_tree.id()
            )));
        }

        let mut references = 0usize;
        for (key, payload) in self.tree.iter() {
            let Some(reference) = payload.reference() else {
                continue;
            };
            if reference.tree() != self.base {
                return Err(ReftreeError::MalformedDelta(format!(
                    "{key} refers to {reference} outside of {}",
                    self.base
                )));
            }
            if !base_tree.contains(reference.key())? {
                return Err(ReftreeError::NodeNotFound(reference.key().clone()));
            }
            references += 1;
        }

        tracing::trace!(base = %self.base, references, "Verified delta");
        Ok(())
    }

    /// Reconstructs the explicit tree this delta stands for.
    pub fn expand(&self, base_tree: Donor<'_, C>) -> Result<MemoryTree<C>, ReftreeError> {
        if base_tree.id() != self.base {
            return Err(ReftreeError::MalformedDelta(format!(
                "delta is based on {}, not {}",
                self.base,
                base_tree.id()
            )));
        }
        let resolver = Resolver::new().with(base_tree);
        expand_refs(&self.tree, |_| false, |_| false, &resolver)
    }
}
