use hashbrown::{HashMap, HashSet};

use crate::{
    AddressableTree, Content, Digest, Key, Payload, Reference, ReftreeError, Resolver, TreeId,
    dfs_keys,
};

/// The digests recorded for one node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeDigest {
    /// Digest of the node's resolved content
    pub content: Digest,
    /// Digest of the resolved subtree: the content digest followed by every
    /// child's key and subtree digest, in sibling order. The node's own key
    /// is not part of it.
    pub subtree: Digest,
    /// The node stores its content itself
    pub local: bool,
    /// The node and all of its descendants store their content themselves
    pub explicit: bool,
}

/// Digests for every node of one tree, plus the pre-order they were
/// collected in.
#[derive(Clone, Debug, Default)]
pub struct TreeDigests {
    order: Vec<Key>,
    nodes: HashMap<Key, NodeDigest>,
}

impl TreeDigests {
    /// The digests recorded for `key`.
    pub fn get(&self, key: &Key) -> Option<&NodeDigest> {
        self.nodes.get(key)
    }

    /// All keys, in pre-order.
    pub fn order(&self) -> &[Key] {
        &self.order
    }
}

/// Computes [`TreeDigests`] for `tree`.
///
/// Tree-references contribute the subtree digest of their target, which
/// `references` supplies.
pub fn digest_tree<T, C>(
    tree: &T,
    resolver: &Resolver<'_, C>,
    references: &mut dyn FnMut(&Reference) -> Result<Digest, ReftreeError>,
) -> Result<TreeDigests, ReftreeError>
where
    T: AddressableTree<Content = C> + ?Sized,
    C: Content,
{
    let order = dfs_keys(tree).collect::<Result<Vec<_>, _>>()?;
    let mut nodes = HashMap::with_capacity(order.len());

    for key in order.iter().rev() {
        let node = tree
            .node(key)?
            .ok_or_else(|| ReftreeError::NodeNotFound(key.clone()))?;
        let content = resolver.resolve(node.payload())?.digest();

        let digest = match node.payload() {
            Payload::TreeRef(reference) => NodeDigest {
                content,
                subtree: references(reference)?,
                local: false,
                explicit: false,
            },
            payload => {
                let local = matches!(payload, Payload::Content(_));
                let mut explicit = local;
                let mut hasher = blake3::Hasher::new();
                hasher.update(content.bytes());
                for child in tree.children(key)? {
                    let digest: &NodeDigest = nodes
                        .get(&child)
                        .ok_or_else(|| ReftreeError::NodeNotFound(child.clone()))?;
                    explicit &= digest.explicit;
                    child.digest_into(&mut hasher);
                    hasher.update(digest.subtree.bytes());
                }
                NodeDigest {
                    content,
                    subtree: hasher.finalize().into(),
                    local,
                    explicit,
                }
            }
        };
        nodes.insert(key.clone(), digest);
    }

    Ok(TreeDigests { order, nodes })
}

/// Digest lookup tables over the donors of a [`Resolver`].
///
/// Each digest maps to the first matching donor node: donors are visited in
/// resolver order and each donor in pre-order. Only nodes that hold their
/// own content are candidates, and only fully explicit subtrees are subtree
/// candidates, so every match resolves in a single hop.
#[derive(Debug, Default)]
pub struct DonorIndex {
    donors: Vec<Option<TreeDigests>>,
    positions: HashMap<TreeId, usize>,
    subtrees: HashMap<Digest, Reference>,
    contents: HashMap<Digest, Reference>,
}

impl DonorIndex {
    /// Indexes every donor of `resolver`.
    pub fn build<C>(resolver: &Resolver<'_, C>) -> Result<Self, ReftreeError>
    where
        C: Content,
    {
        let donors = resolver.donors();
        let mut positions = HashMap::new();
        for (position, donor) in donors.iter().enumerate() {
            positions.entry(donor.id()).or_insert(position);
        }

        let mut slots: Vec<Option<TreeDigests>> = vec![None; donors.len()];
        let mut visiting = HashSet::new();
        for position in positions.values().copied() {
            ensure(resolver, &positions, &mut slots, position, &mut visiting)?;
        }

        let mut index = DonorIndex {
            donors: slots,
            positions,
            subtrees: HashMap::new(),
            contents: HashMap::new(),
        };

        for (position, donor) in donors.iter().enumerate() {
            if index.positions.get(&donor.id()) != Some(&position) {
                continue;
            }
            let Some(digests) = index.donors[position].as_ref() else {
                continue;
            };
            for key in digests.order() {
                let Some(digest) = digests.get(key) else {
                    continue;
                };
                if digest.explicit {
                    index
                        .subtrees
                        .entry(digest.subtree)
                        .or_insert_with(|| Reference::new(donor.id(), key.clone()));
                }
                if digest.local {
                    index
                        .contents
                        .entry(digest.content)
                        .or_insert_with(|| Reference::new(donor.id(), key.clone()));
                }
            }
        }

        tracing::trace!(
            donors = donors.len(),
            subtrees = index.subtrees.len(),
            contents = index.contents.len(),
            "Indexed donor trees"
        );
        Ok(index)
    }

    /// The first donor subtree with the given subtree digest.
    pub fn subtree_match(&self, digest: &Digest) -> Option<&Reference> {
        self.subtrees.get(digest)
    }

    /// The first donor node with the given content digest.
    pub fn content_match(&self, digest: &Digest) -> Option<&Reference> {
        self.contents.get(digest)
    }

    /// The subtree digest of the donor node a reference points at.
    pub fn reference_digest(&self, reference: &Reference) -> Result<Digest, ReftreeError> {
        let position = self
            .positions
            .get(&reference.tree())
            .ok_or(ReftreeError::TreeNotFound(reference.tree()))?;
        lookup(&self.donors[*position], reference)
    }

    /// Computes the digests of a tree whose references point into the
    /// indexed donors.
    pub fn digest<T, C>(
        &self,
        tree: &T,
        resolver: &Resolver<'_, C>,
    ) -> Result<TreeDigests, ReftreeError>
    where
        T: AddressableTree<Content = C> + ?Sized,
        C: Content,
    {
        digest_tree(tree, resolver, &mut |reference| {
            self.reference_digest(reference)
        })
    }
}

fn lookup(slot: &Option<TreeDigests>, reference: &Reference) -> Result<Digest, ReftreeError> {
    slot.as_ref()
        .and_then(|digests| digests.get(reference.key()))
        .map(|digest| digest.subtree)
        .ok_or_else(|| ReftreeError::ReferenceResolution(reference.clone()))
}

fn ensure<C>(
    resolver: &Resolver<'_, C>,
    positions: &HashMap<TreeId, usize>,
    slots: &mut Vec<Option<TreeDigests>>,
    position: usize,
    visiting: &mut HashSet<usize>,
) -> Result<(), ReftreeError>
where
    C: Content,
{
    if slots[position].is_some() {
        return Ok(());
    }
    if !visiting.insert(position) {
        return Err(ReftreeError::Structure(format!(
            "donor {} takes part in a reference cycle",
            resolver.donors()[position].id()
        )));
    }

    let donor = resolver.donors()[position];
    let digests = digest_tree(donor, resolver, &mut |reference| {
        let target = *positions
            .get(&reference.tree())
            .ok_or(ReftreeError::TreeNotFound(reference.tree()))?;
        ensure(resolver, positions, slots, target, visiting)?;
        lookup(&slots[target], reference)
    })?;

    visiting.remove(&position);
    slots[position] = Some(digests);
    Ok(())
}
