use std::io::{Read, Write};

use reftree::{
    AddressableTree, Content, Delta, Donor, Key, MemoryTree, MutableTree, PathKey, Payload,
    Placement, ReftreeError, TreeId, dfs_keys,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::CodecError;

/// Moves [`Delta`]s in and out of byte streams.
pub trait DeltaCodec {
    /// Writes `delta` to `writer`.
    fn encode<C, W>(&self, delta: &Delta<C>, writer: W) -> Result<(), CodecError>
    where
        C: Content + Serialize,
        W: Write;

    /// Reads a delta from `reader` and checks it against `base_tree`, the
    /// receiver's copy of the delta's base version.
    fn decode<C, R>(&self, reader: R, base_tree: Donor<'_, C>) -> Result<Delta<C>, CodecError>
    where
        C: Content + DeserializeOwned,
        R: Read;
}

#[derive(Serialize, Deserialize)]
struct WireDelta<C> {
    base: TreeId,
    tree: TreeId,
    nodes: Vec<WireNode<C>>,
}

#[derive(Serialize, Deserialize)]
struct WireNode<C> {
    key: Key,
    parent: Option<Key>,
    payload: Payload<C>,
}

/// A [`DeltaCodec`] that encodes deltas as IPLD-compatible CBOR
#[derive(Clone, Copy, Debug, Default)]
pub struct CborCodec;

impl DeltaCodec for CborCodec {
    fn encode<C, W>(&self, delta: &Delta<C>, mut writer: W) -> Result<(), CodecError>
    where
        C: Content + Serialize,
        W: Write,
    {
        let tree = delta.tree();
        let mut nodes = Vec::with_capacity(tree.len());
        for key in dfs_keys(tree) {
            let key = key?;
            let payload = tree
                .node(&key)?
                .ok_or_else(|| ReftreeError::NodeNotFound(key.clone()))?
                .into_parts()
                .1;
            let parent = tree.parent(&key)?;
            nodes.push(WireNode {
                key,
                parent,
                payload,
            });
        }

        let wire = WireDelta {
            base: delta.base(),
            tree: tree.id(),
            nodes,
        };
        let bytes = serde_ipld_dagcbor::to_vec(&wire)
            .map_err(|error| CodecError::Encode(format!("{error}")))?;
        writer
            .write_all(&bytes)
            .map_err(|error| CodecError::Encode(format!("{error}")))?;

        tracing::debug!(
            base = %delta.base(),
            nodes = wire.nodes.len(),
            bytes = bytes.len(),
            "Encoded delta"
        );
        Ok(())
    }

    fn decode<C, R>(&self, mut reader: R, base_tree: Donor<'_, C>) -> Result<Delta<C>, CodecError>
    where
        C: Content + DeserializeOwned,
        R: Read,
    {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|error| CodecError::Decode(format!("{error}")))?;
        let wire = serde_ipld_dagcbor::from_slice::<WireDelta<C>>(&bytes)
            .map_err(|error| CodecError::Decode(format!("{error}")))?;

        if wire.base != base_tree.id() {
            return Err(CodecError::BaseMismatch {
                expected: base_tree.id(),
                found: wire.base,
            });
        }

        let count = wire.nodes.len();
        let mut tree = MemoryTree::new(wire.tree);
        for node in wire.nodes {
            if let Some(path) = node.key.as_path() {
                PathKey::try_new(path.components().to_vec())?;
            }
            if tree.contains(&node.key)? {
                return Err(CodecError::Decode(format!(
                    "key {} appears more than once",
                    node.key
                )));
            }
            tree.insert(
                node.parent.as_ref(),
                Placement::Key(node.key),
                node.payload,
            )?;
        }

        let delta = Delta::new(wire.base, tree);
        delta.verify(base_tree)?;

        tracing::debug!(
            base = %wire.base,
            nodes = count,
            bytes = bytes.len(),
            "Decoded delta"
        );
        Ok(delta)
    }
}
