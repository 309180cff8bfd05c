use std::fmt::Debug;

use serde::{Deserialize, Serialize};

/// The size of a [`Digest`] in bytes.
pub const DIGEST_SIZE: usize = 32;

/// A BLAKE3 digest of node content or of a whole subtree.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest([u8; DIGEST_SIZE]);

impl Digest {
    /// Computes the digest of the given bytes.
    pub fn of(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).into())
    }

    /// The raw digest bytes.
    pub fn bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }
}

impl From<blake3::Hash> for Digest {
    fn from(value: blake3::Hash) -> Self {
        Self(value.into())
    }
}

/// Application-defined node content.
///
/// The engine only needs equality and a digest that agrees with it: equal
/// values must produce equal digests.
pub trait Content: Clone + Debug + PartialEq {
    /// A digest of this value, used to index donor trees.
    fn digest(&self) -> Digest;
}

impl Content for String {
    fn digest(&self) -> Digest {
        Digest::of(self.as_bytes())
    }
}

impl Content for Vec<u8> {
    fn digest(&self) -> Digest {
        Digest::of(self)
    }
}

impl Content for &'static str {
    fn digest(&self) -> Digest {
        Digest::of(self.as_bytes())
    }
}
