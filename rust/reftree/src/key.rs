use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::ReftreeError;

fn is_odd(component: i32) -> bool {
    component.rem_euclid(2) == 1
}

/// A position-encoding ("Dewey") key.
///
/// Each tree level contributes one *label*: a run of even components closed
/// by a single odd component. Ordinary positions are plain odd numbers
/// (`[1]`, `[3]`, ...); even components act as carets that open room between
/// two siblings without renumbering either of them (`[2, 1]` sorts between
/// `[1]` and `[3]`). The root is the empty path.
///
/// The derived lexicographic order is document order: ancestors sort before
/// their descendants, and a subtree sorts entirely before its next sibling.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathKey(Vec<i32>);

impl PathKey {
    /// The key of a tree's root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Constructs a [`PathKey`] from raw components, rejecting sequences
    /// that do not end on a label boundary.
    pub fn try_new(components: Vec<i32>) -> Result<Self, ReftreeError> {
        match components.last() {
            Some(last) if !is_odd(*last) => Err(ReftreeError::InvalidKey(format!(
                "path {components:?} does not end with an odd component"
            ))),
            _ => Ok(Self(components)),
        }
    }

    /// The raw components of this key.
    pub fn components(&self) -> &[i32] {
        &self.0
    }

    /// True for the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The number of levels below the root.
    pub fn depth(&self) -> usize {
        self.0.iter().filter(|component| is_odd(**component)).count()
    }

    /// The length of the prefix shared with the parent.
    fn parent_len(&self) -> usize {
        let Some((_, init)) = self.0.split_last() else {
            return 0;
        };
        init.iter()
            .rposition(|component| is_odd(*component))
            .map(|index| index + 1)
            .unwrap_or(0)
    }

    /// The key of the parent position, or `None` for the root.
    pub fn parent(&self) -> Option<PathKey> {
        if self.is_root() {
            None
        } else {
            Some(Self(self.0[..self.parent_len()].to_vec()))
        }
    }

    /// The label this key occupies among its siblings.
    pub fn label(&self) -> &[i32] {
        &self.0[self.parent_len()..]
    }

    /// The first position below this key.
    pub fn first_child(&self) -> PathKey {
        self.extend(&[1])
    }

    /// Returns true if `other` lies strictly below this key.
    pub fn is_ancestor_of(&self, other: &PathKey) -> bool {
        other.0.len() > self.0.len() && other.0.starts_with(&self.0)
    }

    /// Returns true if `other` is an immediate child position of this key.
    pub fn is_parent_of(&self, other: &PathKey) -> bool {
        other.parent().as_ref() == Some(self)
    }

    /// The next free sibling position after this key.
    pub fn after(&self) -> Result<PathKey, ReftreeError> {
        let parent = self.parent().ok_or_else(|| {
            ReftreeError::InvalidKey("the root has no sibling positions".into())
        })?;
        Ok(parent.extend(&label_after(self.label())))
    }

    /// The next free sibling position before this key.
    pub fn before(&self) -> Result<PathKey, ReftreeError> {
        let parent = self.parent().ok_or_else(|| {
            ReftreeError::InvalidKey("the root has no sibling positions".into())
        })?;
        Ok(parent.extend(&label_before(self.label())))
    }

    /// Computes a sibling key that sorts strictly between `left` and
    /// `right`. Both keys must share a parent and `left < right`; neither key
    /// changes.
    pub fn between(left: &PathKey, right: &PathKey) -> Result<PathKey, ReftreeError> {
        let parent = left.parent();
        if parent.is_none() || parent != right.parent() {
            return Err(ReftreeError::InvalidKey(format!(
                "{left} and {right} are not siblings"
            )));
        }
        if left >= right {
            return Err(ReftreeError::InvalidKey(format!(
                "{left} does not sort before {right}"
            )));
        }

        let label = label_between(left.label(), right.label());
        Ok(Self(left.0[..left.parent_len()].to_vec()).extend(&label))
    }

    fn extend(&self, label: &[i32]) -> PathKey {
        let mut components = Vec::with_capacity(self.0.len() + label.len());
        components.extend_from_slice(&self.0);
        components.extend_from_slice(label);
        Self(components)
    }
}

fn label_after(label: &[i32]) -> Vec<i32> {
    let first = label[0];
    if is_odd(first) {
        vec![first + 2]
    } else {
        vec![first + 1]
    }
}

fn label_before(label: &[i32]) -> Vec<i32> {
    let first = label[0];
    if is_odd(first) {
        vec![first - 2]
    } else {
        vec![first - 1]
    }
}

/// Two distinct labels never prefix one another (every label ends on its only
/// odd component), so they always differ at some shared index.
fn label_between(left: &[i32], right: &[i32]) -> Vec<i32> {
    let index = left
        .iter()
        .zip(right.iter())
        .position(|(left, right)| left != right)
        .unwrap_or(left.len().min(right.len()) - 1);

    let (low, high) = (left[index], right[index]);
    let mut label = left[..index].to_vec();

    if high - low >= 2 {
        let candidate = if is_odd(low) { low + 2 } else { low + 1 };
        if candidate < high {
            label.push(candidate);
        } else {
            label.extend_from_slice(&[low + 1, 1]);
        }
    } else if !is_odd(low) {
        label.push(low);
        label.extend(label_after(&left[index + 1..]));
    } else {
        label.push(high);
        label.extend(label_before(&right[index + 1..]));
    }

    label
}

impl Display for PathKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_root() {
            return write!(f, "/");
        }

        let mut level = Vec::new();
        for component in &self.0 {
            level.push(component.to_string());
            if is_odd(*component) {
                write!(f, "/{}", level.join("."))?;
                level.clear();
            }
        }
        Ok(())
    }
}

/// A key with no structural meaning.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OpaqueKey {
    /// A numeric identifier
    Number(u64),
    /// A textual identifier
    Text(String),
}

/// The identifier of a node within one tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Key {
    /// A position-encoding key
    Path(PathKey),
    /// An opaque key
    Opaque(OpaqueKey),
}

impl Key {
    /// The key of an (automatically keyed) root.
    pub fn root() -> Self {
        Key::Path(PathKey::root())
    }

    /// Shorthand for a [`Key::Path`] built from raw components.
    pub fn path(components: &[i32]) -> Result<Self, ReftreeError> {
        PathKey::try_new(components.to_vec()).map(Key::Path)
    }

    /// Shorthand for a numeric [`Key::Opaque`].
    pub fn number(value: u64) -> Self {
        Key::Opaque(OpaqueKey::Number(value))
    }

    /// Shorthand for a textual [`Key::Opaque`].
    pub fn text<S: Into<String>>(value: S) -> Self {
        Key::Opaque(OpaqueKey::Text(value.into()))
    }

    /// The path form of this key, if it has one.
    pub fn as_path(&self) -> Option<&PathKey> {
        match self {
            Key::Path(path) => Some(path),
            Key::Opaque(_) => None,
        }
    }

    /// Feeds a canonical encoding of this key into `hasher`.
    pub(crate) fn digest_into(&self, hasher: &mut blake3::Hasher) {
        match self {
            Key::Path(path) => {
                hasher.update(&[0]);
                hasher.update(&(path.0.len() as u64).to_le_bytes());
                for component in &path.0 {
                    hasher.update(&component.to_le_bytes());
                }
            }
            Key::Opaque(OpaqueKey::Number(number)) => {
                hasher.update(&[1]);
                hasher.update(&number.to_le_bytes());
            }
            Key::Opaque(OpaqueKey::Text(text)) => {
                hasher.update(&[2]);
                hasher.update(&(text.len() as u64).to_le_bytes());
                hasher.update(text.as_bytes());
            }
        }
    }
}

impl From<PathKey> for Key {
    fn from(value: PathKey) -> Self {
        Key::Path(value)
    }
}

impl From<OpaqueKey> for Key {
    fn from(value: OpaqueKey) -> Self {
        Key::Opaque(value)
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Path(path) => write!(f, "{path}"),
            Key::Opaque(OpaqueKey::Number(number)) => write!(f, "#{number}"),
            Key::Opaque(OpaqueKey::Text(text)) => write!(f, "'{text}'"),
        }
    }
}

/// Identifies a tree, and doubles as the base-version tag of a delta.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TreeId(pub u64);

impl Display for TreeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tree:{}", self.0)
    }
}

/// Hands out fresh opaque keys for automatically keyed children of opaque
/// parents. Passed to a tree when it is built.
#[derive(Clone, Debug, Default)]
pub struct KeyGenerator {
    next: u64,
}

impl KeyGenerator {
    /// A generator whose first key is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    /// Produces the next key.
    pub fn next_key(&mut self) -> Key {
        let key = Key::number(self.next);
        self.next += 1;
        key
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    fn path(components: &[i32]) -> PathKey {
        PathKey::try_new(components.to_vec()).unwrap()
    }

    #[test]
    fn it_rejects_paths_that_end_mid_label() {
        assert!(PathKey::try_new(vec![1, 2]).is_err());
        assert!(PathKey::try_new(vec![2, 1]).is_ok());
        assert!(PathKey::try_new(vec![]).is_ok());
    }

    #[test]
    fn it_derives_parents_across_caret_labels() -> Result<()> {
        assert_eq!(path(&[1, 3]).parent(), Some(path(&[1])));
        assert_eq!(path(&[1, 2, 2, 5]).parent(), Some(path(&[1])));
        assert_eq!(path(&[3]).parent(), Some(PathKey::root()));
        assert_eq!(PathKey::root().parent(), None);
        assert_eq!(path(&[1, 2, 2, 5]).label(), &[2, 2, 5]);
        assert_eq!(path(&[1, 2, 2, 5]).depth(), 2);
        Ok(())
    }

    #[test]
    fn it_orders_keys_in_document_order() {
        let first = path(&[1]);
        let first_child = first.first_child();
        let second = path(&[3]);

        assert!(first < first_child);
        assert!(first_child < second);
        assert!(first.is_ancestor_of(&first_child));
        assert!(!first.is_ancestor_of(&second));
        assert!(PathKey::root().is_parent_of(&first));
    }

    #[test]
    fn it_finds_keys_between_siblings() -> Result<()> {
        let cases = [
            (path(&[1]), path(&[3])),
            (path(&[1]), path(&[9])),
            (path(&[2, 1]), path(&[3])),
            (path(&[1]), path(&[2, 1])),
            (path(&[-1]), path(&[1])),
            (path(&[5, 1]), path(&[5, 2, 1])),
        ];

        for (left, right) in cases {
            let middle = PathKey::between(&left, &right)?;
            assert!(left < middle, "{left} < {middle}");
            assert!(middle < right, "{middle} < {right}");
            assert_eq!(middle.parent(), left.parent());
        }
        Ok(())
    }

    #[test]
    fn it_keeps_order_across_repeated_midpoints() -> Result<()> {
        let left = path(&[1]);
        let mut right = path(&[3]);

        for _ in 0..32 {
            let middle = PathKey::between(&left, &right)?;
            assert!(left < middle && middle < right);
            right = middle;
        }

        let mut left = path(&[1]);
        let right = path(&[3]);
        for _ in 0..32 {
            let middle = PathKey::between(&left, &right)?;
            assert!(left < middle && middle < right);
            left = middle;
        }
        Ok(())
    }

    #[test]
    fn it_rejects_non_siblings_for_between() {
        assert!(PathKey::between(&path(&[1]), &path(&[1, 1])).is_err());
        assert!(PathKey::between(&path(&[3]), &path(&[1])).is_err());
        assert!(PathKey::between(&PathKey::root(), &path(&[1])).is_err());
    }

    #[test]
    fn it_prepends_and_appends_siblings() -> Result<()> {
        let key = path(&[1, 3]);
        assert_eq!(key.after()?, path(&[1, 5]));
        assert_eq!(key.before()?, path(&[1, 1]));
        assert_eq!(path(&[1]).before()?, path(&[-1]));
        assert_eq!(path(&[2, 1]).after()?, path(&[3]));
        Ok(())
    }

    #[test]
    fn it_displays_keys() {
        assert_eq!(Key::Path(path(&[1, 2, 1])).to_string(), "/1/2.1");
        assert_eq!(Key::root().to_string(), "/");
        assert_eq!(Key::number(7).to_string(), "#7");
        assert_eq!(Key::text("a").to_string(), "'a'");
    }

    #[test]
    fn it_generates_sequential_opaque_keys() {
        let mut generator = KeyGenerator::starting_at(10);
        assert_eq!(generator.next_key(), Key::number(10));
        assert_eq!(generator.next_key(), Key::number(11));
    }
}
