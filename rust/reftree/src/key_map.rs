use hashbrown::HashMap;

use crate::Key;

/// A bidirectional mapping between the keys of a front tree and the keys of
/// the tree it is backed by.
///
/// Implementations must be mutually inverse on every key they map: if
/// `back_key(f) == Some(b)` then `front_key(&b) == Some(f)`, and vice versa.
pub trait KeyMap {
    /// The front key that corresponds to a backing key.
    fn front_key(&self, back: &Key) -> Option<Key>;

    /// The backing key that corresponds to a front key.
    fn back_key(&self, front: &Key) -> Option<Key>;
}

impl<M> KeyMap for &M
where
    M: KeyMap + ?Sized,
{
    fn front_key(&self, back: &Key) -> Option<Key> {
        (**self).front_key(back)
    }

    fn back_key(&self, front: &Key) -> Option<Key> {
        (**self).back_key(front)
    }
}

/// The [`KeyMap`] used when front and back trees share a key space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IdentityKeyMap;

impl KeyMap for IdentityKeyMap {
    fn front_key(&self, back: &Key) -> Option<Key> {
        Some(back.clone())
    }

    fn back_key(&self, front: &Key) -> Option<Key> {
        Some(front.clone())
    }
}

/// A [`KeyMap`] backed by an explicit table of key pairs.
#[derive(Clone, Debug, Default)]
pub struct BiKeyMap {
    front_to_back: HashMap<Key, Key>,
    back_to_front: HashMap<Key, Key>,
}

impl BiKeyMap {
    /// Create an empty [`BiKeyMap`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Pairs `front` with `back`. Any earlier pairing of either key is
    /// dropped so that the map stays one-to-one.
    pub fn insert(&mut self, front: Key, back: Key) {
        if let Some(previous_back) = self.front_to_back.remove(&front) {
            self.back_to_front.remove(&previous_back);
        }
        if let Some(previous_front) = self.back_to_front.remove(&back) {
            self.front_to_back.remove(&previous_front);
        }
        self.front_to_back.insert(front.clone(), back.clone());
        self.back_to_front.insert(back, front);
    }

    /// Drops the pairing of a front key, returning its backing key.
    pub fn remove_front(&mut self, front: &Key) -> Option<Key> {
        let back = self.front_to_back.remove(front)?;
        self.back_to_front.remove(&back);
        Some(back)
    }

    /// Drops the pairing of a backing key, returning its front key.
    pub fn remove_back(&mut self, back: &Key) -> Option<Key> {
        let front = self.back_to_front.remove(back)?;
        self.front_to_back.remove(&front);
        Some(front)
    }

    /// The number of pairs.
    pub fn len(&self) -> usize {
        self.front_to_back.len()
    }

    /// Returns true if no keys are paired.
    pub fn is_empty(&self) -> bool {
        self.front_to_back.is_empty()
    }
}

impl FromIterator<(Key, Key)> for BiKeyMap {
    fn from_iter<T: IntoIterator<Item = (Key, Key)>>(iter: T) -> Self {
        let mut map = BiKeyMap::new();
        for (front, back) in iter {
            map.insert(front, back);
        }
        map
    }
}

impl KeyMap for BiKeyMap {
    fn front_key(&self, back: &Key) -> Option<Key> {
        self.back_to_front.get(back).cloned()
    }

    fn back_key(&self, front: &Key) -> Option<Key> {
        self.front_to_back.get(front).cloned()
    }
}
