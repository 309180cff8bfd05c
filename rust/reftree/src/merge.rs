/// The outcome of a three-way merge of one value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Merge<T> {
    /// Neither side changed the base value
    Unchanged,
    /// The merged value: the only side that changed, or the value both
    /// sides changed to
    Value(T),
    /// Both sides changed the base value in different ways
    Conflict {
        /// The local side
        local: T,
        /// The remote side
        remote: T,
    },
}

impl<T> Merge<T> {
    /// Returns true if the two sides disagree.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Merge::Conflict { .. })
    }

    /// The merged value, with `base` standing in for [`Merge::Unchanged`].
    /// Returns `None` for a conflict.
    pub fn into_value(self, base: T) -> Option<T> {
        match self {
            Merge::Unchanged => Some(base),
            Merge::Value(value) => Some(value),
            Merge::Conflict { .. } => None,
        }
    }
}

/// Merges two descendants of a common base value.
///
/// Use `Option<T>` to merge additions and removals alongside edits.
pub fn merge3<T>(base: &T, local: &T, remote: &T) -> Merge<T>
where
    T: Clone + PartialEq,
{
    match (local == base, remote == base) {
        (true, true) => Merge::Unchanged,
        (true, false) => Merge::Value(remote.clone()),
        (false, true) => Merge::Value(local.clone()),
        (false, false) if local == remote => Merge::Value(local.clone()),
        (false, false) => Merge::Conflict {
            local: local.clone(),
            remote: remote.clone(),
        },
    }
}
