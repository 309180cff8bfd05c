use std::{fmt::Debug, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::ReftreeError;

fn enabled() -> bool {
    true
}

/// Settings for dereferencing views.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    /// Fail with [`ReftreeError::StaleProxy`] when a proxy node is read
    /// after one of its source trees was modified.
    #[serde(default = "enabled")]
    pub check_staleness: bool,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            check_staleness: true,
        }
    }
}

/// Settings for trees created by an [`crate::Engine`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSettings {
    /// The first key handed out for automatically keyed children of opaque
    /// parents.
    #[serde(default)]
    pub first_opaque_key: u64,
}

/// All engine settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// See [`ProxySettings`]
    #[serde(default)]
    pub proxy: ProxySettings,
    /// See [`TreeSettings`]
    #[serde(default)]
    pub tree: TreeSettings,
}

/// A callback that receives reference resolution failures from a
/// dereferencing view.
///
/// When a view has a [`Trap`], a reference whose target cannot be found is
/// handed to the trap and the read yields an absent result. Without one the
/// failure is fatal to the read: the accessor returns
/// [`ReftreeError::ReferenceResolution`] and the view never panics.
#[derive(Clone)]
pub struct Trap(Arc<dyn Fn(&ReftreeError) + Send + Sync>);

impl Trap {
    /// Wraps a callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&ReftreeError) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    /// A trap that records every failure as a `tracing` warning.
    pub fn log() -> Self {
        Self::new(|error| tracing::warn!(error = %error, "Dereferencing failed"))
    }

    /// Hands `error` to the callback.
    pub fn spring(&self, error: &ReftreeError) {
        (self.0)(error)
    }
}

impl Debug for Trap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Trap").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use std::collections::BTreeMap;

    use anyhow::Result;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::Key;

    #[test]
    fn it_checks_staleness_by_default() {
        assert!(ProxySettings::default().check_staleness);
        assert!(EngineSettings::default().proxy.check_staleness);
        assert_eq!(EngineSettings::default().tree.first_opaque_key, 0);
    }

    #[test]
    fn it_fills_in_missing_settings_when_deserialized() -> Result<()> {
        let partial = BTreeMap::from([
            ("proxy".to_string(), BTreeMap::<String, u64>::new()),
            (
                "tree".to_string(),
                BTreeMap::from([("first_opaque_key".to_string(), 7u64)]),
            ),
        ]);
        let bytes = serde_ipld_dagcbor::to_vec(&partial)?;
        let settings: EngineSettings = serde_ipld_dagcbor::from_slice(&bytes)?;
        assert_eq!(
            settings,
            EngineSettings {
                proxy: ProxySettings {
                    check_staleness: true
                },
                tree: TreeSettings {
                    first_opaque_key: 7
                },
            }
        );

        let empty = serde_ipld_dagcbor::to_vec(&BTreeMap::<String, u64>::new())?;
        let settings: EngineSettings = serde_ipld_dagcbor::from_slice(&empty)?;
        assert_eq!(settings, EngineSettings::default());
        Ok(())
    }

    #[test]
    fn it_honors_disabled_staleness_checks() -> Result<()> {
        let bytes = serde_ipld_dagcbor::to_vec(&BTreeMap::from([(
            "check_staleness".to_string(),
            false,
        )]))?;
        let settings: ProxySettings = serde_ipld_dagcbor::from_slice(&bytes)?;
        assert!(!settings.check_staleness);
        Ok(())
    }

    #[test]
    fn it_forwards_errors_to_the_callback() {
        let count = Arc::new(AtomicUsize::new(0));
        let trap = {
            let count = count.clone();
            Trap::new(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        trap.spring(&ReftreeError::NodeNotFound(Key::number(1)));
        trap.clone().spring(&ReftreeError::NodeNotFound(Key::number(2)));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
