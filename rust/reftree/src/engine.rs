use crate::{
    AddressableTree, ChangeBuffer, Content, Delta, Donor, EngineSettings, KeyGenerator, KeyMap,
    MemoryTree, ProxyTree, ReftreeError, Resolver, Trap, TreeId, normalize,
};

/// Creates trees, views and change buffers that share one configuration.
///
/// ```
/// # use reftree::{Engine, EngineSettings, TreeId};
/// let engine = Engine::new(EngineSettings::default());
/// let tree = engine.tree::<String>(TreeId(1));
/// assert!(tree.is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct Engine {
    settings: EngineSettings,
    trap: Option<Trap>,
}

impl Engine {
    /// Create an engine with the given settings.
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            trap: None,
        }
    }

    /// Install a trap for every view and buffer this engine creates.
    pub fn with_trap(mut self, trap: Trap) -> Self {
        self.trap = Some(trap);
        self
    }

    /// The engine's settings.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// An empty tree whose opaque auto keys start at the configured value.
    pub fn tree<C: Content>(&self, id: TreeId) -> MemoryTree<C> {
        MemoryTree::builder(id)
            .keys(KeyGenerator::starting_at(self.settings.tree.first_opaque_key))
            .build()
    }

    /// A dereferencing view of `front` over `back`.
    pub fn proxy<'a, F, B, M>(&self, front: &'a F, back: &'a B, keys: M) -> ProxyTree<'a, F, B, M>
    where
        F: AddressableTree + ?Sized,
        B: AddressableTree<Content = F::Content> + ?Sized,
        M: KeyMap,
    {
        ProxyTree::new(front, back, keys)
            .with_settings(self.settings.proxy)
            .with_trap(self.trap.clone())
    }

    /// An empty change buffer over `backing`.
    pub fn change_buffer<'b, B>(&self, backing: &'b B) -> ChangeBuffer<'b, B>
    where
        B: AddressableTree + ?Sized,
    {
        ChangeBuffer::new(backing)
            .with_settings(self.settings.proxy)
            .with_trap(self.trap.clone())
    }

    /// Computes the delta that turns `base` into `target`.
    pub fn delta<C: Content>(
        &self,
        target: Donor<'_, C>,
        base: Donor<'_, C>,
    ) -> Result<Delta<C>, ReftreeError> {
        let resolver = Resolver::new().with(base);
        let normalized = normalize(&[target], &resolver)?
            .pop()
            .ok_or_else(|| ReftreeError::MalformedDelta("nothing was normalized".into()))?;

        tracing::debug!(
            base = %base.id(),
            target = %target.id(),
            nodes = normalized.tree.len(),
            references = normalized.references.len(),
            "Computed delta"
        );
        Ok(Delta::from_normalized(base.id(), normalized))
    }

    /// Verifies `delta` against `base` and expands it into an explicit tree.
    pub fn reconstruct<C: Content>(
        &self,
        delta: &Delta<C>,
        base: Donor<'_, C>,
    ) -> Result<MemoryTree<C>, ReftreeError> {
        delta.verify(base)?;
        delta.expand(base)
    }
}
