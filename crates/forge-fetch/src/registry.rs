//! Forge registry
//!
//! Maps a locator type tag to its [`Forge`]. Built once at startup and handed
//! by reference to whatever dispatches on locators.

use crate::error::FetchError;
use crate::forge::{Forge, ForgeKind, GitHub, GitLab, SourceHut};
use crate::locator::{Attrs, Locator};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct ForgeRegistry {
    forges: BTreeMap<ForgeKind, Arc<dyn Forge>>,
}

impl ForgeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the three built-in forges
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GitHub));
        registry.register(Arc::new(GitLab));
        registry.register(Arc::new(SourceHut));
        registry
    }

    /// Register a forge under its type tag. Registration is append-only:
    /// returns `false` and keeps the existing entry if the tag is taken.
    pub fn register(&mut self, forge: Arc<dyn Forge>) -> bool {
        let kind = forge.kind();
        if self.forges.contains_key(&kind) {
            return false;
        }
        self.forges.insert(kind, forge);
        true
    }

    pub fn get(&self, kind: ForgeKind) -> Option<&dyn Forge> {
        self.forges.get(&kind).map(|forge| forge.as_ref())
    }

    /// Registered type tags, in order
    pub fn kinds(&self) -> impl Iterator<Item = ForgeKind> + '_ {
        self.forges.keys().copied()
    }

    /// The forge responsible for `locator`
    pub fn forge_for(&self, locator: &Locator) -> Result<&dyn Forge, FetchError> {
        self.get(locator.kind())
            .ok_or_else(|| FetchError::UnknownForge(locator.kind().scheme().to_string()))
    }

    /// Parse a compact locator URL whose scheme is registered here
    pub fn parse(&self, url: &str) -> Result<Locator, FetchError> {
        let locator = Locator::parse(url)?;
        self.forge_for(&locator)?;
        Ok(locator)
    }

    /// Validate an attribute set whose `type` is registered here
    pub fn from_attrs(&self, attrs: Attrs) -> Result<Locator, FetchError> {
        let locator = Locator::from_attrs(attrs)?;
        self.forge_for(&locator)?;
        Ok(locator)
    }
}

impl std::fmt::Debug for ForgeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.forges.keys()).finish()
    }
}
