//! Owner resolution.
//!
//! An owner is referenced by a type tag and an id. Directories decide which
//! references are valid; they compose as ordinary values, e.g.
//! `AliasDirectory::new(aliases, FallbackDirectory::new(vec![users, orders]))`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{LedgerError, LedgerResult};
use crate::model::OwnerRef;

/// Resolves `(owner_type, owner_id)` into an owner reference.
pub trait OwnerDirectory: Send + Sync {
    /// Resolves an owner, failing with `OwnerNotFound` if it does not exist.
    fn resolve(&self, owner_type: &str, owner_id: &str) -> LedgerResult<OwnerRef>;
}

impl<D: OwnerDirectory + ?Sized> OwnerDirectory for Arc<D> {
    fn resolve(&self, owner_type: &str, owner_id: &str) -> LedgerResult<OwnerRef> {
        (**self).resolve(owner_type, owner_id)
    }
}

fn not_found(owner_type: &str, owner_id: &str) -> LedgerError {
    LedgerError::OwnerNotFound {
        owner_type: owner_type.to_string(),
        owner_id: owner_id.to_string(),
    }
}

/// Accepts every owner.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOwnerDirectory;

impl OwnerDirectory for OpenOwnerDirectory {
    fn resolve(&self, owner_type: &str, owner_id: &str) -> LedgerResult<OwnerRef> {
        Ok(OwnerRef::new(owner_type, owner_id))
    }
}

/// A fixed set of known owners.
#[derive(Debug, Clone, Default)]
pub struct StaticOwnerDirectory {
    owners: HashMap<String, HashSet<String>>,
}

impl StaticOwnerDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an owner.
    #[must_use]
    pub fn with_owner(mut self, owner_type: impl Into<String>, owner_id: impl Into<String>) -> Self {
        self.owners
            .entry(owner_type.into())
            .or_default()
            .insert(owner_id.into());
        self
    }
}

impl OwnerDirectory for StaticOwnerDirectory {
    fn resolve(&self, owner_type: &str, owner_id: &str) -> LedgerResult<OwnerRef> {
        self.owners
            .get(owner_type)
            .filter(|ids| ids.contains(owner_id))
            .map(|_| OwnerRef::new(owner_type, owner_id))
            .ok_or_else(|| not_found(owner_type, owner_id))
    }
}

/// Rewrites owner type aliases before delegating.
#[derive(Debug, Clone)]
pub struct AliasDirectory<D> {
    aliases: HashMap<String, String>,
    inner: D,
}

impl<D: OwnerDirectory> AliasDirectory<D> {
    /// Wraps `inner` with an alias → canonical type map.
    pub fn new(aliases: HashMap<String, String>, inner: D) -> Self {
        Self { aliases, inner }
    }

    /// Canonical name of `owner_type`.
    #[must_use]
    pub fn canonical<'a>(&'a self, owner_type: &'a str) -> &'a str {
        self.aliases.get(owner_type).map_or(owner_type, String::as_str)
    }
}

impl<D: OwnerDirectory> OwnerDirectory for AliasDirectory<D> {
    fn resolve(&self, owner_type: &str, owner_id: &str) -> LedgerResult<OwnerRef> {
        self.inner.resolve(self.canonical(owner_type), owner_id)
    }
}

/// Tries each directory in turn; the first that knows the owner wins.
#[derive(Clone, Default)]
pub struct FallbackDirectory {
    sources: Vec<Arc<dyn OwnerDirectory>>,
}

impl FallbackDirectory {
    /// Creates a directory over `sources`, in priority order.
    #[must_use]
    pub fn new(sources: Vec<Arc<dyn OwnerDirectory>>) -> Self {
        Self { sources }
    }

    /// Appends a lower-priority source.
    #[must_use]
    pub fn or(mut self, source: impl OwnerDirectory + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }
}

impl OwnerDirectory for FallbackDirectory {
    fn resolve(&self, owner_type: &str, owner_id: &str) -> LedgerResult<OwnerRef> {
        for source in &self.sources {
            match source.resolve(owner_type, owner_id) {
                Err(LedgerError::OwnerNotFound { .. }) => {}
                other => return other,
            }
        }
        Err(not_found(owner_type, owner_id))
    }
}
