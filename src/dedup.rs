//! Request-scoped deduplication of emitted assets.
//!
//! Pages commonly render several bundles which share chunks (vendor code,
//! runtime). A [`Scope`] lives exactly as long as one render of one request
//! and remembers which assets were already emitted in it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::resolver::Asset;

/// Whether assets already emitted in the current scope are filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dedup {
    /// Drop assets which were already emitted in this scope.
    #[default]
    Enabled,
    /// Return every asset, but still record them as emitted.
    Disabled,
}

/// Set of asset names already emitted during one request.
///
/// Create one per request and drop it when the request ends. Never share a
/// scope between requests.
#[derive(Debug, Default)]
pub struct Scope {
    emitted: Option<HashSet<String>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters `assets` against this scope and records them as emitted.
    ///
    /// The output keeps the order of first appearance across the whole
    /// request; later duplicates are dropped, never reordered.
    pub fn filter_new(&mut self, assets: Vec<Asset>, dedup: Dedup) -> Vec<Asset> {
        let emitted = self.emitted.get_or_insert_with(HashSet::new);

        assets
            .into_iter()
            .filter(|asset| {
                let fresh = emitted.insert(asset.name.clone());
                fresh || dedup == Dedup::Disabled
            })
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.emitted
            .as_ref()
            .is_some_and(|emitted| emitted.contains(name))
    }

    pub fn len(&self) -> usize {
        self.emitted.as_ref().map_or(0, HashSet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A [`Scope`] for runtimes which resolve several bundles of one request
/// concurrently. Every filter call holds the lock for its whole duration, so
/// the order of first appearance is the order in which calls acquire it.
#[derive(Debug, Clone, Default)]
pub struct SharedScope {
    ptr: Arc<Mutex<Scope>>,
}

impl SharedScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_new(&self, assets: Vec<Asset>, dedup: Dedup) -> Vec<Asset> {
        self.ptr
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .filter_new(assets, dedup)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ptr
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }
}
