//! Resolution cache
//!
//! Maps library names to their resolved record. Entries are either `Fixed`
//! (part of the host runtime, never replaced or removed) or installed as a
//! side effect of some top-level package, which is recorded as their source.
//!
//! The cache is shared between the active installation and readers such as
//! a UI listing. Insertion is insert-if-absent so two resolutions racing on
//! the same name cannot both win.

mod policy;

pub use policy::{ConflictDecision, ConflictPolicy, ConflictReason};

use crate::library::{library_key, ResolvedLibrary};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Where a cache entry came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    /// Baseline runtime library
    Fixed,
    /// Installed while resolving the named top-level package
    InstalledFrom(String),
}

impl Provenance {
    /// Whether this entry was installed on behalf of `package`
    pub fn is_from(&self, package: &str) -> bool {
        matches!(self, Provenance::InstalledFrom(source) if source.eq_ignore_ascii_case(package))
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Fixed => write!(f, "fixed"),
            Provenance::InstalledFrom(source) => write!(f, "installed from {}", source),
        }
    }
}

/// A cached resolution result and its provenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub resolved: Arc<ResolvedLibrary>,
    pub provenance: Provenance,
}

impl CacheEntry {
    pub fn fixed(resolved: ResolvedLibrary) -> Self {
        Self {
            resolved: Arc::new(resolved),
            provenance: Provenance::Fixed,
        }
    }

    pub fn installed_from(resolved: Arc<ResolvedLibrary>, source: impl Into<String>) -> Self {
        Self {
            resolved,
            provenance: Provenance::InstalledFrom(source.into()),
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.provenance == Provenance::Fixed
    }

    /// Source package name, `None` for fixed entries
    pub fn source(&self) -> Option<&str> {
        match &self.provenance {
            Provenance::Fixed => None,
            Provenance::InstalledFrom(source) => Some(source),
        }
    }
}

/// Concurrent map from library name to its resolved record
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: DashMap<String, CacheEntry>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache seeded with baseline runtime libraries
    pub fn with_fixed<I>(libraries: I) -> Self
    where
        I: IntoIterator<Item = ResolvedLibrary>,
    {
        let cache = Self::new();
        for library in libraries {
            cache.insert_fixed(library);
        }
        cache
    }

    /// Register a baseline library
    ///
    /// A fixed entry is never downgraded: registering a lower version than the
    /// one already present is ignored. Non-fixed entries are replaced.
    pub fn insert_fixed(&self, library: ResolvedLibrary) {
        let key = library_key(library.name());
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                if current.is_fixed() && current.resolved.version() >= library.version() {
                    return;
                }
                occupied.insert(CacheEntry::fixed(library));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::fixed(library));
            }
        }
    }

    /// Look up the entry for a library name
    pub fn lookup(&self, name: &str) -> Option<CacheEntry> {
        self.entries.get(&library_key(name)).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&library_key(name))
    }

    /// Insert an entry unless one already exists for the name
    ///
    /// Returns `false` when the name was already present; the caller should
    /// re-read the winner and decide again.
    pub fn try_insert(&self, name: &str, entry: CacheEntry) -> bool {
        match self.entries.entry(library_key(name)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                true
            }
        }
    }

    /// Remove a non-fixed entry
    ///
    /// Fixed entries are never removed; `None` is returned for them.
    pub fn remove(&self, name: &str) -> Option<CacheEntry> {
        self.entries
            .remove_if(&library_key(name), |_, entry| !entry.is_fixed())
            .map(|(_, entry)| entry)
    }

    /// Remove the entry for `name` only if it still holds `library`
    pub fn remove_exact(&self, name: &str, library: &Arc<ResolvedLibrary>) -> Option<CacheEntry> {
        self.entries
            .remove_if(&library_key(name), |_, entry| {
                !entry.is_fixed() && Arc::ptr_eq(&entry.resolved, library)
            })
            .map(|(_, entry)| entry)
    }

    /// Whether any entry names `package` as its source
    pub fn is_source_of_any(&self, package: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.value().provenance.is_from(package))
    }

    /// All entries installed on behalf of `package`
    pub fn entries_from(&self, package: &str) -> Vec<CacheEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.value().provenance.is_from(package))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Remove every entry installed on behalf of `package`
    pub fn rollback(&self, package: &str) -> Vec<CacheEntry> {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().provenance.is_from(package))
            .map(|entry| entry.key().clone())
            .collect();

        let removed: Vec<CacheEntry> = keys
            .iter()
            .filter_map(|key| {
                self.entries
                    .remove_if(key, |_, entry| entry.provenance.is_from(package))
                    .map(|(_, entry)| entry)
            })
            .collect();

        debug!(package, removed = removed.len(), "rolled back cache entries");
        removed
    }

    /// Move a non-fixed entry to a different source package
    pub fn rehome(&self, name: &str, new_source: &str) -> bool {
        match self.entries.get_mut(&library_key(name)) {
            Some(mut entry) if !entry.is_fixed() => {
                entry.provenance = Provenance::InstalledFrom(new_source.to_string());
                true
            }
            _ => false,
        }
    }

    /// Snapshot of all entries, sorted by name
    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by(|a, b| library_key(a.resolved.name()).cmp(&library_key(b.resolved.name())));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
