//! Dependency resolution
//!
//! Walks the dependency graph of one top-level package, registering every
//! newly resolved library in the shared [`ResolutionCache`]. Cached libraries
//! are accepted or rejected by the [`ConflictPolicy`]; an accepted cache hit
//! truncates the walk, which keeps diamond and cyclic graphs linear in the
//! number of distinct names.
//!
//! A failed walk leaves its partial insertions in the cache. The caller rolls
//! them back by source package.

use crate::cache::{CacheEntry, ConflictDecision, ConflictPolicy, ConflictReason, ResolutionCache};
use crate::cancel::CancellationToken;
use crate::framework::Framework;
use crate::library::{library_key, LibraryIdentity, LibraryRange, ResolvedLibrary};
use crate::license::{LicenseGate, PackageLicenseInfo};
use crate::registry::{MetadataSource, RegistryError};
use crate::semver::Version;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during dependency resolution
#[derive(Debug, Error)]
pub enum ResolverError {
    /// Cached library cannot be replaced by the requested version
    #[error("Version conflict for {name}: {cached} is installed, {requested} was requested ({reason})")]
    VersionConflict {
        name: String,
        cached: Version,
        requested: Version,
        reason: ConflictReason,
    },

    /// No published version satisfies the range
    #[error("No version of {name} satisfies {range}")]
    NoMatchingVersion { name: String, range: String },

    /// Metadata could not be fetched
    #[error("Failed to fetch metadata for {name}: {source}")]
    Fetch {
        name: String,
        #[source]
        source: RegistryError,
    },

    /// Walk was cancelled
    #[error("Resolution cancelled")]
    Cancelled,
}

/// One node of a resolved dependency tree
#[derive(Debug, Clone)]
pub struct ResolvedNode {
    pub library: Arc<ResolvedLibrary>,
    /// Served from the cache; children were not walked
    pub from_cache: bool,
    pub children: Vec<ResolvedNode>,
}

impl ResolvedNode {
    fn cached(library: Arc<ResolvedLibrary>) -> Self {
        Self {
            library,
            from_cache: true,
            children: Vec::new(),
        }
    }

    /// Number of nodes in the tree
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(ResolvedNode::node_count).sum::<usize>()
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}{}", "", self.library.identity, indent = depth * 2)?;
        if !self.library.target_framework.is_any() {
            write!(f, " [{}]", self.library.target_framework)?;
        }
        if self.from_cache {
            write!(f, " (cached)")?;
        }
        writeln!(f)?;
        for child in &self.children {
            child.write_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for ResolvedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}

/// What a completed walk produced
#[derive(Debug)]
pub struct WalkReport {
    pub root: ResolvedNode,
    /// Newly resolved libraries in resolution order
    pub packages_to_install: Vec<Arc<ResolvedLibrary>>,
    pub licenses: LicenseGate,
    /// Metadata requests issued
    pub fetches: usize,
}

/// Recursive walker for one top-level package
pub struct DependencyWalker<'a> {
    cache: &'a ResolutionCache,
    source: &'a dyn MetadataSource,
    framework: Framework,
    root: String,
    cancel: CancellationToken,
    to_install: Vec<Arc<ResolvedLibrary>>,
    licenses: LicenseGate,
    added: HashSet<String>,
    fetches: usize,
}

impl<'a> DependencyWalker<'a> {
    /// Create a walker that records insertions as installed from `root`
    pub fn new(
        cache: &'a ResolutionCache,
        source: &'a dyn MetadataSource,
        framework: Framework,
        root: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            source,
            framework,
            root: root.into(),
            cancel: CancellationToken::new(),
            to_install: Vec::new(),
            licenses: LicenseGate::new(),
            added: HashSet::new(),
            fetches: 0,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Resolve `range` and everything below it
    pub fn walk(mut self, range: &LibraryRange) -> Result<WalkReport, ResolverError> {
        let root = self.resolve(range)?;
        self.prune_unreachable(&range.name);
        let root = self.refresh(root);
        Ok(WalkReport {
            root,
            packages_to_install: self.to_install,
            licenses: self.licenses,
            fetches: self.fetches,
        })
    }

    /// Resolve one range, recursing into the dependencies of new libraries
    pub fn resolve(&mut self, range: &LibraryRange) -> Result<ResolvedNode, ResolverError> {
        self.check_cancelled()?;
        let name = range.name.as_str();

        let requested = match range.range.min_version() {
            Some(min) if range.range.is_min_inclusive() => min.clone(),
            _ => {
                if let Some(cached) = self.cache.lookup(name) {
                    if range.range.satisfies(cached.resolved.version()) {
                        debug!(library = name, version = %cached.resolved.version(), "cache hit");
                        return Ok(ResolvedNode::cached(cached.resolved));
                    }
                }
                self.lowest_published(range)?
            }
        };

        loop {
            if let Some(cached) = self.cache.lookup(name) {
                let depended_upon = self.cache.is_source_of_any(cached.resolved.name());
                match ConflictPolicy::decide(&cached, &requested, &self.root, depended_upon) {
                    ConflictDecision::Accept => {
                        debug!(library = name, version = %cached.resolved.version(), "cache hit");
                        return Ok(ResolvedNode::cached(cached.resolved));
                    }
                    ConflictDecision::Reject(reason) => {
                        return Err(ResolverError::VersionConflict {
                            name: cached.resolved.name().to_string(),
                            cached: cached.resolved.version().clone(),
                            requested,
                            reason,
                        });
                    }
                    ConflictDecision::EvictAndRetry => {
                        debug!(library = name, stale = %cached.resolved.version(), "evicting");
                        self.cache.remove(name);
                        let key = library_key(name);
                        self.to_install.retain(|library| library_key(library.name()) != key);
                        self.added.remove(&key);
                        self.licenses.withdraw(name);
                        continue;
                    }
                }
            }

            self.check_cancelled()?;
            debug!(library = name, version = %requested, "cache miss, fetching metadata");
            self.fetches += 1;
            let info = self
                .source
                .get_dependencies(name, &requested, &self.framework)
                .map_err(|source| ResolverError::Fetch {
                    name: name.to_string(),
                    source,
                })?;

            let library = Arc::new(ResolvedLibrary::new(
                LibraryIdentity::new(name, requested.clone(), range.kind),
                info.resolved_framework,
                info.dependencies,
            ));

            if !self
                .cache
                .try_insert(name, CacheEntry::installed_from(library.clone(), &self.root))
            {
                // Another resolution inserted the name first; decide against it
                continue;
            }

            self.to_install.push(library.clone());
            if self.added.insert(library_key(name)) && info.requires_license_acceptance {
                self.licenses.require(PackageLicenseInfo {
                    package_name: name.to_string(),
                    version: requested.clone(),
                    license: info.license,
                    authors: info.authors,
                });
            }

            let mut children = Vec::with_capacity(library.dependencies.len());
            for dependency in &library.dependencies {
                children.push(self.resolve(&LibraryRange::from_dependency(dependency))?);
            }

            return Ok(ResolvedNode {
                library,
                from_cache: false,
                children,
            });
        }
    }

    /// Drop libraries of this walk that only an evicted version needed
    fn prune_unreachable(&mut self, root: &str) {
        let mut reachable = HashSet::new();
        let mut pending = vec![root.to_string()];
        while let Some(name) = pending.pop() {
            if !reachable.insert(library_key(&name)) {
                continue;
            }
            if let Some(entry) = self.cache.lookup(&name) {
                pending.extend(entry.resolved.dependencies.iter().map(|dep| dep.name.clone()));
            }
        }

        let (kept, orphaned): (Vec<_>, Vec<_>) = std::mem::take(&mut self.to_install)
            .into_iter()
            .partition(|library| reachable.contains(&library_key(library.name())));
        for library in &orphaned {
            debug!(library = %library.identity, "pruning dependency of evicted version");
            self.cache.remove_exact(library.name(), library);
            self.added.remove(&library_key(library.name()));
            self.licenses.withdraw(library.name());
        }
        self.to_install = kept;
    }

    /// Point nodes of evicted versions at the library that replaced them
    fn refresh(&self, node: ResolvedNode) -> ResolvedNode {
        if node.from_cache {
            return node;
        }
        match self.cache.lookup(node.library.name()) {
            Some(entry) if !Arc::ptr_eq(&entry.resolved, &node.library) => {
                ResolvedNode::cached(entry.resolved)
            }
            _ => {
                let children = node
                    .children
                    .into_iter()
                    .map(|child| self.refresh(child))
                    .collect();
                ResolvedNode {
                    library: node.library,
                    from_cache: false,
                    children,
                }
            }
        }
    }

    /// Lowest published version inside a range without an inclusive floor
    fn lowest_published(&mut self, range: &LibraryRange) -> Result<Version, ResolverError> {
        self.check_cancelled()?;
        self.fetches += 1;
        let versions = self
            .source
            .get_all_versions(&range.name)
            .map_err(|source| ResolverError::Fetch {
                name: range.name.clone(),
                source,
            })?;

        versions
            .into_iter()
            .find(|version| range.range.satisfies(version))
            .ok_or_else(|| ResolverError::NoMatchingVersion {
                name: range.name.clone(),
                range: range.range.to_string(),
            })
    }

    fn check_cancelled(&self) -> Result<(), ResolverError> {
        if self.cancel.is_cancelled() {
            Err(ResolverError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::DependencyRange;
    use crate::registry::PackageMetadata;
    use crate::semver::VersionRange;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Feed {
        packages: HashMap<(String, String), PackageMetadata>,
        fetches: AtomicUsize,
    }

    impl Feed {
        fn add(&mut self, name: &str, version: &str, deps: &[(&str, &str)]) {
            let mut metadata = PackageMetadata::new(name, Version::parse(version).unwrap());
            if !deps.is_empty() {
                metadata.dependency_groups.push(crate::registry::DependencyGroup {
                    target_framework: Framework::parse("netstandard2.0").unwrap(),
                    dependencies: deps
                        .iter()
                        .map(|(n, r)| DependencyRange::new(*n, VersionRange::parse(r).unwrap()))
                        .collect(),
                });
            }
            self.packages
                .insert((library_key(name), version.to_string()), metadata);
        }
    }

    impl MetadataSource for Feed {
        fn get_metadata(&self, name: &str, version: &Version) -> Result<PackageMetadata, RegistryError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.packages
                .get(&(library_key(name), version.to_string()))
                .cloned()
                .ok_or_else(|| RegistryError::PackageNotFound(name.to_string()))
        }

        fn get_all_versions(&self, name: &str) -> Result<Vec<Version>, RegistryError> {
            let mut versions: Vec<Version> = self
                .packages
                .values()
                .filter(|m| m.id.eq_ignore_ascii_case(name))
                .map(|m| m.version.clone())
                .collect();
            versions.sort();
            Ok(versions)
        }

        fn search(&self, _query: &str, _take: usize) -> Result<Vec<String>, RegistryError> {
            Ok(Vec::new())
        }
    }

    fn net6() -> Framework {
        Framework::parse("net6.0").unwrap()
    }

    fn request(name: &str, version: &str) -> LibraryRange {
        LibraryRange::package(name, Version::parse(version).unwrap())
    }

    #[test]
    fn test_walk_registers_closure() {
        let mut feed = Feed::default();
        feed.add("App", "1.0.0", &[("Util", "2.0.0"), ("Lib", "1.0.0")]);
        feed.add("Lib", "1.0.0", &[("Util", "1.0.0")]);
        feed.add("Util", "2.0.0", &[]);
        let cache = ResolutionCache::new();

        let report = DependencyWalker::new(&cache, &feed, net6(), "App")
            .walk(&request("App", "1.0.0"))
            .unwrap();

        assert_eq!(report.packages_to_install.len(), 3);
        assert_eq!(report.fetches, 3);
        assert_eq!(cache.lookup("util").unwrap().resolved.version(), &Version::new(2, 0, 0));
        assert_eq!(report.root.node_count(), 4);
        assert!(report.root.children[1].children[0].from_cache);
    }

    #[test]
    fn test_cycle_terminates() {
        let mut feed = Feed::default();
        feed.add("A", "1.0.0", &[("B", "1.0.0")]);
        feed.add("B", "1.0.0", &[("A", "1.0.0")]);
        let cache = ResolutionCache::new();

        let report = DependencyWalker::new(&cache, &feed, net6(), "A")
            .walk(&request("A", "1.0.0"))
            .unwrap();
        assert_eq!(report.packages_to_install.len(), 2);
        assert_eq!(feed.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_evicts_lower_version_from_same_walk() {
        let mut feed = Feed::default();
        feed.add("App", "1.0.0", &[("Left", "1.0.0"), ("Right", "1.0.0")]);
        feed.add("Left", "1.0.0", &[("Shared", "1.0.0")]);
        feed.add("Right", "1.0.0", &[("Shared", "2.0.0")]);
        feed.add("Shared", "1.0.0", &[]);
        feed.add("Shared", "2.0.0", &[]);
        let cache = ResolutionCache::new();

        let report = DependencyWalker::new(&cache, &feed, net6(), "App")
            .walk(&request("App", "1.0.0"))
            .unwrap();

        let shared: Vec<_> = report
            .packages_to_install
            .iter()
            .filter(|l| l.name() == "Shared")
            .collect();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].version(), &Version::new(2, 0, 0));
    }

    fn require_license(feed: &mut Feed, name: &str, version: &str) {
        feed.packages
            .get_mut(&(library_key(name), version.to_string()))
            .unwrap()
            .require_license_acceptance = true;
    }

    fn diamond_feed() -> Feed {
        let mut feed = Feed::default();
        feed.add("App", "1.0.0", &[("Left", "1.0.0"), ("Right", "1.0.0")]);
        feed.add("Left", "1.0.0", &[("Shared", "1.0.0")]);
        feed.add("Right", "1.0.0", &[("Shared", "2.0.0")]);
        feed.add("Shared", "1.0.0", &[("Helper", "1.0.0")]);
        feed.add("Shared", "2.0.0", &[]);
        feed.add("Helper", "1.0.0", &[]);
        feed
    }

    #[test]
    fn test_replacement_version_license_is_queued() {
        let mut feed = diamond_feed();
        require_license(&mut feed, "Shared", "2.0.0");
        let cache = ResolutionCache::new();

        let report = DependencyWalker::new(&cache, &feed, net6(), "App")
            .walk(&request("App", "1.0.0"))
            .unwrap();

        assert!(!report.licenses.is_open());
        assert_eq!(report.licenses.pending().len(), 1);
        assert_eq!(report.licenses.pending()[0].version, Version::new(2, 0, 0));
    }

    #[test]
    fn test_evicted_version_license_is_withdrawn() {
        let mut feed = diamond_feed();
        require_license(&mut feed, "Shared", "1.0.0");
        require_license(&mut feed, "Helper", "1.0.0");
        let cache = ResolutionCache::new();

        let report = DependencyWalker::new(&cache, &feed, net6(), "App")
            .walk(&request("App", "1.0.0"))
            .unwrap();
        assert!(report.licenses.is_open());
    }

    #[test]
    fn test_eviction_prunes_orphaned_dependencies() {
        let feed = diamond_feed();
        let cache = ResolutionCache::new();

        let report = DependencyWalker::new(&cache, &feed, net6(), "App")
            .walk(&request("App", "1.0.0"))
            .unwrap();

        let names: Vec<_> = report.packages_to_install.iter().map(|l| l.name()).collect();
        assert_eq!(names, vec!["App", "Left", "Right", "Shared"]);
        assert!(!cache.contains("Helper"));

        // Left now points at the replacement instead of the stale subtree
        let left = &report.root.children[0];
        assert!(left.children[0].from_cache);
        assert_eq!(left.children[0].library.version(), &Version::new(2, 0, 0));
        assert_eq!(report.root.node_count(), 5);
    }

    #[test]
    fn test_eviction_keeps_dependencies_still_reachable() {
        let mut feed = diamond_feed();
        feed.add(
            "App",
            "1.0.0",
            &[("Left", "1.0.0"), ("Right", "1.0.0"), ("Helper", "1.0.0")],
        );
        let cache = ResolutionCache::new();

        let report = DependencyWalker::new(&cache, &feed, net6(), "App")
            .walk(&request("App", "1.0.0"))
            .unwrap();

        assert!(report.packages_to_install.iter().any(|l| l.name() == "Helper"));
        assert!(cache.lookup("Helper").unwrap().provenance.is_from("App"));
    }

    /// Feed that lets a competing resolution win the first insert of a name
    struct RacingFeed<'c> {
        inner: Feed,
        cache: &'c ResolutionCache,
        competitor: Mutex<Option<(String, CacheEntry)>>,
    }

    impl<'c> RacingFeed<'c> {
        fn new(
            inner: Feed,
            cache: &'c ResolutionCache,
            name: &str,
            version: &str,
            owner: &str,
        ) -> Self {
            let library = Arc::new(ResolvedLibrary::new(
                LibraryIdentity::package(name, Version::parse(version).unwrap()),
                Framework::any(),
                Vec::new(),
            ));
            Self {
                inner,
                cache,
                competitor: Mutex::new(Some((
                    name.to_string(),
                    CacheEntry::installed_from(library, owner),
                ))),
            }
        }
    }

    impl MetadataSource for RacingFeed<'_> {
        fn get_metadata(&self, name: &str, version: &Version) -> Result<PackageMetadata, RegistryError> {
            let result = self.inner.get_metadata(name, version);
            let mut competitor = self.competitor.lock();
            if matches!(&*competitor, Some((n, _)) if n.eq_ignore_ascii_case(name)) {
                if let Some((n, entry)) = competitor.take() {
                    assert!(self.cache.try_insert(&n, entry));
                }
            }
            result
        }

        fn get_all_versions(&self, name: &str) -> Result<Vec<Version>, RegistryError> {
            self.inner.get_all_versions(name)
        }

        fn search(&self, query: &str, take: usize) -> Result<Vec<String>, RegistryError> {
            self.inner.search(query, take)
        }
    }

    fn app_with_lib() -> Feed {
        let mut feed = Feed::default();
        feed.add("App", "1.0.0", &[("Lib", "1.0.0")]);
        feed.add("Lib", "1.0.0", &[]);
        feed
    }

    #[test]
    fn test_lost_insert_accepts_newer_winner() {
        let cache = ResolutionCache::new();
        let feed = RacingFeed::new(app_with_lib(), &cache, "Lib", "2.0.0", "Other");

        let report = DependencyWalker::new(&cache, &feed, net6(), "App")
            .walk(&request("App", "1.0.0"))
            .unwrap();

        let names: Vec<_> = report.packages_to_install.iter().map(|l| l.name()).collect();
        assert_eq!(names, vec!["App"]);
        assert!(report.root.children[0].from_cache);
        let lib = cache.lookup("Lib").unwrap();
        assert_eq!(lib.resolved.version(), &Version::new(2, 0, 0));
        assert!(lib.provenance.is_from("Other"));
        assert_eq!(feed.inner.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_lost_insert_rejects_older_winner() {
        let cache = ResolutionCache::new();
        let feed = RacingFeed::new(app_with_lib(), &cache, "Lib", "0.5.0", "Other");

        let err = DependencyWalker::new(&cache, &feed, net6(), "App")
            .walk(&request("App", "1.0.0"))
            .unwrap_err();

        assert!(matches!(
            err,
            ResolverError::VersionConflict {
                reason: ConflictReason::OwnedBy(ref owner),
                ..
            } if owner == "Other"
        ));
        assert_eq!(cache.lookup("Lib").unwrap().resolved.version(), &Version::new(0, 5, 0));
    }

    #[test]
    fn test_range_without_inclusive_floor_uses_lowest_published() {
        let mut feed = Feed::default();
        feed.add("App", "1.0.0", &[("Lib", "(1.0.0, )")]);
        feed.add("Lib", "1.0.0", &[]);
        feed.add("Lib", "1.5.0", &[]);
        feed.add("Lib", "2.0.0", &[]);
        let cache = ResolutionCache::new();

        DependencyWalker::new(&cache, &feed, net6(), "App")
            .walk(&request("App", "1.0.0"))
            .unwrap();
        assert_eq!(cache.lookup("Lib").unwrap().resolved.version(), &Version::new(1, 5, 0));
    }

    #[test]
    fn test_missing_package_is_fetch_error() {
        let feed = Feed::default();
        let cache = ResolutionCache::new();

        let err = DependencyWalker::new(&cache, &feed, net6(), "Nope")
            .walk(&request("Nope", "1.0.0"))
            .unwrap_err();
        assert!(matches!(err, ResolverError::Fetch { ref source, .. } if source.is_not_found()));
    }

    #[test]
    fn test_cancelled_walk_stops_before_fetching() {
        let mut feed = Feed::default();
        feed.add("App", "1.0.0", &[]);
        let cache = ResolutionCache::new();
        let token = CancellationToken::new();
        token.cancel();

        let err = DependencyWalker::new(&cache, &feed, net6(), "App")
            .with_cancellation(token)
            .walk(&request("App", "1.0.0"))
            .unwrap_err();
        assert!(matches!(err, ResolverError::Cancelled));
        assert_eq!(feed.fetches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_license_queued_once_per_name() {
        let mut feed = Feed::default();
        feed.add("App", "1.0.0", &[("Lib", "1.0.0")]);
        feed.add("Lib", "1.0.0", &[]);
        feed.packages
            .get_mut(&("lib".to_string(), "1.0.0".to_string()))
            .unwrap()
            .require_license_acceptance = true;
        let cache = ResolutionCache::new();

        let report = DependencyWalker::new(&cache, &feed, net6(), "App")
            .walk(&request("App", "1.0.0"))
            .unwrap();
        assert_eq!(report.licenses.pending().len(), 1);
        assert_eq!(report.licenses.pending()[0].package_name, "Lib");
    }
}
