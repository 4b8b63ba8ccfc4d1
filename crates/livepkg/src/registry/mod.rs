//! Package metadata and archive sources
//!
//! The engine talks to feeds through [`MetadataSource`] and [`ArchiveSource`].
//! [`RegistryClient`] implements both over a NuGet v3 flat container;
//! [`LocalFeed`] serves a directory of package archives.

mod api;
mod client;
mod local;
mod nuspec;

pub use api::{SearchResponse, SearchResult, VersionIndex};
pub use client::{RegistryClient, RegistryError};
pub use local::LocalFeed;
pub use nuspec::{DependencyGroup, NuspecError, PackageMetadata};

use crate::framework::Framework;
use crate::library::DependencyRange;
use crate::semver::Version;

/// Dependencies of one package for one target framework
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyInfo {
    /// Framework of the selected dependency group, `Any` if none matched
    pub resolved_framework: Framework,
    pub dependencies: Vec<DependencyRange>,
    pub requires_license_acceptance: bool,
    /// License expression or URL
    pub license: Option<String>,
    pub authors: Vec<String>,
}

impl DependencyInfo {
    /// Select the dependency group of `metadata` nearest to `target`
    pub fn select(metadata: &PackageMetadata, target: &Framework) -> Self {
        let (resolved_framework, dependencies) = match metadata.nearest_group(target) {
            Some(group) => (group.target_framework.clone(), group.dependencies.clone()),
            None => (Framework::any(), Vec::new()),
        };

        Self {
            resolved_framework,
            dependencies,
            requires_license_acceptance: metadata.require_license_acceptance,
            license: metadata.license_text().map(str::to_string),
            authors: metadata.authors.clone(),
        }
    }
}

/// Source of package manifests and published versions
pub trait MetadataSource: Send + Sync {
    /// Manifest of one package version
    fn get_metadata(&self, name: &str, version: &Version) -> Result<PackageMetadata, RegistryError>;

    /// All published versions, ascending
    fn get_all_versions(&self, name: &str) -> Result<Vec<Version>, RegistryError>;

    /// Package identifiers matching `query`
    fn search(&self, query: &str, take: usize) -> Result<Vec<String>, RegistryError>;

    /// Dependencies of one package version for `target`
    fn get_dependencies(
        &self,
        name: &str,
        version: &Version,
        target: &Framework,
    ) -> Result<DependencyInfo, RegistryError> {
        let metadata = self.get_metadata(name, version)?;
        Ok(DependencyInfo::select(&metadata, target))
    }
}

/// Source of raw package archives
pub trait ArchiveSource: Send + Sync {
    fn fetch_archive(&self, name: &str, version: &Version) -> Result<Vec<u8>, RegistryError>;
}
