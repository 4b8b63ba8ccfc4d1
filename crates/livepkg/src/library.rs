//! Library identities, requested ranges and resolution results

use crate::framework::Framework;
use crate::semver::{Version, VersionRange};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a library entry stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryKind {
    /// A feed package with an archive to download
    Package,
    /// An assembly shipped with the host runtime
    Assembly,
}

/// A concrete library: name, version and kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryIdentity {
    pub name: String,
    pub version: Version,
    pub kind: LibraryKind,
}

impl LibraryIdentity {
    pub fn new(name: impl Into<String>, version: Version, kind: LibraryKind) -> Self {
        Self {
            name: name.into(),
            version,
            kind,
        }
    }

    pub fn package(name: impl Into<String>, version: Version) -> Self {
        Self::new(name, version, LibraryKind::Package)
    }
}

impl fmt::Display for LibraryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// A request to resolve a library within a version range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryRange {
    pub name: String,
    pub range: VersionRange,
    pub kind: LibraryKind,
}

impl LibraryRange {
    /// Range built from a name and version picked by the user
    pub fn package(name: impl Into<String>, minimum: Version) -> Self {
        Self {
            name: name.into(),
            range: VersionRange::at_least(minimum),
            kind: LibraryKind::Package,
        }
    }

    /// Range built from a dependency declared in a package manifest
    pub fn from_dependency(dependency: &DependencyRange) -> Self {
        Self {
            name: dependency.name.clone(),
            range: dependency.range.clone(),
            kind: LibraryKind::Package,
        }
    }
}

impl fmt::Display for LibraryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.range)
    }
}

/// A dependency as declared by a package: name plus version range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRange {
    pub name: String,
    pub range: VersionRange,
}

impl DependencyRange {
    pub fn new(name: impl Into<String>, range: VersionRange) -> Self {
        Self {
            name: name.into(),
            range,
        }
    }
}

/// Resolution result for one node of the dependency graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLibrary {
    pub identity: LibraryIdentity,
    pub resolved: bool,
    pub target_framework: Framework,
    #[serde(default)]
    pub dependencies: Vec<DependencyRange>,
}

impl ResolvedLibrary {
    pub fn new(
        identity: LibraryIdentity,
        target_framework: Framework,
        dependencies: Vec<DependencyRange>,
    ) -> Self {
        Self {
            identity,
            resolved: true,
            target_framework,
            dependencies,
        }
    }

    /// Baseline assembly with no declared dependencies
    pub fn assembly(name: impl Into<String>, version: Version) -> Self {
        Self::new(
            LibraryIdentity::new(name, version, LibraryKind::Assembly),
            Framework::any(),
            Vec::new(),
        )
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn version(&self) -> &Version {
        &self.identity.version
    }

    /// Whether this library declares a dependency on `name`
    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies
            .iter()
            .any(|dep| dep.name.eq_ignore_ascii_case(name))
    }
}

/// Normalized cache key for a library name
///
/// Package identifiers are case-insensitive.
pub fn library_key(name: &str) -> String {
    name.to_ascii_lowercase()
}
