//! Directory feed
//!
//! Serves every `*.nupkg` file found in one directory. Manifests are read
//! from the archives once, when the feed is opened.

use super::nuspec::PackageMetadata;
use super::{ArchiveSource, MetadataSource, RegistryError};
use crate::archive::{ArchiveContainer, ZipContainer};
use crate::library::library_key;
use crate::semver::Version;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

struct LocalPackage {
    metadata: PackageMetadata,
    path: PathBuf,
}

/// Package feed backed by a local directory
pub struct LocalFeed {
    root: PathBuf,
    packages: Vec<LocalPackage>,
}

impl LocalFeed {
    /// Scan `root` for package archives
    ///
    /// Archives without a readable manifest are skipped with a warning.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let root = root.as_ref().to_path_buf();
        let mut packages = Vec::new();

        for entry in fs::read_dir(&root)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("nupkg") {
                continue;
            }
            match read_manifest(&path) {
                Ok(metadata) => packages.push(LocalPackage { metadata, path }),
                Err(err) => warn!(path = %path.display(), error = %err, "skipping package"),
            }
        }

        debug!(root = %root.display(), packages = packages.len(), "opened local feed");
        Ok(Self { root, packages })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    fn find(&self, name: &str, version: &Version) -> Result<&LocalPackage, RegistryError> {
        let key = library_key(name);
        let mut found_name = false;
        for package in &self.packages {
            if library_key(&package.metadata.id) != key {
                continue;
            }
            found_name = true;
            if &package.metadata.version == version {
                return Ok(package);
            }
        }

        if found_name {
            Err(RegistryError::VersionNotFound {
                package: name.to_string(),
                version: version.to_string(),
            })
        } else {
            Err(RegistryError::PackageNotFound(name.to_string()))
        }
    }
}

/// Read the manifest at the root of a package archive
fn read_manifest(path: &Path) -> Result<PackageMetadata, RegistryError> {
    let mut archive = ZipContainer::new(fs::read(path)?)?;
    let manifest = archive
        .entries()?
        .into_iter()
        .find(|entry| !entry.path.contains('/') && entry.extension().as_deref() == Some("nuspec"))
        .ok_or_else(|| RegistryError::PackageNotFound(path.display().to_string()))?;

    let bytes = archive.read_entry(&manifest.path)?;
    Ok(PackageMetadata::parse(&String::from_utf8_lossy(&bytes))?)
}

impl MetadataSource for LocalFeed {
    fn get_metadata(&self, name: &str, version: &Version) -> Result<PackageMetadata, RegistryError> {
        Ok(self.find(name, version)?.metadata.clone())
    }

    fn get_all_versions(&self, name: &str) -> Result<Vec<Version>, RegistryError> {
        let key = library_key(name);
        let mut versions: Vec<Version> = self
            .packages
            .iter()
            .filter(|package| library_key(&package.metadata.id) == key)
            .map(|package| package.metadata.version.clone())
            .collect();

        if versions.is_empty() {
            return Err(RegistryError::PackageNotFound(name.to_string()));
        }
        versions.sort();
        versions.dedup();
        Ok(versions)
    }

    fn search(&self, query: &str, take: usize) -> Result<Vec<String>, RegistryError> {
        let query = query.to_ascii_lowercase();
        let mut names: Vec<String> = Vec::new();
        for package in &self.packages {
            let id = &package.metadata.id;
            if library_key(id).contains(&query) && !names.iter().any(|n| n.eq_ignore_ascii_case(id)) {
                names.push(id.clone());
            }
        }
        names.sort_by_key(|name| library_key(name));
        names.truncate(take);
        Ok(names)
    }
}

impl ArchiveSource for LocalFeed {
    fn fetch_archive(&self, name: &str, version: &Version) -> Result<Vec<u8>, RegistryError> {
        let package = self.find(name, version)?;
        Ok(fs::read(&package.path)?)
    }
}
