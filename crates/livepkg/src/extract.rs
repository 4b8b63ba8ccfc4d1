//! Archive content extraction
//!
//! Pulls the platform-matching binaries and all static web assets out of a
//! package archive. Binaries live under `{binaries_root}/{framework}/`;
//! static assets under `{static_assets_root}/` are framework-agnostic.

use crate::archive::{open_archive, ArchiveContainer, ArchiveEntry, ArchiveError};
use crate::config::ExtractConfig;
use crate::framework::Framework;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur during extraction
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Archive could not be opened or read
    #[error("Malformed archive: {0}")]
    Archive(#[from] ArchiveError),

    /// Two packages ship different files under the same name
    #[error("Asset {file} is provided by both {first} and {second}")]
    AssetCollision {
        file: String,
        first: String,
        second: String,
    },
}

/// Category of an extracted asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetKind {
    Binary,
    Script,
    Style,
}

impl AssetKind {
    /// Output folder name
    pub fn folder(&self) -> &'static str {
        match self {
            AssetKind::Binary => "bin",
            AssetKind::Script => "scripts",
            AssetKind::Style => "styles",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder())
    }
}

/// Extracted files keyed by bare file name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedAssets {
    pub binaries: BTreeMap<String, Vec<u8>>,
    pub scripts: BTreeMap<String, Vec<u8>>,
    pub styles: BTreeMap<String, Vec<u8>>,
    /// Package that supplied each merged file
    origins: BTreeMap<(AssetKind, String), String>,
}

impl ExtractedAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self, kind: AssetKind) -> &BTreeMap<String, Vec<u8>> {
        match kind {
            AssetKind::Binary => &self.binaries,
            AssetKind::Script => &self.scripts,
            AssetKind::Style => &self.styles,
        }
    }

    fn files_mut(&mut self, kind: AssetKind) -> &mut BTreeMap<String, Vec<u8>> {
        match kind {
            AssetKind::Binary => &mut self.binaries,
            AssetKind::Script => &mut self.scripts,
            AssetKind::Style => &mut self.styles,
        }
    }

    /// Insert a file, returning `true` if it replaced an existing one
    pub fn insert(&mut self, kind: AssetKind, name: impl Into<String>, content: Vec<u8>) -> bool {
        self.files_mut(kind).insert(name.into(), content).is_some()
    }

    /// All files as (kind, name, content)
    pub fn iter(&self) -> impl Iterator<Item = (AssetKind, &str, &[u8])> {
        [AssetKind::Binary, AssetKind::Script, AssetKind::Style]
            .into_iter()
            .flat_map(move |kind| {
                self.files(kind)
                    .iter()
                    .map(move |(name, content)| (kind, name.as_str(), content.as_slice()))
            })
    }

    pub fn len(&self) -> usize {
        self.binaries.len() + self.scripts.len() + self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Package that supplied a merged file
    pub fn origin(&self, kind: AssetKind, name: &str) -> Option<&str> {
        self.origins
            .get(&(kind, name.to_string()))
            .map(String::as_str)
    }

    /// Merge the assets extracted from `package`
    ///
    /// Identical files from different packages are kept once. Different
    /// content under the same name is a collision.
    pub fn merge(&mut self, package: &str, mut other: ExtractedAssets) -> Result<(), ExtractError> {
        for kind in [AssetKind::Binary, AssetKind::Script, AssetKind::Style] {
            for (name, content) in std::mem::take(other.files_mut(kind)) {
                let key = (kind, name.clone());
                if let Some(existing) = self.files(kind).get(&name) {
                    if *existing == content {
                        continue;
                    }
                    let first = self.origins.get(&key).cloned().unwrap_or_default();
                    if first.eq_ignore_ascii_case(package) {
                        self.files_mut(kind).insert(name, content);
                        continue;
                    }
                    return Err(ExtractError::AssetCollision {
                        file: format!("{}/{}", kind, name),
                        first,
                        second: package.to_string(),
                    });
                }
                self.origins.insert(key, package.to_string());
                self.files_mut(kind).insert(name, content);
            }
        }
        Ok(())
    }
}

/// Selects package content for a target framework
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    layout: ExtractConfig,
    default_framework: Framework,
}

impl ContentExtractor {
    /// `default_framework` is used for packages resolved against `Any`
    pub fn new(layout: ExtractConfig, default_framework: Framework) -> Self {
        Self {
            layout,
            default_framework,
        }
    }

    pub fn default_framework(&self) -> &Framework {
        &self.default_framework
    }

    /// Open archive bytes and extract them
    pub fn extract_bytes(&self, bytes: Vec<u8>, target: &Framework) -> Result<ExtractedAssets, ExtractError> {
        let mut archive = open_archive(bytes)?;
        self.extract(archive.as_mut(), target)
    }

    /// Extract binaries for `target` and every static asset
    pub fn extract(
        &self,
        archive: &mut dyn ArchiveContainer,
        target: &Framework,
    ) -> Result<ExtractedAssets, ExtractError> {
        let entries = archive.entries()?;
        let mut selected: Vec<(AssetKind, &ArchiveEntry)> = Vec::new();

        let binaries = self.binary_candidates(&entries);
        let wanted = if target.is_any() {
            &self.default_framework
        } else {
            target
        };
        match Framework::nearest(wanted, binaries.iter().map(|(framework, _)| framework)) {
            Some(folder) => {
                debug!(target = %wanted, folder = %folder, "selected binary folder");
                selected.extend(
                    binaries
                        .iter()
                        .filter(|(framework, _)| framework == folder)
                        .map(|(_, entry)| (AssetKind::Binary, *entry)),
                );
            }
            None if !binaries.is_empty() => {
                debug!(target = %wanted, "no compatible binary folder");
            }
            None => {}
        }

        for entry in &entries {
            if !under_root(&entry.path, &self.layout.static_assets_root) {
                continue;
            }
            match entry.extension() {
                Some(ext) if ext.eq_ignore_ascii_case(&self.layout.script_extension) => {
                    selected.push((AssetKind::Script, entry))
                }
                Some(ext) if ext.eq_ignore_ascii_case(&self.layout.style_extension) => {
                    selected.push((AssetKind::Style, entry))
                }
                _ => {}
            }
        }

        let mut assets = ExtractedAssets::new();
        for (kind, entry) in selected {
            let content = archive.read_entry(&entry.path)?;
            if assets.insert(kind, entry.file_name(), content) {
                warn!(file = entry.file_name(), path = %entry.path, "duplicate file name, overwriting");
            }
        }
        Ok(assets)
    }

    /// Binary entries paired with their parsed framework folder
    fn binary_candidates<'e>(&self, entries: &'e [ArchiveEntry]) -> Vec<(Framework, &'e ArchiveEntry)> {
        entries
            .iter()
            .filter(|entry| under_root(&entry.path, &self.layout.binaries_root))
            .filter(|entry| {
                entry
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.layout.binary_extension))
            })
            .filter_map(|entry| {
                let folder = entry.parent_folder()?;
                match Framework::parse(folder) {
                    Ok(framework) => Some((framework, entry)),
                    Err(err) => {
                        warn!(path = %entry.path, error = %err, "skipping binary in unrecognised folder");
                        None
                    }
                }
            })
            .collect()
    }
}

fn under_root(path: &str, root: &str) -> bool {
    path.split('/')
        .next()
        .is_some_and(|first| first.eq_ignore_ascii_case(root))
        && path.contains('/')
}
