//! Storage of extracted assets
//!
//! The engine hands the merged assets of a committed install to a
//! [`StorageSink`]. [`DirectorySink`] lays them out on disk.

use crate::extract::ExtractedAssets;
use crate::library::library_key;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while storing assets
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// File name would escape its folder
    #[error("Invalid asset file name: {0}")]
    InvalidFileName(String),
}

/// Receives the assets of committed packages
pub trait StorageSink: Send + Sync {
    /// Persist the assets installed with `package`
    fn store(&self, package: &str, assets: &ExtractedAssets) -> Result<(), StorageError>;

    /// Forget the assets of an uninstalled package
    fn remove(&self, _package: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Writes `{root}/{package}/{bin,scripts,styles}/{file}`
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the assets of `package`
    pub fn package_dir(&self, package: &str) -> PathBuf {
        self.root.join(library_key(package))
    }
}

impl StorageSink for DirectorySink {
    fn store(&self, package: &str, assets: &ExtractedAssets) -> Result<(), StorageError> {
        let package_dir = self.package_dir(package);

        for (kind, name, content) in assets.iter() {
            if !is_plain_file_name(name) {
                return Err(StorageError::InvalidFileName(name.to_string()));
            }
            let dir = package_dir.join(kind.folder());
            fs::create_dir_all(&dir)?;

            let tmp = dir.join(format!(".{}.tmp", name));
            fs::write(&tmp, content)?;
            fs::rename(&tmp, dir.join(name))?;
        }

        debug!(package, files = assets.len(), dir = %package_dir.display(), "stored assets");
        Ok(())
    }

    fn remove(&self, package: &str) -> Result<(), StorageError> {
        let package_dir = self.package_dir(package);
        if package_dir.exists() {
            fs::remove_dir_all(&package_dir)?;
        }
        Ok(())
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(|c: char| c == '/' || c == '\\')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::AssetKind;

    #[test]
    fn test_store_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path());

        let mut assets = ExtractedAssets::new();
        assets.insert(AssetKind::Binary, "Charts.dll", b"MZ".to_vec());
        assets.insert(AssetKind::Style, "charts.css", b"body{}".to_vec());
        sink.store("Contoso.Charts", &assets).unwrap();

        let package_dir = dir.path().join("contoso.charts");
        assert_eq!(fs::read(package_dir.join("bin/Charts.dll")).unwrap(), b"MZ");
        assert_eq!(fs::read(package_dir.join("styles/charts.css")).unwrap(), b"body{}");
        assert!(!package_dir.join("bin/.Charts.dll.tmp").exists());

        sink.remove("Contoso.Charts").unwrap();
        assert!(!package_dir.exists());
    }

    #[test]
    fn test_rejects_path_in_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path());

        let mut assets = ExtractedAssets::new();
        assets.insert(AssetKind::Script, "..", b"x".to_vec());
        assert!(matches!(
            sink.store("A", &assets),
            Err(StorageError::InvalidFileName(_))
        ));
    }
}
