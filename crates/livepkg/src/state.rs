//! Session snapshot (session.toml)
//!
//! Records the committed packages and the non-fixed resolution cache entries
//! so a later process can resume where the previous one stopped.

use crate::framework::Framework;
use crate::library::{library_key, LibraryIdentity, ResolvedLibrary};
use crate::semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during snapshot operations
#[derive(Debug, Error)]
pub enum StateError {
    /// Failed to read snapshot
    #[error("Failed to read session state: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse session state: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize snapshot
    #[error("Failed to serialize session state: {0}")]
    SerializeError(String),

    /// Validation error
    #[error("Invalid session state: {0}")]
    ValidationError(String),
}

/// Snapshot format version
pub const STATE_VERSION: u32 = 1;

/// A committed top-level package
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstalledPackage {
    pub name: String,
    pub version: Version,
    /// Framework the package was installed for
    pub framework: Framework,
    /// Libraries downloaded with the package, itself included
    #[serde(default)]
    pub libraries: Vec<LibraryIdentity>,
}

/// A cache entry installed on behalf of a package
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LibraryRecord {
    /// Source package name
    pub source: String,
    pub library: ResolvedLibrary,
}

/// Persisted session state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    /// Snapshot format version
    pub version: u32,

    #[serde(default)]
    pub installed: Vec<InstalledPackage>,

    #[serde(default)]
    pub libraries: Vec<LibraryRecord>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            installed: Vec::new(),
            libraries: Vec::new(),
        }
    }

    /// Load a snapshot, or an empty one if the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, StateError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::new())
        }
    }

    /// Parse a snapshot from a file
    pub fn from_file(path: &Path) -> Result<Self, StateError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a snapshot from a string
    pub fn from_str(content: &str) -> Result<Self, StateError> {
        let snapshot: SessionSnapshot = toml::from_str(content)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Validate the snapshot
    pub fn validate(&self) -> Result<(), StateError> {
        if self.version != STATE_VERSION {
            return Err(StateError::ValidationError(format!(
                "Unsupported state version: {} (expected {})",
                self.version, STATE_VERSION
            )));
        }

        let mut installed = HashSet::new();
        for package in &self.installed {
            if package.name.is_empty() {
                return Err(StateError::ValidationError(
                    "Installed package name cannot be empty".to_string(),
                ));
            }
            if !installed.insert(library_key(&package.name)) {
                return Err(StateError::ValidationError(format!(
                    "Package '{}' is installed twice",
                    package.name
                )));
            }
        }

        let mut names = HashSet::new();
        for record in &self.libraries {
            let name = record.library.name();
            if name.is_empty() || record.source.is_empty() {
                return Err(StateError::ValidationError(
                    "Library records need a name and a source".to_string(),
                ));
            }
            if !names.insert(library_key(name)) {
                return Err(StateError::ValidationError(format!(
                    "Library '{}' is recorded twice",
                    name
                )));
            }
            if !installed.contains(&library_key(&record.source)) {
                return Err(StateError::ValidationError(format!(
                    "Library '{}' names unknown source package '{}'",
                    name, record.source
                )));
            }
        }

        Ok(())
    }

    /// Write the snapshot, creating parent directories
    pub fn to_file(&self, path: &Path) -> Result<(), StateError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| StateError::SerializeError(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}
