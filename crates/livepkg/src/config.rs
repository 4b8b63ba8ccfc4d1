//! Engine configuration (livepkg.toml)
//!
//! Every field has a default, so an empty or missing file is valid.

use crate::framework::Framework;
use crate::library::ResolvedLibrary;
use crate::semver::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Environment variable naming a configuration file
pub const CONFIG_ENV: &str = "LIVEPKG_CONFIG";

/// Environment variable overriding the feed URL
pub const FEED_ENV: &str = "LIVEPKG_FEED";

/// Default flat-container root
pub const DEFAULT_PACKAGE_BASE_URL: &str = "https://api.nuget.org/v3-flatcontainer";

/// Default search endpoint
pub const DEFAULT_SEARCH_URL: &str = "https://azuresearch-usnc.nuget.org/query";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize configuration
    #[error("Failed to serialize config: {0}")]
    SerializeError(String),

    /// Validation error
    #[error("Invalid config: {0}")]
    ValidationError(String),
}

/// Engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub feed: FeedConfig,
    pub runtime: RuntimeConfig,
    pub extract: ExtractConfig,
    pub storage: StorageConfig,
}

/// Package feed settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeedConfig {
    /// Flat-container root URL
    pub package_base_url: String,

    /// Search service URL
    pub search_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// Include prerelease versions in search results
    pub include_prerelease: bool,

    /// Serve packages from a local directory instead of HTTP
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            package_base_url: DEFAULT_PACKAGE_BASE_URL.to_string(),
            search_url: DEFAULT_SEARCH_URL.to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
            include_prerelease: false,
            local_path: None,
        }
    }
}

/// Host runtime settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Default target framework
    pub framework: String,

    /// Libraries shipped with the runtime
    pub fixed: Vec<FixedLibrary>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            framework: "net6.0".to_string(),
            fixed: Vec::new(),
        }
    }
}

/// A baseline runtime library
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixedLibrary {
    pub name: String,
    pub version: String,
}

impl RuntimeConfig {
    pub fn framework(&self) -> Result<Framework, ConfigError> {
        Framework::parse(&self.framework).map_err(|e| {
            ConfigError::ValidationError(format!("runtime.framework '{}': {}", self.framework, e))
        })
    }

    /// Baseline libraries to seed the resolution cache with
    pub fn fixed_libraries(&self) -> Result<Vec<ResolvedLibrary>, ConfigError> {
        self.fixed
            .iter()
            .map(|library| {
                if library.name.trim().is_empty() {
                    return Err(ConfigError::ValidationError(
                        "Fixed library name cannot be empty".to_string(),
                    ));
                }
                let version = Version::parse(&library.version).map_err(|e| {
                    ConfigError::ValidationError(format!("Fixed library '{}': {}", library.name, e))
                })?;
                Ok(ResolvedLibrary::assembly(library.name.trim(), version))
            })
            .collect()
    }
}

/// Archive layout used by the extractor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractConfig {
    pub binaries_root: String,
    pub binary_extension: String,
    pub static_assets_root: String,
    pub script_extension: String,
    pub style_extension: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            binaries_root: "lib".to_string(),
            binary_extension: "dll".to_string(),
            static_assets_root: "staticwebassets".to_string(),
            script_extension: "js".to_string(),
            style_extension: "css".to_string(),
        }
    }
}

/// Output locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory receiving extracted assets
    pub root: PathBuf,

    /// Persisted session snapshot
    pub state_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = livepkg_home();
        Self {
            root: home.join("assets"),
            state_file: home.join("session.toml"),
        }
    }
}

/// `~/.livepkg`, or `.livepkg` when no home directory is known
pub fn livepkg_home() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".livepkg"))
        .unwrap_or_else(|| PathBuf::from(".livepkg"))
}

/// Default configuration file location
pub fn default_config_path() -> PathBuf {
    livepkg_home().join("livepkg.toml")
}

impl EngineConfig {
    /// Load configuration using the standard lookup order
    ///
    /// `explicit` (from `--config`) wins over `$LIVEPKG_CONFIG`, which wins
    /// over `~/.livepkg/livepkg.toml`. Without any file the defaults apply.
    /// `$LIVEPKG_FEED` overrides the feed URL.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .or_else(|| Some(default_config_path()).filter(|path| path.exists()));

        Self::load_from(path.as_deref(), std::env::var(FEED_ENV).ok())
    }

    /// Load from an optional file and apply an optional feed override
    pub fn load_from(path: Option<&Path>, feed_override: Option<String>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                debug!(path = %path.display(), "loading config");
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            None => EngineConfig::default(),
        };

        if let Some(url) = feed_override.filter(|url| !url.trim().is_empty()) {
            config.feed.package_base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.runtime.framework()?;
        self.runtime.fixed_libraries()?;

        for (field, value) in [
            ("feed.package_base_url", &self.feed.package_base_url),
            ("feed.search_url", &self.feed.search_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| ConfigError::ValidationError(format!("{} '{}': {}", field, value, e)))?;
        }

        if self.feed.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "feed.timeout_secs must be greater than zero".to_string(),
            ));
        }

        for (field, value) in [
            ("extract.binaries_root", &self.extract.binaries_root),
            ("extract.binary_extension", &self.extract.binary_extension),
            ("extract.static_assets_root", &self.extract.static_assets_root),
            ("extract.script_extension", &self.extract.script_extension),
            ("extract.style_extension", &self.extract.style_extension),
        ] {
            if value.is_empty() || value.contains('/') {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be a single path segment",
                    field
                )));
            }
        }

        Ok(())
    }

    /// Write configuration to a file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
