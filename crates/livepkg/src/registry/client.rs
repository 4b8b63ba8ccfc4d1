//! Feed HTTP client
//!
//! Provides a blocking HTTP client for a NuGet v3 flat-container feed.

use super::api::{SearchResponse, VersionIndex};
use super::nuspec::{NuspecError, PackageMetadata};
use super::{ArchiveSource, MetadataSource};
use crate::archive::ArchiveError;
use crate::config::FeedConfig;
use crate::semver::Version;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during feed operations
#[derive(Debug, Error)]
pub enum RegistryError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Package not found
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    /// Version not found
    #[error("Version {version} not found for package {package}")]
    VersionNotFound { package: String, version: String },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Package manifest could not be parsed
    #[error("Invalid package manifest: {0}")]
    Nuspec(#[from] NuspecError),

    /// Package archive could not be read
    #[error("Invalid package archive: {0}")]
    Archive(#[from] ArchiveError),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Feed unavailable
    #[error("Feed unavailable: {0}")]
    Unavailable(String),
}

impl RegistryError {
    /// Whether retrying the same request later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            RegistryError::HttpError(err) => !err.is_decode() && !err.is_builder(),
            RegistryError::Unavailable(_) => true,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::PackageNotFound(_) | RegistryError::VersionNotFound { .. }
        )
    }
}

/// Client for a flat-container feed and its search service
pub struct RegistryClient {
    /// HTTP client
    client: Client,

    /// Flat-container root
    base_url: String,

    /// Search service endpoint
    search_url: String,

    include_prerelease: bool,
}

impl RegistryClient {
    /// Create a client from feed settings
    pub fn new(config: &FeedConfig) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(format!("livepkg/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = url::Url::parse(&config.package_base_url)
            .map_err(|e| RegistryError::InvalidUrl(format!("{}: {}", config.package_base_url, e)))?;

        Ok(Self {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            search_url: config.search_url.clone(),
            include_prerelease: config.include_prerelease,
        })
    }

    /// Create a client for a custom flat-container root with default settings
    pub fn with_url(base_url: &str) -> Result<Self, RegistryError> {
        Self::new(&FeedConfig {
            package_base_url: base_url.to_string(),
            ..FeedConfig::default()
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET {base}/{id}/index.json
    pub fn index_url(&self, name: &str) -> String {
        format!("{}/{}/index.json", self.base_url, package_id(name))
    }

    /// GET {base}/{id}/{version}/{id}.nuspec
    pub fn manifest_url(&self, name: &str, version: &Version) -> String {
        let id = package_id(name);
        format!("{}/{}/{}/{}.nuspec", self.base_url, id, version_segment(version), id)
    }

    /// GET {base}/{id}/{version}/{id}.{version}.nupkg
    pub fn archive_url(&self, name: &str, version: &Version) -> String {
        let id = package_id(name);
        let version = version_segment(version);
        format!("{}/{}/{}/{}.{}.nupkg", self.base_url, id, version, id, version)
    }

    /// Send a GET request, mapping 404 to `not_found`
    fn get(&self, url: &str, not_found: impl FnOnce() -> RegistryError) -> Result<Response, RegistryError> {
        debug!(url, "fetching");
        let response = self.client.get(url).send()?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(not_found());
        }

        if !response.status().is_success() {
            return Err(RegistryError::Unavailable(format!(
                "Feed returned status {} for {}",
                response.status(),
                url
            )));
        }

        Ok(response)
    }
}

impl MetadataSource for RegistryClient {
    fn get_metadata(&self, name: &str, version: &Version) -> Result<PackageMetadata, RegistryError> {
        let url = self.manifest_url(name, version);
        let response = self.get(&url, || version_not_found(name, version))?;
        let xml = response.text()?;
        Ok(PackageMetadata::parse(&xml)?)
    }

    fn get_all_versions(&self, name: &str) -> Result<Vec<Version>, RegistryError> {
        let url = self.index_url(name);
        let response = self.get(&url, || RegistryError::PackageNotFound(name.to_string()))?;
        let index: VersionIndex = serde_json::from_str(&response.text()?)?;

        let mut versions: Vec<Version> = index
            .versions
            .iter()
            .filter_map(|v| Version::parse(v).ok())
            .collect();
        versions.sort();

        Ok(versions)
    }

    fn search(&self, query: &str, take: usize) -> Result<Vec<String>, RegistryError> {
        let mut url = url::Url::parse(&self.search_url)
            .map_err(|e| RegistryError::InvalidUrl(format!("{}: {}", self.search_url, e)))?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("take", &take.to_string())
            .append_pair("prerelease", if self.include_prerelease { "true" } else { "false" });

        let response = self.get(url.as_str(), || RegistryError::Unavailable(format!(
            "search endpoint {} not found",
            self.search_url
        )))?;
        let results: SearchResponse = serde_json::from_str(&response.text()?)?;

        Ok(results.data.into_iter().map(|result| result.id).collect())
    }
}

impl ArchiveSource for RegistryClient {
    fn fetch_archive(&self, name: &str, version: &Version) -> Result<Vec<u8>, RegistryError> {
        let url = self.archive_url(name, version);
        let response = self.get(&url, || version_not_found(name, version))?;
        let bytes = response.bytes()?.to_vec();
        debug!(package = name, %version, size = bytes.len(), "downloaded archive");
        Ok(bytes)
    }
}

fn version_not_found(name: &str, version: &Version) -> RegistryError {
    RegistryError::VersionNotFound {
        package: name.to_string(),
        version: version.to_string(),
    }
}

/// Package identifiers are lower-cased in flat-container URLs
fn package_id(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Normalized version without build metadata, lower-cased
fn version_segment(version: &Version) -> String {
    let text = version.to_string();
    let release = text.split('+').next().unwrap_or(&text);
    release.to_ascii_lowercase()
}
