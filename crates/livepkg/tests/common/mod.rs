//! Shared fixtures for integration tests

#![allow(dead_code)]

use livepkg::config::ExtractConfig;
use livepkg::library::library_key;
use livepkg::registry::PackageMetadata;
use livepkg::{
    ArchiveSource, ContentExtractor, ExtractedAssets, Framework, Installer, MetadataSource,
    RegistryError, ResolutionCache, ResolvedLibrary, StorageError, StorageSink, Version,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::io::{self, Cursor, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use zip::write::SimpleFileOptions;

/// Builds `.nupkg` archives
#[derive(Debug, Clone)]
pub struct PackageBuilder {
    id: String,
    version: String,
    groups: Vec<(Option<String>, Vec<(String, String)>)>,
    license: Option<String>,
    authors: Vec<String>,
    files: Vec<(String, Vec<u8>)>,
}

impl PackageBuilder {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
            groups: Vec::new(),
            license: None,
            authors: vec!["Contoso".to_string()],
            files: Vec::new(),
        }
    }

    /// Dependency group for a framework (`None` for a group without one)
    pub fn group(mut self, framework: Option<&str>, deps: &[(&str, &str)]) -> Self {
        self.groups.push((
            framework.map(str::to_string),
            deps.iter()
                .map(|(name, range)| (name.to_string(), range.to_string()))
                .collect(),
        ));
        self
    }

    /// Dependencies that apply to every framework
    pub fn deps(self, deps: &[(&str, &str)]) -> Self {
        self.group(None, deps)
    }

    /// Require acceptance of `license`
    pub fn license(mut self, license: &str) -> Self {
        self.license = Some(license.to_string());
        self
    }

    pub fn file(mut self, path: &str, content: &[u8]) -> Self {
        self.files.push((path.to_string(), content.to_vec()));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn nuspec(&self) -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<package xmlns=\"http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd\">\n  <metadata>\n",
        );
        xml.push_str(&format!("    <id>{}</id>\n", self.id));
        xml.push_str(&format!("    <version>{}</version>\n", self.version));
        xml.push_str(&format!("    <authors>{}</authors>\n", self.authors.join(",")));
        if let Some(license) = &self.license {
            xml.push_str("    <requireLicenseAcceptance>true</requireLicenseAcceptance>\n");
            xml.push_str(&format!("    <license type=\"expression\">{}</license>\n", license));
        }
        if !self.groups.is_empty() {
            xml.push_str("    <dependencies>\n");
            for (framework, deps) in &self.groups {
                match framework {
                    Some(framework) => xml.push_str(&format!(
                        "      <group targetFramework=\"{}\">\n",
                        framework
                    )),
                    None => xml.push_str("      <group>\n"),
                }
                for (name, range) in deps {
                    xml.push_str(&format!(
                        "        <dependency id=\"{}\" version=\"{}\" />\n",
                        name, range
                    ));
                }
                xml.push_str("      </group>\n");
            }
            xml.push_str("    </dependencies>\n");
        }
        xml.push_str("  </metadata>\n</package>\n");
        xml
    }

    pub fn metadata(&self) -> PackageMetadata {
        PackageMetadata::parse(&self.nuspec()).unwrap()
    }

    /// Zip archive with the manifest and every file
    pub fn build(&self) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        writer
            .start_file(format!("{}.nuspec", self.id), options)
            .unwrap();
        writer.write_all(self.nuspec().as_bytes()).unwrap();

        for (path, content) in &self.files {
            writer.start_file(path.as_str(), options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }
}

/// In-memory feed that counts requests
#[derive(Default)]
pub struct MemoryFeed {
    packages: Mutex<BTreeMap<(String, Version), (PackageMetadata, Vec<u8>)>>,
    failing: Mutex<HashSet<String>>,
    pub metadata_fetches: AtomicUsize,
    pub archive_fetches: AtomicUsize,
}

impl MemoryFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, package: PackageBuilder) {
        let metadata = package.metadata();
        let key = (library_key(&metadata.id), metadata.version.clone());
        self.packages.lock().insert(key, (metadata, package.build()));
    }

    /// Make archive downloads of `name` fail with a transient error
    pub fn fail_archive(&self, name: &str) {
        self.failing.lock().insert(library_key(name));
    }

    pub fn metadata_fetches(&self) -> usize {
        self.metadata_fetches.load(Ordering::SeqCst)
    }

    pub fn archive_fetches(&self) -> usize {
        self.archive_fetches.load(Ordering::SeqCst)
    }
}

impl MetadataSource for MemoryFeed {
    fn get_metadata(&self, name: &str, version: &Version) -> Result<PackageMetadata, RegistryError> {
        self.metadata_fetches.fetch_add(1, Ordering::SeqCst);
        self.packages
            .lock()
            .get(&(library_key(name), version.clone()))
            .map(|(metadata, _)| metadata.clone())
            .ok_or_else(|| RegistryError::VersionNotFound {
                package: name.to_string(),
                version: version.to_string(),
            })
    }

    fn get_all_versions(&self, name: &str) -> Result<Vec<Version>, RegistryError> {
        let key = library_key(name);
        let mut versions: Vec<Version> = self
            .packages
            .lock()
            .keys()
            .filter(|(id, _)| *id == key)
            .map(|(_, version)| version.clone())
            .collect();
        if versions.is_empty() {
            return Err(RegistryError::PackageNotFound(name.to_string()));
        }
        versions.sort();
        Ok(versions)
    }

    fn search(&self, query: &str, take: usize) -> Result<Vec<String>, RegistryError> {
        let query = query.to_ascii_lowercase();
        let mut names: Vec<String> = self
            .packages
            .lock()
            .values()
            .filter(|(metadata, _)| library_key(&metadata.id).contains(&query))
            .map(|(metadata, _)| metadata.id.clone())
            .collect();
        names.sort();
        names.dedup();
        names.truncate(take);
        Ok(names)
    }
}

impl ArchiveSource for MemoryFeed {
    fn fetch_archive(&self, name: &str, version: &Version) -> Result<Vec<u8>, RegistryError> {
        self.archive_fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().contains(&library_key(name)) {
            return Err(RegistryError::Unavailable(format!("503 for {}", name)));
        }
        self.packages
            .lock()
            .get(&(library_key(name), version.clone()))
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| RegistryError::VersionNotFound {
                package: name.to_string(),
                version: version.to_string(),
            })
    }
}

/// Storage sink that keeps assets in memory
#[derive(Default)]
pub struct MemorySink {
    pub stored: Mutex<BTreeMap<String, ExtractedAssets>>,
    pub removed: Mutex<Vec<String>>,
    /// Make `remove` fail as a read-only store would
    pub read_only: AtomicBool,
}

impl MemorySink {
    pub fn assets(&self, package: &str) -> Option<ExtractedAssets> {
        self.stored.lock().get(package).cloned()
    }
}

impl StorageSink for MemorySink {
    fn store(&self, package: &str, assets: &ExtractedAssets) -> Result<(), StorageError> {
        self.stored.lock().insert(package.to_string(), assets.clone());
        Ok(())
    }

    fn remove(&self, package: &str) -> Result<(), StorageError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only store").into());
        }
        self.stored.lock().remove(package);
        self.removed.lock().push(package.to_string());
        Ok(())
    }
}

pub fn framework(token: &str) -> Framework {
    Framework::parse(token).unwrap()
}

pub fn version(text: &str) -> Version {
    Version::parse(text).unwrap()
}

/// Installer over `feed` with the given fixed libraries, targeting net6.0
pub fn installer(feed: &Arc<MemoryFeed>, fixed: &[(&str, &str)]) -> Installer {
    let cache = Arc::new(ResolutionCache::with_fixed(
        fixed
            .iter()
            .map(|(name, v)| ResolvedLibrary::assembly(*name, version(v))),
    ));
    let extractor = ContentExtractor::new(ExtractConfig::default(), framework("net6.0"));
    Installer::new(cache, feed.clone(), feed.clone(), extractor)
}
