//! Installation sessions
//!
//! [`Installer`] drives one install at a time through
//! `Idle -> Resolving -> (AwaitingLicenseAcceptance) -> Downloading -> Idle`.
//! Every abort path (license rejection, cancellation, any error while
//! resolving or downloading) rolls back the cache entries sourced from the
//! in-flight package and returns to `Idle`.
//!
//! All operations take `&self`. The session lock is not held while walking
//! the graph or downloading, so readers can list installed packages and a
//! caller on another thread can cancel.

use crate::cache::{CacheEntry, ResolutionCache};
use crate::cancel::CancellationToken;
use crate::config::{ConfigError, EngineConfig};
use crate::extract::{ContentExtractor, ExtractError, ExtractedAssets};
use crate::framework::Framework;
use crate::library::{library_key, LibraryIdentity, LibraryKind, LibraryRange, ResolvedLibrary};
use crate::license::{LicenseGate, PackageLicenseInfo};
use crate::registry::{ArchiveSource, LocalFeed, MetadataSource, RegistryClient, RegistryError};
use crate::resolver::{DependencyWalker, ResolvedNode, ResolverError};
use crate::semver::Version;
use crate::state::{InstalledPackage, LibraryRecord, SessionSnapshot, StateError};
use crate::storage::{StorageError, StorageSink};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Resolving,
    AwaitingLicenseAcceptance,
    Downloading,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Resolving => "resolving",
            SessionState::AwaitingLicenseAcceptance => "awaiting license acceptance",
            SessionState::Downloading => "downloading",
        };
        f.write_str(name)
    }
}

/// Error category, for callers deciding how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Requested version cannot coexist with what is installed
    VersionConflict,
    /// Package, version or range has no match on the feed
    NotFound,
    /// Network or server failure; retrying may help
    TransientFetchFailure,
    /// Operation not valid in the current state
    InvalidUsage,
    /// Archive or manifest could not be read
    MalformedArchive,
    /// Two packages ship different files under one name
    AssetConflict,
    /// Install was cancelled
    Cancelled,
    /// Local filesystem or persisted state failure
    Storage,
}

/// Errors surfaced by the installer
#[derive(Debug, Error)]
pub enum SessionError {
    /// Operation is not valid in the current state
    #[error("Cannot {operation} while {state}")]
    InvalidOperation {
        operation: &'static str,
        state: SessionState,
    },

    /// Package is already installed
    #[error("Package {0} is already installed; uninstall it first")]
    AlreadyInstalled(String),

    /// Package is not installed
    #[error("Package {0} is not installed")]
    NotInstalled(String),

    /// Dependency resolution failed
    #[error(transparent)]
    Resolve(#[from] ResolverError),

    /// Feed request failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Archive download failed
    #[error("Failed to download {name}: {source}")]
    Fetch {
        name: String,
        #[source]
        source: RegistryError,
    },

    /// Archive content could not be extracted
    #[error("Failed to extract {name}: {source}")]
    Extract {
        name: String,
        #[source]
        source: ExtractError,
    },

    /// Assets could not be stored
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Session state could not be saved or loaded
    #[error(transparent)]
    State(#[from] StateError),

    /// Configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Install was cancelled
    #[error("Installation cancelled")]
    Cancelled,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::InvalidOperation { .. }
            | SessionError::AlreadyInstalled(_)
            | SessionError::NotInstalled(_)
            | SessionError::Config(_) => ErrorKind::InvalidUsage,
            SessionError::Resolve(err) => match err {
                ResolverError::VersionConflict { .. } => ErrorKind::VersionConflict,
                ResolverError::NoMatchingVersion { .. } => ErrorKind::NotFound,
                ResolverError::Fetch { source, .. } => registry_kind(source),
                ResolverError::Cancelled => ErrorKind::Cancelled,
            },
            SessionError::Registry(source) | SessionError::Fetch { source, .. } => registry_kind(source),
            SessionError::Extract { source, .. } => match source {
                ExtractError::Archive(_) => ErrorKind::MalformedArchive,
                ExtractError::AssetCollision { .. } => ErrorKind::AssetConflict,
            },
            SessionError::Storage(_) | SessionError::State(_) => ErrorKind::Storage,
            SessionError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

fn registry_kind(error: &RegistryError) -> ErrorKind {
    if error.is_not_found() {
        ErrorKind::NotFound
    } else if error.is_transient() {
        ErrorKind::TransientFetchFailure
    } else {
        match error {
            RegistryError::Nuspec(_) | RegistryError::Archive(_) => ErrorKind::MalformedArchive,
            _ => ErrorKind::Storage,
        }
    }
}

/// What the caller must do after `begin_install`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStep {
    /// Licenses must be accepted or rejected first
    AwaitingLicenseAcceptance(Vec<PackageLicenseInfo>),
    /// Ready to download these libraries
    ReadyToDownload(Vec<LibraryIdentity>),
}

/// The package an in-flight session is installing
#[derive(Debug, Clone)]
struct Request {
    name: String,
    version: Version,
    framework: Framework,
}

#[derive(Debug)]
struct Session {
    state: SessionState,
    request: Option<Request>,
    packages_to_install: Vec<Arc<ResolvedLibrary>>,
    licenses: LicenseGate,
    plan: Option<ResolvedNode>,
    assets: Option<ExtractedAssets>,
    transfer_active: bool,
    cancel: CancellationToken,
    /// Bumped on every reset so late workers can tell they are stale
    generation: u64,
}

impl Session {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            request: None,
            packages_to_install: Vec::new(),
            licenses: LicenseGate::new(),
            plan: None,
            assets: None,
            transfer_active: false,
            cancel: CancellationToken::new(),
            generation: 0,
        }
    }

    fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.request = None;
        self.packages_to_install.clear();
        self.licenses.clear();
        self.assets = None;
        self.transfer_active = false;
        self.cancel = CancellationToken::new();
        self.generation += 1;
    }

    fn expect_state(&self, operation: &'static str, expected: SessionState) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidOperation {
                operation,
                state: self.state,
            })
        }
    }

    fn request_name(&self) -> Option<String> {
        self.request.as_ref().map(|request| request.name.clone())
    }
}

/// Package installation engine
pub struct Installer {
    cache: Arc<ResolutionCache>,
    metadata: Arc<dyn MetadataSource>,
    archives: Arc<dyn ArchiveSource>,
    extractor: ContentExtractor,
    session: Mutex<Session>,
    installed: RwLock<Vec<InstalledPackage>>,
}

impl Installer {
    pub fn new(
        cache: Arc<ResolutionCache>,
        metadata: Arc<dyn MetadataSource>,
        archives: Arc<dyn ArchiveSource>,
        extractor: ContentExtractor,
    ) -> Self {
        Self {
            cache,
            metadata,
            archives,
            extractor,
            session: Mutex::new(Session::new()),
            installed: RwLock::new(Vec::new()),
        }
    }

    /// Build an installer from configuration
    ///
    /// Uses a [`LocalFeed`] when `feed.local_path` is set, otherwise the
    /// HTTP [`RegistryClient`]. Fixed runtime libraries seed the cache.
    pub fn from_config(config: &EngineConfig) -> Result<Self, SessionError> {
        let framework = config.runtime.framework()?;
        let fixed = config.runtime.fixed_libraries()?;
        let cache = Arc::new(ResolutionCache::with_fixed(fixed));
        let extractor = ContentExtractor::new(config.extract.clone(), framework);

        let installer = match &config.feed.local_path {
            Some(path) => {
                let feed = Arc::new(LocalFeed::open(path)?);
                Self::new(cache, feed.clone(), feed, extractor)
            }
            None => {
                let client = Arc::new(RegistryClient::new(&config.feed)?);
                Self::new(cache, client.clone(), client, extractor)
            }
        };
        Ok(installer)
    }

    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.cache
    }

    pub fn state(&self) -> SessionState {
        self.session.lock().state
    }

    /// Package identifiers matching `query`
    pub fn search_packages(&self, query: &str, take: usize) -> Result<Vec<String>, SessionError> {
        Ok(self.metadata.search(query, take)?)
    }

    /// Published versions of a package, ascending
    pub fn get_versions(&self, name: &str) -> Result<Vec<Version>, SessionError> {
        Ok(self.metadata.get_all_versions(name)?)
    }

    pub fn list_installed_packages(&self) -> Vec<InstalledPackage> {
        self.installed.read().clone()
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.installed
            .read()
            .iter()
            .any(|package| package.name.eq_ignore_ascii_case(name))
    }

    /// Licenses awaiting acceptance
    pub fn pending_licenses(&self) -> Vec<PackageLicenseInfo> {
        self.session.lock().licenses.pending().to_vec()
    }

    /// Libraries the in-flight session will download
    pub fn packages_to_install(&self) -> Vec<LibraryIdentity> {
        self.session
            .lock()
            .packages_to_install
            .iter()
            .map(|library| library.identity.clone())
            .collect()
    }

    /// Dependency tree of the most recent walk
    pub fn install_plan(&self) -> Option<ResolvedNode> {
        self.session.lock().plan.clone()
    }

    /// Start installing `name` at `version` for the default framework
    pub fn begin_install(&self, name: &str, version: &Version) -> Result<InstallStep, SessionError> {
        let framework = self.extractor.default_framework().clone();
        self.begin_install_for(name, version, framework)
    }

    /// Start installing `name` at `version` for `framework`
    pub fn begin_install_for(
        &self,
        name: &str,
        version: &Version,
        framework: Framework,
    ) -> Result<InstallStep, SessionError> {
        let cancel = {
            let mut session = self.session.lock();
            session.expect_state("begin an install", SessionState::Idle)?;
            if self.is_installed(name) {
                return Err(SessionError::AlreadyInstalled(name.to_string()));
            }

            session.reset();
            session.state = SessionState::Resolving;
            session.plan = None;
            session.request = Some(Request {
                name: name.to_string(),
                version: version.clone(),
                framework: framework.clone(),
            });
            session.cancel.clone()
        };
        info!(package = name, %version, %framework, "resolving");

        let walk = DependencyWalker::new(&self.cache, self.metadata.as_ref(), framework, name)
            .with_cancellation(cancel.clone())
            .walk(&LibraryRange::package(name, version.clone()));

        // Nothing but this call leaves Resolving, so the session is still ours
        let mut session = self.session.lock();
        let report = match walk {
            Ok(_) if cancel.is_cancelled() => {
                return Err(self.abort(&mut session, SessionError::Cancelled));
            }
            Ok(report) => report,
            Err(err) => return Err(self.abort(&mut session, err.into())),
        };

        debug!(
            package = name,
            libraries = report.packages_to_install.len(),
            fetches = report.fetches,
            "resolved"
        );
        let to_download = report
            .packages_to_install
            .iter()
            .map(|library| library.identity.clone())
            .collect();

        session.packages_to_install = report.packages_to_install;
        session.licenses = report.licenses;
        session.plan = Some(report.root);

        if session.licenses.is_open() {
            session.state = SessionState::Downloading;
            info!(package = name, "ready to download");
            Ok(InstallStep::ReadyToDownload(to_download))
        } else {
            session.state = SessionState::AwaitingLicenseAcceptance;
            info!(package = name, licenses = session.licenses.pending().len(), "awaiting license acceptance");
            Ok(InstallStep::AwaitingLicenseAcceptance(
                session.licenses.pending().to_vec(),
            ))
        }
    }

    /// Accept every pending license and move on to downloading
    pub fn accept_licenses(&self) -> Result<Vec<PackageLicenseInfo>, SessionError> {
        let mut session = self.session.lock();
        session.expect_state("accept licenses", SessionState::AwaitingLicenseAcceptance)?;

        let accepted = session.licenses.accept();
        session.state = SessionState::Downloading;
        info!(accepted = accepted.len(), "licenses accepted");
        Ok(accepted)
    }

    /// Reject the pending licenses, undoing the install
    pub fn reject_licenses(&self) -> Result<(), SessionError> {
        let mut session = self.session.lock();
        session.expect_state("reject licenses", SessionState::AwaitingLicenseAcceptance)?;

        info!(package = ?session.request_name(), "licenses rejected");
        self.rollback(&mut session);
        Ok(())
    }

    /// Cancel the in-flight install
    ///
    /// While resolving, this only signals the walker; the walk stops at its
    /// next fetch, rolls back and returns [`SessionError::Cancelled`] from
    /// `begin_install`. In the later states the rollback happens here.
    pub fn cancel(&self) -> Result<(), SessionError> {
        let mut session = self.session.lock();
        match session.state {
            SessionState::Idle => Err(SessionError::InvalidOperation {
                operation: "cancel",
                state: SessionState::Idle,
            }),
            SessionState::Resolving => {
                info!(package = ?session.request_name(), "cancellation requested");
                session.cancel.cancel();
                Ok(())
            }
            SessionState::AwaitingLicenseAcceptance | SessionState::Downloading => {
                info!(package = ?session.request_name(), "cancelled");
                session.cancel.cancel();
                self.rollback(&mut session);
                Ok(())
            }
        }
    }

    /// Fetch and extract every library of the session in parallel
    pub fn download(&self) -> Result<usize, SessionError> {
        let (libraries, cancel, generation) = {
            let mut session = self.session.lock();
            session.expect_state("download", SessionState::Downloading)?;
            if session.transfer_active || session.assets.is_some() {
                return Err(SessionError::InvalidOperation {
                    operation: "download twice",
                    state: session.state,
                });
            }
            session.transfer_active = true;
            (
                session.packages_to_install.clone(),
                session.cancel.clone(),
                session.generation,
            )
        };

        let results: Vec<Result<(String, ExtractedAssets), SessionError>> = libraries
            .par_iter()
            .filter(|library| library.identity.kind == LibraryKind::Package)
            .map(|library| self.fetch_and_extract(library, &cancel))
            .collect();

        let mut merged = ExtractedAssets::new();
        let mut failure = None;
        for result in results {
            match result.and_then(|(name, assets)| {
                merged
                    .merge(&name, assets)
                    .map_err(|source| SessionError::Extract { name, source })
            }) {
                Ok(()) => {}
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        let mut session = self.session.lock();
        if session.generation != generation || cancel.is_cancelled() {
            // Cancelled while transferring; the rollback already happened
            return Err(SessionError::Cancelled);
        }
        if let Some(err) = failure {
            return Err(self.abort(&mut session, err));
        }

        let files = merged.len();
        info!(libraries = libraries.len(), files, "downloaded");
        session.transfer_active = false;
        session.assets = Some(merged);
        Ok(files)
    }

    fn fetch_and_extract(
        &self,
        library: &ResolvedLibrary,
        cancel: &CancellationToken,
    ) -> Result<(String, ExtractedAssets), SessionError> {
        let name = library.name().to_string();
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        let bytes = self
            .archives
            .fetch_archive(&name, library.version())
            .map_err(|source| SessionError::Fetch {
                name: name.clone(),
                source,
            })?;

        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        let assets = self
            .extractor
            .extract_bytes(bytes, &library.target_framework)
            .map_err(|source| SessionError::Extract {
                name: name.clone(),
                source,
            })?;
        debug!(library = %library.identity, files = assets.len(), "extracted");
        Ok((name, assets))
    }

    /// Hand the downloaded assets to `sink` and record the install
    pub fn commit(&self, sink: &dyn StorageSink) -> Result<InstalledPackage, SessionError> {
        let mut session = self.session.lock();
        session.expect_state("commit", SessionState::Downloading)?;
        if session.transfer_active || session.assets.is_none() {
            return Err(SessionError::InvalidOperation {
                operation: "commit before download finished",
                state: session.state,
            });
        }

        let Some(request) = session.request.clone() else {
            return Err(SessionError::InvalidOperation {
                operation: "commit without a request",
                state: session.state,
            });
        };

        let assets = session.assets.take().unwrap_or_default();
        if let Err(err) = sink.store(&request.name, &assets) {
            return Err(self.abort(&mut session, err.into()));
        }

        let package = InstalledPackage {
            name: request.name.clone(),
            version: request.version.clone(),
            framework: request.framework.clone(),
            libraries: session
                .packages_to_install
                .iter()
                .map(|library| library.identity.clone())
                .collect(),
        };
        self.installed.write().push(package.clone());

        info!(package = %request.name, version = %request.version, files = assets.len(), "installed");
        session.reset();
        Ok(package)
    }

    /// Remove an installed package and the libraries only it needed
    ///
    /// Libraries that another installed package still needs are moved to
    /// that package instead of being removed: either it depends on them, or
    /// it was itself installed at top level after arriving as a dependency.
    /// The sink is asked to drop the package's assets unless some of them
    /// were moved. A sink failure leaves the installation untouched.
    pub fn uninstall(&self, name: &str, sink: &dyn StorageSink) -> Result<InstalledPackage, SessionError> {
        let session = self.session.lock();
        session.expect_state("uninstall", SessionState::Idle)?;

        let mut installed = self.installed.write();
        let index = installed
            .iter()
            .position(|package| package.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| SessionError::NotInstalled(name.to_string()))?;
        let package_name = installed[index].name.clone();

        let moves = self.shared_library_owners(&package_name, &installed);
        if moves.is_empty() {
            sink.remove(&package_name)?;
        } else {
            info!(package = %package_name, rehomed = moves.len(), "keeping assets still used by other packages");
        }

        let package = installed.remove(index);
        drop(installed);

        for (library, owner) in &moves {
            debug!(library = %library, owner = %owner, "re-homing");
            self.cache.rehome(library, owner);
        }
        let removed = self.cache.rollback(&package.name);
        info!(package = %package.name, removed = removed.len(), "uninstalled");
        Ok(package)
    }

    /// Entries of `package` that another installed package still needs,
    /// paired with their new owner
    fn shared_library_owners(&self, package: &str, installed: &[InstalledPackage]) -> Vec<(String, String)> {
        let entries = self.cache.entries();
        let mut owned: Vec<&CacheEntry> = entries
            .iter()
            .filter(|entry| entry.provenance.is_from(package))
            .collect();
        let mut moves: Vec<(String, String)> = Vec::new();

        // Source of an entry once the moves so far are applied
        let source_of = |entry: &CacheEntry, moves: &[(String, String)]| -> Option<String> {
            let name = entry.resolved.name();
            moves
                .iter()
                .find(|(moved, _)| moved.eq_ignore_ascii_case(name))
                .map(|(_, owner)| owner.clone())
                .or_else(|| entry.source().map(str::to_string))
        };

        loop {
            let mut progressed = false;

            owned.retain(|candidate| {
                let name = candidate.resolved.name();
                let top_level = installed
                    .iter()
                    .find(|p| p.name.eq_ignore_ascii_case(name) && !p.name.eq_ignore_ascii_case(package))
                    .map(|p| p.name.clone());
                let owner = top_level.or_else(|| {
                    entries.iter().find_map(|entry| {
                        let source = source_of(entry, &moves)?;
                        (!source.eq_ignore_ascii_case(package) && entry.resolved.depends_on(name))
                            .then_some(source)
                    })
                });
                match owner {
                    Some(owner) => {
                        moves.push((name.to_string(), owner));
                        progressed = true;
                        false
                    }
                    None => true,
                }
            });

            if !progressed {
                return moves;
            }
        }
    }

    /// Installed packages and their cache entries
    pub fn snapshot(&self) -> SessionSnapshot {
        let installed = self.installed.read().clone();
        let libraries = self
            .cache
            .entries()
            .into_iter()
            .filter_map(|entry| {
                let source = entry.source()?.to_string();
                installed
                    .iter()
                    .any(|package| package.name.eq_ignore_ascii_case(&source))
                    .then(|| LibraryRecord {
                        source,
                        library: (*entry.resolved).clone(),
                    })
            })
            .collect();

        SessionSnapshot {
            installed,
            libraries,
            ..SessionSnapshot::new()
        }
    }

    /// Load installed packages and their cache entries from a snapshot
    pub fn restore(&self, snapshot: SessionSnapshot) -> Result<(), SessionError> {
        snapshot.validate()?;
        let session = self.session.lock();
        session.expect_state("restore", SessionState::Idle)?;

        let mut installed = self.installed.write();
        for record in snapshot.libraries {
            let name = record.library.name().to_string();
            let entry = CacheEntry::installed_from(Arc::new(record.library), record.source);
            if !self.cache.try_insert(&name, entry) {
                warn!(library = %name, "already cached, keeping existing entry");
            }
        }
        for package in snapshot.installed {
            let key = library_key(&package.name);
            if !installed.iter().any(|p| library_key(&p.name) == key) {
                installed.push(package);
            }
        }
        debug!(installed = installed.len(), cached = self.cache.len(), "restored session");
        Ok(())
    }

    /// Roll back the in-flight request, reset and surface `error`
    fn abort(&self, session: &mut Session, error: SessionError) -> SessionError {
        warn!(package = ?session.request_name(), error = %error, "install aborted");
        self.rollback(session);
        error
    }

    fn rollback(&self, session: &mut Session) {
        if let Some(name) = session.request_name() {
            let removed = self.cache.rollback(&name);
            if !removed.is_empty() {
                warn!(package = %name, removed = removed.len(), "rolled back resolution");
            }
        }
        session.plan = None;
        session.reset();
    }
}
