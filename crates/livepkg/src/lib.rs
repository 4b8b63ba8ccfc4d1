//! Live package installer
//!
//! This crate resolves and installs packages into a running session:
//! - Versions, ranges and target framework tokens
//! - Resolution cache with a greedy conflict policy
//! - Recursive dependency walk against a package feed
//! - License acceptance gate
//! - Platform-aware extraction of binaries and static web assets
//! - Single-flight installation sessions with rollback

pub mod archive;
pub mod cache;
pub mod cancel;
pub mod commands;
pub mod config;
pub mod extract;
pub mod framework;
pub mod library;
pub mod license;
pub mod registry;
pub mod resolver;
pub mod semver;
pub mod session;
pub mod state;
pub mod storage;

pub use archive::{open_archive, ArchiveContainer, ArchiveEntry, ArchiveError};
pub use cache::{CacheEntry, ConflictDecision, ConflictPolicy, ConflictReason, Provenance, ResolutionCache};
pub use cancel::CancellationToken;
pub use config::{ConfigError, EngineConfig};
pub use extract::{AssetKind, ContentExtractor, ExtractError, ExtractedAssets};
pub use framework::{Framework, FrameworkError, FrameworkFamily};
pub use library::{DependencyRange, LibraryIdentity, LibraryKind, LibraryRange, ResolvedLibrary};
pub use license::{LicenseGate, PackageLicenseInfo};
pub use registry::{ArchiveSource, DependencyInfo, LocalFeed, MetadataSource, RegistryClient, RegistryError};
pub use resolver::{DependencyWalker, ResolvedNode, ResolverError, WalkReport};
pub use semver::{SemverError, Version, VersionRange};
pub use session::{ErrorKind, InstallStep, Installer, SessionError, SessionState};
pub use state::{InstalledPackage, SessionSnapshot, StateError};
pub use storage::{DirectorySink, StorageError, StorageSink};
