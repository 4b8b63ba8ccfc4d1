//! Conflict policy for libraries that are already cached
//!
//! The policy is greedy: the first version of a library that lands in the
//! cache wins unless it can be safely replaced. There is no backtracking.

use super::{CacheEntry, Provenance};
use crate::semver::Version;
use std::fmt;

/// Outcome of checking a request against a cached entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictDecision {
    /// Cached version satisfies the request; reuse it
    Accept,
    /// Request cannot be honoured
    Reject(ConflictReason),
    /// Cached entry is stale and may be replaced; drop it and resolve again
    EvictAndRetry,
}

/// Why a request was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// Cached entry belongs to the host runtime
    Fixed,
    /// Other cached entries were installed on behalf of the cached library
    DependedUpon,
    /// Cached entry belongs to another installed package
    OwnedBy(String),
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::Fixed => write!(f, "the host runtime version cannot be replaced"),
            ConflictReason::DependedUpon => {
                write!(f, "other installed libraries were resolved against it")
            }
            ConflictReason::OwnedBy(owner) => write!(f, "it is in use by installed package {}", owner),
        }
    }
}

/// Pure decision function consulted by the dependency walker
pub struct ConflictPolicy;

impl ConflictPolicy {
    /// Decide what to do when `requested` hits an existing cache entry
    ///
    /// * `root` - top-level package being installed
    /// * `depended_upon` - whether any cached entry names the cached library
    ///   as its source package
    pub fn decide(
        cached: &CacheEntry,
        requested: &Version,
        root: &str,
        depended_upon: bool,
    ) -> ConflictDecision {
        if cached.resolved.version() >= requested {
            return ConflictDecision::Accept;
        }

        match &cached.provenance {
            Provenance::Fixed => ConflictDecision::Reject(ConflictReason::Fixed),
            _ if depended_upon => ConflictDecision::Reject(ConflictReason::DependedUpon),
            Provenance::InstalledFrom(owner) if !owner.eq_ignore_ascii_case(root) => {
                ConflictDecision::Reject(ConflictReason::OwnedBy(owner.clone()))
            }
            Provenance::InstalledFrom(_) => ConflictDecision::EvictAndRetry,
        }
    }
}
