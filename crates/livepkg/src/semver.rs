//! Package versions and version ranges
//!
//! Versions follow the four-part `MAJOR.MINOR.PATCH[.REVISION]` scheme used by
//! package feeds, with optional pre-release and build labels. Ranges use the
//! interval notation found in package manifests (`[1.0,2.0)`, `(,3.0]`, `1.*`).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Errors that can occur during version parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SemverError {
    /// Invalid version format
    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    /// Invalid range format
    #[error("Invalid version range: {0}")]
    InvalidRange(String),

    /// Invalid pre-release tag
    #[error("Invalid pre-release tag: {0}")]
    InvalidPrerelease(String),
}

/// Package version (MAJOR.MINOR.PATCH[.REVISION])
///
/// Build metadata is carried for display but ignored by comparisons.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub revision: u64,
    pub prerelease: Option<String>,
    pub build: Option<String>,
}

impl Version {
    /// Parse a version string
    ///
    /// Missing numeric components default to zero, so `"2"`, `"2.0"` and
    /// `"2.0.0.0"` all parse to the same version.
    pub fn parse(s: &str) -> Result<Self, SemverError> {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);

        if s.is_empty() {
            return Err(SemverError::InvalidVersion("empty version".to_string()));
        }

        let (version_part, build) = match s.split_once('+') {
            Some((v, b)) => (v, Some(b.to_string())),
            None => (s, None),
        };

        let (core_version, prerelease) = match version_part.split_once('-') {
            Some((v, p)) => {
                if p.is_empty() || p.split('.').any(|ident| ident.is_empty()) {
                    return Err(SemverError::InvalidPrerelease(p.to_string()));
                }
                (v, Some(p.to_string()))
            }
            None => (version_part, None),
        };

        let parts: Vec<&str> = core_version.split('.').collect();
        if parts.len() > 4 {
            return Err(SemverError::InvalidVersion(format!(
                "Expected at most four numeric parts, got '{}'",
                s
            )));
        }

        let mut numbers = [0u64; 4];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| {
                SemverError::InvalidVersion(format!("Invalid numeric part '{}' in '{}'", part, s))
            })?;
        }

        Ok(Version {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            revision: numbers[3],
            prerelease,
            build,
        })
    }

    /// Create a new release version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version {
            major,
            minor,
            patch,
            revision: 0,
            prerelease: None,
            build: None,
        }
    }

    /// Attach a pre-release label
    pub fn with_prerelease(mut self, label: &str) -> Self {
        self.prerelease = Some(label.to_string());
        self
    }

    /// Check if this is a prerelease version
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    fn compare_prerelease(a: &str, b: &str) -> Ordering {
        let mut left = a.split('.');
        let mut right = b.split('.');
        loop {
            match (left.next(), right.next()) {
                (None, None) => return Ordering::Equal,
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (Some(l), Some(r)) => {
                    let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
                        (Ok(ln), Ok(rn)) => ln.cmp(&rn),
                        (Ok(_), Err(_)) => Ordering::Less,
                        (Err(_), Ok(_)) => Ordering::Greater,
                        (Err(_), Err(_)) => l.to_ascii_lowercase().cmp(&r.to_ascii_lowercase()),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
            }
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.revision != 0 {
            write!(f, ".{}", self.revision)?;
        }
        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }
        if let Some(ref build) = self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Version {
    type Error = SemverError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Version::parse(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then(self.revision.cmp(&other.revision))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => Self::compare_prerelease(a, b),
            })
    }
}

/// Version range in interval notation
///
/// | Notation     | Meaning              |
/// |--------------|----------------------|
/// | `1.0`        | `1.0 <= v`           |
/// | `[1.0]`      | `v == 1.0`           |
/// | `(1.0,)`     | `1.0 < v`            |
/// | `[1.0,2.0)`  | `1.0 <= v < 2.0`     |
/// | `(,2.0]`     | `v <= 2.0`           |
/// | `1.*`        | `1.0 <= v` (floating)|
/// | `*`          | any version          |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    min: Option<Version>,
    min_inclusive: bool,
    max: Option<Version>,
    max_inclusive: bool,
    floating: bool,
}

impl VersionRange {
    /// Range with an inclusive lower bound and no upper bound
    pub fn at_least(version: Version) -> Self {
        VersionRange {
            min: Some(version),
            min_inclusive: true,
            max: None,
            max_inclusive: false,
            floating: false,
        }
    }

    /// Range matching exactly one version
    pub fn exact(version: Version) -> Self {
        VersionRange {
            min: Some(version.clone()),
            min_inclusive: true,
            max: Some(version),
            max_inclusive: true,
            floating: false,
        }
    }

    /// Range matching every version
    pub fn any() -> Self {
        VersionRange {
            min: None,
            min_inclusive: false,
            max: None,
            max_inclusive: false,
            floating: true,
        }
    }

    /// Parse a range string
    pub fn parse(s: &str) -> Result<Self, SemverError> {
        let s = s.trim();

        if s.is_empty() || s == "*" {
            return Ok(Self::any());
        }

        if s.starts_with('[') || s.starts_with('(') {
            return Self::parse_interval(s);
        }

        if s.contains('*') {
            return Self::parse_floating(s);
        }

        Ok(Self::at_least(Version::parse(s)?))
    }

    fn parse_interval(s: &str) -> Result<Self, SemverError> {
        let min_inclusive = s.starts_with('[');
        let max_inclusive = if s.ends_with(']') {
            true
        } else if s.ends_with(')') {
            false
        } else {
            return Err(SemverError::InvalidRange(format!("unterminated interval '{}'", s)));
        };

        let inner = s[1..s.len() - 1].trim();

        let Some((low, high)) = inner.split_once(',') else {
            // Single-version intervals only make sense as `[x]`
            if !(min_inclusive && max_inclusive) || inner.is_empty() {
                return Err(SemverError::InvalidRange(format!(
                    "'{}' must be written as [version]",
                    s
                )));
            }
            return Ok(Self::exact(Version::parse(inner)?));
        };

        let parse_bound = |bound: &str| -> Result<Option<Version>, SemverError> {
            let bound = bound.trim();
            if bound.is_empty() {
                Ok(None)
            } else {
                Version::parse(bound).map(Some)
            }
        };

        let min = parse_bound(low)?;
        let max = parse_bound(high)?;

        if min.is_none() && max.is_none() {
            return Err(SemverError::InvalidRange(format!("'{}' has no bounds", s)));
        }

        if let (Some(lo), Some(hi)) = (&min, &max) {
            let empty = match lo.cmp(hi) {
                Ordering::Greater => true,
                Ordering::Equal => !(min_inclusive && max_inclusive),
                Ordering::Less => false,
            };
            if empty {
                return Err(SemverError::InvalidRange(format!("'{}' matches nothing", s)));
            }
        }

        Ok(VersionRange {
            min_inclusive: min.is_some() && min_inclusive,
            max_inclusive: max.is_some() && max_inclusive,
            min,
            max,
            floating: false,
        })
    }

    /// Parse floating ranges (`1.*`, `1.2.*`)
    fn parse_floating(s: &str) -> Result<Self, SemverError> {
        let parts: Vec<&str> = s.split('.').collect();
        let Some((last, fixed)) = parts.split_last() else {
            return Err(SemverError::InvalidRange(s.to_string()));
        };

        if *last != "*" || fixed.is_empty() || fixed.len() > 3 || fixed.iter().any(|p| p.contains('*')) {
            return Err(SemverError::InvalidRange(format!("Invalid floating range: {}", s)));
        }

        let floor = Version::parse(&fixed.join("."))
            .map_err(|_| SemverError::InvalidRange(format!("Invalid floating range: {}", s)))?;

        Ok(VersionRange {
            min: Some(floor),
            min_inclusive: true,
            max: None,
            max_inclusive: false,
            floating: true,
        })
    }

    /// Check if a version satisfies this range
    pub fn satisfies(&self, version: &Version) -> bool {
        let above_min = match &self.min {
            Some(min) if self.min_inclusive => version >= min,
            Some(min) => version > min,
            None => true,
        };
        let below_max = match &self.max {
            Some(max) if self.max_inclusive => version <= max,
            Some(max) => version < max,
            None => true,
        };
        above_min && below_max
    }

    /// Lower bound of the range, if any
    pub fn min_version(&self) -> Option<&Version> {
        self.min.as_ref()
    }

    /// Upper bound of the range, if any
    pub fn max_version(&self) -> Option<&Version> {
        self.max.as_ref()
    }

    /// Whether the lower bound is itself a member of the range
    pub fn is_min_inclusive(&self) -> bool {
        self.min.is_some() && self.min_inclusive
    }

    /// Whether the range was written with a `*` wildcard
    pub fn is_floating(&self) -> bool {
        self.floating
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.min, &self.max) {
            (None, None) => write!(f, "*"),
            (Some(min), Some(max)) if min == max && self.min_inclusive && self.max_inclusive => {
                write!(f, "[{}]", min)
            }
            (Some(min), None) if self.min_inclusive => write!(f, "{}", min),
            (min, max) => {
                write!(f, "{}", if self.min_inclusive { '[' } else { '(' })?;
                if let Some(min) = min {
                    write!(f, "{}", min)?;
                }
                write!(f, ", ")?;
                if let Some(max) = max {
                    write!(f, "{}", max)?;
                }
                write!(f, "{}", if self.max_inclusive { ']' } else { ')' })
            }
        }
    }
}

impl TryFrom<String> for VersionRange {
    type Error = SemverError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        VersionRange::parse(&value)
    }
}

impl From<VersionRange> for String {
    fn from(range: VersionRange) -> Self {
        range.to_string()
    }
}
