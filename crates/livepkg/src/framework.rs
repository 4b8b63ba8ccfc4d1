//! Target framework tokens
//!
//! Parses framework monikers in both the short folder form used inside
//! package archives (`netstandard2.0`, `net461`, `net6.0-windows`) and the
//! long form used by package manifests (`.NETStandard2.0`), and decides which
//! candidate framework is the nearest compatible one for a target.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur while parsing a framework token
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameworkError {
    /// Token does not name a known framework family
    #[error("Unknown framework: {0}")]
    UnknownFramework(String),

    /// Family is recognised but the version part is malformed
    #[error("Invalid framework version in '{0}'")]
    InvalidVersion(String),
}

/// Framework family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameworkFamily {
    /// Classic desktop framework (`net461`, `net48`)
    NetFramework,
    /// Portable API surface (`netstandard2.0`)
    NetStandard,
    /// Cross-platform runtime, including `net5.0` and later
    NetCoreApp,
    /// Framework-agnostic content
    Any,
}

/// Framework version as (major, minor, patch)
pub type FrameworkVersion = (u32, u32, u32);

/// A parsed target framework
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Framework {
    family: FrameworkFamily,
    version: FrameworkVersion,
    platform: Option<String>,
}

impl Framework {
    /// The framework-agnostic token
    pub const fn any() -> Self {
        Framework {
            family: FrameworkFamily::Any,
            version: (0, 0, 0),
            platform: None,
        }
    }

    pub fn new(family: FrameworkFamily, version: FrameworkVersion) -> Self {
        Framework {
            family,
            version,
            platform: None,
        }
    }

    /// Attach an OS/platform qualifier (`net6.0-windows`)
    pub fn with_platform(mut self, platform: &str) -> Self {
        self.platform = Some(platform.to_ascii_lowercase());
        self
    }

    pub fn family(&self) -> FrameworkFamily {
        self.family
    }

    pub fn version(&self) -> FrameworkVersion {
        self.version
    }

    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    pub fn is_any(&self) -> bool {
        self.family == FrameworkFamily::Any
    }

    /// Parse a framework token, short or long form
    ///
    /// Parsing is strict: folder names that are not framework monikers
    /// (`lib`, `ref`, `portable-net45+win8`) are rejected.
    pub fn parse(token: &str) -> Result<Self, FrameworkError> {
        let trimmed = token.trim();
        let lower = trimmed.to_ascii_lowercase();

        if lower == "any" || lower == "agnostic" {
            return Ok(Self::any());
        }

        if let Some(rest) = lower.strip_prefix(".netstandard") {
            return Ok(Self::new(FrameworkFamily::NetStandard, parse_dotted(rest, trimmed)?));
        }
        if let Some(rest) = lower.strip_prefix(".netcoreapp") {
            return Ok(Self::new(FrameworkFamily::NetCoreApp, parse_dotted(rest, trimmed)?));
        }
        if let Some(rest) = lower.strip_prefix(".netframework") {
            return Ok(Self::new(FrameworkFamily::NetFramework, parse_dotted(rest, trimmed)?));
        }
        if let Some(rest) = lower.strip_prefix("netstandard") {
            return Ok(Self::new(FrameworkFamily::NetStandard, parse_dotted(rest, trimmed)?));
        }
        if let Some(rest) = lower.strip_prefix("netcoreapp") {
            return Ok(Self::new(FrameworkFamily::NetCoreApp, parse_dotted(rest, trimmed)?));
        }
        if let Some(rest) = lower.strip_prefix("net") {
            let (version_part, platform) = match rest.split_once('-') {
                Some((v, p)) if !p.is_empty() && p.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') => {
                    (v, Some(p))
                }
                Some(_) => return Err(FrameworkError::UnknownFramework(trimmed.to_string())),
                None => (rest, None),
            };

            if version_part.contains('.') {
                // net5.0 and later are the NetCoreApp family
                let version = parse_dotted(version_part, trimmed)?;
                if version.0 < 5 {
                    return Err(FrameworkError::InvalidVersion(trimmed.to_string()));
                }
                let mut framework = Self::new(FrameworkFamily::NetCoreApp, version);
                framework.platform = platform.map(str::to_string);
                return Ok(framework);
            }

            if platform.is_some() {
                return Err(FrameworkError::UnknownFramework(trimmed.to_string()));
            }
            return Ok(Self::new(FrameworkFamily::NetFramework, parse_compact(version_part, trimmed)?));
        }

        Err(FrameworkError::UnknownFramework(trimmed.to_string()))
    }

    /// Highest NetStandard version this framework can consume
    fn max_netstandard(&self) -> Option<FrameworkVersion> {
        match self.family {
            FrameworkFamily::NetStandard => Some(self.version),
            FrameworkFamily::NetCoreApp => Some(match self.version.0 {
                0 | 1 => (1, 6, 0),
                2 => (2, 0, 0),
                _ => (2, 1, 0),
            }),
            FrameworkFamily::NetFramework => {
                let v = self.version;
                if v >= (4, 6, 1) {
                    Some((2, 0, 0))
                } else if v >= (4, 6, 0) {
                    Some((1, 3, 0))
                } else if v >= (4, 5, 1) {
                    Some((1, 2, 0))
                } else if v >= (4, 5, 0) {
                    Some((1, 1, 0))
                } else {
                    None
                }
            }
            FrameworkFamily::Any => None,
        }
    }

    /// Whether a project targeting `target` can consume content built for `self`
    pub fn is_compatible_with(&self, target: &Framework) -> bool {
        if self.is_any() {
            return true;
        }
        if target.is_any() {
            return false;
        }

        if let Some(platform) = &self.platform {
            if target.platform.as_deref() != Some(platform.as_str()) {
                return false;
            }
        }

        if self.family == target.family {
            return self.version <= target.version;
        }

        if self.family == FrameworkFamily::NetStandard {
            return target
                .max_netstandard()
                .is_some_and(|supported| self.version <= supported);
        }

        false
    }

    /// Precedence of a compatible candidate for a target, higher is nearer
    fn precedence(&self, target: &Framework) -> (u8, FrameworkVersion, bool) {
        let tier = if self == target {
            4
        } else if self.family == target.family {
            3
        } else if self.family == FrameworkFamily::NetStandard {
            2
        } else if self.is_any() {
            0
        } else {
            1
        };
        (tier, self.version, self.platform.is_some())
    }

    /// Pick the nearest compatible candidate for `target`
    ///
    /// Exact matches win, then the same family at the highest version not
    /// above the target, then NetStandard, then anything else compatible, and
    /// finally framework-agnostic candidates. Returns `None` when nothing is
    /// compatible.
    pub fn nearest<'a, I>(target: &Framework, candidates: I) -> Option<&'a Framework>
    where
        I: IntoIterator<Item = &'a Framework>,
    {
        candidates
            .into_iter()
            .filter(|candidate| candidate.is_compatible_with(target))
            .max_by_key(|candidate| candidate.precedence(target))
    }

    /// Short folder name (`netstandard2.0`, `net461`, `net6.0-browser`)
    pub fn folder_name(&self) -> String {
        let (major, minor, patch) = self.version;
        let mut name = match self.family {
            FrameworkFamily::Any => return "any".to_string(),
            FrameworkFamily::NetStandard => format!("netstandard{}.{}", major, minor),
            FrameworkFamily::NetCoreApp if major >= 5 => format!("net{}.{}", major, minor),
            FrameworkFamily::NetCoreApp => format!("netcoreapp{}.{}", major, minor),
            FrameworkFamily::NetFramework if patch > 0 => format!("net{}{}{}", major, minor, patch),
            FrameworkFamily::NetFramework => format!("net{}{}", major, minor),
        };
        if let Some(platform) = &self.platform {
            name.push('-');
            name.push_str(platform);
        }
        name
    }
}

/// Parse `2.0`, `3.1`, `4.6.1`
fn parse_dotted(rest: &str, original: &str) -> Result<FrameworkVersion, FrameworkError> {
    let invalid = || FrameworkError::InvalidVersion(original.to_string());
    let parts: Vec<&str> = rest.split('.').collect();
    if rest.is_empty() || parts.len() > 3 {
        return Err(invalid());
    }
    let mut numbers = [0u32; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        *slot = part.parse().map_err(|_| invalid())?;
    }
    Ok((numbers[0], numbers[1], numbers[2]))
}

/// Parse compact digit versions used by classic frameworks (`45`, `461`, `48`)
fn parse_compact(rest: &str, original: &str) -> Result<FrameworkVersion, FrameworkError> {
    if rest.len() < 2 || rest.len() > 3 || !rest.chars().all(|c| c.is_ascii_digit()) {
        return Err(FrameworkError::UnknownFramework(original.to_string()));
    }
    let digits: Vec<u32> = rest.chars().filter_map(|c| c.to_digit(10)).collect();
    Ok((digits[0], digits[1], digits.get(2).copied().unwrap_or(0)))
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.folder_name())
    }
}

impl std::str::FromStr for Framework {
    type Err = FrameworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Framework::parse(s)
    }
}

impl TryFrom<String> for Framework {
    type Error = FrameworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Framework::parse(&value)
    }
}

impl From<Framework> for String {
    fn from(framework: Framework) -> Self {
        framework.folder_name()
    }
}
