//! License acceptance gate
//!
//! Packages that are newly added to the cache during a walk and whose
//! manifest requires license acceptance are queued here. Downloading may only
//! start once the queue has been accepted.

use crate::semver::Version;
use serde::Serialize;
use std::fmt;

/// License details shown to the user before download
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageLicenseInfo {
    pub package_name: String,
    pub version: Version,
    /// License expression, file name or URL
    pub license: Option<String>,
    pub authors: Vec<String>,
}

impl fmt::Display for PackageLicenseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.package_name, self.version)?;
        if !self.authors.is_empty() {
            write!(f, " by {}", self.authors.join(", "))?;
        }
        match &self.license {
            Some(license) => write!(f, " ({})", license),
            None => write!(f, " (license not specified)"),
        }
    }
}

/// Queue of licenses awaiting acceptance
#[derive(Debug, Default, Clone)]
pub struct LicenseGate {
    pending: Vec<PackageLicenseInfo>,
}

impl LicenseGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a license, ignoring packages that are already queued
    pub fn require(&mut self, info: PackageLicenseInfo) {
        let queued = self
            .pending
            .iter()
            .any(|p| p.package_name.eq_ignore_ascii_case(&info.package_name));
        if !queued {
            self.pending.push(info);
        }
    }

    /// Drop the queued license of `package_name`, if any
    pub fn withdraw(&mut self, package_name: &str) -> Option<PackageLicenseInfo> {
        let index = self
            .pending
            .iter()
            .position(|p| p.package_name.eq_ignore_ascii_case(package_name))?;
        Some(self.pending.remove(index))
    }

    pub fn pending(&self) -> &[PackageLicenseInfo] {
        &self.pending
    }

    pub fn is_open(&self) -> bool {
        self.pending.is_empty()
    }

    /// Consume the queue; accepted licenses are not shown again
    pub fn accept(&mut self) -> Vec<PackageLicenseInfo> {
        std::mem::take(&mut self.pending)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
