//! Read-only commands: search, versions, list

use super::{open_engine, CommandError};
use crate::config::EngineConfig;
use crate::session::Installer;
use crate::state::InstalledPackage;

/// Search the feed
pub fn search_packages(
    config: &EngineConfig,
    query: &str,
    take: usize,
    prerelease: bool,
) -> Result<Vec<String>, CommandError> {
    let mut config = config.clone();
    config.feed.include_prerelease |= prerelease;

    let installer = Installer::from_config(&config)?;
    let names = installer.search_packages(query, take)?;

    if names.is_empty() {
        println!("No packages match '{}'.", query);
    }
    for name in &names {
        println!("{}", name);
    }
    Ok(names)
}

/// Print the published versions of a package
pub fn show_versions(config: &EngineConfig, name: &str) -> Result<Vec<String>, CommandError> {
    let installer = Installer::from_config(config)?;
    let versions: Vec<String> = installer
        .get_versions(name)?
        .iter()
        .map(ToString::to_string)
        .collect();

    for version in &versions {
        println!("{}", version);
    }
    Ok(versions)
}

/// Print the installed packages
pub fn list_packages(config: &EngineConfig) -> Result<Vec<InstalledPackage>, CommandError> {
    let installer = open_engine(config)?;
    let packages = installer.list_installed_packages();

    if packages.is_empty() {
        println!("No packages installed.");
    }
    for package in &packages {
        println!(
            "{} {} [{}] ({} librar{})",
            package.name,
            package.version,
            package.framework,
            package.libraries.len(),
            if package.libraries.len() == 1 { "y" } else { "ies" }
        );
    }
    Ok(packages)
}
