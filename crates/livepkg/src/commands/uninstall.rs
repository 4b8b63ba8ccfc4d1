//! Uninstall command

use super::{open_engine, save_engine, CommandError};
use crate::config::EngineConfig;
use crate::state::InstalledPackage;
use crate::storage::DirectorySink;

/// Remove an installed package
pub fn uninstall_package(config: &EngineConfig, name: &str) -> Result<InstalledPackage, CommandError> {
    let installer = open_engine(config)?;
    let sink = DirectorySink::new(&config.storage.root);

    let package = installer.uninstall(name, &sink)?;
    save_engine(&installer, config)?;

    println!("Removed {} {}", package.name, package.version);
    Ok(package)
}
