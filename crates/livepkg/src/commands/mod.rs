//! Command implementations for the `livepkg` binary
//!
//! Each command opens the engine from configuration, restores the persisted
//! session, does its work and saves the session again.

pub mod install;
pub mod query;
pub mod uninstall;

pub use install::{install_package, plan_package, InstallOptions};
pub use query::{list_packages, search_packages, show_versions};
pub use uninstall::uninstall_package;

use crate::config::{ConfigError, EngineConfig};
use crate::framework::{Framework, FrameworkError};
use crate::semver::{SemverError, Version};
use crate::session::{Installer, SessionError};
use crate::state::{SessionSnapshot, StateError};
use std::io::{self, BufRead, Write};
use thiserror::Error;

/// Errors that can occur while running a command
#[derive(Debug, Error)]
pub enum CommandError {
    /// Configuration error
    #[error("Config error: {0}")]
    ConfigError(#[from] ConfigError),

    /// Engine error
    #[error("{0}")]
    SessionError(#[from] SessionError),

    /// Session state error
    #[error("State error: {0}")]
    StateError(#[from] StateError),

    /// Version argument could not be parsed
    #[error("Invalid version: {0}")]
    VersionError(#[from] SemverError),

    /// Framework argument could not be parsed
    #[error("Invalid framework: {0}")]
    FrameworkError(#[from] FrameworkError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Create the engine and load the persisted session into it
pub fn open_engine(config: &EngineConfig) -> Result<Installer, CommandError> {
    let installer = Installer::from_config(config)?;
    let snapshot = SessionSnapshot::load_or_default(&config.storage.state_file)?;
    installer.restore(snapshot)?;
    Ok(installer)
}

/// Persist the engine's installed packages
pub fn save_engine(installer: &Installer, config: &EngineConfig) -> Result<(), CommandError> {
    installer.snapshot().to_file(&config.storage.state_file)?;
    Ok(())
}

pub(crate) fn parse_version(version: &str) -> Result<Version, CommandError> {
    Ok(Version::parse(version)?)
}

pub(crate) fn parse_framework(
    framework: Option<&str>,
    config: &EngineConfig,
) -> Result<Framework, CommandError> {
    match framework {
        Some(token) => Ok(Framework::parse(token)?),
        None => Ok(config.runtime.framework()?),
    }
}

/// Ask a yes/no question on stdin; anything but `y`/`yes` is no
pub(crate) fn confirm(prompt: &str) -> Result<bool, CommandError> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    let answer = answer.trim();
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}
