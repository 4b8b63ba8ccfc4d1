//! Install and plan commands

use super::{confirm, open_engine, parse_framework, parse_version, save_engine, CommandError};
use crate::config::EngineConfig;
use crate::license::PackageLicenseInfo;
use crate::session::{InstallStep, Installer, SessionState};
use crate::state::InstalledPackage;
use crate::storage::DirectorySink;

/// Install options
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Package identifier
    pub name: String,

    /// Version to install
    pub version: String,

    /// Target framework, defaults to the runtime framework
    pub framework: Option<String>,

    /// Accept licenses without prompting
    pub accept_licenses: bool,
}

/// Install one package and its dependencies
///
/// Returns `None` when the user declined the licenses.
pub fn install_package(
    config: &EngineConfig,
    options: &InstallOptions,
) -> Result<Option<InstalledPackage>, CommandError> {
    let version = parse_version(&options.version)?;
    let framework = parse_framework(options.framework.as_deref(), config)?;
    let installer = open_engine(config)?;

    println!("Resolving {} {} for {}...", options.name, version, framework);
    let step = installer.begin_install_for(&options.name, &version, framework)?;

    if let InstallStep::AwaitingLicenseAcceptance(licenses) = &step {
        print_licenses(licenses);
        let accepted = options.accept_licenses || confirm("Accept these licenses?")?;
        if !accepted {
            installer.reject_licenses()?;
            println!("Installation cancelled.");
            return Ok(None);
        }
        installer.accept_licenses()?;
    }

    let libraries = installer.packages_to_install();
    println!("Downloading {} package(s)...", libraries.len());
    let files = installer.download()?;

    let sink = DirectorySink::new(&config.storage.root);
    let package = installer.commit(&sink)?;
    save_engine(&installer, config)?;

    println!(
        "Installed {} {} ({} package(s), {} file(s))",
        package.name,
        package.version,
        libraries.len(),
        files
    );
    Ok(Some(package))
}

/// Resolve a package and print its dependency tree without installing
pub fn plan_package(config: &EngineConfig, options: &InstallOptions) -> Result<String, CommandError> {
    let version = parse_version(&options.version)?;
    let framework = parse_framework(options.framework.as_deref(), config)?;
    let installer = open_engine(config)?;

    let step = installer.begin_install_for(&options.name, &version, framework)?;
    let plan = installer
        .install_plan()
        .map(|tree| tree.to_string())
        .unwrap_or_default();

    print!("{}", plan);
    if let InstallStep::AwaitingLicenseAcceptance(licenses) = &step {
        print_licenses(licenses);
    }

    discard(&installer)?;
    Ok(plan)
}

fn discard(installer: &Installer) -> Result<(), CommandError> {
    if installer.state() != SessionState::Idle {
        installer.cancel()?;
    }
    Ok(())
}

fn print_licenses(licenses: &[PackageLicenseInfo]) {
    println!("The following packages require license acceptance:");
    for license in licenses {
        println!("  {}", license);
    }
}
