//! Live package installer (livepkg)

use clap::{Parser, Subcommand};
use livepkg::commands::{self, InstallOptions};
use livepkg::EngineConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "livepkg")]
#[command(about = "Install packages into a live runtime session", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the package feed
    Search {
        /// Search terms
        query: String,
        /// Maximum number of results
        #[arg(long, default_value_t = 20)]
        take: usize,
        /// Include prerelease packages
        #[arg(long)]
        prerelease: bool,
    },
    /// List published versions of a package
    Versions {
        /// Package name
        name: String,
    },
    /// Install a package and its dependencies
    Install {
        /// Package name
        name: String,
        /// Package version
        version: String,
        /// Accept licenses without prompting
        #[arg(short, long)]
        yes: bool,
        /// Target framework (e.g. net6.0)
        #[arg(long)]
        framework: Option<String>,
    },
    /// Show the dependency tree an install would produce
    Plan {
        /// Package name
        name: String,
        /// Package version
        version: String,
        /// Target framework (e.g. net6.0)
        #[arg(long)]
        framework: Option<String>,
    },
    /// List installed packages
    List,
    /// Remove an installed package
    Uninstall {
        /// Package name
        name: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = EngineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Search {
            query,
            take,
            prerelease,
        } => {
            commands::search_packages(&config, &query, take, prerelease)?;
        }
        Commands::Versions { name } => {
            commands::show_versions(&config, &name)?;
        }
        Commands::Install {
            name,
            version,
            yes,
            framework,
        } => {
            let options = InstallOptions {
                name,
                version,
                framework,
                accept_licenses: yes,
            };
            commands::install_package(&config, &options)?;
        }
        Commands::Plan {
            name,
            version,
            framework,
        } => {
            let options = InstallOptions {
                name,
                version,
                framework,
                accept_licenses: false,
            };
            commands::plan_package(&config, &options)?;
        }
        Commands::List => {
            commands::list_packages(&config)?;
        }
        Commands::Uninstall { name } => {
            commands::uninstall_package(&config, &name)?;
        }
    }

    Ok(())
}
