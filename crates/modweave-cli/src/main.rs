//! Modweave CLI
//!
//! Developer tool for managing the mod registry and running mods from job files.

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Modweave - ETL mods driven by YAML jobs
#[derive(Parser)]
#[command(name = "modweave")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Registry file path
    #[arg(short, long, default_value = modweave_core::registry::REGISTRY_FILE)]
    registry: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty registry file if none exists
    InitRegistry,

    /// List registered mods
    ListRegistry {
        /// Only show mods in this category
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Show details for a registered mod
    ModInfo {
        /// Mod type
        mod_type: String,
    },

    /// Register a built-in mod by module path
    RegisterMod {
        /// Module path, e.g. modweave_mods::file_reader
        module_path: String,
    },

    /// Remove a mod from the registry
    DeleteMod {
        /// Mod type
        mod_type: String,
    },

    /// Check every registry entry against the built-in mods
    ValidateRegistry,

    /// List the module paths that can be registered
    ListCatalog,

    /// Run one mod instance from a job file
    RunMod {
        /// Mod instance name under `mods:` in the job file
        mod_name: String,

        /// Job file (YAML)
        #[arg(short, long)]
        params: String,

        /// Context file (JSON) for ${...} substitution
        #[arg(short, long)]
        context: Option<String>,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::InitRegistry => {
            commands::registry::init(&cli.registry)?;
        }
        Commands::ListRegistry { category } => {
            commands::registry::list(&cli.registry, category.as_deref())?;
        }
        Commands::ModInfo { mod_type } => {
            commands::registry::info(&cli.registry, &mod_type)?;
        }
        Commands::RegisterMod { module_path } => {
            commands::registry::register(&cli.registry, &module_path)?;
        }
        Commands::DeleteMod { mod_type } => {
            commands::registry::delete(&cli.registry, &mod_type)?;
        }
        Commands::ValidateRegistry => {
            return commands::registry::validate(&cli.registry);
        }
        Commands::ListCatalog => {
            commands::registry::catalog();
        }
        Commands::RunMod {
            mod_name,
            params,
            context,
        } => {
            return commands::run::run(&cli.registry, &mod_name, &params, context.as_deref());
        }
    }

    Ok(ExitCode::SUCCESS)
}
