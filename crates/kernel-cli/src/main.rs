//! `skillkernel`: a thin CLI harness over a `kernel_runtime::Kernel`.
//!
//! Subcommands map directly onto the kernel's external surface: `invoke` is
//! the dispatch gateway itself, `list`/`find`/`info` read the Metadata and
//! Ghost indices, `pin`/`unpin` manage the Resident Set, `serve` runs the
//! Hot Reload Controller in the foreground, and `config` prints the
//! effective configuration.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use kernel_cli::commands;
use kernel_runtime::{Kernel, KernelConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "skillkernel", version, about = "Skill Kernel dispatch harness")]
struct Cli {
    /// Path to a KernelConfig TOML file. Defaults (plus SKILL_KERNEL_* env
    /// overrides) are used if omitted.
    #[arg(long, global = true, env = "SKILL_KERNEL_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `skills_root_path` from the config file/defaults.
    #[arg(long, global = true)]
    skills_root: Option<PathBuf>,

    /// Emit machine-readable JSON instead of formatted text, where supported.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Invoke a dispatch target: "skill.command", "skill" (help), or "help".
    Invoke {
        target: String,
        /// Command arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        args: String,
        #[arg(long, default_value = "cli")]
        session: String,
    },
    /// List every known skill, resident or ghost.
    List,
    /// Semantic search over skills not currently resident.
    Find {
        query: String,
    },
    /// A skill's protocol and command table.
    Info {
        skill_id: String,
    },
    /// Pin a resident skill so it's never evicted under capacity pressure.
    Pin {
        skill_id: String,
    },
    /// Undo `pin`.
    Unpin {
        skill_id: String,
    },
    /// Run the Hot Reload Controller in the foreground.
    Serve,
    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match KernelConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{} malformed configuration: {:#}", "Error:".red().bold(), err);
                std::process::exit(2);
            }
        },
        None => KernelConfig::default().with_env_overrides(),
    };
    if let Some(root) = cli.skills_root {
        config.skills_root_path = root;
    }

    if matches!(cli.command, Commands::Config) {
        commands::config::execute(&config)?;
        return Ok(());
    }

    run(cli, config).await
}

async fn run(cli: Cli, config: KernelConfig) -> Result<()> {
    let kernel = match Kernel::bootstrap(config).await {
        Ok(kernel) => kernel,
        Err(err) => {
            if let Some(bootstrap_err) = err.downcast_ref::<kernel_runtime::KernelBootstrapError>() {
                eprintln!("{} {}", "Error:".red().bold(), bootstrap_err);
                match bootstrap_err {
                    kernel_runtime::KernelBootstrapError::SkillsRootNotFound(_) => std::process::exit(3),
                    kernel_runtime::KernelBootstrapError::MetadataIndexUnreadable(_) => std::process::exit(4),
                }
            }
            eprintln!("{} {:#}", "Error:".red().bold(), err);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Invoke { target, args, session } => {
            commands::invoke::execute(&kernel, &target, &args, &session).await?
        }
        Commands::List => commands::list::execute(&kernel, cli.json)?,
        Commands::Find { query } => commands::find::execute(&kernel, &query, cli.json).await?,
        Commands::Info { skill_id } => commands::info::execute(&kernel, &skill_id, cli.json).await?,
        Commands::Pin { skill_id } => commands::resident::pin(&kernel, &skill_id)?,
        Commands::Unpin { skill_id } => commands::resident::unpin(&kernel, &skill_id)?,
        Commands::Serve => commands::serve::execute(&kernel).await?,
        Commands::Config => unreachable!("handled before kernel bootstrap"),
    }

    Ok(())
}
