//! Config file commands.

use std::path::PathBuf;

use ags_config::{EngineConfig, config_path};
use anyhow::{Context, bail};
use clap::{Args, Subcommand};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the configuration the engine would run with
    Show {
        /// Config file (defaults to the per-user config)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Write a config file with every key at its default
    Init {
        /// Where to write (defaults to the per-user config)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print where the config file is looked up
    Path,
}

pub fn run(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show { config } => show(config),
        ConfigCommand::Init { config, force } => init(config, force),
        ConfigCommand::Path => {
            println!("{}", config_path(None).display());
            Ok(())
        }
    }
}

fn show(explicit: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path(explicit.as_deref());
    let config = if path.exists() {
        println!("# {}", path.display());
        EngineConfig::load(&path).with_context(|| format!("loading {}", path.display()))?
    } else if explicit.is_some() {
        bail!("{} does not exist", path.display());
    } else {
        println!("# {} (not found, defaults)", path.display());
        EngineConfig::default()
    };
    print!("{}", config.to_toml()?);
    config
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))
}

fn init(explicit: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = config_path(explicit.as_deref());
    if path.exists() && !force {
        bail!("{} already exists, use --force to overwrite", path.display());
    }
    EngineConfig::default()
        .save(&path)
        .with_context(|| format!("writing {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
