//! ags - headless driver for the AGS recall engine.

mod commands;
mod instrument;
mod meter;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ags")]
#[command(author, version, about = "AGS recall engine CLI", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the threaded engine with a demo instrument
    Run(commands::run::RunArgs),

    /// Render ticks synchronously and print output levels
    Render(commands::render::RenderArgs),

    /// Show, create or locate the engine config file
    Config(commands::config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Render(args) => commands::render::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
