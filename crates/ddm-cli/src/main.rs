mod commands;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ddm", about = "Differential dynamic microscopy of particle suspensions")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show recording metadata
    Info(commands::info::InfoArgs),
    /// Print or save a default analysis config
    Config(commands::config::ConfigArgs),
    /// Measure diffusion and particle size from a recording
    Run(commands::pipeline::RunArgs),
    /// Write a synthetic video of Brownian particles
    Synth(commands::synth::SynthArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Config(args) => commands::config::run(args),
        Commands::Run(args) => commands::pipeline::run(args),
        Commands::Synth(args) => commands::synth::run(args),
    }
}
