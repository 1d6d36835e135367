//! Otter Idle - Development Tools

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use otter_tools::simulate::{AdvanceMode, SimulateOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "otter-tools")]
#[command(about = "Development tools for Otter Idle")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate content files
    Validate {
        /// Content file or directory of RON files
        #[arg(default_value = "assets/data")]
        path: String,
    },
    /// Advance a save file by some number of seconds
    Simulate {
        /// RON content file
        #[arg(long, default_value = "assets/data/otter.ron")]
        content: PathBuf,
        /// JSON save file, created if missing
        #[arg(long, default_value = "otter-save.json")]
        save: PathBuf,
        /// RON cadence overrides
        #[arg(long)]
        config: Option<PathBuf>,
        /// Seconds to simulate
        #[arg(long, default_value_t = 60.0)]
        seconds: f64,
        /// Catch up with a single forced tick instead of the clock
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { path } => {
            tracing::info!("Validating content in: {path}");
            match otter_tools::validate::validate_path(std::path::Path::new(&path)) {
                Ok(count) => tracing::info!("Validation passed ({count} files)"),
                Err(e) => {
                    tracing::error!("Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Simulate {
            content,
            save,
            config,
            seconds,
            force,
        } => {
            let options = SimulateOptions {
                content,
                save,
                config,
                seconds,
                mode: if force {
                    AdvanceMode::Force
                } else {
                    AdvanceMode::Clock
                },
            };
            match otter_tools::simulate::run(&options) {
                Ok(summary) => {
                    for line in summary.lines() {
                        println!("{line}");
                    }
                }
                Err(e) => {
                    tracing::error!("Simulation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}
