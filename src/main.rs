// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "sensor-recorder")]
#[command(about = "Record stereo camera frames and IMU samples to disk")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Log at info level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a session from the virtual stereo camera
    Record {
        /// Config file (default: ~/.config/sensor-recorder/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output root directory, overrides the config
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<f64>,

        /// Stop after this many frames per camera
        #[arg(short, long)]
        frames: Option<u64>,

        /// Record the left camera only
        #[arg(long)]
        no_right: bool,
    },

    /// Print the effective configuration
    Config {
        /// Config file (default: ~/.config/sensor-recorder/config.json)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Write the effective configuration back to the file
        #[arg(short, long)]
        write: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=sensor_recorder=debug, RUST_LOG=info
    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    match cli.command {
        Commands::Record {
            config,
            output,
            duration,
            frames,
            no_right,
        } => cli::record(cli::RecordOptions {
            config,
            output,
            duration,
            frames,
            no_right,
        })?,
        Commands::Config { path, write } => cli::show_config(path, write)?,
    }
    Ok(())
}
