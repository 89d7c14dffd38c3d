// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use interval_camera::backends::camera::{CameraBackendType, FocusMode, LensFacing, WhiteBalance};
use interval_camera::config::Config;
use interval_camera::constants::app_info;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "interval-camera")]
#[command(about = "Take a series of photos at a fixed interval")]
#[command(version = app_info::version())]
struct Cli {
    /// Log progress details (same as RUST_LOG=info)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Camera backend: v4l2 or virtual (default: saved configuration)
    #[arg(long, global = true)]
    backend: Option<CameraBackendType>,

    /// Configuration file (default: ~/.config/interval-camera/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List,

    /// Show what a camera supports
    Capabilities {
        /// Lens facing of the camera to query (front or back)
        #[arg(long)]
        lens: Option<LensFacing>,
    },

    /// Capture a series of photos
    Run {
        /// Seconds between shots (1-3600)
        #[arg(short, long)]
        interval: Option<u32>,

        /// Number of shots (1-1000)
        #[arg(short = 'n', long)]
        shots: Option<u32>,

        /// Lens facing (front or back)
        #[arg(long)]
        lens: Option<LensFacing>,

        /// Zoom ratio, clamped to what the camera supports
        #[arg(long)]
        zoom: Option<f32>,

        /// Focus mode (auto, continuous or manual)
        #[arg(long)]
        focus: Option<FocusMode>,

        /// Exposure compensation in camera steps
        #[arg(long, allow_hyphen_values = true)]
        exposure: Option<i32>,

        /// White balance (auto, daylight, cloudy, incandescent or fluorescent)
        #[arg(long)]
        white_balance: Option<WhiteBalance>,

        /// Camera id to prefer (from 'interval-camera list')
        #[arg(short, long)]
        camera: Option<String>,

        /// Output directory (default: ~/Pictures/interval-camera)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep photos in memory instead of writing them
        #[arg(long)]
        dry_run: bool,

        /// Do not remember these values in the configuration
        #[arg(long)]
        no_save: bool,
    },

    /// Show or reset the saved configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the configuration
    Show,
    /// Restore the default interval, shot count and capture settings
    Reset,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=interval_camera=debug
    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let mut config = Config::load_or_default(&config_path);
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    match cli.command {
        Commands::List => cli::list_cameras(&config),
        Commands::Capabilities { lens } => cli::show_capabilities(&config, lens),
        Commands::Run {
            interval,
            shots,
            lens,
            zoom,
            focus,
            exposure,
            white_balance,
            camera,
            output,
            dry_run,
            no_save,
        } => cli::run_interval(
            config,
            cli::RunOptions {
                interval,
                shots,
                lens,
                zoom,
                focus,
                exposure,
                white_balance,
                camera,
                output,
                dry_run,
                no_save,
            },
            &config_path,
        ),
        Commands::Config { action } => match action {
            ConfigAction::Show => cli::show_config(&config, &config_path),
            ConfigAction::Reset => cli::reset_config(&config_path),
        },
    }
}
