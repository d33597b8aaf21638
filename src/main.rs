// SPDX-License-Identifier: GPL-3.0-only

use camera_orchestrator::backends::camera::CameraBackendType;
use clap::{Parser, Subcommand};

mod cli;

#[derive(Parser)]
#[command(name = "camera-orchestrator")]
#[command(about = "Capture session orchestrator running against a virtual camera rig")]
#[command(version = camera_orchestrator::constants::app_info::version())]
struct Cli {
    /// Camera API to drive (modern or legacy); overrides the config file
    #[arg(short, long, global = true)]
    backend: Option<CameraBackendType>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List,

    /// Take a photo
    Photo {
        /// Use the front camera
        #[arg(short, long)]
        front: bool,
    },

    /// Record a video
    Video {
        /// Recording duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,

        /// Use the front camera
        #[arg(short, long)]
        front: bool,
    },

    /// Run a sequence of intents and print every callback
    ///
    /// Steps: photo, start, stop, switch, pause, resume, wait=<ms>
    Script {
        #[arg(required = true)]
        steps: Vec<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_orchestrator=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async move {
        match cli.command {
            Commands::List => cli::list_cameras(cli.backend).await,
            Commands::Photo { front } => cli::take_photo(cli.backend, front).await,
            Commands::Video { duration, front } => {
                cli::record_video(cli.backend, duration, front).await
            }
            Commands::Script { steps } => cli::run_script(cli.backend, &steps).await,
        }
    })
}
