//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod job;
mod system;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Upload an image and enqueue a video generation job
    Submit {
        /// Image file to animate
        file: PathBuf,

        /// Wait for the job to finish and download the video
        #[arg(short, long)]
        wait: bool,

        /// Where to save the video when waiting (default: ./<job id>.<ext>)
        #[arg(short, long, requires = "wait")]
        output: Option<PathBuf>,
    },
    /// Show the status of a job
    Status {
        /// Job ID
        id: Uuid,
    },
    /// Download the video of a finished job
    Result {
        /// Job ID
        id: Uuid,

        /// Destination file (default: ./<job id>.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Poll a job until it finishes
    Wait {
        /// Job ID
        id: Uuid,

        /// Seconds between status checks
        #[arg(long, default_value_t = 2)]
        interval: u64,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Download the video to this file once it succeeds
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check orchestrator and queue health
    Health,
    /// Show orchestrator job metrics
    Metrics,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Submit { file, wait, output } => {
            job::submit(config, &file, wait, output).await
        }
        Commands::Status { id } => job::status(config, id).await,
        Commands::Result { id, output } => job::result(config, id, output).await,
        Commands::Wait {
            id,
            interval,
            timeout,
            output,
        } => job::wait(config, id, interval, timeout, output).await,
        Commands::Health => system::health(config).await,
        Commands::Metrics => system::metrics(config).await,
    }
}
