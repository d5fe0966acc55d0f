//! Kiln CLI library

pub mod commands;
pub mod config;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

/// Kiln - distributed training jobs on Kubernetes
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a training job
    Submit(commands::submit::SubmitArgs),
    /// Show the state of a submitted job
    Get(commands::get::GetArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Submit(args) => commands::submit::run(args).await,
            Commands::Get(args) => commands::get::run(args).await,
        }
    }
}
