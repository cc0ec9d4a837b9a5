use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "logsift")]
#[command(about = "Log analysis job engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run local log files through the full job engine and print results
    Process(ProcessArgs),
}

#[derive(clap::Args, Debug)]
pub struct ProcessArgs {
    /// Log files to process
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Path to configuration file (defaults to config/logsift.toml,
    /// also settable via LOGSIFT_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override monitored keywords (comma-separated)
    #[arg(long)]
    pub keywords: Option<String>,
}
