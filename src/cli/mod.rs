pub mod init;
pub mod schema;
pub mod serve;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "crowdwork")]
#[command(
    author,
    version,
    about = "Multi-perspective audience reaction simulator with streaming analysis"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose/debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the analysis service
    Serve(ServeArgs),

    /// Write a default config file
    Init(InitArgs),

    /// Print JSON Schema for config validation
    Schema,
}

#[derive(Parser, Clone)]
pub struct ServeArgs {
    /// Path to config file
    #[arg(short, long, default_value = "crowdwork.yaml")]
    pub config: PathBuf,

    /// Override listen host
    #[arg(long)]
    pub host: Option<String>,

    /// Override listen port
    #[arg(long)]
    pub port: Option<u16>,

    /// Override database path
    #[arg(long)]
    pub database: Option<PathBuf>,
}

#[derive(Parser, Clone)]
pub struct InitArgs {
    /// Where to write the config file
    #[arg(short, long, default_value = "crowdwork.yaml")]
    pub config: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}
