use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Validate a back end against an OpenAPI description
#[derive(Parser, Debug)]
#[command(name = "apiconform")]
#[command(about = "Validates a back end against an OpenAPI description")]
#[command(version = crate::VERSION)]
pub struct Cli {
    /// Log every request and response
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the test plan from config files, layered in the given order
    #[command(alias = "c")]
    Config {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}
