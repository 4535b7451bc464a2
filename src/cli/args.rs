use std::path::PathBuf;

use clap::Parser;

use crate::Commands;

/// Main CLI application arguments and command structure
#[derive(Parser)]
#[clap(
    version,
    about = "Personal notes with rich-text content, labels, locking and export bundles"
)]
pub struct Cli {
    /// Path to the configuration file
    #[clap(short = 'C', long, value_parser)]
    pub config: Option<PathBuf>,

    /// Directory holding the note store, assets and state
    #[clap(long, value_parser)]
    pub data_dir: Option<PathBuf>,

    /// Verbose output mode
    #[clap(short, long)]
    pub verbose: bool,

    /// Subcommands for the notebox application
    #[clap(subcommand)]
    pub command: Commands,
}
