//! Command-line argument parsing for wbt-runner

use clap::Parser;
use std::path::PathBuf;

/// Run a WhiteboxTools pipeline described by a TOML configuration file
#[derive(Parser, Debug)]
#[command(name = "wbt-runner")]
#[command(version)]
#[command(about = "Run WhiteboxTools using a TOML configuration file", long_about = None)]
pub struct Args {
    /// Path to the TOML configuration file
    #[arg(value_name = "CONFIG_FILE")]
    pub config_file: PathBuf,

    /// Verbose output (also honors RUST_LOG)
    #[arg(short, long)]
    pub verbose: bool,
}
