//! wbt-runner - CLI entry point

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;
use wbt_runner::cli::{Args, RunConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match RunConfig::load(&args.config_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    let default_filter = if args.verbose || config.verbose {
        "wbt_runner=debug,info"
    } else {
        "wbt_runner=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    let invocations = config.invocations();
    let options = config.run_options();

    match wbt_runner::whitebox_tools(&config.src_dir, &invocations, &options).await {
        Ok(persisted) => {
            for path in persisted {
                println!("{}", path.display());
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}
