//! devdeck - run saved shell and device command sequences against attached devices
//!
//! This is the binary entry point. All logic lives in the library.

use clap::Parser;
use tracing::{error, info};

use devdeck::{run_cli, Cli, Reporter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    // Logs go to a file; stdout carries command output
    if let Err(e) = devdeck_core::logging::init() {
        eprintln!("Warning: file logging disabled: {}", e);
    }

    let reporter = Reporter::new(cli.json);
    let result = run_cli(cli).await;
    info!("devdeck exiting");

    match result {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("Command failed: {:?}", e);
            if reporter.is_json() {
                reporter.error(&e);
                std::process::exit(2);
            }
            Err(e.into())
        }
    }
}
