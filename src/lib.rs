//! devdeck Library
//!
//! Command-line front end over the devdeck crates: argument parsing,
//! subcommands, and console / NDJSON rendering of their results.

// Module declarations
pub mod cli;
pub mod commands;
pub mod console;
pub mod headless;

// Re-export main entry points
pub use cli::Cli;
pub use commands::{run_cli, Reporter};
