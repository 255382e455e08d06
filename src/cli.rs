//! Command-line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use devdeck_core::{StepKind, StepRecord};

/// devdeck - run saved shell and device command sequences against attached devices
#[derive(Parser, Debug)]
#[command(name = "devdeck")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding config.toml, commands.json and history.json
    #[arg(long, global = true, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Print NDJSON events on stdout instead of human-readable lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Probe and list attached devices
    Devices,

    /// Print the device list whenever a device is attached or detached
    Watch,

    /// List saved requests
    List,

    /// Save a new request
    ///
    /// Steps run in the order given. STEP is `KIND:VALUE` where KIND is
    /// `shell`, `device`, `device-dir` (device command with `{local_dir}`)
    /// or `delay` (milliseconds).
    Add {
        alias: String,

        #[arg(short, long = "step", value_name = "STEP", value_parser = parse_step, required = true)]
        steps: Vec<StepRecord>,
    },

    /// Delete a saved request
    Remove { alias: String },

    /// Run saved requests one after another
    Run {
        #[arg(required = true)]
        aliases: Vec<String>,

        /// Target device id (defaults to the first attached device)
        #[arg(short, long)]
        device: Option<String>,

        /// Answer every `{local_dir}` prompt with this directory
        #[arg(long, value_name = "DIR", conflicts_with = "no_prompt")]
        local_dir: Option<PathBuf>,

        /// Skip `{local_dir}` steps instead of asking
        #[arg(long)]
        no_prompt: bool,
    },

    /// Show (or clear) the run history
    History {
        #[arg(long)]
        clear: bool,
    },

    /// Show or set the working directory for command steps
    Workdir {
        path: Option<PathBuf>,

        /// Reset to the current directory
        #[arg(long, conflicts_with = "path")]
        clear: bool,
    },

    /// Write a default config.toml
    Init,
}

/// Parse a `KIND:VALUE` step argument
pub fn parse_step(arg: &str) -> Result<StepRecord, String> {
    let (kind, value) = arg
        .split_once(':')
        .ok_or_else(|| format!("expected KIND:VALUE, got '{}'", arg))?;

    let record = match kind.trim().to_ascii_lowercase().as_str() {
        "device" => StepRecord::device(value, false),
        "device-dir" => StepRecord::device(value, true),
        other => match other.parse::<StepKind>().map_err(|e| e.to_string())? {
            StepKind::ShellCommand => StepRecord::shell(value),
            StepKind::DeviceCommand => StepRecord::device(value, false),
            StepKind::Delay => StepRecord {
                kind: StepKind::Delay.as_str().to_string(),
                value: value.trim().to_string(),
                local_dir: None,
            },
        },
    };

    record.parse().map_err(|e| e.to_string())?;
    Ok(record)
}
