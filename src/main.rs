// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use k4a_combo::ComboMode;
use k4a_combo::constants::timing::{PROBE_CAPTURES, PROBE_TIMEOUT_MS};
use k4a_combo::sensor::types::TraceLevel;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "k4a-combo")]
#[command(about = "Inspect Azure Kinect and Orbbec Femto devices")]
#[command(version = k4a_combo::constants::app_info::version())]
struct Cli {
    /// Backends to initialize: azure, orbbec or both (default from config)
    #[arg(short, long, global = true)]
    mode: Option<ComboMode>,

    /// Directory holding the k4a-azure and k4a-orbbec library folders
    #[arg(long, global = true)]
    lib_root: Option<PathBuf>,

    /// Forward native SDK messages at this level and above
    #[arg(long, global = true)]
    trace_level: Option<TraceLevel>,

    /// Use this many simulated devices per backend instead of native libraries
    #[arg(long = "virtual", global = true, value_name = "DEVICES")]
    virtual_devices: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List attached devices
    List,

    /// Stream a few captures from one device
    Probe {
        /// Device index (from 'k4a-combo list')
        #[arg(short, long, default_value = "0")]
        index: u32,

        /// Number of captures to read
        #[arg(short, long, default_value_t = PROBE_CAPTURES)]
        captures: u32,

        /// Wait for each capture, in milliseconds
        #[arg(short, long, default_value_t = PROBE_TIMEOUT_MS)]
        timeout_ms: u32,
    },

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=k4a_combo=trace, RUST_LOG=k4a_native=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let options = cli::ContextOptions {
        mode: cli.mode,
        lib_root: cli.lib_root,
        trace_level: cli.trace_level,
        virtual_devices: cli.virtual_devices,
    };

    match cli.command {
        Commands::List => cli::list_devices(&options),
        Commands::Probe {
            index,
            captures,
            timeout_ms,
        } => cli::probe_device(&options, index, captures, timeout_ms),
        Commands::Config { save } => cli::show_config(&options, save),
    }
}
