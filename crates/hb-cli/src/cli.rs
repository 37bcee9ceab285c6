//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Heartbeat device log analysis.
///
/// Ingests device CSV logs, segments them into recording sessions and
/// derives normalized rate timelines and hourly beat totals.
#[derive(Debug, Parser)]
#[command(name = "hb", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load device CSV log files into the database.
    Ingest {
        /// Directory to scan for `<TYPE>_<ID>_<DATE>.csv` files.
        dir: PathBuf,
    },

    /// Analyze unprocessed events, per device.
    Analyze {
        /// Restrict to one device, as `type:id` (e.g. `hset:a1`).
        #[arg(long)]
        device: Option<String>,
    },

    /// Print hourly beat totals.
    Report {
        /// Restrict to one device, as `type:id`.
        #[arg(long)]
        device: Option<String>,

        /// Emit JSON instead of the human-readable table.
        #[arg(long)]
        json: bool,
    },

    /// Show per-device cursor positions and pending events.
    Status,
}
