//! CLI - Command-line argument parsing
//!
//! Keeps argument parsing separate from execution logic.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// hoist control CLI
#[derive(Parser, Debug)]
#[command(name = "hoistctl")]
#[command(about = "Check, inspect and configure hoist self-updates", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (default: $HOIST_CONFIG or /etc/hoist/hoist.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print logs to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check for an update and apply it now
    Check {
        /// Run the cycle in this process instead of asking the daemon
        #[arg(long)]
        local: bool,

        /// Only report installed vs latest version; apply nothing
        #[arg(long, conflicts_with = "local")]
        dry_run: bool,

        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// Show installed version, current phase and the last attempt
    Status {
        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// Show recent update attempts, newest first
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// Show or change the configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Inspect or prune pre-update backups
    Backups {
        #[command(subcommand)]
        action: BackupCommands,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Set a single key, e.g. `channel testing` or `health.attempts 5`
    Set { key: String, value: String },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum BackupCommands {
    /// List backups, newest first
    List {
        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// Apply the retention policy now
    Prune,
}
