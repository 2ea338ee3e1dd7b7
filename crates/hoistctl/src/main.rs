//! hoistctl - operator CLI for the hoist self-updater
//!
//! Commands:
//!   hoistctl check [--local]      Run an update cycle now
//!   hoistctl check --dry-run      Compare installed and latest, apply nothing
//!   hoistctl status               Installed version and updater state
//!   hoistctl history              Recent update attempts
//!   hoistctl config show|set      Inspect or change hoist.toml
//!   hoistctl backups list|prune   Pre-update backups
//!
//! Exit codes for `check`: 0 ok, 1 failed or rolled back, 2 rollback failed,
//! 3 another cycle is running, 4 daemon unreachable.

use clap::Parser;
use hoist_common::paths::config_path;
use hoistctl::cli::{BackupCommands, Cli, Commands, ConfigCommands};
use hoistctl::commands;
use hoistctl::output;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs only on request; normal output is the formatted report
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    let path = config_path(cli.config.as_deref());
    let result = match cli.command {
        Commands::Check { dry_run: true, json, .. } => commands::check::dry_run(&path, json).await,
        Commands::Check { local, json, .. } => commands::check::run(&path, local, json).await,
        Commands::Status { json } => commands::status::run(&path, json).await,
        Commands::History { limit, json } => commands::history::run(&path, limit, json).await,
        Commands::Config { action } => match action {
            ConfigCommands::Show => commands::config::show(&path),
            ConfigCommands::Set { key, value } => commands::config::run_set(&path, &key, &value),
        },
        Commands::Backups { action } => match action {
            BackupCommands::List { json } => commands::backups::list(&path, json).await,
            BackupCommands::Prune => commands::backups::prune(&path).await,
        },
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            output::display_error(&format!("{:#}", e));
            1
        }
    };
    std::process::exit(code);
}
