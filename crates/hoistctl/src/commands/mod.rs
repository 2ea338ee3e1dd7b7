//! Command modules for hoistctl
//!
//! Each command returns the process exit code:
//! - check: run one update cycle (daemon or local)
//! - status: installed version, phase and the last attempt
//! - history: the audit trail
//! - config: show or change the TOML configuration
//! - backups: list or prune pre-update backups

pub mod backups;
pub mod check;
pub mod config;
pub mod history;
pub mod status;
