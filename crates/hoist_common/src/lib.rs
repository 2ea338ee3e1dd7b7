//! Hoist Common - shared library for the hoist self-update system
//!
//! Everything the daemon, the CLI and the registry agree on lives here:
//! - Release/version data model and the channel rules
//! - Client configuration (TOML) and on-disk state layout
//! - Crash-safe file primitives (atomic write, journaled directory swap)
//! - Bundle codec, checksums, audit trail, update lock
//! - Backup Manager, Process Supervisor, health probing
//! - The Update Client Core that drives one update cycle

pub mod api;
pub mod atomic;
pub mod audit;
pub mod backup;
pub mod bundle;
pub mod checksum;
pub mod config;
pub mod error;
pub mod health;
pub mod lock;
pub mod paths;
pub mod release;
pub mod source;
pub mod state;
pub mod supervisor;
pub mod updater;
pub mod version;

pub use audit::{Outcome, Phase, Trigger, UpdateAttempt};
pub use config::UpdateConfig;
pub use error::{BackupError, ConfigError, LockError, SupervisorError, UpdateError};
pub use release::Release;
pub use updater::{CycleReport, UpdateClient};
pub use version::{is_newer_version, Version};
