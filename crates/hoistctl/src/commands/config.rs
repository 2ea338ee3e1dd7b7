//! Config Command - show or change hoist.toml
//!
//! `set` validates the value against the typed config before writing; a
//! running daemon picks the change up at its next tick.

use anyhow::{Context, Result};
use hoist_common::config::SETTABLE_KEYS;
use hoist_common::UpdateConfig;
use owo_colors::OwoColorize;
use std::path::Path;

use crate::output;

pub fn show(config_path: &Path) -> Result<i32> {
    let config = UpdateConfig::load(config_path);
    let text = toml::to_string_pretty(&config).context("serializing config")?;

    output::header("hoist Configuration");
    println!("  file: {}", config_path.display());
    if !config_path.exists() {
        output::note("File does not exist; showing defaults");
    }
    println!();
    print!("{}", text);
    print_warnings(&config.validate());
    Ok(0)
}

/// Apply one key and save. Returns the validation warnings of the result.
pub fn set(config_path: &Path, key: &str, value: &str) -> Result<Vec<String>> {
    let mut config = if config_path.exists() {
        UpdateConfig::load_from_path(config_path)
            .with_context(|| format!("reading {}", config_path.display()))?
    } else {
        UpdateConfig::default()
    };
    config.set_value(key, value)?;
    config
        .save(config_path)
        .with_context(|| format!("writing {}", config_path.display()))?;
    Ok(config.validate())
}

pub fn run_set(config_path: &Path, key: &str, value: &str) -> Result<i32> {
    match set(config_path, key, value) {
        Ok(warnings) => {
            println!("[OK] {} = {}", key, value.bright_green());
            print_warnings(&warnings);
            Ok(0)
        }
        Err(e) => {
            output::display_error(&format!("{:#}", e));
            if !SETTABLE_KEYS.contains(&key) {
                eprintln!("Settable keys: {}", SETTABLE_KEYS.join(", "));
            }
            Ok(1)
        }
    }
}

fn print_warnings(warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    output::section("WARNINGS");
    for warning in warnings {
        println!("  * {}", warning.yellow());
    }
}
