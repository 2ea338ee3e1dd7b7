//! On-disk layout for hoist
//!
//! Config: `/etc/hoist/hoist.toml` (or `--config` / `HOIST_CONFIG`)
//! State:  `<state_dir>/{state.json, attempts.jsonl, update.lock, backups/, staging/}`

use std::fs;
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/hoist/hoist.toml";
pub const CONFIG_ENV: &str = "HOIST_CONFIG";
pub const DEFAULT_STATE_DIR: &str = "/var/lib/hoist";

/// Version marker at the root of every installation tree and bundle.
pub const VERSION_FILE: &str = "VERSION";

/// Version assumed when the installation carries no marker yet.
pub const UNKNOWN_VERSION: &str = "0.0.0";

/// Files and directories under `state_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub root: PathBuf,
    pub state_file: PathBuf,
    pub audit_file: PathBuf,
    pub lock_file: PathBuf,
    pub backups_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub incident_file: PathBuf,
}

impl StatePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            state_file: root.join("state.json"),
            audit_file: root.join("attempts.jsonl"),
            lock_file: root.join("update.lock"),
            backups_dir: root.join("backups"),
            staging_dir: root.join("staging"),
            incident_file: root.join("INCIDENT.json"),
            root,
        }
    }
}

/// Resolve the config file: explicit flag, then `HOIST_CONFIG`, then the default.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match std::env::var_os(CONFIG_ENV) {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => PathBuf::from(DEFAULT_CONFIG_PATH),
    }
}

/// Read the `VERSION` marker of an installation tree.
pub fn read_installed_version(install_dir: &Path) -> Option<String> {
    fs::read_to_string(install_dir.join(VERSION_FILE))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// True when `name` is exactly one plain path component (no separators,
/// no `.` or `..`), so joining it onto a directory stays inside that directory.
pub fn is_path_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(segment)), None) if segment == std::ffi::OsStr::new(name)
    )
}

/// Hidden sibling of `live` in the same directory: `<parent>/.<name>.<tag>`.
/// Renames between the two stay on one filesystem.
pub fn sibling_path(live: &Path, tag: &str) -> PathBuf {
    let name = live
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "install".to_string());
    let parent = live.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!(".{}.{}", name, tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_state_layout() {
        let paths = StatePaths::new("/var/lib/hoist");
        assert_eq!(paths.lock_file, PathBuf::from("/var/lib/hoist/update.lock"));
        assert_eq!(paths.backups_dir, PathBuf::from("/var/lib/hoist/backups"));
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let explicit = Path::new("/tmp/custom.toml");
        assert_eq!(config_path(Some(explicit)), explicit);
    }

    #[test]
    fn test_path_segment() {
        assert!(is_path_segment("1.2.3"));
        assert!(is_path_segment("stable"));
        assert!(!is_path_segment(""));
        assert!(!is_path_segment(".."));
        assert!(!is_path_segment("."));
        assert!(!is_path_segment("a/b"));
        assert!(!is_path_segment("/abs"));
        assert!(!is_path_segment("1.0.0/"));
    }

    #[test]
    fn test_sibling_path() {
        assert_eq!(
            sibling_path(Path::new("/opt/app"), "incoming"),
            PathBuf::from("/opt/.app.incoming")
        );
    }

    #[test]
    fn test_read_installed_version() {
        let temp = TempDir::new().unwrap();
        assert_eq!(read_installed_version(temp.path()), None);
        fs::write(temp.path().join(VERSION_FILE), "1.2.3\n").unwrap();
        assert_eq!(read_installed_version(temp.path()).as_deref(), Some("1.2.3"));
    }
}
