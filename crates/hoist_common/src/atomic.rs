//! Crash-safe filesystem primitives
//!
//! - `atomic_write`: temp file, fsync, rename
//! - `copy_tree` / `copy_file_atomic`: snapshot helpers for backups
//! - `swap_in_dir`: replace a live directory with a fully staged one
//!
//! A directory cannot be replaced with one rename, so the swap is two renames
//! (`live -> retired`, `incoming -> live`) guarded by a journal file written
//! before the first rename. `recover_interrupted_swap` reads the journal after a
//! crash and settles the tree to exactly the old or exactly the new contents.
//!
//! Every rename here is followed by an fsync of the parent directory so the new
//! directory entry survives a power loss, not only the file contents.

use crate::paths::sibling_path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Flush the directory entry table of `path`'s parent.
pub fn sync_parent(path: &Path) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()
}

/// `fs::rename` followed by a parent-directory fsync of both ends.
fn rename_synced(from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to)?;
    sync_parent(to)?;
    if from.parent() != to.parent() {
        sync_parent(from)?;
    }
    Ok(())
}

/// Write data to a file atomically (temp file + fsync + rename + dir fsync).
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;

    rename_synced(&temp_path, path)
}

/// Copy one file to `dst` via a temp sibling so `dst` is never half-written.
pub fn copy_file_atomic(src: &Path, dst: &Path) -> io::Result<u64> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = sibling_path(dst, "tmp");
    let copied = fs::copy(src, &temp_path)?;
    File::open(&temp_path)?.sync_all()?;
    rename_synced(&temp_path, dst)?;
    Ok(copied)
}

/// Recursively copy `src` into `dst`. Symlinks are copied as links.
/// Returns the number of file bytes copied.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<u64> {
    fs::create_dir_all(dst)?;
    let mut total = 0;

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = dst.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            std::os::unix::fs::symlink(link, &target)?;
        } else {
            total += fs::copy(entry.path(), &target)?;
        }
    }

    Ok(total)
}

/// Remove a file or directory tree, ignoring "not found".
pub fn remove_path(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// What `recover_interrupted_swap` found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapRecovery {
    /// No journal; nothing was in flight
    Clean,
    /// The swap never completed; the old tree is live
    KeptOld,
    /// The new tree had already been moved into place
    CompletedNew,
}

/// Journal of one in-flight directory swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirSwap {
    pub live: PathBuf,
    pub incoming: PathBuf,
    pub retired: PathBuf,
    pub started_at: DateTime<Utc>,
}

impl DirSwap {
    fn journal_path(live: &Path) -> PathBuf {
        sibling_path(live, "swap")
    }

    /// Record the intent to replace `live` with `incoming`.
    pub fn begin(live: &Path, incoming: &Path) -> io::Result<Self> {
        let swap = Self {
            live: live.to_path_buf(),
            incoming: incoming.to_path_buf(),
            retired: sibling_path(live, "retired"),
            started_at: Utc::now(),
        };

        // Leftover from a swap that committed but crashed before cleanup
        remove_path(&swap.retired)?;

        let journal = serde_json::to_vec_pretty(&swap)?;
        atomic_write(&Self::journal_path(live), &journal)?;
        Ok(swap)
    }

    /// First rename: move the live tree aside (no-op on a fresh install).
    pub fn retire_live(&self) -> io::Result<()> {
        if self.live.exists() {
            rename_synced(&self.live, &self.retired)?;
        }
        Ok(())
    }

    /// Second rename: the staged tree becomes live.
    pub fn promote_incoming(&self) -> io::Result<()> {
        rename_synced(&self.incoming, &self.live)
    }

    /// Drop the journal, then the retired tree.
    pub fn commit(self) -> io::Result<()> {
        fs::remove_file(Self::journal_path(&self.live))?;
        if let Err(e) = remove_path(&self.retired) {
            warn!("Could not remove retired tree {}: {}", self.retired.display(), e);
        }
        Ok(())
    }

    fn discard_journal(&self) {
        let _ = fs::remove_file(Self::journal_path(&self.live));
    }
}

/// Replace `live` with the fully staged directory `incoming`.
///
/// On error the old tree is put back before returning. If even that fails the
/// journal is left behind for `recover_interrupted_swap`.
pub fn swap_in_dir(live: &Path, incoming: &Path) -> io::Result<()> {
    if !incoming.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("staged tree {} is missing", incoming.display()),
        ));
    }

    let swap = DirSwap::begin(live, incoming)?;

    if let Err(e) = swap.retire_live() {
        swap.discard_journal();
        return Err(e);
    }

    if let Err(e) = swap.promote_incoming() {
        if swap.retired.exists() {
            rename_synced(&swap.retired, live)?;
        }
        swap.discard_journal();
        return Err(e);
    }

    swap.commit()
}

/// Settle a swap interrupted by a crash. Safe to call when nothing is pending.
pub fn recover_interrupted_swap(live: &Path) -> io::Result<SwapRecovery> {
    let journal_path = DirSwap::journal_path(live);
    if !journal_path.exists() {
        return Ok(SwapRecovery::Clean);
    }

    let swap = match fs::read(&journal_path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| serde_json::from_slice::<DirSwap>(&bytes).map_err(|e| e.to_string()))
    {
        Ok(swap) => swap,
        Err(e) => {
            warn!("Swap journal unreadable ({}), assuming default sibling names", e);
            DirSwap {
                live: live.to_path_buf(),
                incoming: sibling_path(live, "incoming"),
                retired: sibling_path(live, "retired"),
                started_at: Utc::now(),
            }
        }
    };

    let outcome = if swap.live.exists() && !swap.incoming.exists() {
        // Second rename happened
        remove_path(&swap.retired)?;
        SwapRecovery::CompletedNew
    } else if !swap.live.exists() {
        // Crashed between the renames
        if swap.retired.exists() {
            rename_synced(&swap.retired, &swap.live)?;
        }
        remove_path(&swap.incoming)?;
        SwapRecovery::KeptOld
    } else {
        // First rename never happened
        remove_path(&swap.incoming)?;
        remove_path(&swap.retired)?;
        SwapRecovery::KeptOld
    };

    fs::remove_file(&journal_path)?;
    info!(
        "Recovered interrupted swap of {}: {:?}",
        swap.live.display(),
        outcome
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_tree(root: &Path, marker: &str) {
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::write(root.join("VERSION"), marker).unwrap();
        fs::write(root.join("lib/app.py"), format!("print('{}')", marker)).unwrap();
    }

    fn marker(root: &Path) -> String {
        fs::read_to_string(root.join("VERSION")).unwrap()
    }

    #[test]
    fn test_atomic_write_replaces_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/state.json");
        atomic_write(&path, b"one").unwrap();
        atomic_write(&path, b"two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_sync_parent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        fs::write(&path, b"{}").unwrap();
        sync_parent(&path).unwrap();
        // Relative bare name resolves against the working directory
        sync_parent(Path::new("state.json")).unwrap();
        assert!(sync_parent(&temp.path().join("missing/state.json")).is_err());
    }

    #[test]
    fn test_copy_tree() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        make_tree(&src, "1.0.0");
        std::os::unix::fs::symlink("lib/app.py", src.join("entry")).unwrap();

        let dst = temp.path().join("dst");
        let bytes = copy_tree(&src, &dst).unwrap();
        assert!(bytes > 0);
        assert_eq!(marker(&dst), "1.0.0");
        assert!(fs::symlink_metadata(dst.join("entry"))
            .unwrap()
            .file_type()
            .is_symlink());
    }

    #[test]
    fn test_swap_replaces_tree() {
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("app");
        let incoming = temp.path().join(".app.incoming");
        make_tree(&live, "1.0.0");
        make_tree(&incoming, "1.1.0");

        swap_in_dir(&live, &incoming).unwrap();

        assert_eq!(marker(&live), "1.1.0");
        assert!(!incoming.exists());
        assert!(!sibling_path(&live, "retired").exists());
        assert!(!sibling_path(&live, "swap").exists());
    }

    #[test]
    fn test_swap_missing_incoming_leaves_live() {
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("app");
        make_tree(&live, "1.0.0");

        assert!(swap_in_dir(&live, &temp.path().join("nope")).is_err());
        assert_eq!(marker(&live), "1.0.0");
    }

    #[test]
    fn test_recover_crash_between_renames_keeps_old() {
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("app");
        let incoming = temp.path().join(".app.incoming");
        make_tree(&live, "1.0.0");
        make_tree(&incoming, "1.1.0");

        let swap = DirSwap::begin(&live, &incoming).unwrap();
        swap.retire_live().unwrap();
        drop(swap); // crash

        assert!(!live.exists());
        assert_eq!(recover_interrupted_swap(&live).unwrap(), SwapRecovery::KeptOld);
        assert_eq!(marker(&live), "1.0.0");
        assert!(!incoming.exists());
    }

    #[test]
    fn test_recover_crash_after_promote_keeps_new() {
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("app");
        let incoming = temp.path().join(".app.incoming");
        make_tree(&live, "1.0.0");
        make_tree(&incoming, "1.1.0");

        let swap = DirSwap::begin(&live, &incoming).unwrap();
        swap.retire_live().unwrap();
        swap.promote_incoming().unwrap();
        drop(swap); // crash before commit

        assert_eq!(
            recover_interrupted_swap(&live).unwrap(),
            SwapRecovery::CompletedNew
        );
        assert_eq!(marker(&live), "1.1.0");
        assert!(!sibling_path(&live, "retired").exists());
    }

    #[test]
    fn test_recover_crash_before_first_rename() {
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("app");
        let incoming = temp.path().join(".app.incoming");
        make_tree(&live, "1.0.0");
        make_tree(&incoming, "1.1.0");

        let _swap = DirSwap::begin(&live, &incoming).unwrap();

        assert_eq!(recover_interrupted_swap(&live).unwrap(), SwapRecovery::KeptOld);
        assert_eq!(marker(&live), "1.0.0");
        assert!(!incoming.exists());
    }

    #[test]
    fn test_recover_without_journal_is_clean() {
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("app");
        make_tree(&live, "1.0.0");
        assert_eq!(recover_interrupted_swap(&live).unwrap(), SwapRecovery::Clean);
    }
}
