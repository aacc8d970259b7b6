//! Crash-safe file replacement.
//!
//! A value is written to a temp file in the destination directory, synced,
//! then renamed over the target, so after a power loss the target holds
//! either the old bytes or the new bytes, never a torn mix. On Windows,
//! rename-over-existing fails, so the old file is parked as `.bak` for the
//! duration of the swap and [`recover_bak_file`] restores it if we crash in
//! that window.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistMode {
    /// Inherit the default umask.
    Default,
    /// Owner-only read/write (0o600 on Unix).
    #[default]
    OwnerOnly,
}

impl PersistMode {
    #[cfg(unix)]
    fn mode(self) -> Option<u32> {
        match self {
            Self::Default => None,
            Self::OwnerOnly => Some(0o600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSyncPolicy {
    SyncAll,
    SkipSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentDirSyncPolicy {
    SyncBestEffort,
    SkipSync,
}

#[derive(Debug, Clone, Copy)]
pub struct AtomicWriteOptions {
    pub file_sync: FileSyncPolicy,
    /// Needed for the rename (or unlink) itself to survive power loss.
    pub parent_dir_sync: ParentDirSyncPolicy,
    pub mode: PersistMode,
}

impl Default for AtomicWriteOptions {
    fn default() -> Self {
        Self {
            file_sync: FileSyncPolicy::SyncAll,
            parent_dir_sync: ParentDirSyncPolicy::SyncBestEffort,
            mode: PersistMode::OwnerOnly,
        }
    }
}

impl AtomicWriteOptions {
    /// No fsyncs. For tests and scratch data only.
    #[must_use]
    pub fn relaxed() -> Self {
        Self {
            file_sync: FileSyncPolicy::SkipSync,
            parent_dir_sync: ParentDirSyncPolicy::SkipSync,
            mode: PersistMode::Default,
        }
    }
}

/// Restore `path` from `path.bak` left behind by an interrupted swap.
///
/// Returns `true` when a backup was moved back into place.
pub fn recover_bak_file(path: &Path) -> bool {
    let backup = path.with_extension("bak");
    if path.exists() || !backup.exists() {
        return false;
    }
    match fs::rename(&backup, path) {
        Ok(()) => {
            tracing::warn!(
                path = %path.display(),
                "Recovered .bak file from interrupted atomic write"
            );
            true
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "Failed to recover .bak file: {e}");
            false
        }
    }
}

pub fn atomic_write_with_options(
    path: impl AsRef<Path>,
    bytes: &[u8],
    options: AtomicWriteOptions,
) -> io::Result<()> {
    let path = path.as_ref();
    let parent = parent_dir(path);

    let mut tmp = NamedTempFile::new_in(parent)?;
    #[cfg(unix)]
    if let Some(mode) = options.mode.mode() {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(mode))?;
    }

    tmp.write_all(bytes)?;
    if matches!(options.file_sync, FileSyncPolicy::SyncAll) {
        tmp.as_file().sync_all()?;
    }

    if let Err(err) = tmp.persist(path) {
        if !path.exists() {
            return Err(err.error);
        }
        // Windows: rename over an existing file fails, swap through a backup.
        let backup_path = path.with_extension("bak");
        let _ = fs::remove_file(&backup_path);
        fs::rename(path, &backup_path)?;

        if let Err(rename_err) = err.file.persist(path) {
            let _ = fs::rename(&backup_path, path);
            return Err(rename_err.error);
        }
        if let Err(e) = fs::remove_file(&backup_path) {
            tracing::warn!(
                path = %backup_path.display(),
                "Failed to remove .bak after atomic write: {e}"
            );
        }
    }

    if matches!(options.parent_dir_sync, ParentDirSyncPolicy::SyncBestEffort) {
        best_effort_sync_parent_dir(parent);
    }

    Ok(())
}

/// Remove `path` and make the removal durable.
///
/// Returns `Ok(false)` when there was nothing to remove.
pub fn atomic_remove(path: impl AsRef<Path>, options: AtomicWriteOptions) -> io::Result<bool> {
    let path = path.as_ref();
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    }
    if matches!(options.parent_dir_sync, ParentDirSyncPolicy::SyncBestEffort) {
        best_effort_sync_parent_dir(parent_dir(path));
    }
    Ok(true)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn best_effort_sync_parent_dir(parent: &Path) {
    #[cfg(unix)]
    {
        if let Err(e) = fs::File::open(parent).and_then(|d| d.sync_all()) {
            debug!(path = %parent.display(), "Parent directory sync_all failed (best-effort): {e}");
        }
    }

    #[cfg(windows)]
    {
        use std::fs::OpenOptions;
        use std::os::windows::fs::OpenOptionsExt;

        // From winbase.h. Required to open a directory handle on Windows.
        const FILE_FLAG_BACKUP_SEMANTICS: u32 = 0x0200_0000;

        let mut opts = OpenOptions::new();
        opts.read(true)
            .write(true)
            .custom_flags(FILE_FLAG_BACKUP_SEMANTICS);

        if let Err(e) = opts.open(parent).and_then(|d| d.sync_all()) {
            debug!(path = %parent.display(), "Parent directory sync_all failed (best-effort): {e}");
        }
    }

    #[cfg(not(any(unix, windows)))]
    let _ = parent;
}
