//! Owner-only directory and database file creation.

use std::fs::OpenOptions;
use std::path::Path;

use crate::StorageError;

/// Create `path` (and parents) and, on Unix, tighten it to 0o700 if we own it.
pub(crate) fn ensure_secure_dir(path: &Path) -> Result<(), StorageError> {
    std::fs::create_dir_all(path).map_err(|e| StorageError::io(path, e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};
        let metadata = std::fs::metadata(path).map_err(|e| StorageError::io(path, e))?;

        let our_uid = unsafe { libc::getuid() };
        if metadata.uid() != our_uid {
            return Ok(());
        }

        let current_mode = metadata.permissions().mode() & 0o777;
        if current_mode & 0o077 != 0 {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
                .map_err(|e| StorageError::io(path, e))?;
        }
    }
    Ok(())
}

/// Create the SQLite file with 0o600 if missing and tighten its sidecars.
pub(crate) fn ensure_secure_db_file(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        let mut options = OpenOptions::new();
        options.create(true).truncate(false).read(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        options.open(path).map_err(|e| StorageError::io(path, e))?;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| StorageError::io(path, e))?;
        for suffix in ["-wal", "-shm"] {
            let sidecar = sidecar_path(path, suffix);
            if sidecar.exists() {
                let _ = std::fs::set_permissions(&sidecar, std::fs::Permissions::from_mode(0o600));
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn sidecar_path(path: &Path, suffix: &str) -> std::path::PathBuf {
    match path.file_name() {
        Some(name) => path.with_file_name(format!("{}{suffix}", name.to_string_lossy())),
        None => std::path::PathBuf::from(format!("{}{suffix}", path.display())),
    }
}
