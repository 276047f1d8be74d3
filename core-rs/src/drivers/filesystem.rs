//! Filesystem primitives shared by the library and project registries
//!
//! Provides:
//! - Advisory locking of a registry root (`.lock` + flock)
//! - Atomic JSON persistence (write temp file, then rename)
//! - Recursive copy and size accounting
//! - Bucket links (relative symlink, copy fallback)

use crate::errors::{LizzyError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Name of the lock file created in every registry root
pub const LOCK_FILE: &str = ".lock";

/// Exclusive advisory lock over a registry root
///
/// Held for the duration of a read-modify-write cycle. The lock is
/// released when the guard is dropped (closing the descriptor releases
/// the flock as well).
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire the lock for `root`, blocking until it is available
    pub fn acquire(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        let path = root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| LizzyError::Lock(format!("Failed to open {}: {}", path.display(), e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = file.as_raw_fd();
            // LOCK_EX blocks until every other holder has released
            unsafe {
                if libc::flock(fd, libc::LOCK_EX) != 0 {
                    return Err(LizzyError::Lock(format!(
                        "flock failed on {}: {}",
                        path.display(),
                        std::io::Error::last_os_error()
                    )));
                }
            }
        }

        debug!(lock = %path.display(), "acquired registry lock");
        Ok(FileLock { file, path })
    }

    /// Path of the underlying lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}

/// Read and deserialize a JSON file
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LizzyError::FileNotFound(path.display().to_string())
        } else {
            LizzyError::IoError(format!("Failed to read {}: {}", path.display(), e))
        }
    })?;

    serde_json::from_str(&content).map_err(|e| {
        LizzyError::ParseError(format!("Invalid JSON in {}: {}", path.display(), e))
    })
}

/// Read a JSON file, returning `None` when it does not exist
pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    read_json(path).map(Some)
}

/// Serialize `value` as pretty JSON and atomically replace `path`
///
/// The temp file lives next to the target so the rename never crosses
/// filesystems.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| {
        LizzyError::SerializationError(format!("Failed to serialize {}: {}", path.display(), e))
    })?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| LizzyError::IoError(format!("Invalid target path: {}", path.display())))?
        .to_string_lossy()
        .to_string();
    let tmp_path = path.with_file_name(format!(".{}.tmp-{}", file_name, std::process::id()));

    fs::write(&tmp_path, json).map_err(|e| {
        LizzyError::IoError(format!("Failed to write {}: {}", tmp_path.display(), e))
    })?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        LizzyError::IoError(format!("Failed to replace {}: {}", path.display(), e))
    })?;

    Ok(())
}

/// Recursively copy the contents of `src` into `dst`
///
/// Top-level entries whose name is in `skip` are left out. Symlinks inside
/// the tree are copied as the files they point to.
pub fn copy_dir_all(src: &Path, dst: &Path, skip: &[&str]) -> Result<u64> {
    fs::create_dir_all(dst)?;
    let mut copied = 0u64;

    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.depth() == 1
                && skip.iter().any(|name| entry.file_name() == std::ffi::OsStr::new(name)))
        });

    for entry in walker {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| LizzyError::IoError(format!("Failed to relativize path: {}", e)))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            copied += fs::copy(entry.path(), &target)?;
        }
    }

    Ok(copied)
}

/// Total size in bytes of the regular files under `path`
///
/// Symlinked directories are not followed, so imported buckets are not
/// counted twice. Entries that vanish during the walk are ignored.
pub fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// Convert a byte count to megabytes
pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// How a bucket ended up inside a project
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Symlink,
    Copy,
}

/// Whether `path` itself is a symbolic link (dangling links included)
pub fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// Whether anything (file, directory, or dangling link) exists at `path`
pub fn path_occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Link `source` at `link_path` with a relative symlink, copying the
/// directory when the platform refuses symlinks
pub fn link_or_copy(source: &Path, link_path: &Path) -> Result<LinkKind> {
    let parent = link_path
        .parent()
        .ok_or_else(|| LizzyError::IoError("Link path has no parent directory".to_string()))?;
    fs::create_dir_all(parent)?;

    let source_abs = fs::canonicalize(source)?;
    let parent_abs = fs::canonicalize(parent)?;
    let relative = pathdiff::diff_paths(&source_abs, &parent_abs).unwrap_or_else(|| source_abs.clone());

    match create_dir_symlink(&relative, link_path) {
        Ok(()) => Ok(LinkKind::Symlink),
        Err(e) => {
            warn!(
                link = %link_path.display(),
                error = %e,
                "symlink unsupported, falling back to copy"
            );
            copy_dir_all(&source_abs, link_path, &[])?;
            Ok(LinkKind::Copy)
        }
    }
}

#[cfg(unix)]
fn create_dir_symlink(target: &Path, link_path: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link_path)
}

#[cfg(windows)]
fn create_dir_symlink(target: &Path, link_path: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link_path)
}

/// Remove a bucket link, or the fallback copy, without touching its target
pub fn remove_link(link_path: &Path) -> Result<()> {
    if is_symlink(link_path) {
        #[cfg(windows)]
        {
            fs::remove_dir(link_path)?;
        }
        #[cfg(not(windows))]
        {
            fs::remove_file(link_path)?;
        }
    } else if link_path.is_dir() {
        fs::remove_dir_all(link_path)?;
    } else if link_path.exists() {
        fs::remove_file(link_path)?;
    }
    Ok(())
}
