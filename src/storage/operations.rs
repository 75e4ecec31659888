//! Storage operations backing the filesystem-touching commands.
//!
//! Each function resolves the client path through the sandbox, performs the
//! filesystem call with `tokio::fs`, and translates failures into typed
//! [`StorageError`]s for the dispatcher to turn into protocol replies.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::info;
use tokio::fs;

use crate::error::StorageError;
use crate::storage::validation::resolve;

/// Metadata for a single directory entry, consumed by the listing formatter.
#[derive(Debug)]
pub struct EntryInfo {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
    pub modified: Option<SystemTime>,
}

/// Reads the directory at `path_arg` (or the cwd when empty) and returns
/// entry metadata sorted by name.
pub async fn list_directory(
    home_dir: &Path,
    cwd: &str,
    path_arg: &str,
) -> Result<Vec<EntryInfo>, StorageError> {
    let target = if path_arg.is_empty() { "." } else { path_arg };
    let (real_path, virtual_path) = resolve(home_dir, cwd, target)?;

    let metadata = fs::metadata(&real_path)
        .await
        .map_err(|e| not_found(e, &virtual_path))?;
    if !metadata.is_dir() {
        return Err(StorageError::NotADirectory(virtual_path));
    }

    let mut entries = Vec::new();
    let mut reader = fs::read_dir(&real_path).await?;
    while let Some(entry) = reader.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        match entry.metadata().await {
            Ok(meta) => entries.push(EntryInfo {
                name,
                size: if meta.is_dir() { 0 } else { meta.len() },
                is_dir: meta.is_dir(),
                modified: meta.modified().ok(),
            }),
            Err(_) => entries.push(EntryInfo {
                name,
                size: 0,
                is_dir: false,
                modified: None,
            }),
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    info!(
        "Listed {} ({} entries)",
        virtual_path,
        entries.len()
    );
    Ok(entries)
}

/// Resolves a file for download and verifies it exists and is a file.
pub async fn prepare_retrieval(
    home_dir: &Path,
    cwd: &str,
    filename: &str,
) -> Result<(PathBuf, String), StorageError> {
    let (real_path, virtual_path) = resolve(home_dir, cwd, filename)?;

    let metadata = fs::metadata(&real_path)
        .await
        .map_err(|e| not_found(e, &virtual_path))?;
    if !metadata.is_file() {
        return Err(StorageError::NotAFile(virtual_path));
    }

    Ok((real_path, virtual_path))
}

/// Resolves a destination for upload and verifies the parent directory
/// exists. STOR truncates an existing file, so presence of the target is
/// not an error.
pub async fn prepare_storage(
    home_dir: &Path,
    cwd: &str,
    filename: &str,
) -> Result<(PathBuf, String), StorageError> {
    let (real_path, virtual_path) = resolve(home_dir, cwd, filename)?;

    if let Some(parent) = real_path.parent() {
        let metadata = fs::metadata(parent)
            .await
            .map_err(|_| StorageError::DirectoryNotFound(virtual_path.clone()))?;
        if !metadata.is_dir() {
            return Err(StorageError::NotADirectory(virtual_path));
        }
    }

    if fs::metadata(&real_path).await.is_ok_and(|m| m.is_dir()) {
        return Err(StorageError::NotAFile(virtual_path));
    }

    Ok((real_path, virtual_path))
}

/// Deletes a file (never a directory).
pub async fn delete_file(
    home_dir: &Path,
    cwd: &str,
    filename: &str,
) -> Result<String, StorageError> {
    let (real_path, virtual_path) = resolve(home_dir, cwd, filename)?;

    let metadata = fs::metadata(&real_path)
        .await
        .map_err(|e| not_found(e, &virtual_path))?;
    if !metadata.is_file() {
        return Err(StorageError::NotAFile(virtual_path));
    }

    fs::remove_file(&real_path).await?;
    info!("Deleted file {virtual_path}");
    Ok(virtual_path)
}

/// Creates a directory.
pub async fn make_directory(
    home_dir: &Path,
    cwd: &str,
    dirname: &str,
) -> Result<String, StorageError> {
    let (real_path, virtual_path) = resolve(home_dir, cwd, dirname)?;

    if fs::metadata(&real_path).await.is_ok() {
        return Err(StorageError::AlreadyExists(virtual_path));
    }

    fs::create_dir(&real_path).await?;
    info!("Created directory {virtual_path}");
    Ok(virtual_path)
}

/// Removes an empty directory.
pub async fn remove_directory(
    home_dir: &Path,
    cwd: &str,
    dirname: &str,
) -> Result<String, StorageError> {
    let (real_path, virtual_path) = resolve(home_dir, cwd, dirname)?;

    let metadata = fs::metadata(&real_path)
        .await
        .map_err(|e| not_found(e, &virtual_path))?;
    if !metadata.is_dir() {
        return Err(StorageError::NotADirectory(virtual_path));
    }

    fs::remove_dir(&real_path).await.map_err(|e| {
        if e.raw_os_error() == Some(39) || e.kind() == ErrorKind::DirectoryNotEmpty {
            StorageError::DirectoryNotEmpty(virtual_path.clone())
        } else {
            StorageError::Io(e)
        }
    })?;
    info!("Removed directory {virtual_path}");
    Ok(virtual_path)
}

/// Validates the rename source for RNFR.
pub async fn prepare_rename(
    home_dir: &Path,
    cwd: &str,
    source: &str,
) -> Result<(PathBuf, String), StorageError> {
    let (real_path, virtual_path) = resolve(home_dir, cwd, source)?;

    fs::metadata(&real_path)
        .await
        .map_err(|e| not_found(e, &virtual_path))?;

    Ok((real_path, virtual_path))
}

/// Completes a rename started by RNFR.
pub async fn rename(
    home_dir: &Path,
    cwd: &str,
    source_real: &Path,
    target: &str,
) -> Result<String, StorageError> {
    let (target_real, target_virtual) = resolve(home_dir, cwd, target)?;

    if fs::metadata(&target_real).await.is_ok() {
        return Err(StorageError::AlreadyExists(target_virtual));
    }

    fs::rename(source_real, &target_real).await?;
    info!("Renamed {} -> {}", source_real.display(), target_virtual);
    Ok(target_virtual)
}

/// Returns the size of a regular file, for SIZE.
pub async fn file_size(home_dir: &Path, cwd: &str, filename: &str) -> Result<u64, StorageError> {
    let (real_path, virtual_path) = resolve(home_dir, cwd, filename)?;

    let metadata = fs::metadata(&real_path)
        .await
        .map_err(|e| not_found(e, &virtual_path))?;
    if !metadata.is_file() {
        return Err(StorageError::NotAFile(virtual_path));
    }
    Ok(metadata.len())
}

/// Returns the modification time of a file, for MDTM.
pub async fn modification_time(
    home_dir: &Path,
    cwd: &str,
    filename: &str,
) -> Result<SystemTime, StorageError> {
    let (real_path, virtual_path) = resolve(home_dir, cwd, filename)?;

    let metadata = fs::metadata(&real_path)
        .await
        .map_err(|e| not_found(e, &virtual_path))?;
    Ok(metadata.modified()?)
}

/// Sets the modification time of a file, for MFMT.
pub async fn set_modification_time(
    home_dir: &Path,
    cwd: &str,
    filename: &str,
    mtime: SystemTime,
) -> Result<String, StorageError> {
    let (real_path, virtual_path) = resolve(home_dir, cwd, filename)?;

    fs::metadata(&real_path)
        .await
        .map_err(|e| not_found(e, &virtual_path))?;

    // tokio::fs has no utimes; this is a quick metadata-only syscall, fine
    // to run on the blocking pool.
    let path = real_path.clone();
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::options().write(true).open(&path)?;
        file.set_modified(mtime)
    })
    .await
    .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;

    info!("Changed mtime of {virtual_path}");
    Ok(virtual_path)
}

/// Verifies a virtual directory exists, for CWD.
pub async fn check_directory(
    home_dir: &Path,
    cwd: &str,
    target: &str,
) -> Result<String, StorageError> {
    let (real_path, virtual_path) = resolve(home_dir, cwd, target)?;

    let metadata = fs::metadata(&real_path)
        .await
        .map_err(|e| not_found(e, &virtual_path))?;
    if !metadata.is_dir() {
        return Err(StorageError::NotADirectory(virtual_path));
    }

    Ok(virtual_path)
}

fn not_found(error: std::io::Error, virtual_path: &str) -> StorageError {
    if error.kind() == ErrorKind::NotFound {
        StorageError::FileNotFound(virtual_path.to_string())
    } else {
        StorageError::Io(error)
    }
}
