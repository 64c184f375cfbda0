//! On-disk JSON records for the file cache tier.
//!
//! A record is replaced by writing a uniquely named `.tmp` sibling and
//! renaming it over the target. Readers see either the old record or the new
//! one, and concurrent writers of one key never share a temp file.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io;
use std::path::{Path, PathBuf};

/// Result of reading one record file.
#[derive(Debug)]
pub enum RecordRead<T> {
    /// No file at that path.
    Missing,
    Parsed(T),
    /// The file exists but does not hold a `T`.
    Unreadable(serde_json::Error),
}

/// Serialize `record` and swap it into place, creating parent directories.
pub async fn write_record<T: Serialize>(path: &Path, record: &T) -> io::Result<()> {
    let bytes = serde_json::to_vec(record).map_err(io::Error::other)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let staging = staging_path(path);
    tokio::fs::write(&staging, &bytes).await?;
    tokio::fs::rename(&staging, path).await.inspect_err(|_| {
        // Best effort; a stray staging file is ignored by directory scans.
        let _ = std::fs::remove_file(&staging);
    })
}

/// Read and parse a record file. I/O failures other than "not found" are errors.
pub async fn read_record<T: DeserializeOwned>(path: &Path) -> io::Result<RecordRead<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RecordRead::Missing),
        Err(e) => return Err(e),
    };
    Ok(match serde_json::from_slice(&bytes) {
        Ok(record) => RecordRead::Parsed(record),
        Err(e) => RecordRead::Unreadable(e),
    })
}

/// Delete a record file. Returns `false` when there was nothing to delete.
pub async fn discard_record(path: &Path) -> io::Result<bool> {
    tokio::fs::remove_file(path)
        .await
        .map(|()| true)
        .or_else(|e| match e.kind() {
            io::ErrorKind::NotFound => Ok(false),
            _ => Err(e),
        })
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{:016x}.tmp", rand::random::<u64>()));
    path.with_file_name(name)
}
