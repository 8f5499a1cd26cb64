//! Atomic file replacement shared by the ledger, discourse files and download state

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Write `contents` to `path` so readers only ever see the old or the new file
///
/// The data goes to a temporary file in the same directory, is flushed to
/// disk, then renamed over the target.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let path = path.to_path_buf();
    let contents = contents.to_vec();
    tokio::task::spawn_blocking(move || write_atomic_blocking(&path, &contents))
        .await
        .map_err(|e| anyhow!("Atomic write task failed: {}", e))?
}

/// Serialize `value` as pretty JSON and write it atomically
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, json.as_bytes()).await
}

fn write_atomic_blocking(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = parent_dir(path);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Cannot create directory {}", dir.display()))?;

    let mut temp = NamedTempFile::new_in(&dir)
        .with_context(|| format!("Cannot create temporary file in {}", dir.display()))?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path)
        .map_err(|e| anyhow!("Cannot replace {}: {}", path.display(), e.error))?;
    Ok(())
}

/// Strip characters that are illegal in file names on common filesystems
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(*c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|') && !c.is_control())
        .collect();
    let cleaned = cleaned.trim().trim_end_matches('.').trim();
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned.to_string()
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
