use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::persist::write_json_atomic;

/// Durable set of URLs whose files have been fully downloaded
///
/// Stored as a JSON array of URLs. Workers insert under the mutex after a
/// transfer completes; only the manager writes the file.
#[derive(Debug, Clone)]
pub struct DownloadState {
    path: PathBuf,
    downloaded: Arc<Mutex<HashSet<String>>>,
}

impl DownloadState {
    /// Load the state file; a missing or unreadable file starts an empty set
    pub async fn load(path: PathBuf) -> Result<Self> {
        let downloaded = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<Vec<String>>(&content) {
                Ok(urls) => urls.into_iter().collect(),
                Err(e) => {
                    warn!("⚠️  Download state {} is corrupt ({}), starting fresh", path.display(), e);
                    HashSet::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read download state {}", path.display()))
            }
        };

        info!("📊 Download state: {} files already downloaded", downloaded.len());
        Ok(Self {
            path,
            downloaded: Arc::new(Mutex::new(downloaded)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn contains(&self, url: &str) -> bool {
        self.downloaded.lock().await.contains(url)
    }

    pub async fn insert(&self, url: &str) {
        self.downloaded.lock().await.insert(url.to_string());
    }

    pub async fn len(&self) -> usize {
        self.downloaded.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Persist atomically, sorted for stable diffs
    pub async fn save(&self) -> Result<()> {
        let urls: BTreeSet<String> = self.downloaded.lock().await.iter().cloned().collect();
        write_json_atomic(&self.path, &urls).await?;
        info!("💾 Download state saved: {} files downloaded", urls.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_state_persists_inserted_urls() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("download_state.json");

        let state = DownloadState::load(path.clone()).await.unwrap();
        assert!(state.is_empty().await);
        state.insert("https://x/b.mp3").await;
        state.insert("https://x/a.mp3").await;
        state.save().await.unwrap();

        let raw: Vec<String> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, vec!["https://x/a.mp3", "https://x/b.mp3"]);

        let reloaded = DownloadState::load(path).await.unwrap();
        assert!(reloaded.contains("https://x/a.mp3").await);
        assert_eq!(reloaded.len().await, 2);
    }

    #[tokio::test]
    async fn test_corrupt_state_starts_fresh() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("download_state.json");
        std::fs::write(&path, "{oops").unwrap();

        let state = DownloadState::load(path).await.unwrap();
        assert!(state.is_empty().await);
    }
}
