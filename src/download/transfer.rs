use anyhow::{anyhow, Context, Result};
use futures::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How a transfer ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Renamed into place with this many bytes
    Completed(u64),
    /// Stopped by the cancellation token; nothing left on disk
    Cancelled,
}

/// Sibling path the body is streamed into before the final rename
pub fn temp_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Stream `chunks` into `destination` so it only appears once complete
///
/// The body goes to `<destination>.tmp`, checked against `cancel` after every
/// chunk. The temp file is removed on cancellation or error.
pub async fn write_stream_atomically<S, B, E>(
    chunks: S,
    destination: &Path,
    cancel: &CancellationToken,
) -> Result<TransferOutcome>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }

    let tmp = temp_path(destination);
    match stream_into(chunks, &tmp, cancel).await {
        Ok(Some(bytes)) => {
            fs::rename(&tmp, destination)
                .await
                .with_context(|| format!("Cannot move {} into place", tmp.display()))?;
            Ok(TransferOutcome::Completed(bytes))
        }
        Ok(None) => {
            remove_quietly(&tmp).await;
            Ok(TransferOutcome::Cancelled)
        }
        Err(e) => {
            remove_quietly(&tmp).await;
            Err(e)
        }
    }
}

/// Returns `None` when cancelled mid-transfer
async fn stream_into<S, B, E>(chunks: S, tmp: &Path, cancel: &CancellationToken) -> Result<Option<u64>>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut chunks = std::pin::pin!(chunks);
    let mut file = fs::File::create(tmp)
        .await
        .with_context(|| format!("Cannot create {}", tmp.display()))?;
    let mut written = 0u64;

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| anyhow!("Error reading download stream: {}", e))?;
        file.write_all(chunk.as_ref()).await?;
        written += chunk.as_ref().len() as u64;

        if cancel.is_cancelled() {
            debug!("Transfer into {} cancelled after {} bytes", tmp.display(), written);
            return Ok(None);
        }
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(Some(written))
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!("Could not remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_complete_transfer_renames_into_place() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("Hindi").join("Foo").join("Foo_01.mp3");
        let chunks = stream::iter(vec![Ok::<_, std::io::Error>(b"ID3".to_vec()), Ok(b"data".to_vec())]);

        let outcome = write_stream_atomically(chunks, &destination, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, TransferOutcome::Completed(7));
        assert_eq!(std::fs::read(&destination).unwrap(), b"ID3data");
        assert!(!temp_path(&destination).exists());
    }

    #[tokio::test]
    async fn test_stream_error_leaves_nothing_behind() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("Foo_02.mp3");
        let chunks = stream::iter(vec![
            Ok(b"partial".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);

        let result = write_stream_atomically(chunks, &destination, &CancellationToken::new()).await;

        assert!(result.is_err());
        assert!(!destination.exists());
        assert!(!temp_path(&destination).exists());
    }

    #[tokio::test]
    async fn test_cancel_mid_transfer_removes_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("Foo_03.mp3");
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        let chunks = stream::iter(0..10).map(move |i| {
            if i == 2 {
                trigger.cancel();
            }
            Ok::<_, std::io::Error>(vec![0u8; 16])
        });

        let outcome = write_stream_atomically(chunks, &destination, &cancel).await.unwrap();

        assert_eq!(outcome, TransferOutcome::Cancelled);
        assert!(!destination.exists());
        assert!(!temp_path(&destination).exists());
    }
}
