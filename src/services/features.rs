//! Feature event output as JSON lines.

use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::models::{FeatureEvent, FeatureVector};

/// Writes one `{"key": ..., "value": ...}` line per feature vector until the channel
/// closes. Returns the number of lines written.
pub async fn write_features<W>(
    writer: W,
    mut rx: mpsc::Receiver<FeatureVector>,
) -> std::io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(writer);
    let mut written = 0usize;

    while let Some(features) = rx.recv().await {
        let event = FeatureEvent::from(features);
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        written += 1;
        if rx.is_empty() {
            writer.flush().await?;
        }
    }

    writer.flush().await?;
    Ok(written)
}

/// Appends feature events to `path` in a background task.
pub fn spawn_feature_file(path: PathBuf, rx: mpsc::Receiver<FeatureVector>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let file = match OpenOptions::new().create(true).append(true).open(&path).await {
            Ok(file) => file,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Cannot open feature output {}", path.display());
                return;
            }
        };
        match write_features(file, rx).await {
            Ok(count) => info!(path = %path.display(), events = count, "Wrote {} feature events", count),
            Err(e) => error!(path = %path.display(), error = %e, "Feature output failed"),
        }
    })
}
