// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Artifact publishing and draining.
//
// The publisher renders a flushed batch into one document and sends it on
// the artifact channel.  The consumer pulls at most one document per cycle
// from the same channel and stores it in the output directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Local;
use smartscan_core::QueueMessage;
use smartscan_core::error::{Result, SmartScanError};
use smartscan_document::DocumentRenderer;
use smartscan_queue::MessageTransport;
use tracing::{debug, error, info, instrument, warn};

use crate::sequencer::FlushedBatch;

/// Renders flushed batches and sends them downstream.
pub struct ArtifactPublisher {
    renderer: Arc<dyn DocumentRenderer>,
    channel: String,
    out_dir: PathBuf,
    keep_local_copy: bool,
}

impl ArtifactPublisher {
    pub fn new(
        renderer: Arc<dyn DocumentRenderer>,
        channel: impl Into<String>,
        out_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            renderer,
            channel: channel.into(),
            out_dir: out_dir.into(),
            keep_local_copy: false,
        }
    }

    /// Also write each rendered document to `result_<n>.pdf`.
    pub fn with_local_copy(mut self, keep: bool) -> Self {
        self.keep_local_copy = keep;
        self
    }

    /// Render `batch` and send the result.  Returns the rendered size.
    ///
    /// Rendering runs on the blocking pool.  The batch is consumed either
    /// way; a failed render or send is not retried.
    #[instrument(skip_all, fields(batch = batch.number(), pages = batch.len()))]
    pub async fn publish(
        &self,
        transport: &dyn MessageTransport,
        batch: &FlushedBatch,
    ) -> Result<usize> {
        let renderer = Arc::clone(&self.renderer);
        let pages = batch.page_paths();
        let bytes = tokio::task::spawn_blocking(move || renderer.render(&pages))
            .await
            .map_err(|e| SmartScanError::Render(format!("render task failed: {e}")))??;
        let size = bytes.len();

        if self.keep_local_copy {
            self.write_local_copy(&bytes);
        }

        transport
            .send(&self.channel, QueueMessage::new(bytes))
            .await?;
        info!(bytes = size, indices = ?batch.indices(), "document published");
        Ok(size)
    }

    /// Log-only wrapper around [`publish`](Self::publish) for the worker.
    pub async fn publish_logged(&self, transport: &dyn MessageTransport, batch: FlushedBatch) {
        if let Err(e) = self.publish(transport, &batch).await {
            error!(batch = batch.number(), error = %e, "failed to publish document");
        }
    }

    fn write_local_copy(&self, bytes: &[u8]) {
        let n = count_files(&self.out_dir) + 1;
        let path = self.out_dir.join(format!("result_{n}.pdf"));
        if path.exists() {
            warn!(path = %path.display(), "local copy target exists, skipping");
            return;
        }
        match std::fs::write(&path, bytes) {
            Ok(()) => debug!(path = %path.display(), "local copy written"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to write local copy"),
        }
    }
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
                .count()
        })
        .unwrap_or(0)
}

/// What one drain pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    NoMessage,
    /// Stored at this path and acknowledged.
    Stored(PathBuf),
    /// Payload missing or corrupt; acknowledged without storing.
    Discarded,
    /// Receive, write, or acknowledge failed.
    Failed,
}

/// Drains documents from the artifact channel into the output directory.
pub struct ArtifactConsumer {
    out_dir: PathBuf,
    channel: String,
    wait: Duration,
    sequence: AtomicU64,
}

impl ArtifactConsumer {
    pub fn new(out_dir: impl Into<PathBuf>, channel: impl Into<String>, wait: Duration) -> Self {
        Self {
            out_dir: out_dir.into(),
            channel: channel.into(),
            wait,
            sequence: AtomicU64::new(0),
        }
    }

    /// Receive at most one document and store it.
    pub async fn drain_one(&self, transport: &dyn MessageTransport) -> DrainOutcome {
        let delivery = match transport.receive(&self.channel, self.wait).await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => return DrainOutcome::NoMessage,
            Err(e) => {
                warn!(channel = %self.channel, error = %e, "artifact receive failed");
                return DrainOutcome::Failed;
            }
        };

        let outcome = match delivery.verified_message() {
            Ok(message) => match self.store(&message.payload) {
                Ok(path) => {
                    info!(path = %path.display(), bytes = message.payload.len(), "artifact stored");
                    DrainOutcome::Stored(path)
                }
                Err(e) => {
                    // Not acknowledged: the message comes back after its lock expires.
                    error!(id = delivery.id, error = %e, "failed to store artifact");
                    return DrainOutcome::Failed;
                }
            },
            Err(e) => {
                warn!(id = delivery.id, error = %e, "discarding unreadable artifact");
                DrainOutcome::Discarded
            }
        };

        if let Err(e) = transport.complete(&delivery).await {
            warn!(id = delivery.id, error = %e, "failed to acknowledge artifact");
            return DrainOutcome::Failed;
        }
        outcome
    }

    /// Write `payload` under a fresh `queued_<timestamp>_<seq>.pdf` name.
    fn store(&self, payload: &[u8]) -> Result<PathBuf> {
        loop {
            let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            let stamp = Local::now().format("%Y%m%d%H%M%S%3f");
            let path = self.out_dir.join(format!("queued_{stamp}_{seq}.pdf"));
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    std::io::Write::write_all(&mut file, payload)?;
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartscan_queue::{MemoryTransport, hash_bytes};
    use std::sync::Mutex;

    const CHANNEL: &str = "pdfQueue";

    /// Records page names instead of rendering.
    #[derive(Default)]
    struct RecordingRenderer {
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl DocumentRenderer for RecordingRenderer {
        fn render(&self, pages: &[PathBuf]) -> Result<Vec<u8>> {
            let names = pages
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect::<Vec<_>>();
            let body = format!("%PDF {}", names.join(","));
            self.calls
                .lock()
                .map_err(|_| SmartScanError::Render("poisoned".into()))?
                .push(names);
            Ok(body.into_bytes())
        }
    }

    struct FailingRenderer;

    impl DocumentRenderer for FailingRenderer {
        fn render(&self, _pages: &[PathBuf]) -> Result<Vec<u8>> {
            Err(SmartScanError::Render("no pages".into()))
        }
    }

    fn batch(indices: &[u8]) -> FlushedBatch {
        let mut seq = crate::SequencerState::new();
        for &i in indices {
            seq.accept_page(i, PathBuf::from(format!("image_{i}.jpg")));
        }
        seq.flush().expect("non-empty batch")
    }

    async fn transport() -> MemoryTransport {
        let t = MemoryTransport::new();
        t.ensure_channel(CHANNEL).await.expect("channel");
        t
    }

    #[tokio::test]
    async fn publish_renders_pages_in_order_and_sends_one_message() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let t = transport().await;
        let renderer = Arc::new(RecordingRenderer::default());
        let publisher = ArtifactPublisher::new(renderer.clone(), CHANNEL, tmp.path());

        publisher.publish(&t, &batch(&[0, 1, 2])).await.expect("publish");

        let calls = renderer.calls.lock().expect("lock").clone();
        assert_eq!(calls, [vec!["image_0.jpg", "image_1.jpg", "image_2.jpg"]]);
        assert_eq!(t.pending(CHANNEL), 1);
        assert_eq!(count_files(tmp.path()), 0, "no local copy by default");
    }

    #[tokio::test]
    async fn local_copy_is_numbered_after_existing_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(tmp.path().join("queued_old.pdf"), b"x").expect("seed");
        let t = transport().await;
        let publisher = ArtifactPublisher::new(Arc::new(RecordingRenderer::default()), CHANNEL, tmp.path())
            .with_local_copy(true);

        publisher.publish(&t, &batch(&[4])).await.expect("publish");
        assert_eq!(
            std::fs::read(tmp.path().join("result_2.pdf")).expect("copy"),
            b"%PDF image_4.jpg"
        );
    }

    #[tokio::test]
    async fn render_failure_sends_nothing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let t = transport().await;
        let publisher = ArtifactPublisher::new(Arc::new(FailingRenderer), CHANNEL, tmp.path());

        assert!(publisher.publish(&t, &batch(&[0])).await.is_err());
        assert_eq!(t.pending(CHANNEL), 0);
    }

    #[tokio::test]
    async fn drain_stores_payload_and_acknowledges() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let t = transport().await;
        t.send(CHANNEL, QueueMessage::new(b"%PDF-1.7".to_vec()))
            .await
            .expect("send");

        let consumer = ArtifactConsumer::new(tmp.path(), CHANNEL, Duration::ZERO);
        let DrainOutcome::Stored(path) = consumer.drain_one(&t).await else {
            panic!("expected a stored artifact");
        };
        let name = path.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(name.starts_with("queued_") && name.ends_with("_0.pdf"), "{name}");
        assert_eq!(std::fs::read(&path).expect("read"), b"%PDF-1.7");
        assert_eq!(t.in_flight(), 0);
    }

    #[tokio::test]
    async fn drained_files_never_overwrite_each_other() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let t = transport().await;
        for body in [b"one".as_slice(), b"two".as_slice()] {
            t.send(CHANNEL, QueueMessage::new(body.to_vec())).await.expect("send");
        }

        let consumer = ArtifactConsumer::new(tmp.path(), CHANNEL, Duration::ZERO);
        assert!(matches!(consumer.drain_one(&t).await, DrainOutcome::Stored(_)));
        assert!(matches!(consumer.drain_one(&t).await, DrainOutcome::Stored(_)));
        assert_eq!(count_files(tmp.path()), 2);
    }

    #[tokio::test]
    async fn bad_payloads_are_acknowledged_without_storing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let t = transport().await;
        t.inject(CHANNEL, None, None).expect("missing body");
        t.inject(CHANNEL, Some(Vec::new()), None).expect("empty body");
        t.inject(CHANNEL, Some(b"%PDF-tampered".to_vec()), Some(hash_bytes(b"%PDF")))
            .expect("wrong hash");

        let consumer = ArtifactConsumer::new(tmp.path(), CHANNEL, Duration::ZERO);
        for _ in 0..3 {
            assert_eq!(consumer.drain_one(&t).await, DrainOutcome::Discarded);
        }
        assert_eq!(t.pending(CHANNEL), 0);
        assert_eq!(t.in_flight(), 0);
        assert_eq!(count_files(tmp.path()), 0);
    }

    #[tokio::test]
    async fn empty_channel_is_a_noop() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let t = transport().await;
        let consumer = ArtifactConsumer::new(tmp.path(), CHANNEL, Duration::ZERO);
        assert_eq!(consumer.drain_one(&t).await, DrainOutcome::NoMessage);
    }
}
