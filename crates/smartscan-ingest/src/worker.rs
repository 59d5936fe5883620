// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ingestion worker — the single long-lived task that owns all batching
// state.
//
// Each cycle:
//   1. pick up at most one settings update,
//   2. scan the input directory and route every new file,
//   3. wait for a wake signal, the idle timeout, or cancellation,
//   4. on idle timeout, close the open document,
//   5. drain at most one artifact into the output directory,
//   6. stop if cancelled.
//
// Nothing in a cycle is fatal.  On cancellation the open document is
// flushed and the input directory is purged before `run` returns.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use smartscan_core::{CandidateFile, FileClass, InstanceId, ServiceConfig, ServiceSettings};
use smartscan_document::DocumentRenderer;
use smartscan_queue::MessageTransport;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::access::try_open;
use crate::artifacts::{ArtifactConsumer, ArtifactPublisher};
use crate::gate::FileGate;
use crate::quarantine::quarantine;
use crate::sequencer::{FlushedBatch, PageOutcome, SequencerState};
use crate::settings_sync::SettingsSync;

/// Identity of a page file when it was accepted.  A file deleted and
/// recreated, or rewritten, under the same name gets a different stamp.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
    #[cfg(unix)]
    inode: u64,
}

impl FileStamp {
    fn read(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
            #[cfg(unix)]
            inode: std::os::unix::fs::MetadataExt::ino(&meta),
        })
    }
}

/// How the idle wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitOutcome {
    Woken,
    TimedOut,
    Cancelled,
}

pub struct Worker {
    in_dir: PathBuf,
    holding_dir: PathBuf,
    open_attempts: u32,
    gate: FileGate,
    sequencer: SequencerState,
    settings: ServiceSettings,
    /// Pages already accepted into a batch, by name.  An entry only
    /// suppresses the file it was stamped from.
    seen: HashMap<String, FileStamp>,
    publisher: ArtifactPublisher,
    consumer: ArtifactConsumer,
    sync: SettingsSync,
    transport: Arc<dyn MessageTransport>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
}

impl Worker {
    pub fn new(
        config: &ServiceConfig,
        transport: Arc<dyn MessageTransport>,
        renderer: Arc<dyn DocumentRenderer>,
        wake: Arc<Notify>,
        cancel: CancellationToken,
        instance: InstanceId,
    ) -> Self {
        let publisher = ArtifactPublisher::new(renderer, &config.artifact_channel, config.out_dir())
            .with_local_copy(config.keep_local_copy);
        let consumer =
            ArtifactConsumer::new(config.out_dir(), &config.artifact_channel, config.receive_wait());
        let sync = SettingsSync::new(&config.settings_channel, config.receive_wait(), instance);

        Self {
            in_dir: config.in_dir(),
            holding_dir: config.holding_dir(),
            open_attempts: config.open_attempts.max(1),
            gate: FileGate::new(),
            sequencer: SequencerState::new(),
            settings: config.settings.clone(),
            seen: HashMap::new(),
            publisher,
            consumer,
            sync,
            transport,
            wake,
            cancel,
        }
    }

    /// Run cycles until cancelled, then flush and purge.
    pub async fn run(mut self) {
        info!(dir = %self.in_dir.display(), "ingestion worker started");

        loop {
            self.sync
                .poll(self.transport.as_ref(), &mut self.settings)
                .await;

            self.scan_pass().await;

            match self.wait().await {
                WaitOutcome::Cancelled => break,
                WaitOutcome::TimedOut => {
                    if let Some(batch) = self.sequencer.on_idle_timeout() {
                        debug!(batch = batch.number(), "idle timeout closed document");
                        self.publish(batch).await;
                    }
                }
                WaitOutcome::Woken => {}
            }

            self.consumer.drain_one(self.transport.as_ref()).await;

            if self.cancel.is_cancelled() {
                break;
            }
        }

        self.shutdown().await;
        info!(batches = self.sequencer.flushed_count(), "ingestion worker stopped");
    }

    /// Route every file currently in the input directory.
    #[instrument(skip_all)]
    async fn scan_pass(&mut self) {
        let candidates = match self.gate.scan_directory(&self.in_dir) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(dir = %self.in_dir.display(), error = %e, "scan failed");
                return;
            }
        };

        let present: HashSet<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        self.seen.retain(|name, _| present.contains(name.as_str()));

        for candidate in candidates {
            if self.cancel.is_cancelled() {
                return;
            }
            match candidate.class {
                FileClass::Page(index) => self.handle_page(index, candidate).await,
                FileClass::Foreign | FileClass::Unrecognized => self.handle_foreign(candidate).await,
            }
        }
    }

    async fn handle_page(&mut self, index: u8, candidate: CandidateFile) {
        let Ok(stamp) = FileStamp::read(&candidate.path) else {
            return;
        };
        if self.seen.get(&candidate.name) == Some(&stamp) {
            return;
        }
        if !self.ready(&candidate).await {
            debug!(file = %candidate.name, "page not ready, retrying next pass");
            return;
        }

        // Stamp again once the writer has let go.
        let stamp = FileStamp::read(&candidate.path).unwrap_or(stamp);
        self.seen.insert(candidate.name.clone(), stamp);
        let outcome = self.sequencer.accept_page(index, candidate.path);
        debug!(file = %candidate.name, index, outcome = ?outcome, "page accepted");
        if let PageOutcome::Split(batch) = outcome {
            self.publish(batch).await;
        }
    }

    async fn handle_foreign(&mut self, candidate: CandidateFile) {
        if !self.ready(&candidate).await {
            debug!(file = %candidate.name, "foreign file not ready, retrying next pass");
            return;
        }
        if let Err(e) = quarantine(&candidate.path, &self.holding_dir) {
            warn!(file = %candidate.name, error = %e, "quarantine failed, retrying next pass");
        }
    }

    async fn ready(&self, candidate: &CandidateFile) -> bool {
        try_open(&candidate.path, self.open_attempts, self.settings.idle_timeout()).await
    }

    async fn wait(&self) -> WaitOutcome {
        let idle = self.settings.idle_timeout();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => WaitOutcome::Cancelled,
            _ = self.wake.notified() => WaitOutcome::Woken,
            _ = tokio::time::sleep(idle) => WaitOutcome::TimedOut,
        }
    }

    async fn publish(&self, batch: FlushedBatch) {
        self.publisher
            .publish_logged(self.transport.as_ref(), batch)
            .await;
    }

    async fn shutdown(&mut self) {
        if let Some(batch) = self.sequencer.flush() {
            debug!(batch = batch.number(), "closing open document on shutdown");
            self.publish(batch).await;
        }
        self.purge().await;
    }

    /// Delete every file left in the input directory that can be opened
    /// exclusively.  Busy files stay for the next run.
    async fn purge(&mut self) {
        let candidates = match self.gate.scan_directory(&self.in_dir) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(dir = %self.in_dir.display(), error = %e, "purge scan failed");
                return;
            }
        };

        let mut removed = 0usize;
        for candidate in &candidates {
            if !self.ready(candidate).await {
                debug!(file = %candidate.name, "file busy, left in place");
                continue;
            }
            match std::fs::remove_file(&candidate.path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(file = %candidate.name, error = %e, "purge failed"),
            }
        }
        self.seen.clear();
        info!(removed, left = candidates.len() - removed, "input directory purged");
    }
}
