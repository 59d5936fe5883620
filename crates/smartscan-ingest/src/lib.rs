// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// smartscan-ingest — Turns a watched directory of scanned pages into
// published documents.
//
// A single worker scans the directory, classifies each file (`gate`), waits
// until the scanner has finished writing it (`access`), and feeds pages to
// the batching state machine (`sequencer`).  Closed batches are rendered and
// published (`artifacts`); foreign files are moved aside (`quarantine`);
// runtime settings are exchanged over the queue (`settings_sync`).  The
// `service` module wires this together with the filesystem `watcher`.

pub mod access;
pub mod artifacts;
pub mod gate;
pub mod quarantine;
pub mod sequencer;
pub mod service;
pub mod settings_sync;
pub mod watcher;
pub mod worker;

pub use artifacts::{ArtifactConsumer, ArtifactPublisher, DrainOutcome};
pub use gate::FileGate;
pub use sequencer::{FlushedBatch, PageOutcome, Phase, SequencerState};
pub use quarantine::QuarantineAction;
pub use service::{SERVICE_NAME, ScanService};
pub use settings_sync::{SettingsSync, SyncOutcome};
pub use watcher::DirectoryWatcher;
pub use worker::Worker;
