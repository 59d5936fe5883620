// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ScanService — start/stop lifecycle around the ingestion worker.

use std::sync::Arc;

use smartscan_core::error::{Result, SmartScanError};
use smartscan_core::{InstanceId, ServiceConfig, ServiceStatus};
use smartscan_document::DocumentRenderer;
use smartscan_queue::MessageTransport;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::settings_sync::SettingsSync;
use crate::watcher::DirectoryWatcher;
use crate::worker::Worker;

/// Display name of the service.
pub const SERVICE_NAME: &str = "SmartScan";

/// The scan ingestion service.
///
/// Created in `Stopped` state.  [`start`](Self::start) provisions the queue
/// channels, announces this instance's settings, starts watching the input
/// directory and spawns the worker.  [`stop`](Self::stop) waits for the
/// worker's final flush and purge, then closes the transport.
pub struct ScanService {
    config: ServiceConfig,
    instance: InstanceId,
    transport: Arc<dyn MessageTransport>,
    renderer: Arc<dyn DocumentRenderer>,
    status: ServiceStatus,
    wake: Arc<Notify>,
    cancel: CancellationToken,
    watcher: Option<DirectoryWatcher>,
    task_handle: Option<JoinHandle<()>>,
}

impl ScanService {
    /// Create the service and every directory it works in.
    pub fn new(
        config: ServiceConfig,
        transport: Arc<dyn MessageTransport>,
        renderer: Arc<dyn DocumentRenderer>,
    ) -> Result<Self> {
        config.ensure_directories()?;
        Ok(Self {
            config,
            instance: InstanceId::new(),
            transport,
            renderer,
            status: ServiceStatus::Stopped,
            wake: Arc::new(Notify::new()),
            cancel: CancellationToken::new(),
            watcher: None,
            task_handle: None,
        })
    }

    pub fn status(&self) -> ServiceStatus {
        self.status
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.status == ServiceStatus::Running {
            return Ok(());
        }

        for channel in [&self.config.artifact_channel, &self.config.settings_channel] {
            self.transport.ensure_channel(channel).await?;
        }

        let sync = SettingsSync::new(
            &self.config.settings_channel,
            self.config.receive_wait(),
            self.instance,
        );
        if let Err(e) = sync
            .broadcast(self.transport.as_ref(), &self.config.settings)
            .await
        {
            warn!(error = %e, "settings broadcast failed");
        }

        self.watcher = Some(DirectoryWatcher::start(
            self.config.in_dir(),
            Arc::clone(&self.wake),
        )?);

        // A cancelled token stays cancelled; each run gets its own.
        self.cancel = CancellationToken::new();
        let worker = Worker::new(
            &self.config,
            Arc::clone(&self.transport),
            Arc::clone(&self.renderer),
            Arc::clone(&self.wake),
            self.cancel.clone(),
            self.instance,
        );
        self.task_handle = Some(tokio::spawn(worker.run()));
        self.status = ServiceStatus::Running;

        info!(
            service = SERVICE_NAME,
            instance = %self.instance,
            base_dir = %self.config.base_dir.display(),
            "service started"
        );
        Ok(())
    }

    /// Stop the worker and wait for it to finish.  A no-op unless running.
    pub async fn stop(&mut self) -> Result<()> {
        if self.status != ServiceStatus::Running {
            return Ok(());
        }
        self.status = ServiceStatus::Stopping;
        info!(service = SERVICE_NAME, "stopping service");

        self.watcher = None;
        self.cancel.cancel();

        let joined = match self.task_handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| SmartScanError::Service(format!("worker join: {e}"))),
            None => Ok(()),
        };

        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "failed to close transport");
        }
        self.status = ServiceStatus::Stopped;
        info!(service = SERVICE_NAME, "service stopped");
        joined
    }
}
