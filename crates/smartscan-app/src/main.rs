// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SmartScan — watched-folder scan ingestion service
//
// Entry point.  Initialises logging, loads configuration, opens the local
// queue, and runs the service until Ctrl-C.

mod cli;
mod data_dir;

use std::sync::Arc;

use clap::Parser;
use smartscan_core::ServiceConfig;
use smartscan_core::error::Result;
use smartscan_document::{PageLayout, PdfRenderer};
use smartscan_ingest::ScanService;
use smartscan_queue::SqliteTransport;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::Cli;

/// Queue database file inside `queue/`.
const QUEUE_DB: &str = "queue.db";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let base_dir = cli.base_dir.clone().unwrap_or_else(data_dir::default_base_dir);
    let mut config = ServiceConfig::load(&base_dir);
    cli.apply(&mut config)?;
    config.ensure_directories()?;

    if cli.write_config {
        config.persist()?;
        info!(path = %base_dir.display(), "configuration written");
        return Ok(());
    }

    let transport = SqliteTransport::open(config.queue_dir().join(QUEUE_DB))?
        .with_poll_interval(config.queue_poll_interval());
    let mut renderer = PdfRenderer::new(PageLayout {
        paper_size: config.paper_size,
        image_scale: config.image_scale,
    });
    renderer.set_title(smartscan_ingest::SERVICE_NAME);

    info!("SmartScan starting");
    let mut service = ScanService::new(config, Arc::new(transport), Arc::new(renderer))?;
    service.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("interrupt received");
    service.stop().await
}
