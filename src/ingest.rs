//! Batch import and reconciliation commands.
//!
//! `crowdcrawl batch import` stores uploaded batch files as `Local`,
//! `crowdcrawl reconcile` runs a single driver cycle and `crowdcrawl ingest`
//! runs the driver until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crowdcrawl_core::models::{Batch, BatchStatus};
use crowdcrawl_core::reconcile::Reconciler;

use crate::blacklist;
use crate::config::Config;
use crate::db;
use crate::driver::{DriverSettings, IngestionDriver};
use crate::sqlite_store::SqliteStore;

/// Build a driver wired to the configured database and blacklist.
pub async fn build_driver(config: &Config) -> Result<IngestionDriver> {
    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteStore::new(pool, config.index.num_pages));
    let reconciler = Reconciler::new(
        blacklist::from_config(&config.blacklist)?,
        store.clone(),
        store.clone(),
    );
    Ok(IngestionDriver::new(
        store.clone(),
        reconciler,
        store,
        DriverSettings::from(&config.ingest),
    ))
}

/// Read batch JSON files and store each as a `Local` batch.
pub async fn run_import(config: &Config, files: &[PathBuf]) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool, config.index.num_pages);

    let mut items = 0usize;
    for path in files {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read batch file: {}", path.display()))?;
        let batch: Batch = serde_json::from_str(&text)
            .with_context(|| format!("Invalid batch JSON: {}", path.display()))?;
        items += batch.items.len();
        let id = store.insert_batch(&batch, BatchStatus::Local).await?;
        info!(batch_id = %id, file = %path.display(), items = batch.items.len(), "imported batch");
    }

    println!("batch import");
    println!("  batches: {}", files.len());
    println!("  items: {}", items);
    println!("ok");
    Ok(())
}

/// Run one reconciliation cycle and print its summary.
pub async fn run_reconcile(config: &Config) -> Result<()> {
    let mut driver = build_driver(config).await?;
    let report = driver
        .run_cycle()
        .await
        .with_context(|| format!("reconcile failed while {}", driver.state()))?;

    println!("reconcile");
    println!("  batches: {}", report.summary.batches);
    println!("  found urls: {}", report.summary.found_urls);
    println!("  new urls: {}", report.summary.new_urls);
    println!("  source domains: {}", report.summary.source_domains);
    println!("  blacklisted domains: {}", report.summary.blacklist_size);
    println!("ok");
    Ok(())
}

/// Run the ingestion driver until Ctrl-C.
pub async fn run_ingest(config: &Config) -> Result<()> {
    let mut driver = build_driver(config).await?;
    let shutdown = CancellationToken::new();

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            signal.cancel();
        }
    });

    driver.run(shutdown).await;
    Ok(())
}
