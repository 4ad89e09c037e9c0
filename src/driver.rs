//! Long-running ingestion driver.
//!
//! The driver repeatedly pulls `Local` batches from the batch store,
//! reconciles them and marks them `UrlsUpdated`. Cycles are strictly
//! sequential. A failed cycle is logged with the phase it failed in and
//! never stops the loop, and neither does a panic inside a collaborator;
//! the same delay follows every cycle, successful or not.
//!
//! ```text
//! Fetching ──▶ Reconciling ──▶ Persisting ──▶ Sleeping ──▶ Fetching ...
//!     │              │               │
//!     └──── error ───┴───────────────┴──▶ Sleeping
//!
//! any state ── shutdown token ──▶ Stopped
//! ```
//!
//! A cycle in flight when shutdown is requested runs to completion.
//! Batches from an interrupted process stay `Local` and are reconciled
//! again on the next run, which is safe because reconciliation is
//! idempotent.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crowdcrawl_core::models::{Batch, BatchStatus};
use crowdcrawl_core::reconcile::{ReconcileSummary, Reconciler};
use crowdcrawl_core::store::{BatchStore, WorkQueue};

use crate::config::IngestConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Fetching,
    Reconciling,
    Persisting,
    Sleeping,
    Stopped,
}

impl DriverState {
    pub fn as_str(self) -> &'static str {
        match self {
            DriverState::Fetching => "fetching",
            DriverState::Reconciling => "reconciling",
            DriverState::Persisting => "persisting",
            DriverState::Sleeping => "sleeping",
            DriverState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DriverSettings {
    /// Maximum batches pulled per cycle.
    pub batch_limit: usize,
    /// Pause after every cycle.
    pub retry_delay: Duration,
}

impl From<&IngestConfig> for DriverSettings {
    fn from(config: &IngestConfig) -> Self {
        Self {
            batch_limit: config.batch_limit,
            retry_delay: config.retry_delay(),
        }
    }
}

/// Result of one fetch/reconcile/persist pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Ids of the batches marked `UrlsUpdated`, in arrival order.
    pub batch_ids: Vec<String>,
    pub summary: ReconcileSummary,
}

pub struct IngestionDriver {
    batch_store: Arc<dyn BatchStore>,
    reconciler: Reconciler,
    queue: Arc<dyn WorkQueue>,
    settings: DriverSettings,
    state: DriverState,
}

impl IngestionDriver {
    pub fn new(
        batch_store: Arc<dyn BatchStore>,
        reconciler: Reconciler,
        queue: Arc<dyn WorkQueue>,
        settings: DriverSettings,
    ) -> Self {
        Self {
            batch_store,
            reconciler,
            queue,
            settings,
            state: DriverState::Sleeping,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Run one cycle. On error, [`state`](Self::state) names the phase that failed.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.state = DriverState::Fetching;
        let stored = self
            .batch_store
            .fetch(BatchStatus::Local, self.settings.batch_limit)
            .await
            .context("failed to fetch local batches")?;

        if stored.is_empty() {
            debug!("no batches to reconcile");
            self.state = DriverState::Sleeping;
            return Ok(CycleReport::default());
        }

        let batch_ids: Vec<String> = stored.iter().map(|b| b.id.clone()).collect();
        let batches: Vec<Batch> = stored.into_iter().map(|b| b.batch).collect();
        info!(batches = batches.len(), "got batches to reconcile");

        self.state = DriverState::Reconciling;
        let blacklist = self.reconciler.fetch_blacklist().await?;
        let outcome = self.reconciler.fold(&batches, &blacklist);

        self.state = DriverState::Persisting;
        let new_urls = self.reconciler.persist(&outcome, self.queue.as_ref()).await?;
        self.batch_store
            .mark(&batch_ids, BatchStatus::UrlsUpdated)
            .await
            .context("failed to mark batches as reconciled")?;

        self.state = DriverState::Sleeping;
        Ok(CycleReport {
            summary: ReconcileSummary::new(batch_ids.len(), &outcome, new_urls, &blacklist),
            batch_ids,
        })
    }

    /// Run cycles until `shutdown` is cancelled.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(
            batch_limit = self.settings.batch_limit,
            retry_delay_ms = self.settings.retry_delay.as_millis() as u64,
            "ingestion driver started"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let cycle = AssertUnwindSafe(self.run_cycle()).catch_unwind().await;
            match cycle {
                Ok(Ok(report)) if !report.batch_ids.is_empty() => {
                    info!(
                        batches = report.summary.batches,
                        found_urls = report.summary.found_urls,
                        new_urls = report.summary.new_urls,
                        source_domains = report.summary.source_domains,
                        "reconciled batches"
                    );
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    error!(phase = %self.state, error = format!("{:#}", e), "ingestion cycle failed");
                    self.state = DriverState::Sleeping;
                }
                Err(payload) => {
                    error!(phase = %self.state, panic = panic_message(payload.as_ref()), "ingestion cycle panicked");
                    self.state = DriverState::Sleeping;
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.retry_delay) => {}
            }
        }

        self.state = DriverState::Stopped;
        info!("ingestion driver stopped");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
