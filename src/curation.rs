//! `crowdcrawl curate`: apply a curation request file to the term index.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crowdcrawl_core::curate::{CurationAck, CurationMerger};
use crowdcrawl_core::models::CurationRequest;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

pub async fn apply_curation(
    config: &Config,
    request: &CurationRequest,
    acting_user: &str,
) -> Result<CurationAck> {
    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteStore::new(pool, config.index.num_pages));
    let merger = CurationMerger::new(store.clone(), store);
    let ack = merger.merge(request, acting_user).await?;
    Ok(ack)
}

pub async fn run_curate(config: &Config, path: &Path, acting_user: &str) -> Result<()> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read curation request: {}", path.display()))?;
    let request: CurationRequest = serde_json::from_str(&text)
        .with_context(|| format!("Invalid curation request JSON: {}", path.display()))?;

    let ack = apply_curation(config, &request, acting_user)
        .await
        .context("curation rejected")?;

    println!("curate \"{}\"", ack.term);
    println!("  page: {}", ack.page);
    println!("  curated documents: {}", ack.curated);
    println!("  other documents kept: {}", ack.kept);
    println!("ok");
    Ok(())
}
