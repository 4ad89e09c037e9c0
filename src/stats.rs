//! Database statistics: what has been ingested and what is waiting.
//!
//! Used by `crowdcrawl stats` and `crowdcrawl queue pop`.

use anyhow::Result;
use sqlx::Row;

use crowdcrawl_core::models::{BatchStatus, UrlStatus};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Counts keyed by status label, in code order.
async fn status_counts(
    pool: &sqlx::SqlitePool,
    sql: &str,
    label: impl Fn(i64) -> String,
) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query(sql).fetch_all(pool).await?;
    Ok(rows
        .iter()
        .map(|row| {
            let code: i64 = row.get("status");
            let count: i64 = row.get("n");
            (label(code), count)
        })
        .collect())
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let batches = status_counts(
        &pool,
        "SELECT status, COUNT(*) AS n FROM batches GROUP BY status ORDER BY status",
        |code| match BatchStatus::from_code(code) {
            Some(status) => status.as_str().to_string(),
            None => format!("unknown({})", code),
        },
    )
    .await?;

    let urls = status_counts(
        &pool,
        "SELECT status, COUNT(*) AS n FROM urls GROUP BY status ORDER BY status",
        |code| match UrlStatus::from_code(code) {
            Some(status) => status.as_str().to_string(),
            None => format!("unknown({})", code),
        },
    )
    .await?;

    let edges: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM domain_links")
        .fetch_one(&pool)
        .await?;
    let queued: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM url_queue")
        .fetch_one(&pool)
        .await?;
    let curations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM curations")
        .fetch_one(&pool)
        .await?;

    println!("Crowdcrawl Database Stats");
    println!("=========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!();
    println!("  Batches:");
    for (label, count) in &batches {
        println!("    {:<20} {}", label, count);
    }
    println!("  URLs:");
    for (label, count) in &urls {
        println!("    {:<20} {}", label, count);
    }
    println!();
    println!("  Domain links: {}", edges);
    println!("  Queued sets:  {}", queued);
    println!("  Curations:    {}", curations);
    Ok(())
}

/// Print and remove the oldest queued URL set.
pub async fn run_queue_pop(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool, config.index.num_pages);
    match store.pop_queue().await? {
        Some(urls) => {
            for url in urls {
                println!("{}", url);
            }
        }
        None => eprintln!("queue is empty"),
    }
    Ok(())
}
