//! Idempotent schema creation.
//!
//! | Table | Holds |
//! |-------|-------|
//! | `batches` | Uploaded crawl batches and their lifecycle status |
//! | `urls` | Deduplicated URL state (the crawl frontier) |
//! | `domain_links` | Directed domain graph edges |
//! | `url_queue` | Pushed sets of newly discovered URLs, FIFO |
//! | `index_documents` | Term-index pages, one row per document slot |
//! | `curations` | Verbatim curation audit log |

use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS batches (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            user_id_hash TEXT NOT NULL,
            status INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            batch_json TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS urls (
            url TEXT PRIMARY KEY,
            user_id_hash TEXT NOT NULL,
            status INTEGER NOT NULL,
            updated INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS domain_links (
            source TEXT NOT NULL,
            target TEXT NOT NULL,
            PRIMARY KEY (source, target)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS url_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            urls_json TEXT NOT NULL,
            pushed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_documents (
            page INTEGER NOT NULL,
            position INTEGER NOT NULL,
            term TEXT,
            title TEXT NOT NULL,
            url TEXT NOT NULL,
            extract TEXT NOT NULL,
            score REAL NOT NULL,
            state INTEGER,
            PRIMARY KEY (page, position)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS curations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            acting_user TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            url TEXT NOT NULL,
            results_json TEXT NOT NULL,
            curation_type TEXT NOT NULL,
            curation_json TEXT NOT NULL,
            received_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_batches_status ON batches(status, created_at, seq)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_urls_status ON urls(status)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
