//! SQLite-backed collaborator implementations.
//!
//! [`SqliteStore`] wraps one [`SqlitePool`] and implements every collaborator
//! trait the core needs except the blacklist source: batch store, URL
//! database, domain-link database, work queue, page store and curation log.
//! Multi-statement writes (`update_found_urls`, `merge_links`, `write_page`,
//! `mark`) each run in a single transaction. `replace_page` holds the
//! database write lock from its read to its commit.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::warn;
use uuid::Uuid;

use crowdcrawl_core::models::{
    Batch, BatchStatus, CurationRequest, Document, DocumentState, FoundUrl, StoredBatch, UrlStatus,
};
use crowdcrawl_core::store::{
    page_index, should_replace_url, BatchStore, CurationLog, DomainLinkDatabase, PageEdit,
    PageStore, UrlDatabase, WorkQueue,
};

pub struct SqliteStore {
    pool: SqlitePool,
    num_pages: u64,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, num_pages: u64) -> Self {
        Self { pool, num_pages }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Store an uploaded batch in `status`, returning its new id.
    pub async fn insert_batch(&self, batch: &Batch, status: BatchStatus) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let batch_json = serde_json::to_string(batch)?;
        sqlx::query(
            "INSERT INTO batches (id, user_id_hash, status, created_at, batch_json) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&batch.user_id_hash)
        .bind(status.code())
        .bind(chrono::Utc::now().timestamp())
        .bind(&batch_json)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    /// Remove and return the oldest pushed URL set.
    pub async fn pop_queue(&self) -> Result<Option<Vec<String>>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT id, urls_json FROM url_queue ORDER BY id ASC LIMIT 1")
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let id: i64 = row.get("id");
        let urls_json: String = row.get("urls_json");
        sqlx::query("DELETE FROM url_queue WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let urls = serde_json::from_str(&urls_json)
            .with_context(|| format!("corrupt url_queue entry {}", id))?;
        Ok(Some(urls))
    }

    pub async fn get_url(&self, url: &str) -> Result<Option<FoundUrl>> {
        let row = sqlx::query("SELECT url, user_id_hash, status, updated FROM urls WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let code: i64 = row.get("status");
        let updated: i64 = row.get("updated");
        Ok(Some(FoundUrl {
            url: row.get("url"),
            user_id_hash: row.get("user_id_hash"),
            status: UrlStatus::from_code(code)
                .with_context(|| format!("unknown URL status code {}", code))?,
            timestamp: DateTime::<Utc>::from_timestamp_millis(updated)
                .with_context(|| format!("invalid URL timestamp {}", updated))?,
        }))
    }

    pub async fn domain_targets(&self, source_domain: &str) -> Result<BTreeSet<String>> {
        let targets: Vec<String> =
            sqlx::query_scalar("SELECT target FROM domain_links WHERE source = ? ORDER BY target")
                .bind(source_domain)
                .fetch_all(&self.pool)
                .await?;
        Ok(targets.into_iter().collect())
    }
}

fn page_key(page: u64) -> Result<i64> {
    i64::try_from(page).with_context(|| format!("page index {} out of range", page))
}

#[async_trait]
impl BatchStore for SqliteStore {
    async fn fetch(&self, status: BatchStatus, max_count: usize) -> Result<Vec<StoredBatch>> {
        let rows = sqlx::query(
            r#"
            SELECT id, created_at, batch_json FROM batches
            WHERE status = ?
            ORDER BY created_at ASC, seq ASC
            LIMIT ?
            "#,
        )
        .bind(status.code())
        .bind(max_count as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                let batch_json: String = row.get("batch_json");
                let batch = serde_json::from_str(&batch_json)
                    .with_context(|| format!("corrupt batch {}", id))?;
                Ok(StoredBatch {
                    id,
                    created_at: row.get("created_at"),
                    batch,
                })
            })
            .collect()
    }

    async fn mark(&self, batch_ids: &[String], status: BatchStatus) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for id in batch_ids {
            sqlx::query("UPDATE batches SET status = ? WHERE id = ?")
                .bind(status.code())
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl UrlDatabase for SqliteStore {
    async fn update_found_urls(&self, found_urls: &[FoundUrl]) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let mut new_urls = Vec::new();

        for found in found_urls {
            let existing: Option<i64> = sqlx::query_scalar("SELECT status FROM urls WHERE url = ?")
                .bind(&found.url)
                .fetch_optional(&mut *tx)
                .await?;

            let replace = existing
                .and_then(UrlStatus::from_code)
                .map_or(true, |status| should_replace_url(status, found.status));
            if existing.is_none() {
                new_urls.push(found.url.clone());
            }
            if !replace {
                continue;
            }

            sqlx::query(
                r#"
                INSERT INTO urls (url, user_id_hash, status, updated)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(url) DO UPDATE SET
                    user_id_hash = excluded.user_id_hash,
                    status = excluded.status,
                    updated = excluded.updated
                "#,
            )
            .bind(&found.url)
            .bind(&found.user_id_hash)
            .bind(found.status.code())
            .bind(found.timestamp.timestamp_millis())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(new_urls)
    }
}

#[async_trait]
impl DomainLinkDatabase for SqliteStore {
    async fn merge_links(&self, source_domain: &str, target_domains: &BTreeSet<String>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for target in target_domains {
            sqlx::query("INSERT OR IGNORE INTO domain_links (source, target) VALUES (?, ?)")
                .bind(source_domain)
                .bind(target)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl WorkQueue for SqliteStore {
    async fn push(&self, urls: Vec<String>) -> Result<()> {
        sqlx::query("INSERT INTO url_queue (urls_json, pushed_at) VALUES (?, ?)")
            .bind(serde_json::to_string(&urls)?)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PageStore for SqliteStore {
    fn page_index_for(&self, term: &str) -> u64 {
        page_index(term, self.num_pages)
    }

    async fn read_page(&self, page: u64) -> Result<Vec<Document>> {
        let mut conn = self.pool.acquire().await?;
        load_page(&mut *conn, page_key(page)?).await
    }

    async fn write_page(&self, page: u64, documents: &[Document]) -> Result<()> {
        let key = page_key(page)?;
        let mut tx = self.pool.begin().await?;
        store_page(&mut *tx, key, documents).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn replace_page(&self, page: u64, edit: PageEdit) -> Result<Vec<Document>> {
        let key = page_key(page)?;
        let mut conn = self.pool.acquire().await?;

        // IMMEDIATE takes the write lock before the read, so replacements
        // from other connections or processes wait on the busy timeout.
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        let replaced = async {
            let raw = load_page(&mut *conn, key).await?;
            let previous = self.resolve_terms(raw, page).await?;
            store_page(&mut *conn, key, &edit(previous.clone())).await?;
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            Ok::<_, anyhow::Error>(previous)
        }
        .await;

        if replaced.is_err() {
            if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                warn!(page, error = %e, "failed to roll back page replacement");
            }
        }
        replaced
    }
}

async fn load_page(conn: &mut SqliteConnection, key: i64) -> Result<Vec<Document>> {
    let rows = sqlx::query(
        r#"
        SELECT term, title, url, extract, score, state
        FROM index_documents
        WHERE page = ?
        ORDER BY position ASC
        "#,
    )
    .bind(key)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let state: Option<i64> = row.get("state");
            Document {
                term: row.get("term"),
                title: row.get("title"),
                url: row.get("url"),
                extract: row.get("extract"),
                score: row.get("score"),
                state: state.and_then(DocumentState::from_code),
            }
        })
        .collect())
}

async fn store_page(conn: &mut SqliteConnection, key: i64, documents: &[Document]) -> Result<()> {
    sqlx::query("DELETE FROM index_documents WHERE page = ?")
        .bind(key)
        .execute(&mut *conn)
        .await?;

    for (position, doc) in documents.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO index_documents (page, position, term, title, url, extract, score, state)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(key)
        .bind(position as i64)
        .bind(&doc.term)
        .bind(&doc.title)
        .bind(&doc.url)
        .bind(&doc.extract)
        .bind(doc.score)
        .bind(doc.state.map(DocumentState::code))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl CurationLog for SqliteStore {
    async fn append(&self, request: &CurationRequest, acting_user: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO curations (acting_user, timestamp, url, results_json, curation_type, curation_json, received_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(acting_user)
        .bind(request.timestamp)
        .bind(&request.url)
        .bind(serde_json::to_string(&request.results)?)
        .bind(request.curation_type.as_str())
        .bind(request.curation.to_string())
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
