//! In-memory collaborator implementations for testing and embedding.
//!
//! Each type keeps its state behind a `tokio::sync` lock so it can be shared
//! across tasks. Semantics match the SQLite implementations in the
//! `crowdcrawl` application: arrival-ordered batches, upsert-and-diff URLs,
//! set-semantics domain edges, FIFO queue, full-replace pages.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::models::{Batch, BatchStatus, CurationRequest, Document, FoundUrl, StoredBatch};

use super::{
    page_index, should_replace_url, BatchStore, BlacklistSource, CurationLog, DomainLinkDatabase,
    PageEdit, PageStore, UrlDatabase, WorkQueue,
};

struct BatchEntry {
    stored: StoredBatch,
    status: BatchStatus,
}

/// Batch store holding batches in arrival order.
#[derive(Default)]
pub struct InMemoryBatchStore {
    entries: RwLock<Vec<BatchEntry>>,
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a batch in `status`, returning its generated id.
    pub async fn insert(&self, batch: Batch, status: BatchStatus) -> String {
        let mut entries = self.entries.write().await;
        let id = format!("batch-{:06}", entries.len() + 1);
        entries.push(BatchEntry {
            stored: StoredBatch {
                id: id.clone(),
                created_at: chrono::Utc::now().timestamp(),
                batch,
            },
            status,
        });
        id
    }

    pub async fn status_of(&self, id: &str) -> Option<BatchStatus> {
        let entries = self.entries.read().await;
        entries.iter().find(|e| e.stored.id == id).map(|e| e.status)
    }
}

#[async_trait]
impl BatchStore for InMemoryBatchStore {
    async fn fetch(&self, status: BatchStatus, max_count: usize) -> Result<Vec<StoredBatch>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.status == status)
            .take(max_count)
            .map(|e| e.stored.clone())
            .collect())
    }

    async fn mark(&self, batch_ids: &[String], status: BatchStatus) -> Result<()> {
        let mut entries = self.entries.write().await;
        for entry in entries.iter_mut() {
            if batch_ids.contains(&entry.stored.id) {
                entry.status = status;
            }
        }
        Ok(())
    }
}

/// Fixed blacklist, for tests and for deployments that configure domains inline.
#[derive(Debug, Clone, Default)]
pub struct StaticBlacklist {
    domains: HashSet<String>,
}

impl StaticBlacklist {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domains: domains.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl BlacklistSource for StaticBlacklist {
    async fn current_blacklist(&self) -> Result<HashSet<String>> {
        Ok(self.domains.clone())
    }
}

/// URL state table keyed by URL.
#[derive(Default)]
pub struct InMemoryUrlDatabase {
    urls: RwLock<HashMap<String, FoundUrl>>,
}

impl InMemoryUrlDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, url: &str) -> Option<FoundUrl> {
        self.urls.read().await.get(url).cloned()
    }

    pub async fn len(&self) -> usize {
        self.urls.read().await.len()
    }
}

#[async_trait]
impl UrlDatabase for InMemoryUrlDatabase {
    async fn update_found_urls(&self, found_urls: &[FoundUrl]) -> Result<Vec<String>> {
        let mut urls = self.urls.write().await;
        let mut new_urls = Vec::new();
        for found in found_urls {
            match urls.get(&found.url) {
                Some(existing) if !should_replace_url(existing.status, found.status) => {}
                Some(_) => {
                    urls.insert(found.url.clone(), found.clone());
                }
                None => {
                    new_urls.push(found.url.clone());
                    urls.insert(found.url.clone(), found.clone());
                }
            }
        }
        Ok(new_urls)
    }
}

/// Domain link graph with set semantics per source domain.
#[derive(Default)]
pub struct InMemoryDomainLinks {
    links: RwLock<BTreeMap<String, BTreeSet<String>>>,
}

impl InMemoryDomainLinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn targets(&self, source_domain: &str) -> BTreeSet<String> {
        self.links
            .read()
            .await
            .get(source_domain)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn edge_count(&self) -> usize {
        self.links.read().await.values().map(BTreeSet::len).sum()
    }
}

#[async_trait]
impl DomainLinkDatabase for InMemoryDomainLinks {
    async fn merge_links(&self, source_domain: &str, target_domains: &BTreeSet<String>) -> Result<()> {
        let mut links = self.links.write().await;
        links
            .entry(source_domain.to_string())
            .or_default()
            .extend(target_domains.iter().cloned());
        Ok(())
    }
}

/// FIFO queue of pushed URL sets.
#[derive(Default)]
pub struct InMemoryQueue {
    pushes: Mutex<VecDeque<Vec<String>>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return the oldest push.
    pub async fn pop(&self) -> Option<Vec<String>> {
        self.pushes.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.pushes.lock().await.len()
    }
}

#[async_trait]
impl WorkQueue for InMemoryQueue {
    async fn push(&self, urls: Vec<String>) -> Result<()> {
        self.pushes.lock().await.push_back(urls);
        Ok(())
    }
}

/// Term index with `num_pages` hash-addressed pages.
pub struct InMemoryPageStore {
    num_pages: u64,
    pages: RwLock<HashMap<u64, Vec<Document>>>,
}

impl InMemoryPageStore {
    pub fn new(num_pages: u64) -> Self {
        Self {
            num_pages,
            pages: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PageStore for InMemoryPageStore {
    fn page_index_for(&self, term: &str) -> u64 {
        page_index(term, self.num_pages)
    }

    async fn read_page(&self, page: u64) -> Result<Vec<Document>> {
        Ok(self.pages.read().await.get(&page).cloned().unwrap_or_default())
    }

    async fn write_page(&self, page: u64, documents: &[Document]) -> Result<()> {
        self.pages.write().await.insert(page, documents.to_vec());
        Ok(())
    }

    async fn replace_page(&self, page: u64, edit: PageEdit) -> Result<Vec<Document>> {
        let mut pages = self.pages.write().await;
        let raw = pages.get(&page).cloned().unwrap_or_default();
        let previous = self.resolve_terms(raw, page).await?;
        pages.insert(page, edit(previous.clone()));
        Ok(previous)
    }
}

/// Audit log entry: the request as submitted and who submitted it.
#[derive(Debug, Clone)]
pub struct LoggedCuration {
    pub request: CurationRequest,
    pub acting_user: String,
}

#[derive(Default)]
pub struct InMemoryCurationLog {
    entries: RwLock<Vec<LoggedCuration>>,
}

impl InMemoryCurationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<LoggedCuration> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl CurationLog for InMemoryCurationLog {
    async fn append(&self, request: &CurationRequest, acting_user: &str) -> Result<()> {
        self.entries.write().await.push(LoggedCuration {
            request: request.clone(),
            acting_user: acting_user.to_string(),
        });
        Ok(())
    }
}
