//! Collaborator contracts for reconciliation and curation.
//!
//! Every external system the core talks to is behind one of these traits:
//! the batch store, the blacklist source, the URL database, the domain-link
//! database, the outbound work queue, the term-index page store and the
//! curation audit log. [`memory`] provides in-memory implementations; the
//! `crowdcrawl` application provides SQLite-backed ones.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Operations
//!
//! | Trait | Method | Purpose |
//! |-------|--------|---------|
//! | [`BatchStore`] | [`fetch`](BatchStore::fetch) | Up to `max_count` batches in a status |
//! | [`BatchStore`] | [`mark`](BatchStore::mark) | Move batches to a new status |
//! | [`BlacklistSource`] | [`current_blacklist`](BlacklistSource::current_blacklist) | Excluded domains |
//! | [`UrlDatabase`] | [`update_found_urls`](UrlDatabase::update_found_urls) | Atomic upsert-and-diff |
//! | [`DomainLinkDatabase`] | [`merge_links`](DomainLinkDatabase::merge_links) | Merge one source's edges |
//! | [`WorkQueue`] | [`push`](WorkQueue::push) | Hand new URLs downstream |
//! | [`PageStore`] | [`read_page`](PageStore::read_page) / [`write_page`](PageStore::write_page) | Page-granular term index |
//! | [`PageStore`] | [`replace_page`](PageStore::replace_page) | Exclusive read-modify-write of one page |
//! | [`CurationLog`] | [`append`](CurationLog::append) | Archive a curation verbatim |

pub mod memory;

use std::collections::{BTreeSet, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::models::{BatchStatus, CurationRequest, Document, FoundUrl, StoredBatch, UrlStatus};
use crate::tokenize::tokenize;

/// Source of crawl batches awaiting reconciliation.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Fetch up to `max_count` batches currently in `status`.
    ///
    /// Batches are returned in arrival order (oldest first) so repeated
    /// cycles over the same backlog fold observations in the same order.
    async fn fetch(&self, status: BatchStatus, max_count: usize) -> Result<Vec<StoredBatch>>;

    /// Transition the given batches to `status`.
    async fn mark(&self, batch_ids: &[String], status: BatchStatus) -> Result<()>;
}

/// Source of the domain blacklist, queried once per reconciliation cycle.
#[async_trait]
pub trait BlacklistSource: Send + Sync {
    async fn current_blacklist(&self) -> Result<HashSet<String>>;
}

/// Durable URL state table driving the crawl frontier.
#[async_trait]
pub trait UrlDatabase: Send + Sync {
    /// Upsert `found_urls` and return the URLs that were not previously known.
    ///
    /// Must be atomic: either every record is applied or none is.
    async fn update_found_urls(&self, found_urls: &[FoundUrl]) -> Result<Vec<String>>;
}

/// Durable domain-level link graph.
#[async_trait]
pub trait DomainLinkDatabase: Send + Sync {
    /// Merge the edges `source_domain -> target` for every target.
    async fn merge_links(&self, source_domain: &str, target_domains: &BTreeSet<String>) -> Result<()>;
}

/// Outbound queue of newly discovered URLs for crawl scheduling.
///
/// Each push is delivered at least once, FIFO relative to other pushes.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn push(&self, urls: Vec<String>) -> Result<()>;
}

/// Rewrites a page: receives its current (term-resolved) documents and
/// returns the documents that replace them.
pub type PageEdit = Box<dyn FnOnce(Vec<Document>) -> Vec<Document> + Send>;

/// Page-addressed term index.
///
/// A page is the atomic unit of read and replace and may hold documents
/// for several terms whose keys collide.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// The page that holds documents for `term`.
    fn page_index_for(&self, term: &str) -> u64;

    /// Raw documents stored at `page`, possibly with compacted (term-less) records.
    async fn read_page(&self, page: u64) -> Result<Vec<Document>>;

    /// Fill in the owning term of compacted records read from `page`.
    ///
    /// The default recovers a term from each record's title and extract:
    /// the first unigram, then bigram, that addresses the same page.
    async fn resolve_terms(&self, documents: Vec<Document>, page: u64) -> Result<Vec<Document>> {
        Ok(documents
            .into_iter()
            .map(|doc| resolve_term(doc, page, |term| self.page_index_for(term)))
            .collect())
    }

    /// Replace the entire contents of `page` with `documents`.
    async fn write_page(&self, page: u64, documents: &[Document]) -> Result<()>;

    /// Read `page`, resolve its terms, apply `edit` and write the result,
    /// excluding every other writer of the same page for the whole sequence.
    ///
    /// Returns the resolved documents the page held before the edit.
    async fn replace_page(&self, page: u64, edit: PageEdit) -> Result<Vec<Document>>;
}

/// Append-only audit log of curation requests.
#[async_trait]
pub trait CurationLog: Send + Sync {
    async fn append(&self, request: &CurationRequest, acting_user: &str) -> Result<()>;
}

/// Upsert rule shared by URL database implementations: a link-only
/// rediscovery (`New`) never demotes a URL that has already been crawled or
/// errored; every other observation replaces the stored record.
pub fn should_replace_url(existing: UrlStatus, incoming: UrlStatus) -> bool {
    incoming != UrlStatus::New || existing == UrlStatus::New
}

/// Hash-address `term` onto one of `num_pages` pages.
///
/// Uses the first 8 bytes of the SHA-256 digest, big-endian.
pub fn page_index(term: &str, num_pages: u64) -> u64 {
    let digest = Sha256::digest(term.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix) % num_pages.max(1)
}

fn resolve_term(mut doc: Document, page: u64, page_of: impl Fn(&str) -> u64) -> Document {
    if doc.term.is_some() {
        return doc;
    }
    let tokens = tokenize(&format!("{} {}", doc.title, doc.extract));
    let bigrams = tokens.windows(2).map(|pair| pair.join(" "));
    doc.term = tokens
        .iter()
        .cloned()
        .chain(bigrams)
        .find(|candidate| page_of(candidate) == page);
    doc
}
