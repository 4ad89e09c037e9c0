//! Batch-to-state reconciliation.
//!
//! Folds a collection of crawl batches into a deduplicated set of
//! [`FoundUrl`] records and a domain link graph, then writes both through
//! to their databases and pushes genuinely new URLs onto the work queue.
//!
//! # Algorithm
//!
//! 1. Fetch the blacklist once for the whole cycle.
//! 2. For each item of each batch, in processing order: stamp the item's URL
//!    with the batch user and item timestamp, and set its status (`Crawled`
//!    when content is present, otherwise the classified error). Later
//!    observations overwrite earlier ones.
//! 3. For crawled items, resolve the page's domain and run every entry of
//!    `links`, then `extra_links`, through [`CycleContext::process_link`].
//!    A page whose own URL has no resolvable domain keeps its status but
//!    contributes no links.
//! 4. Emit one record per stamped or statused URL, defaulting to `New`.
//! 5. Persist: one atomic upsert-and-diff into the URL database (the new
//!    URLs go to the queue as a single push), then one merge per source
//!    domain into the domain-link database.
//!
//! The fold is pure, so re-running a cycle over the same batches reproduces
//! the same records and edges. The two persistence steps are independent;
//! a crash between them is repaired by re-running the cycle.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::blacklist::Blacklist;
use crate::classify::{ErrorClassifier, StatusClassifier};
use crate::links::{domain_of, CycleContext};
use crate::models::{Batch, FoundUrl, UrlStatus};
use crate::store::{BlacklistSource, DomainLinkDatabase, UrlDatabase, WorkQueue};

/// In-memory result of folding one cycle's batches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// One record per URL, sorted by URL.
    pub found_urls: Vec<FoundUrl>,
    /// Source domain to the set of domains it links to.
    pub domain_links: BTreeMap<String, BTreeSet<String>>,
}

/// Counters reported after a reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub batches: usize,
    pub found_urls: usize,
    pub new_urls: usize,
    pub source_domains: usize,
    pub blacklist_size: usize,
}

impl ReconcileSummary {
    /// Counters for a cycle that folded `batches` into `outcome` and found
    /// `new_urls` URLs unknown to the URL database.
    pub fn new(batches: usize, outcome: &ReconcileOutcome, new_urls: usize, blacklist: &Blacklist) -> Self {
        Self {
            batches,
            found_urls: outcome.found_urls.len(),
            new_urls,
            source_domains: outcome.domain_links.len(),
            blacklist_size: blacklist.len(),
        }
    }
}

/// Fold `batches` into URL records and domain edges.
pub fn fold_batches<'b, I>(
    batches: I,
    blacklist: &Blacklist,
    classifier: &dyn ErrorClassifier,
) -> ReconcileOutcome
where
    I: IntoIterator<Item = &'b Batch>,
{
    let mut ctx = CycleContext::new(blacklist);

    for batch in batches {
        let user = batch.user_id_hash.as_str();
        for item in &batch.items {
            let Some(timestamp) = DateTime::<Utc>::from_timestamp_millis(item.timestamp) else {
                warn!(url = %item.url, timestamp = item.timestamp, "skipping item with out-of-range timestamp");
                continue;
            };
            ctx.observe(&item.url, user, timestamp);

            let Some(content) = &item.content else {
                ctx.set_status(&item.url, classifier.classify_failed_item(item));
                continue;
            };
            ctx.set_status(&item.url, UrlStatus::Crawled);

            let crawled_page_domain = match domain_of(&item.url) {
                Ok(domain) => domain,
                Err(e) => {
                    info!(url = %item.url, error = %e, "couldn't parse URL");
                    continue;
                }
            };

            let extra_links = content.extra_links.iter().flatten();
            for link in content.links.iter().chain(extra_links) {
                ctx.process_link(user, &crawled_page_domain, link, timestamp);
            }
        }
    }

    ctx.into_outcome()
}

/// Reconciliation entry point: blacklist, databases, and status classifier.
#[derive(Clone)]
pub struct Reconciler {
    blacklist_source: Arc<dyn BlacklistSource>,
    url_db: Arc<dyn UrlDatabase>,
    link_db: Arc<dyn DomainLinkDatabase>,
    classifier: Arc<dyn ErrorClassifier>,
}

impl Reconciler {
    pub fn new(
        blacklist_source: Arc<dyn BlacklistSource>,
        url_db: Arc<dyn UrlDatabase>,
        link_db: Arc<dyn DomainLinkDatabase>,
    ) -> Self {
        Self {
            blacklist_source,
            url_db,
            link_db,
            classifier: Arc::new(StatusClassifier),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Take this cycle's blacklist snapshot.
    pub async fn fetch_blacklist(&self) -> Result<Blacklist> {
        let start = Instant::now();
        let domains = self
            .blacklist_source
            .current_blacklist()
            .await
            .context("failed to fetch blacklist")?;
        let blacklist = Blacklist::new(domains);
        info!(
            domains = blacklist.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "fetched blacklist"
        );
        Ok(blacklist)
    }

    pub fn fold(&self, batches: &[Batch], blacklist: &Blacklist) -> ReconcileOutcome {
        let outcome = fold_batches(batches, blacklist, self.classifier.as_ref());
        info!(
            batches = batches.len(),
            found_urls = outcome.found_urls.len(),
            source_domains = outcome.domain_links.len(),
            "folded batches"
        );
        outcome
    }

    /// Write `outcome` through to the URL and domain-link databases.
    ///
    /// Returns the number of URLs that were new to the URL database; those
    /// URLs are pushed onto `queue` as one unit.
    pub async fn persist(&self, outcome: &ReconcileOutcome, queue: &dyn WorkQueue) -> Result<usize> {
        let new_urls = self
            .url_db
            .update_found_urls(&outcome.found_urls)
            .await
            .context("failed to update found URLs")?;
        let new_count = new_urls.len();
        if !new_urls.is_empty() {
            queue
                .push(new_urls)
                .await
                .context("failed to push new URLs onto the work queue")?;
        }
        info!(new_urls = new_count, "put new items in the URL queue");

        for (source_domain, target_domains) in &outcome.domain_links {
            self.link_db
                .merge_links(source_domain, target_domains)
                .await
                .with_context(|| format!("failed to merge domain links for {}", source_domain))?;
        }
        Ok(new_count)
    }

    /// Run a full reconciliation cycle over `batches`.
    pub async fn record_urls(&self, batches: &[Batch], queue: &dyn WorkQueue) -> Result<ReconcileSummary> {
        let blacklist = self.fetch_blacklist().await?;
        info!(
            batches = batches.len(),
            blacklist_domains = blacklist.len(),
            "recording URLs in database"
        );
        let outcome = self.fold(batches, &blacklist);
        let new_urls = self.persist(&outcome, queue).await?;
        Ok(ReconcileSummary::new(batches.len(), &outcome, new_urls, &blacklist))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CrawlItem, ItemContent};
    use crate::store::memory::{InMemoryDomainLinks, InMemoryQueue, InMemoryUrlDatabase, StaticBlacklist};

    const T0: i64 = 1_700_000_000_000;

    fn crawled(url: &str, timestamp: i64, links: &[&str], extra: Option<&[&str]>) -> CrawlItem {
        CrawlItem {
            url: url.into(),
            status: Some("ok".into()),
            timestamp,
            content: Some(ItemContent {
                title: String::new(),
                extract: String::new(),
                links: links.iter().map(|l| l.to_string()).collect(),
                extra_links: extra.map(|e| e.iter().map(|l| l.to_string()).collect()),
            }),
            error: None,
        }
    }

    fn failed(url: &str, timestamp: i64, status: &str) -> CrawlItem {
        CrawlItem {
            url: url.into(),
            status: Some(status.into()),
            timestamp,
            content: None,
            error: None,
        }
    }

    fn batch(user: &str, items: Vec<CrawlItem>) -> Batch {
        Batch {
            user_id_hash: user.into(),
            timestamp: T0,
            items,
        }
    }

    fn status_of(outcome: &ReconcileOutcome, url: &str) -> Option<UrlStatus> {
        outcome.found_urls.iter().find(|f| f.url == url).map(|f| f.status)
    }

    #[test]
    fn test_frontier_expansion() {
        let batches = vec![batch(
            "u1",
            vec![crawled("http://a.example/", T0, &["http://b.example/x/y"], None)],
        )];
        let outcome = fold_batches(&batches, &Blacklist::default(), &StatusClassifier);

        assert_eq!(status_of(&outcome, "http://a.example/"), Some(UrlStatus::Crawled));
        assert_eq!(status_of(&outcome, "http://b.example/x/y"), Some(UrlStatus::New));
        assert_eq!(status_of(&outcome, "http://b.example/"), Some(UrlStatus::New));
        assert_eq!(
            outcome.domain_links.get("a.example"),
            Some(&BTreeSet::from(["b.example".to_string()]))
        );
    }

    #[test]
    fn test_blacklist_exclusion() {
        let batches = vec![batch(
            "u1",
            vec![crawled("http://a.example/", T0, &["http://spam.example/page"], None)],
        )];
        let blacklist = Blacklist::new(["spam.example"]);
        let outcome = fold_batches(&batches, &blacklist, &StatusClassifier);

        assert_eq!(outcome.found_urls.len(), 1);
        assert_eq!(status_of(&outcome, "http://spam.example/page"), None);
        assert_eq!(status_of(&outcome, "http://spam.example/"), None);
        assert!(outcome.domain_links.is_empty());
    }

    #[test]
    fn test_later_crawl_overrides_link_discovery() {
        let batches = vec![
            batch("u1", vec![crawled("http://a.example/", T0, &["http://b.example/"], None)]),
            batch("u2", vec![crawled("http://b.example/", T0 + 5, &[], None)]),
        ];
        let outcome = fold_batches(&batches, &Blacklist::default(), &StatusClassifier);
        let b = outcome.found_urls.iter().find(|f| f.url == "http://b.example/").unwrap();
        assert_eq!(b.status, UrlStatus::Crawled);
        assert_eq!(b.user_id_hash, "u2");
        assert_eq!(b.timestamp.timestamp_millis(), T0 + 5);
    }

    #[test]
    fn test_last_write_wins_by_processing_order_not_timestamp() {
        // The second observation is older but processed later, so it wins.
        let batches = vec![
            batch("u1", vec![crawled("http://a.example/", T0 + 100, &[], None)]),
            batch("u2", vec![failed("http://a.example/", T0, "timeout")]),
        ];
        let outcome = fold_batches(&batches, &Blacklist::default(), &StatusClassifier);
        assert_eq!(status_of(&outcome, "http://a.example/"), Some(UrlStatus::ErrorTimeout));
        assert_eq!(outcome.found_urls[0].user_id_hash, "u2");
    }

    #[test]
    fn test_extra_links_are_processed() {
        let batches = vec![batch(
            "u1",
            vec![crawled(
                "http://a.example/",
                T0,
                &["http://b.example/"],
                Some(&["http://c.example/page"]),
            )],
        )];
        let outcome = fold_batches(&batches, &Blacklist::default(), &StatusClassifier);
        assert_eq!(status_of(&outcome, "http://c.example/page"), Some(UrlStatus::New));
        assert_eq!(outcome.domain_links["a.example"].len(), 2);
    }

    #[test]
    fn test_unparseable_page_url_keeps_status_but_skips_links() {
        let batches = vec![batch(
            "u1",
            vec![crawled("not a url", T0, &["http://b.example/"], None)],
        )];
        let outcome = fold_batches(&batches, &Blacklist::default(), &StatusClassifier);
        assert_eq!(outcome.found_urls.len(), 1);
        assert_eq!(status_of(&outcome, "not a url"), Some(UrlStatus::Crawled));
        assert!(outcome.domain_links.is_empty());
    }

    #[test]
    fn test_out_of_range_timestamp_skips_item() {
        let batches = vec![batch(
            "u1",
            vec![
                crawled("http://a.example/", i64::MAX, &["http://b.example/"], None),
                failed("http://c.example/", T0, "bad_status"),
            ],
        )];
        let outcome = fold_batches(&batches, &Blacklist::default(), &StatusClassifier);
        assert_eq!(outcome.found_urls.len(), 1);
        assert_eq!(status_of(&outcome, "http://c.example/"), Some(UrlStatus::ErrorOther));
    }

    #[test]
    fn test_fold_is_idempotent() {
        let batches = vec![
            batch("u1", vec![crawled("http://a.example/", T0, &["http://b.example/x"], None)]),
            batch("u2", vec![failed("http://d.example/", T0, "timeout")]),
        ];
        let first = fold_batches(&batches, &Blacklist::default(), &StatusClassifier);
        let second = fold_batches(&batches, &Blacklist::default(), &StatusClassifier);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_record_urls_persists_and_queues_new_urls() {
        let url_db = Arc::new(InMemoryUrlDatabase::new());
        let link_db = Arc::new(InMemoryDomainLinks::new());
        let queue = InMemoryQueue::new();
        let reconciler = Reconciler::new(
            Arc::new(StaticBlacklist::new(["spam.example"])),
            url_db.clone(),
            link_db.clone(),
        );
        let batches = vec![batch(
            "u1",
            vec![crawled(
                "http://a.example/",
                T0,
                &["http://b.example/x/y", "http://spam.example/page"],
                None,
            )],
        )];

        let summary = reconciler.record_urls(&batches, &queue).await.unwrap();
        assert_eq!(summary.found_urls, 3);
        assert_eq!(summary.new_urls, 3);
        assert_eq!(summary.blacklist_size, 1);
        let mut pushed = queue.pop().await.unwrap();
        pushed.sort();
        assert_eq!(
            pushed,
            vec!["http://a.example/", "http://b.example/", "http://b.example/x/y"]
        );
        assert_eq!(
            link_db.targets("a.example").await,
            BTreeSet::from(["b.example".to_string()])
        );

        // Re-running the same cycle finds nothing new and adds no edges.
        let again = reconciler.record_urls(&batches, &queue).await.unwrap();
        assert_eq!(again.new_urls, 0);
        assert_eq!(queue.len().await, 0);
        assert_eq!(url_db.len().await, 3);
        assert_eq!(link_db.edge_count().await, 1);
    }
}
