//! Per-cycle accumulators and discovered-link processing.
//!
//! A [`CycleContext`] is created for each reconciliation cycle and threaded
//! through every item and link of every batch. It owns the four
//! accumulators (explicit statuses, last user, last timestamp, domain
//! edges) and borrows the cycle's blacklist snapshot. Nothing here touches
//! persistent state.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tracing::debug;
use url::{ParseError, Url};

use crate::blacklist::Blacklist;
use crate::models::{FoundUrl, UrlStatus};
use crate::reconcile::ReconcileOutcome;

/// Network location of `url`: host plus a non-default port.
pub fn domain_of(url: &str) -> Result<String, ParseError> {
    let parsed = Url::parse(url)?;
    netloc(&parsed)
}

fn netloc(parsed: &Url) -> Result<String, ParseError> {
    let host = parsed.host_str().ok_or(ParseError::EmptyHost)?;
    Ok(match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

pub struct CycleContext<'a> {
    blacklist: &'a Blacklist,
    url_users: HashMap<String, String>,
    url_timestamps: HashMap<String, DateTime<Utc>>,
    url_statuses: HashMap<String, UrlStatus>,
    domain_links: BTreeMap<String, BTreeSet<String>>,
}

impl<'a> CycleContext<'a> {
    pub fn new(blacklist: &'a Blacklist) -> Self {
        Self {
            blacklist,
            url_users: HashMap::new(),
            url_timestamps: HashMap::new(),
            url_statuses: HashMap::new(),
            domain_links: BTreeMap::new(),
        }
    }

    /// Stamp `url` with the reporting user and observation time. Last write wins.
    pub fn observe(&mut self, url: &str, user_id_hash: &str, timestamp: DateTime<Utc>) {
        self.url_users.insert(url.to_string(), user_id_hash.to_string());
        self.url_timestamps.insert(url.to_string(), timestamp);
    }

    /// Assign an explicit status to `url`. Last write wins.
    pub fn set_status(&mut self, url: &str, status: UrlStatus) {
        self.url_statuses.insert(url.to_string(), status);
    }

    /// Register one link discovered on a page of `crawled_page_domain`.
    ///
    /// Unparseable links and links into blacklisted domains are dropped.
    /// Otherwise both the link and its domain root become crawl candidates
    /// and an edge `crawled_page_domain -> link domain` is recorded.
    pub fn process_link(
        &mut self,
        user_id_hash: &str,
        crawled_page_domain: &str,
        link: &str,
        timestamp: DateTime<Utc>,
    ) {
        let (scheme, target_domain) = match Url::parse(link).and_then(|parsed| {
            let domain = netloc(&parsed)?;
            Ok((parsed.scheme().to_string(), domain))
        }) {
            Ok(parts) => parts,
            Err(e) => {
                debug!(link, error = %e, "couldn't parse link");
                return;
            }
        };

        if self.blacklist.is_blacklisted(&target_domain) {
            debug!(link, domain = %target_domain, "excluding link for blacklisted domain");
            return;
        }

        self.observe(link, user_id_hash, timestamp);
        let root_url = format!("{}://{}/", scheme, target_domain);
        self.observe(&root_url, user_id_hash, timestamp);
        self.domain_links
            .entry(crawled_page_domain.to_string())
            .or_default()
            .insert(target_domain);
    }

    /// Close the cycle: every URL that was statused or stamped yields one
    /// record, with `New` for URLs that never received an explicit status.
    pub fn into_outcome(self) -> ReconcileOutcome {
        let Self {
            url_users,
            url_timestamps,
            url_statuses,
            domain_links,
            ..
        } = self;

        let mut urls: Vec<&String> = url_statuses.keys().chain(url_users.keys()).collect();
        urls.sort();
        urls.dedup();

        let found_urls = urls
            .into_iter()
            .filter_map(|url| {
                // Every statused URL is also stamped; the filter only guards the invariant.
                let user_id_hash = url_users.get(url)?.clone();
                let timestamp = *url_timestamps.get(url)?;
                let status = url_statuses.get(url).copied().unwrap_or(UrlStatus::New);
                Some(FoundUrl {
                    url: url.clone(),
                    user_id_hash,
                    status,
                    timestamp,
                })
            })
            .collect();

        ReconcileOutcome {
            found_urls,
            domain_links,
        }
    }
}
