//! Core data models shared by reconciliation and curation.
//!
//! Crawl batches arrive as JSON from crawling clients, so the batch-side
//! types derive `Deserialize` with lenient defaults. Status and state enums
//! carry stable integer codes that the persistence layer stores directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One crawl session's output, as uploaded by a crawling client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Opaque crawler identity.
    pub user_id_hash: String,
    /// Upload time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
    pub items: Vec<CrawlItem>,
}

/// A single fetched (or failed) URL within a [`Batch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlItem {
    pub url: String,
    /// Crawler-reported fetch outcome (`"ok"`, `"bad_status"`, `"timeout"`, ...).
    #[serde(default)]
    pub status: Option<String>,
    /// Observation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Absent when the fetch failed.
    #[serde(default)]
    pub content: Option<ItemContent>,
    #[serde(default)]
    pub error: Option<ItemError>,
}

/// Extracted content of a successfully fetched page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ItemContent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub extract: String,
    #[serde(default)]
    pub links: Vec<String>,
    /// Secondary link source, e.g. links found in the rendered page.
    #[serde(default)]
    pub extra_links: Option<Vec<String>>,
}

/// Error details reported for a failed fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemError {
    pub name: String,
    #[serde(default)]
    pub message: String,
}

/// A batch as held by the batch store.
#[derive(Debug, Clone)]
pub struct StoredBatch {
    pub id: String,
    /// Unix seconds at which the batch entered the store.
    pub created_at: i64,
    pub batch: Batch,
}

/// Lifecycle of a batch in the batch store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchStatus {
    /// Known to exist remotely, not yet downloaded.
    Remote,
    /// Available locally and ready to reconcile.
    Local,
    /// URLs and domain links have been recorded.
    UrlsUpdated,
    /// Documents have been indexed.
    Indexed,
}

impl BatchStatus {
    pub fn code(self) -> i64 {
        match self {
            BatchStatus::Remote => 0,
            BatchStatus::Local => 1,
            BatchStatus::UrlsUpdated => 2,
            BatchStatus::Indexed => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(BatchStatus::Remote),
            1 => Some(BatchStatus::Local),
            2 => Some(BatchStatus::UrlsUpdated),
            3 => Some(BatchStatus::Indexed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Remote => "remote",
            BatchStatus::Local => "local",
            BatchStatus::UrlsUpdated => "urls_updated",
            BatchStatus::Indexed => "indexed",
        }
    }
}

/// Crawl state of a URL.
///
/// `New` is the default for URLs discovered only as link targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UrlStatus {
    #[default]
    New,
    ErrorTimeout,
    Error404,
    ErrorOther,
    ErrorRobotsDenied,
    ErrorRecordTooLong,
    Crawled,
}

impl UrlStatus {
    pub fn code(self) -> i64 {
        match self {
            UrlStatus::New => 0,
            UrlStatus::ErrorTimeout => 20,
            UrlStatus::Error404 => 30,
            UrlStatus::ErrorOther => 40,
            UrlStatus::ErrorRobotsDenied => 50,
            UrlStatus::ErrorRecordTooLong => 60,
            UrlStatus::Crawled => 100,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(UrlStatus::New),
            20 => Some(UrlStatus::ErrorTimeout),
            30 => Some(UrlStatus::Error404),
            40 => Some(UrlStatus::ErrorOther),
            50 => Some(UrlStatus::ErrorRobotsDenied),
            60 => Some(UrlStatus::ErrorRecordTooLong),
            100 => Some(UrlStatus::Crawled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UrlStatus::New => "new",
            UrlStatus::ErrorTimeout => "error_timeout",
            UrlStatus::Error404 => "error_404",
            UrlStatus::ErrorOther => "error_other",
            UrlStatus::ErrorRobotsDenied => "error_robots_denied",
            UrlStatus::ErrorRecordTooLong => "error_record_too_long",
            UrlStatus::Crawled => "crawled",
        }
    }
}

/// Canonical deduplicated record of one URL's latest known state.
#[derive(Debug, Clone, PartialEq)]
pub struct FoundUrl {
    pub url: String,
    /// Last crawler to report on this URL.
    pub user_id_hash: String,
    pub status: UrlStatus,
    pub timestamp: DateTime<Utc>,
}

/// Provenance and approval state of an index document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentState {
    FromUser,
    FromGoogle,
    OrganicApproved,
    FromUserApproved,
    FromGoogleApproved,
}

impl DocumentState {
    pub fn code(self) -> i64 {
        match self {
            DocumentState::FromUser => 2,
            DocumentState::FromGoogle => 3,
            DocumentState::OrganicApproved => 7,
            DocumentState::FromUserApproved => 8,
            DocumentState::FromGoogleApproved => 9,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            2 => Some(DocumentState::FromUser),
            3 => Some(DocumentState::FromGoogle),
            7 => Some(DocumentState::OrganicApproved),
            8 => Some(DocumentState::FromUserApproved),
            9 => Some(DocumentState::FromGoogleApproved),
            _ => None,
        }
    }
}

/// A term-indexed entry in the page store.
///
/// Documents on one page may belong to different terms. A `None` term marks
/// a compacted record whose owning term must be resolved against the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub term: Option<String>,
    pub title: String,
    pub url: String,
    pub extract: String,
    pub score: f64,
    pub state: Option<DocumentState>,
}

/// Kind of user action that produced a curation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurationType {
    Begin,
    Move,
    Delete,
    Add,
    Validate,
}

impl CurationType {
    pub fn as_str(self) -> &'static str {
        match self {
            CurationType::Begin => "begin",
            CurationType::Move => "move",
            CurationType::Delete => "delete",
            CurationType::Add => "add",
            CurationType::Validate => "validate",
        }
    }
}

/// One proposed result in a curation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurationResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub extract: String,
    #[serde(default)]
    pub validated: bool,
    #[serde(default)]
    pub source: String,
}

/// A user-submitted edit of the results for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurationRequest {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Full query URL; the search term is derived from its single parameter.
    pub url: String,
    pub results: Vec<CurationResult>,
    pub curation_type: CurationType,
    /// The action-specific payload, kept verbatim for audit.
    #[serde(default)]
    pub curation: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_status_codes_roundtrip_and_default() {
        assert_eq!(UrlStatus::default(), UrlStatus::New);
        for status in [
            UrlStatus::New,
            UrlStatus::ErrorTimeout,
            UrlStatus::Error404,
            UrlStatus::ErrorOther,
            UrlStatus::ErrorRobotsDenied,
            UrlStatus::ErrorRecordTooLong,
            UrlStatus::Crawled,
        ] {
            assert_eq!(UrlStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(UrlStatus::from_code(7), None);
    }

    #[test]
    fn test_batch_deserializes_with_missing_optionals() {
        let json = r#"{
            "user_id_hash": "abc",
            "items": [
                {"url": "http://a.example/", "timestamp": 1000,
                 "content": {"title": "A", "links": ["http://b.example/"]}},
                {"url": "http://c.example/", "timestamp": 2000, "status": "timeout"}
            ]
        }"#;
        let batch: Batch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.items.len(), 2);
        let content = batch.items[0].content.as_ref().unwrap();
        assert_eq!(content.links, vec!["http://b.example/".to_string()]);
        assert!(content.extra_links.is_none());
        assert!(batch.items[1].content.is_none());
        assert_eq!(batch.items[1].status.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_curation_request_parses_lowercase_type() {
        let json = r#"{
            "timestamp": 1700000000000,
            "url": "https://search.example/?q=cat",
            "results": [{"title": "Cats", "url": "https://cats.example/", "validated": true, "source": "user"}],
            "curation_type": "move",
            "curation": {"old_index": 2, "new_index": 0}
        }"#;
        let req: CurationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.curation_type, CurationType::Move);
        assert_eq!(req.results[0].extract, "");
        assert_eq!(req.curation["new_index"], 0);
    }
}
