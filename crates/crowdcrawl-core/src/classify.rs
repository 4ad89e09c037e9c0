//! Status classification for failed fetches.

use crate::models::{CrawlItem, UrlStatus};

/// Maps a crawl item without content to the error status it represents.
pub trait ErrorClassifier: Send + Sync {
    fn classify_failed_item(&self, item: &CrawlItem) -> UrlStatus;
}

/// Classifies from the crawler-reported status string and error details.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusClassifier;

impl ErrorClassifier for StatusClassifier {
    fn classify_failed_item(&self, item: &CrawlItem) -> UrlStatus {
        let status = item.status.as_deref().unwrap_or("");
        let (name, message) = item
            .error
            .as_ref()
            .map(|e| (e.name.as_str(), e.message.as_str()))
            .unwrap_or(("", ""));

        if name == "RobotsDenied" || status == "robots_denied" {
            UrlStatus::ErrorRobotsDenied
        } else if name == "RecordTooLong" || status == "record_too_long" {
            UrlStatus::ErrorRecordTooLong
        } else if status == "timeout" || name.contains("Timeout") {
            UrlStatus::ErrorTimeout
        } else if status == "bad_status" && message.contains("404") {
            UrlStatus::Error404
        } else {
            UrlStatus::ErrorOther
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemError;

    fn failed(status: Option<&str>, error: Option<(&str, &str)>) -> CrawlItem {
        CrawlItem {
            url: "http://a.example/".into(),
            status: status.map(String::from),
            timestamp: 0,
            content: None,
            error: error.map(|(name, message)| ItemError {
                name: name.into(),
                message: message.into(),
            }),
        }
    }

    #[test]
    fn test_classify_variants() {
        let c = StatusClassifier;
        assert_eq!(
            c.classify_failed_item(&failed(Some("bad_status"), Some(("HTTPError", "404 Not Found")))),
            UrlStatus::Error404
        );
        assert_eq!(
            c.classify_failed_item(&failed(Some("bad_status"), Some(("HTTPError", "500")))),
            UrlStatus::ErrorOther
        );
        assert_eq!(c.classify_failed_item(&failed(Some("timeout"), None)), UrlStatus::ErrorTimeout);
        assert_eq!(
            c.classify_failed_item(&failed(None, Some(("ReadTimeout", "")))),
            UrlStatus::ErrorTimeout
        );
        assert_eq!(
            c.classify_failed_item(&failed(None, Some(("RobotsDenied", "")))),
            UrlStatus::ErrorRobotsDenied
        );
        assert_eq!(
            c.classify_failed_item(&failed(Some("record_too_long"), None)),
            UrlStatus::ErrorRecordTooLong
        );
        assert_eq!(c.classify_failed_item(&failed(None, None)), UrlStatus::ErrorOther);
    }
}
