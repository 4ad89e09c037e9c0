//! Blacklist sources backed by a local file or a remote list.
//!
//! Both formats are plain text with one domain per line. Blank lines and
//! lines starting with `#` are ignored, and entries are lower-cased.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crowdcrawl_core::store::memory::StaticBlacklist;
use crowdcrawl_core::store::BlacklistSource;

use crate::config::BlacklistConfig;

/// Parse a blacklist document into a set of domains.
pub fn parse_blacklist(text: &str) -> HashSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_lowercase)
        .collect()
}

/// Re-reads its file on every fetch so edits apply to the next cycle.
pub struct FileBlacklist {
    path: PathBuf,
}

impl FileBlacklist {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BlacklistSource for FileBlacklist {
    async fn current_blacklist(&self) -> Result<HashSet<String>> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read blacklist: {}", self.path.display()))?;
        Ok(parse_blacklist(&text))
    }
}

pub struct HttpBlacklist {
    url: String,
    client: reqwest::Client,
}

impl HttpBlacklist {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl BlacklistSource for HttpBlacklist {
    async fn current_blacklist(&self) -> Result<HashSet<String>> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch blacklist from {}", self.url))?;

        if !resp.status().is_success() {
            anyhow::bail!("Blacklist fetch from {} returned {}", self.url, resp.status());
        }

        let text = resp.text().await?;
        Ok(parse_blacklist(&text))
    }
}

/// Build the configured blacklist source. No source configured means an
/// empty blacklist.
pub fn from_config(config: &BlacklistConfig) -> Result<Arc<dyn BlacklistSource>> {
    Ok(match (&config.path, &config.url) {
        (Some(path), _) => Arc::new(FileBlacklist::new(path.clone())),
        (None, Some(url)) => Arc::new(HttpBlacklist::new(url.clone())?),
        (None, None) => Arc::new(StaticBlacklist::new(Vec::<String>::new())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_blacklist_skips_comments_and_blanks() {
        let set = parse_blacklist("# spam list\nSpam.Example\n\n  ads.example  \n#old.example\n");
        assert_eq!(set.len(), 2);
        assert!(set.contains("spam.example"));
        assert!(set.contains("ads.example"));
    }

    #[tokio::test]
    async fn test_file_blacklist_reads_current_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "spam.example").unwrap();
        let source = FileBlacklist::new(file.path());
        assert!(source.current_blacklist().await.unwrap().contains("spam.example"));

        writeln!(file, "ads.example").unwrap();
        assert_eq!(source.current_blacklist().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let source = FileBlacklist::new("/nonexistent/blacklist.txt");
        assert!(source.current_blacklist().await.is_err());
    }

    #[tokio::test]
    async fn test_unconfigured_source_is_empty() {
        let source = from_config(&BlacklistConfig::default()).unwrap();
        assert!(source.current_blacklist().await.unwrap().is_empty());
    }
}
