//! Curated-term merge into the shared page store.
//!
//! A curation replaces the documents of exactly one term on the page that
//! term hashes to. Other terms stored on the same page are left in place,
//! since a page is a physical slot shared by colliding keys.
//!
//! # Merge steps
//!
//! 1. Archive the request verbatim in the curation log.
//! 2. Extract the single query value from the request URL and normalize it
//!    into the curated term. Ambiguous queries are rejected here, before
//!    any page is read or written.
//! 3. Build one curated document per result, scored
//!    `MAX_CURATED_SCORE - position` so they rank above organic content in
//!    the order given.
//! 4. In one exclusive page replacement: read the page, resolve compacted
//!    records to their terms, drop the curated term's old documents, and
//!    write curated documents followed by the kept ones.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::models::{CurationRequest, CurationResult, Document, DocumentState};
use crate::store::{CurationLog, PageStore};
use crate::tokenize::{normalized_term, Tokenizer, WhitespaceTokenizer};

/// Score of the first curated result; later results count down from here.
pub const MAX_CURATED_SCORE: f64 = 1_111_111.0;

#[derive(Debug, Error)]
pub enum CurationError {
    #[error("should be one query parameter in the URL: {url}")]
    MultipleParameters { url: String },

    #[error("should be one query value in the URL: {url}")]
    MultipleValues { url: String },

    #[error("no query parameter in the URL: {url}")]
    MissingQuery { url: String },

    #[error("query has no searchable terms: {url}")]
    EmptyTerm { url: String },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl CurationError {
    /// True when the request itself is malformed, as opposed to a storage failure.
    pub fn is_request_error(&self) -> bool {
        !matches!(self, CurationError::Store(_))
    }
}

/// Acknowledgement of an applied curation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurationAck {
    pub term: String,
    pub page: u64,
    /// Curated documents written.
    pub curated: usize,
    /// Documents of other terms kept on the page.
    pub kept: usize,
}

/// The single query value carried by `url`.
///
/// Only the part after `?` is parsed (the whole string when there is none).
/// Parameters with blank values are ignored.
pub fn query_value(url: &str) -> Result<String, CurationError> {
    let query = url.split_once('?').map(|(_, q)| q).unwrap_or(url);
    let query = query.split_once('#').map(|(q, _)| q).unwrap_or(query);

    let mut params: Vec<(String, Vec<String>)> = Vec::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        match params.iter_mut().find(|(k, _)| k.as_str() == key) {
            Some((_, values)) => values.push(value.into_owned()),
            None => params.push((key.into_owned(), vec![value.into_owned()])),
        }
    }

    if params.len() > 1 {
        return Err(CurationError::MultipleParameters { url: url.to_string() });
    }
    let Some((_, mut values)) = params.pop() else {
        return Err(CurationError::MissingQuery { url: url.to_string() });
    };
    if values.len() > 1 {
        return Err(CurationError::MultipleValues { url: url.to_string() });
    }
    values
        .pop()
        .ok_or_else(|| CurationError::MissingQuery { url: url.to_string() })
}

/// Provenance state for a curated result.
///
/// Unvalidated results from sources other than users or Google carry no state.
pub fn document_state(validated: bool, source: &str) -> Option<DocumentState> {
    let source = source.to_lowercase();
    match (validated, source.as_str()) {
        (true, "user") => Some(DocumentState::FromUserApproved),
        (true, "google") => Some(DocumentState::FromGoogleApproved),
        (true, _) => Some(DocumentState::OrganicApproved),
        (false, "user") => Some(DocumentState::FromUser),
        (false, "google") => Some(DocumentState::FromGoogle),
        (false, _) => None,
    }
}

/// Curated documents for `term`, in the order the user gave them.
pub fn curated_documents(term: &str, results: &[CurationResult]) -> Vec<Document> {
    results
        .iter()
        .enumerate()
        .map(|(i, result)| Document {
            term: Some(term.to_string()),
            title: result.title.clone(),
            url: result.url.clone(),
            extract: result.extract.clone(),
            score: MAX_CURATED_SCORE - i as f64,
            state: document_state(result.validated, &result.source),
        })
        .collect()
}

/// Curation entry point over a page store and an audit log.
pub struct CurationMerger {
    pages: Arc<dyn PageStore>,
    log: Arc<dyn CurationLog>,
    tokenizer: Arc<dyn Tokenizer>,
}

impl CurationMerger {
    pub fn new(pages: Arc<dyn PageStore>, log: Arc<dyn CurationLog>) -> Self {
        Self {
            pages,
            log,
            tokenizer: Arc::new(WhitespaceTokenizer),
        }
    }

    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// Apply `request` on behalf of `acting_user`.
    ///
    /// Either the page is replaced in one write or the call fails; request
    /// errors are raised before the page is touched.
    pub async fn merge(
        &self,
        request: &CurationRequest,
        acting_user: &str,
    ) -> Result<CurationAck, CurationError> {
        self.log.append(request, acting_user).await?;

        let query = query_value(&request.url)?;
        let term = normalized_term(self.tokenizer.as_ref(), &query);
        if term.is_empty() {
            return Err(CurationError::EmptyTerm {
                url: request.url.clone(),
            });
        }

        let documents = curated_documents(&term, &request.results);
        let curated = documents.len();
        let page = self.pages.page_index_for(&term);

        let curated_term = term.clone();
        let previous = self
            .pages
            .replace_page(
                page,
                Box::new(move |existing: Vec<Document>| {
                    let mut replacement = documents;
                    replacement.extend(
                        existing
                            .into_iter()
                            .filter(|doc| doc.term.as_deref() != Some(curated_term.as_str())),
                    );
                    replacement
                }),
            )
            .await?;

        let other_terms: BTreeSet<&str> = previous
            .iter()
            .filter_map(|doc| doc.term.as_deref())
            .filter(|other| *other != term)
            .collect();
        let kept = previous
            .iter()
            .filter(|doc| doc.term.as_deref() != Some(term.as_str()))
            .count();
        info!(
            term = %term,
            page,
            curated,
            kept,
            other_terms = ?other_terms,
            "stored curated documents"
        );

        Ok(CurationAck {
            term,
            page,
            curated,
            kept,
        })
    }
}
