//! Query and text tokenization.
//!
//! Only used to normalize curated search terms and to recover the owning
//! term of compacted page records, so the rules are deliberately small:
//! lower-case, split on whitespace, and drop a trailing token that was cut
//! off by an ellipsis.

/// Normalizes free text into index tokens.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Whitespace tokenizer matching the index writer's rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        tokenize(text)
    }
}

/// Split `text` into lower-cased whitespace tokens.
///
/// Text ending in `…` is a truncated extract, so its last token is partial
/// and dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = text.split_whitespace().map(|t| t.to_lowercase()).collect();
    if text.ends_with('…') {
        tokens.pop();
    }
    tokens
}

/// The normalized term for a query: its tokens joined by single spaces.
pub fn normalized_term(tokenizer: &dyn Tokenizer, query: &str) -> String {
    tokenizer.tokenize(query).join(" ")
}
