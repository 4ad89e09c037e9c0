//! Cycle-local blacklist snapshot.
//!
//! The domain set is fetched once at the start of a reconciliation cycle
//! and consulted for every discovered link. A domain is excluded when it,
//! or any of its parent domains, is listed.

use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    domains: HashSet<String>,
}

impl Blacklist {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domains: domains
                .into_iter()
                .map(|d| d.as_ref().trim().trim_end_matches('.').to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Whether links to `domain` (a host, optionally with `:port`) are excluded.
    pub fn is_blacklisted(&self, domain: &str) -> bool {
        if self.domains.is_empty() {
            return false;
        }
        let host = strip_port(domain).trim_end_matches('.').to_lowercase();
        let mut candidate = host.as_str();
        loop {
            if self.domains.contains(candidate) {
                return true;
            }
            match candidate.split_once('.') {
                Some((_, parent)) if !parent.is_empty() => candidate = parent,
                _ => return false,
            }
        }
    }
}

fn strip_port(domain: &str) -> &str {
    // Bracketed IPv6 hosts contain colons of their own.
    if let Some(end) = domain.rfind(']') {
        return &domain[..=end];
    }
    match domain.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => domain,
    }
}
