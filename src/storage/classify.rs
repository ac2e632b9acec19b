//! Sensitive key classification
//!
//! A storage key is sensitive when it equals one of the exact names or
//! matches one of the `*` glob patterns. Matching ignores ASCII case, so
//! `*token*` catches `accessToken`, `REFRESH_TOKEN` and `csrf_token_v2`.

use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};

use crate::error::{VaultError, VaultResult};

/// Exact key names that are always sensitive by default
pub const DEFAULT_SENSITIVE_KEYS: [&str; 6] = [
    "auth_token",
    "auth_user",
    "refresh_token",
    "session_data",
    "user_profile",
    "payment_info",
];

/// Glob patterns that are sensitive by default
pub const DEFAULT_SENSITIVE_PATTERNS: [&str; 6] = [
    "*token*",
    "*password*",
    "*secret*",
    "*credential*",
    "*key*",
    "*card*",
];

#[derive(Debug, Clone)]
struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    fn compile(source: &str) -> VaultResult<Self> {
        let body = source
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");

        let regex = RegexBuilder::new(&format!("^{}$", body))
            .case_insensitive(true)
            .build()
            .map_err(|e| VaultError::Validation(format!("Invalid pattern '{}': {}", source, e)))?;

        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }
}

/// Mutable set of sensitive names and patterns
#[derive(Debug, Clone)]
pub struct SensitiveKeySet {
    exact: BTreeSet<String>,
    patterns: Vec<GlobPattern>,
}

impl SensitiveKeySet {
    /// A set that classifies nothing as sensitive
    pub fn empty() -> Self {
        Self {
            exact: BTreeSet::new(),
            patterns: Vec::new(),
        }
    }

    /// The built-in defaults
    pub fn with_defaults() -> Self {
        let mut set = Self::empty();
        for name in DEFAULT_SENSITIVE_KEYS {
            set.exact.insert(name.to_string());
        }
        for pattern in DEFAULT_SENSITIVE_PATTERNS {
            // defaults contain no regex metacharacters once escaped
            if let Ok(glob) = GlobPattern::compile(pattern) {
                set.patterns.push(glob);
            }
        }
        set
    }

    /// Add an exact name, or a glob if the entry contains `*`
    ///
    /// Adding an entry that is already present is a no-op.
    pub fn add(&mut self, entry: &str) -> VaultResult<()> {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(VaultError::Validation("Sensitive pattern cannot be empty".into()));
        }

        if entry.contains('*') {
            if !self.patterns.iter().any(|p| p.source.eq_ignore_ascii_case(entry)) {
                self.patterns.push(GlobPattern::compile(entry)?);
            }
        } else {
            self.exact.insert(entry.to_ascii_lowercase());
        }
        Ok(())
    }

    /// Remove an exact name or glob; returns whether anything was removed
    pub fn remove(&mut self, entry: &str) -> bool {
        let entry = entry.trim();
        if entry.contains('*') {
            let before = self.patterns.len();
            self.patterns.retain(|p| !p.source.eq_ignore_ascii_case(entry));
            self.patterns.len() != before
        } else {
            self.exact.remove(&entry.to_ascii_lowercase())
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        self.exact.contains(&key.to_ascii_lowercase())
            || self.patterns.iter().any(|p| p.regex.is_match(key))
    }

    /// Every entry, exact names first
    pub fn entries(&self) -> Vec<String> {
        self.exact
            .iter()
            .cloned()
            .chain(self.patterns.iter().map(|p| p.source.clone()))
            .collect()
    }
}

impl Default for SensitiveKeySet {
    fn default() -> Self {
        Self::with_defaults()
    }
}
