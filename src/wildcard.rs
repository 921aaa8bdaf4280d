//! Wildcard object references
//!
//! A glob such as `*`, `**/*.csv` or `logs/2024/*.parquet` resolves to exactly one
//! object: the first listing entry that matches. Listing order is the tie-break,
//! so the same listing always yields the same object.

use crate::types::{ObjectDescriptor, ObjectRef};
use crate::{ProxyError, Result};

/// Match constraints derived from a glob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardPattern {
    /// Text before the first `*`
    pub prefix: String,
    /// Required extension, lowercase and without the dot
    pub extension: Option<String>,
    /// The glob is nothing but `*` characters
    pub unconstrained: bool,
    /// Only the extension rule applies; a bare prefix match is not enough
    pub strict_extension: bool,
}

impl WildcardPattern {
    pub fn parse(glob: &str) -> Self {
        let prefix = glob.split('*').next().unwrap_or_default().to_string();
        let unconstrained = !glob.is_empty() && glob.chars().all(|c| c == '*');

        let extension = glob
            .rfind("*.")
            .map(|pos| &glob[pos + 2..])
            .filter(|ext| !ext.is_empty() && !ext.contains('*') && !ext.contains('/'))
            .map(str::to_lowercase);

        Self {
            prefix,
            extension,
            unconstrained,
            strict_extension: false,
        }
    }

    /// Pattern for a raw table: objects under `prefix` that carry extension `ext`
    pub fn with_extension(prefix: impl Into<String>, ext: &str) -> Self {
        Self {
            prefix: prefix.into(),
            extension: Some(ext.trim_start_matches('.').to_lowercase()),
            unconstrained: false,
            strict_extension: true,
        }
    }

    /// Directory markers (names ending in `/`) never match
    pub fn matches(&self, name: &str) -> bool {
        if name.is_empty() || name.ends_with('/') {
            return false;
        }
        let in_prefix = name.starts_with(&self.prefix);
        if let Some(ext) = &self.extension {
            if in_prefix && name.to_lowercase().ends_with(&format!(".{ext}")) {
                return true;
            }
        }
        if !self.strict_extension && !self.prefix.is_empty() && in_prefix {
            return true;
        }
        self.unconstrained
    }

    /// First descriptor in listing order that matches
    pub fn first_match<'a>(&self, listing: &'a [ObjectDescriptor]) -> Option<&'a ObjectDescriptor> {
        listing.iter().find(|candidate| self.matches(&candidate.name))
    }
}

/// Resolve `glob` in `bucket` to a single object of `listing`
pub fn resolve(bucket: &str, glob: &str, listing: &[ObjectDescriptor]) -> Result<ObjectRef> {
    resolve_pattern(bucket, &WildcardPattern::parse(glob), glob, listing)
}

/// Resolve an already parsed pattern; `shown` names it in logs and errors
pub fn resolve_pattern(
    bucket: &str,
    pattern: &WildcardPattern,
    shown: &str,
    listing: &[ObjectDescriptor],
) -> Result<ObjectRef> {
    match pattern.first_match(listing) {
        Some(found) => {
            tracing::debug!(
                bucket,
                pattern = shown,
                object = %found.name,
                candidates = listing.len(),
                "resolved wildcard"
            );
            Ok(ObjectRef::new(bucket, found.name.clone()))
        }
        None => Err(ProxyError::NoMatch {
            bucket: bucket.to_string(),
            pattern: shown.to_string(),
        }),
    }
}
