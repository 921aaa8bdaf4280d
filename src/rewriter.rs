//! Substitution of remote URI literals in query text
//!
//! The scanner looks for string literals that open with a remote scheme
//! (`'http://`, `"s3://`, ...) and replaces each one with the quoted local path
//! returned by the resolver. It is not a SQL parser: it only knows about the
//! closing quote of the literal it is looking at.

use std::path::{Path, PathBuf};

use crate::error::RewriteWarning;
use crate::Result;

/// Schemes recognized at the start of a quoted literal
pub const URI_SCHEMES: [&str; 3] = ["http://", "https://", "s3://"];

const QUOTES: [char; 2] = ['\'', '"'];

/// Result of rewriting one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub query: String,
    /// One entry per literal left untouched because it could not be resolved
    pub warnings: Vec<RewriteWarning>,
}

impl RewriteOutcome {
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Replace every quoted remote URI in `query` with the path `resolve` returns
///
/// Literals are processed left to right. A literal whose resolution fails is
/// kept byte for byte and reported as a warning. An unterminated literal stops
/// the scan and the rest of the query is kept as is.
pub fn rewrite_query<F>(query: &str, mut resolve: F) -> RewriteOutcome
where
    F: FnMut(&str) -> Result<PathBuf>,
{
    let mut out = String::with_capacity(query.len());
    let mut warnings = Vec::new();
    let mut rest = query;

    while let Some((start, quote)) = next_marker(rest) {
        let body_start = start + quote.len_utf8();
        let Some(len) = rest[body_start..].find(quote) else {
            break;
        };
        let body_end = body_start + len;
        let uri = &rest[body_start..body_end];

        out.push_str(&rest[..start]);
        match resolve(uri) {
            Ok(path) => {
                tracing::debug!(uri, path = %path.display(), "rewrote remote literal");
                out.push_str(&quote_path(&path, quote));
            }
            Err(e) => {
                tracing::warn!(uri, error = %e, "remote literal left in place");
                warnings.push(RewriteWarning::new(uri, e.to_string()));
                out.push_str(&rest[start..=body_end]);
            }
        }
        rest = &rest[body_end + quote.len_utf8()..];
    }

    out.push_str(rest);
    RewriteOutcome {
        query: out,
        warnings,
    }
}

/// Byte offset and quote character of the earliest remote literal in `text`
fn next_marker(text: &str) -> Option<(usize, char)> {
    QUOTES
        .iter()
        .flat_map(|&quote| {
            URI_SCHEMES.iter().filter_map(move |scheme| {
                find_literal(text, quote, scheme).map(|pos| (pos, quote))
            })
        })
        .min_by_key(|(pos, _)| *pos)
}

fn find_literal(text: &str, quote: char, scheme: &str) -> Option<usize> {
    let marker = format!("{quote}{scheme}");
    text.find(&marker)
}

/// Quote a local path as a literal of the given style
pub fn quote_path(path: &Path, quote: char) -> String {
    let raw = path.to_string_lossy();
    match quote {
        '\'' => format!("'{}'", raw.replace('\'', "''")),
        other => format!("{other}{raw}{other}"),
    }
}
