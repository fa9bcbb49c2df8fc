//! Query compiler: whitespace-separated glob terms compiled to regexes.
//!
//! Each term is a shell-style glob: `*` matches zero or more characters,
//! `?` matches exactly one, matching is case-insensitive. Brackets are
//! literal characters, not character classes. Two combination modes exist
//! and stay distinct: All (every term must match a line) and Any (one
//! matching term is enough).

use regex::{Regex, RegexBuilder};

use crate::error::CoreError;

/// How the terms of a compiled query combine against a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Every term must match (structured content search).
    All,
    /// Any term may match (line filtering against a saved pattern list).
    Any,
}

/// A compiled query: one regex per term plus the combination mode.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    terms: Vec<Regex>,
    mode: MatchMode,
}

impl CompiledQuery {
    /// Compile a raw query string.
    ///
    /// Splits on whitespace into glob terms. An empty query (after
    /// trimming) is a validation error, not an empty-result success.
    pub fn compile(query: &str, mode: MatchMode) -> Result<Self, CoreError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(CoreError::Validation("query must not be empty".to_string()));
        }

        let terms = trimmed
            .split_whitespace()
            .map(|term| {
                let pattern = glob_to_regex(term);
                RegexBuilder::new(&pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| CoreError::Validation(format!("bad term '{}': {}", term, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { terms, mode })
    }

    /// Check whether a line matches this query under its mode.
    pub fn matches(&self, line: &str) -> bool {
        match self.mode {
            MatchMode::All => self.terms.iter().all(|re| re.is_match(line)),
            MatchMode::Any => self.terms.iter().any(|re| re.is_match(line)),
        }
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }
}

/// Translate one glob term to a regex fragment.
///
/// Metacharacters are escaped first, then `*` and `?` get their glob
/// meanings. Everything else, brackets included, is literal.
fn glob_to_regex(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() * 2);
    for ch in term.chars() {
        match ch {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            _ => pattern.push_str(&regex::escape(&ch.to_string())),
        }
    }
    pattern
}
