//! Document search helpers.
//!
//! Plain and regex search over snapshot text, with optional case folding and
//! whole-word matching. All public offsets are **character** offsets so they
//! compose with the rest of the engine; byte offsets never escape this module.

use regex::RegexBuilder;

/// Options controlling how a search is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// If `true`, the search is case-sensitive.
    pub case_sensitive: bool,
    /// If `true`, matches only whole words (ASCII-alphanumeric and `_`).
    pub whole_word: bool,
    /// If `true`, the query is treated as a regex pattern.
    pub regex: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            whole_word: false,
            regex: false,
        }
    }
}

/// A half-open match range in character offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchMatch {
    /// Inclusive start character offset.
    pub start: usize,
    /// Exclusive end character offset.
    pub end: usize,
}

/// Search errors.
#[derive(Debug)]
pub enum SearchError {
    /// The query failed to compile as a regex.
    InvalidRegex(regex::Error),
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchError::InvalidRegex(err) => write!(f, "invalid regex: {}", err),
        }
    }
}

impl std::error::Error for SearchError {}

/// Find all matches of `query` in `text`, in order.
pub fn find_all(
    text: &str,
    query: &str,
    options: SearchOptions,
) -> Result<Vec<SearchMatch>, SearchError> {
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let regex = compile(query, options)?;
    let byte_to_char = byte_to_char_table(text);

    let mut matches = Vec::new();
    for m in regex.find_iter(text) {
        if m.start() == m.end() {
            continue;
        }
        matches.push(SearchMatch {
            start: byte_to_char[&m.start()],
            end: byte_to_char[&m.end()],
        });
    }
    Ok(matches)
}

/// Find the first match at or after character offset `from`, wrapping around to
/// the document start.
pub fn find_next(
    text: &str,
    query: &str,
    from: usize,
    options: SearchOptions,
) -> Result<Option<SearchMatch>, SearchError> {
    let matches = find_all(text, query, options)?;
    Ok(matches
        .iter()
        .find(|m| m.start >= from)
        .or_else(|| matches.first())
        .copied())
}

/// Find the last match strictly before character offset `before`, wrapping
/// around to the document end.
pub fn find_prev(
    text: &str,
    query: &str,
    before: usize,
    options: SearchOptions,
) -> Result<Option<SearchMatch>, SearchError> {
    let matches = find_all(text, query, options)?;
    Ok(matches
        .iter()
        .rev()
        .find(|m| m.start < before)
        .or_else(|| matches.last())
        .copied())
}

fn compile(query: &str, options: SearchOptions) -> Result<regex::Regex, SearchError> {
    let mut pattern = if options.regex {
        query.to_string()
    } else {
        regex::escape(query)
    };
    if options.whole_word {
        pattern = format!(r"\b(?:{})\b", pattern);
    }
    RegexBuilder::new(&pattern)
        .case_insensitive(!options.case_sensitive)
        .build()
        .map_err(SearchError::InvalidRegex)
}

/// Byte offset to character offset, for every boundary of `text`.
fn byte_to_char_table(text: &str) -> std::collections::HashMap<usize, usize> {
    let mut table = std::collections::HashMap::with_capacity(text.len() + 1);
    for (char_idx, (byte_idx, _)) in text.char_indices().enumerate() {
        table.insert(byte_idx, char_idx);
    }
    table.insert(text.len(), text.chars().count());
    table
}
