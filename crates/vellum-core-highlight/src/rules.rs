//! Language profiles driving the lexer.
//!
//! A [`LanguageRules`] value names the keyword set, comment delimiters, string
//! quotes, and bracket pairs for one language, plus optional regex rules for
//! token shapes the built-in scanners don't cover. Profiles are plain data; the
//! lexer interprets them.

use std::collections::HashSet;

use regex::Regex;
use thiserror::Error;

use crate::lexer::TokenKind;

/// A user-supplied rule pattern failed to compile.
#[derive(Debug, Error)]
pub enum RuleError {
    /// The regex pattern was rejected by the `regex` crate.
    #[error("invalid token rule pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// A custom regex token rule, tried before the built-in scanners.
///
/// The pattern must match at the current lexer position to apply; matches
/// elsewhere in the line are ignored.
#[derive(Debug, Clone)]
pub struct RegexRule {
    regex: Regex,
    kind: TokenKind,
}

impl RegexRule {
    /// Compile `pattern` into a rule emitting `kind` tokens.
    pub fn new(pattern: &str, kind: TokenKind) -> Result<Self, RuleError> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            kind,
        })
    }

    /// The token kind this rule emits.
    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Length in bytes of a match anchored at `pos`, if any.
    pub(crate) fn match_len_at(&self, text: &str, pos: usize) -> Option<usize> {
        let m = self.regex.find_at(text, pos)?;
        (m.start() == pos && !m.is_empty()).then(|| m.len())
    }
}

/// A lexing profile for one language.
#[derive(Debug, Clone)]
pub struct LanguageRules {
    keywords: HashSet<String>,
    line_comment: Option<String>,
    block_comment: Option<(String, String)>,
    string_quotes: Vec<char>,
    brackets: Vec<(char, char)>,
    custom: Vec<RegexRule>,
}

impl LanguageRules {
    /// An empty profile: no keywords, no comments, no strings, no brackets.
    ///
    /// Every non-whitespace, non-numeric, non-identifier character lexes as a
    /// plain symbol. Useful as a base for the `with_*` builder methods.
    pub fn plain() -> Self {
        Self {
            keywords: HashSet::new(),
            line_comment: None,
            block_comment: None,
            string_quotes: Vec::new(),
            brackets: Vec::new(),
            custom: Vec::new(),
        }
    }

    /// A generic C-family profile: `//` and `/* */` comments, double- and
    /// single-quoted strings, `()[]{}` brackets, and a small keyword set shared
    /// by most curly-brace languages.
    pub fn c_like() -> Self {
        Self::plain()
            .with_keywords([
                "break", "case", "const", "continue", "do", "else", "enum", "false", "fn",
                "for", "function", "if", "import", "let", "match", "new", "null", "return",
                "static", "struct", "switch", "true", "var", "void", "while",
            ])
            .with_line_comment("//")
            .with_block_comment("/*", "*/")
            .with_string_quotes(['"', '\''])
            .with_brackets([('(', ')'), ('[', ']'), ('{', '}')])
    }

    /// Replace the keyword set.
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Set the line comment prefix.
    pub fn with_line_comment(mut self, prefix: &str) -> Self {
        self.line_comment = Some(prefix.to_string());
        self
    }

    /// Set the block comment delimiters.
    pub fn with_block_comment(mut self, open: &str, close: &str) -> Self {
        self.block_comment = Some((open.to_string(), close.to_string()));
        self
    }

    /// Replace the string quote characters.
    pub fn with_string_quotes<I: IntoIterator<Item = char>>(mut self, quotes: I) -> Self {
        self.string_quotes = quotes.into_iter().collect();
        self
    }

    /// Replace the bracket pairs.
    pub fn with_brackets<I: IntoIterator<Item = (char, char)>>(mut self, pairs: I) -> Self {
        self.brackets = pairs.into_iter().collect();
        self
    }

    /// Append a custom regex rule.
    pub fn with_rule(mut self, rule: RegexRule) -> Self {
        self.custom.push(rule);
        self
    }

    pub(crate) fn is_keyword(&self, word: &str) -> bool {
        self.keywords.contains(word)
    }

    pub(crate) fn line_comment(&self) -> Option<&str> {
        self.line_comment.as_deref()
    }

    pub(crate) fn block_comment(&self) -> Option<(&str, &str)> {
        self.block_comment
            .as_ref()
            .map(|(open, close)| (open.as_str(), close.as_str()))
    }

    pub(crate) fn is_string_quote(&self, ch: char) -> bool {
        self.string_quotes.contains(&ch)
    }

    pub(crate) fn closer_for(&self, opener: char) -> Option<char> {
        self.brackets
            .iter()
            .find(|&&(open, _)| open == opener)
            .map(|&(_, close)| close)
    }

    pub(crate) fn is_opener(&self, ch: char) -> bool {
        self.brackets.iter().any(|&(open, _)| open == ch)
    }

    pub(crate) fn is_closer(&self, ch: char) -> bool {
        self.brackets.iter().any(|&(_, close)| close == ch)
    }

    pub(crate) fn custom_rules(&self) -> &[RegexRule] {
        &self.custom
    }
}

impl Default for LanguageRules {
    fn default() -> Self {
        Self::c_like()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_like_profile() {
        let rules = LanguageRules::c_like();
        assert!(rules.is_keyword("return"));
        assert!(!rules.is_keyword("banana"));
        assert_eq!(rules.line_comment(), Some("//"));
        assert_eq!(rules.block_comment(), Some(("/*", "*/")));
        assert!(rules.is_string_quote('"'));
        assert_eq!(rules.closer_for('{'), Some('}'));
        assert!(rules.is_closer(']'));
        assert!(!rules.is_opener(']'));
    }

    #[test]
    fn test_builder_overrides() {
        let rules = LanguageRules::plain()
            .with_keywords(["SELECT", "FROM"])
            .with_line_comment("--");
        assert!(rules.is_keyword("SELECT"));
        assert_eq!(rules.line_comment(), Some("--"));
        assert!(rules.block_comment().is_none());
        assert!(!rules.is_opener('('));
    }

    #[test]
    fn test_regex_rule_anchoring() {
        let rule = RegexRule::new(r"0x[0-9a-fA-F]+", TokenKind::Number).unwrap();
        assert_eq!(rule.match_len_at("0xff + 1", 0), Some(4));
        // A match later in the line does not apply at position 0.
        assert_eq!(rule.match_len_at("a 0xff", 0), None);
        assert_eq!(rule.match_len_at("a 0xff", 2), Some(4));
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        assert!(RegexRule::new(r"[unclosed", TokenKind::Number).is_err());
    }
}
