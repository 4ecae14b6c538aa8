//! Stateful line lexer.
//!
//! Lexing is line-at-a-time: [`lex_line`] takes the context left by the
//! previous row (multi-line state plus the open-bracket stack) and returns the
//! row's tokens together with the context the next row starts from. Block
//! comments and unterminated strings are the only constructs that carry state
//! across rows; everything else resolves within one line.

use std::hash::{Hash, Hasher};

use crate::rules::LanguageRules;

/// Token classification produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// A word from the profile's keyword set.
    Keyword,
    /// A word not in the keyword set.
    Identifier,
    /// A numeric literal.
    Number,
    /// A string literal, including its quotes.
    String,
    /// A line or block comment, including its delimiters.
    Comment,
    /// A run of whitespace.
    Whitespace,
    /// A matched bracket; the payload is its nesting color (`depth % 3`).
    Bracket(u8),
    /// Punctuation with no more specific classification, including mismatched
    /// closing brackets.
    Symbol,
    /// A character no rule matched.
    Error,
}

/// One token: a half-open character-column span within its row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// First column of the token.
    pub start: usize,
    /// One past the last column of the token.
    pub end: usize,
    /// Classification.
    pub kind: TokenKind,
}

/// Multi-line lexer state carried from one row to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LexState {
    /// No open multi-line construct.
    #[default]
    Default,
    /// Inside an unterminated block comment.
    InBlockComment,
    /// Inside an unterminated string opened with this quote character.
    InString(char),
}

/// An open bracket waiting for its closer.
#[derive(Debug, Clone, Copy)]
pub struct BracketFrame {
    /// The opening bracket character.
    pub ch: char,
    /// Serial offset of the opener in the document.
    pub offset: usize,
    /// Nesting color assigned at push time (`depth % 3`).
    pub color: u8,
}

// Frame equality ignores the opener offset: downstream lexing depends only on
// the nesting shape, and offset shifts from upstream edits must not invalidate
// every cached line below them.
impl PartialEq for BracketFrame {
    fn eq(&self, other: &Self) -> bool {
        self.ch == other.ch && self.color == other.color
    }
}

impl Eq for BracketFrame {}

impl Hash for BracketFrame {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ch.hash(state);
        self.color.hash(state);
    }
}

/// The full lexer context at a row boundary: multi-line state plus the open
/// bracket stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LexContext {
    /// Multi-line construct state.
    pub state: LexState,
    /// Open brackets, innermost last.
    pub stack: Vec<BracketFrame>,
}

/// Lex one row.
///
/// `base_offset` is the serial offset of the row's first column; it is recorded
/// on bracket frames so consumers can locate matching openers. Returns the
/// row's tokens (character-column spans) and the context the next row starts
/// from.
///
/// A character no rule matches emits one [`TokenKind::Error`] token and
/// advances exactly one character, so lexing always terminates.
pub fn lex_line(
    text: &str,
    base_offset: usize,
    ctx: &LexContext,
    rules: &LanguageRules,
) -> (Vec<Token>, LexContext) {
    let mut spans: Vec<(usize, usize, TokenKind)> = Vec::new();
    let mut state = ctx.state;
    let mut stack = ctx.stack.clone();
    let mut pos = 0usize;

    // Continuation of a multi-line construct consumes from column zero.
    match state {
        LexState::InBlockComment => {
            let close = rules.block_comment().map(|(_, close)| close);
            match close.and_then(|close| text.find(close)) {
                Some(idx) => {
                    let end = idx + close.unwrap_or_default().len();
                    spans.push((0, end, TokenKind::Comment));
                    pos = end;
                    state = LexState::Default;
                }
                None => {
                    if !text.is_empty() {
                        spans.push((0, text.len(), TokenKind::Comment));
                    }
                    pos = text.len();
                }
            }
        }
        LexState::InString(quote) => {
            let (end, closed) = scan_string_body(text, 0, quote);
            if end > 0 {
                spans.push((0, end, TokenKind::String));
            }
            pos = end;
            if closed {
                state = LexState::Default;
            }
        }
        LexState::Default => {}
    }

    while pos < text.len() {
        let rest = &text[pos..];
        let ch = rest.chars().next().unwrap_or_default();

        if let Some((len, kind)) = match_custom_rule(text, pos, rules) {
            spans.push((pos, pos + len, kind));
            pos += len;
            continue;
        }

        if let Some((open, close)) = rules.block_comment() {
            if rest.starts_with(open) {
                match rest[open.len()..].find(close) {
                    Some(idx) => {
                        let end = pos + open.len() + idx + close.len();
                        spans.push((pos, end, TokenKind::Comment));
                        pos = end;
                    }
                    None => {
                        spans.push((pos, text.len(), TokenKind::Comment));
                        pos = text.len();
                        state = LexState::InBlockComment;
                    }
                }
                continue;
            }
        }

        if let Some(prefix) = rules.line_comment() {
            if rest.starts_with(prefix) {
                spans.push((pos, text.len(), TokenKind::Comment));
                pos = text.len();
                continue;
            }
        }

        if rules.is_string_quote(ch) {
            let (end, closed) = scan_string_body(text, pos + ch.len_utf8(), ch);
            spans.push((pos, end, TokenKind::String));
            pos = end;
            if !closed {
                state = LexState::InString(ch);
            }
            continue;
        }

        if ch.is_whitespace() {
            let end = scan_while(text, pos, char::is_whitespace);
            spans.push((pos, end, TokenKind::Whitespace));
            pos = end;
            continue;
        }

        if ch.is_ascii_digit() {
            let end = scan_number(text, pos);
            spans.push((pos, end, TokenKind::Number));
            pos = end;
            continue;
        }

        if ch.is_alphabetic() || ch == '_' {
            let end = scan_while(text, pos, |c| c.is_alphanumeric() || c == '_');
            let kind = if rules.is_keyword(&text[pos..end]) {
                TokenKind::Keyword
            } else {
                TokenKind::Identifier
            };
            spans.push((pos, end, kind));
            pos = end;
            continue;
        }

        if rules.is_opener(ch) {
            let color = (stack.len() % 3) as u8;
            stack.push(BracketFrame {
                ch,
                offset: base_offset + text[..pos].chars().count(),
                color,
            });
            spans.push((pos, pos + ch.len_utf8(), TokenKind::Bracket(color)));
            pos += ch.len_utf8();
            continue;
        }

        if rules.is_closer(ch) {
            // A closer pops only its matching opener; anything else reads as
            // plain punctuation and leaves the stack untouched.
            let kind = match stack.last() {
                Some(frame) if rules.closer_for(frame.ch) == Some(ch) => {
                    let frame = stack.pop().unwrap_or(BracketFrame {
                        ch,
                        offset: 0,
                        color: 0,
                    });
                    TokenKind::Bracket(frame.color)
                }
                _ => TokenKind::Symbol,
            };
            spans.push((pos, pos + ch.len_utf8(), kind));
            pos += ch.len_utf8();
            continue;
        }

        if ch.is_ascii_punctuation() {
            spans.push((pos, pos + 1, TokenKind::Symbol));
            pos += 1;
            continue;
        }

        spans.push((pos, pos + ch.len_utf8(), TokenKind::Error));
        pos += ch.len_utf8();
    }

    (to_char_columns(text, &spans), LexContext { state, stack })
}

/// First custom rule matching at `pos`, as `(byte length, kind)`.
fn match_custom_rule(text: &str, pos: usize, rules: &LanguageRules) -> Option<(usize, TokenKind)> {
    rules
        .custom_rules()
        .iter()
        .find_map(|rule| rule.match_len_at(text, pos).map(|len| (len, rule.kind())))
}

/// Scan a string body starting after the opening quote. Backslash escapes the
/// next character. Returns the byte end (past the closing quote when found)
/// and whether the string closed on this line.
fn scan_string_body(text: &str, from: usize, quote: char) -> (usize, bool) {
    let mut chars = text[from..].char_indices();
    while let Some((i, c)) = chars.next() {
        if c == '\\' {
            chars.next();
            continue;
        }
        if c == quote {
            return (from + i + c.len_utf8(), true);
        }
    }
    (text.len(), false)
}

fn scan_while(text: &str, from: usize, pred: impl Fn(char) -> bool) -> usize {
    text[from..]
        .char_indices()
        .find(|&(_, c)| !pred(c))
        .map_or(text.len(), |(i, _)| from + i)
}

/// Scan a numeric literal: digits with `_` separators and at most one `.`.
fn scan_number(text: &str, from: usize) -> usize {
    let mut seen_dot = false;
    for (i, c) in text[from..].char_indices() {
        if c.is_ascii_digit() || c == '_' {
            continue;
        }
        if c == '.' && !seen_dot {
            seen_dot = true;
            continue;
        }
        return from + i;
    }
    text.len()
}

/// Convert ordered byte spans to character-column tokens in one pass.
fn to_char_columns(text: &str, spans: &[(usize, usize, TokenKind)]) -> Vec<Token> {
    let mut chars = text.char_indices();
    let mut byte = 0usize;
    let mut col = 0usize;
    let mut col_at = move |target: usize| {
        while byte < target {
            match chars.next() {
                Some((_, c)) => {
                    byte += c.len_utf8();
                    col += 1;
                }
                None => break,
            }
        }
        col
    };

    spans
        .iter()
        .map(|&(start, end, kind)| Token {
            start: col_at(start),
            end: col_at(end),
            kind,
        })
        .collect()
}
