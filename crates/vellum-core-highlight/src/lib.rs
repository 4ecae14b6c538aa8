#![warn(missing_docs)]
//! Incremental syntax highlighting for `vellum-core` documents.
//!
//! # Overview
//!
//! The highlighter sits behind the document engine and consumes its immutable
//! snapshots: a stateful line lexer (block comments, strings, and the bracket
//! stack carry across rows), a chunked parse cache that skips re-lexing
//! unchanged rows, and a background scheduler that re-parses only the chunks
//! an edit touched while cancelling superseded work.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use vellum_core::Document;
//! use vellum_core_highlight::{Highlighter, LanguageRules, Scheduler, TokenKind};
//!
//! let doc = Document::new("fn main() {\n    return 42;\n}");
//! let highlighter = Arc::new(Highlighter::new(LanguageRules::c_like()));
//!
//! let scheduler = Scheduler::new(Arc::clone(&highlighter), 2);
//! scheduler.schedule_full(doc.snapshot());
//! scheduler.wait_idle();
//!
//! let spans = highlighter.spans_for_row(0);
//! assert_eq!(spans[0].kind, TokenKind::Keyword); // "fn"
//! ```
//!
//! # Module Description
//!
//! - [`lexer`] - the stateful line lexer and its token types
//! - [`rules`] - language profiles and custom regex rules
//! - [`cache`] - per-row lex cache and chunk checkpoints
//! - [`highlighter`] - incremental re-parse over snapshots
//! - [`scheduler`] - background worker pool with cancellation

pub mod cache;
pub mod highlighter;
pub mod lexer;
pub mod rules;
pub mod scheduler;

pub use highlighter::Highlighter;
pub use lexer::{BracketFrame, LexContext, LexState, Token, TokenKind, lex_line};
pub use rules::{LanguageRules, RegexRule, RuleError};
pub use scheduler::{CancelToken, Scheduler, SchedulerStats};
