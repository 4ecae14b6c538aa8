//! Incremental highlighter over document snapshots.
//!
//! The highlighter consumes immutable [`Snapshot`] values and never touches
//! live document structures. An update names the changed row range; the
//! highlighter maps it to chunks, re-lexes only rows whose content or incoming
//! context changed, and follows state spills into later chunks until the
//! chunk checkpoints stabilize.
//!
//! Results live in two shapes behind one store lock: per-row token spans
//! (column-relative) for renderers walking visible rows, and an interval index
//! in document serial offsets for overlap queries. The parse cache has its own
//! lock so result readers are never blocked by cache bookkeeping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use log::trace;
use parking_lot::{Mutex, RwLock};
use vellum_core::{IntervalTree, Snapshot};

use crate::cache::{DEFAULT_LINE_CAPACITY, LineEntry, ParseCache, hash_line};
use crate::lexer::{self, LexContext, Token, TokenKind};
use crate::rules::LanguageRules;

/// Incremental syntax highlighter.
///
/// Shared between the edit thread and re-parse workers as `Arc<Highlighter>`;
/// all methods take `&self`.
pub struct Highlighter {
    rules: LanguageRules,
    cache: Mutex<ParseCache>,
    store: RwLock<HighlightStore>,
    lex_calls: AtomicU64,
}

#[derive(Default)]
struct HighlightStore {
    /// Token spans per row, column-relative.
    rows: Vec<Vec<Token>>,
    /// The same tokens (minus whitespace) keyed by document serial offsets.
    intervals: IntervalTree<TokenKind>,
    /// Version of the newest committed chunk.
    version: u64,
    /// Newest committed version per chunk. A commit racing a newer job is
    /// rejected here, under the same write lock as the publish.
    chunk_versions: HashMap<usize, u64>,
}

/// Lex results for one chunk, computed without touching the result store.
/// `None` rows were cache hits and keep their stored spans.
pub(crate) struct ChunkResult {
    rows: Vec<(usize, Option<Vec<Token>>)>,
    next_ctx: LexContext,
}

impl Highlighter {
    /// Highlighter with the default line-cache bound.
    pub fn new(rules: LanguageRules) -> Self {
        Self::with_cache_capacity(rules, DEFAULT_LINE_CAPACITY)
    }

    /// Highlighter with an explicit line-cache bound.
    pub fn with_cache_capacity(rules: LanguageRules, line_capacity: usize) -> Self {
        Self {
            rules,
            cache: Mutex::new(ParseCache::new(line_capacity)),
            store: RwLock::new(HighlightStore::default()),
            lex_calls: AtomicU64::new(0),
        }
    }

    /// Number of times the lexer has run on a row. Cache hits do not count.
    pub fn lex_calls(&self) -> u64 {
        self.lex_calls.load(Ordering::Relaxed)
    }

    /// Version of the last committed results.
    pub fn version(&self) -> u64 {
        self.store.read().version
    }

    /// Token spans of `row`, column-relative. Empty when the row has no
    /// results yet.
    pub fn spans_for_row(&self, row: usize) -> Vec<Token> {
        self.store.read().rows.get(row).cloned().unwrap_or_default()
    }

    /// All highlight intervals overlapping `[start, end]` in serial offsets.
    pub fn query_overlapping(&self, start: usize, end: usize) -> Vec<(usize, usize, TokenKind)> {
        self.store
            .read()
            .intervals
            .query_overlapping(start, end)
            .into_iter()
            .map(|(s, e, kind)| (s, e, *kind))
            .collect()
    }

    /// Shift stored intervals for a text insertion, keeping spans aligned with
    /// content until the affected rows are re-parsed.
    pub fn shift_for_insertion(&self, pos: usize, len: usize) {
        self.store.write().intervals.shift_for_insertion(pos, len);
    }

    /// Shift stored intervals for a text deletion of `[start, end)`.
    pub fn shift_for_deletion(&self, start: usize, end: usize) {
        self.store.write().intervals.shift_for_deletion(start, end);
    }

    /// Synchronously parse the whole snapshot.
    pub fn parse_document(&self, snapshot: &Snapshot) {
        self.parse_rows(snapshot, 0, snapshot.rows().saturating_sub(1));
    }

    /// Synchronously re-parse the chunks covering `first_row..=last_row`,
    /// following state spills into later chunks.
    pub fn parse_rows(&self, snapshot: &Snapshot, first_row: usize, last_row: usize) {
        let mut chunks = self.begin_update(snapshot, first_row, last_row);
        let mut idx = 0;
        while idx < chunks.len() {
            let chunk = chunks[idx];
            idx += 1;
            let Some(result) = self.process_chunk(snapshot, chunk) else {
                continue;
            };
            if self.commit_chunk(snapshot, chunk, result) {
                let next = chunk + 1;
                if let Err(pos) = chunks.binary_search(&next) {
                    chunks.insert(pos, next);
                }
            }
        }
    }

    /// Prepare for an update: re-chunk for the snapshot's row count, remap
    /// cached rows and stored spans across the row-count delta, and return the
    /// sorted chunk set to process.
    ///
    /// Must be called in edit order, once per change, before any chunk of that
    /// change is processed.
    pub(crate) fn begin_update(
        &self,
        snapshot: &Snapshot,
        first_row: usize,
        last_row: usize,
    ) -> Vec<usize> {
        let total_rows = snapshot.rows();
        let (first_chunk, last_chunk, chunk_limit) = {
            let mut cache = self.cache.lock();
            cache.update_layout(total_rows, first_row);
            // Starting past the last known checkpoint would lex from a wrong
            // state; back up to it and let spills carry forward.
            let first = cache.chunk_of_row(first_row).min(cache.last_known_chunk());
            let last = cache
                .chunk_of_row(last_row.min(total_rows.saturating_sub(1)))
                .max(first);
            (first, last, cache.chunk_count(total_rows))
        };

        let mut store = self.store.write();
        store.chunk_versions.retain(|&chunk, _| chunk < chunk_limit);
        let old_rows = store.rows.len();
        if total_rows > old_rows {
            let at = (first_row + 1).min(old_rows);
            let added = std::iter::repeat_with(Vec::new).take(total_rows - old_rows);
            let _ = store.rows.splice(at..at, added);
        } else if total_rows < old_rows {
            let at = (first_row + 1).min(total_rows);
            store.rows.drain(at..at + (old_rows - total_rows));
        }
        drop(store);

        (first_chunk..=last_chunk).collect()
    }

    /// Number of chunks covering `snapshot` under the current chunk size.
    pub(crate) fn chunk_limit(&self, snapshot: &Snapshot) -> usize {
        self.cache.lock().chunk_count(snapshot.rows())
    }

    /// Lex `chunk` against the snapshot, reusing cached rows. Pure with
    /// respect to the result store; `None` when the chunk is past the end.
    pub(crate) fn process_chunk(&self, snapshot: &Snapshot, chunk: usize) -> Option<ChunkResult> {
        let mut cache = self.cache.lock();
        let range = cache.rows_of_chunk(chunk, snapshot.rows());
        if range.is_empty() {
            return None;
        }
        let mut ctx = cache.checkpoint(chunk).cloned().unwrap_or_default();
        let mut rows = Vec::with_capacity(range.len());
        for row in range {
            let text = snapshot.text_of_row(row).unwrap_or_default();
            let hash = hash_line(&text);
            if let Some(ctx_out) = cache.lookup(row, hash, &ctx) {
                trace!("row {row}: lex cache hit");
                rows.push((row, None));
                ctx = ctx_out;
                continue;
            }
            let base = snapshot.serial(row, 0).unwrap_or(0);
            let (tokens, ctx_out) = lexer::lex_line(&text, base, &ctx, &self.rules);
            self.lex_calls.fetch_add(1, Ordering::Relaxed);
            cache.store(
                row,
                LineEntry {
                    hash,
                    ctx_in: ctx.clone(),
                    ctx_out: ctx_out.clone(),
                },
            );
            rows.push((row, Some(tokens)));
            ctx = ctx_out;
        }
        Some(ChunkResult {
            rows,
            next_ctx: ctx,
        })
    }

    /// Publish a chunk's results and advance its successor's checkpoint.
    /// Returns `true` when the end state changed and the next chunk must be
    /// re-processed.
    pub(crate) fn commit_chunk(
        &self,
        snapshot: &Snapshot,
        chunk: usize,
        result: ChunkResult,
    ) -> bool {
        {
            let mut store = self.store.write();
            let version = snapshot.version();
            // Guard and publish under one lock: a result computed from a
            // snapshot older than this chunk's last commit is dropped.
            if store.chunk_versions.get(&chunk).is_some_and(|&v| v > version) {
                trace!("chunk {chunk}: dropping stale result from v{version}");
                return false;
            }
            store.chunk_versions.insert(chunk, version);
            if store.rows.len() < snapshot.rows() {
                store.rows.resize_with(snapshot.rows(), Vec::new);
            }
            for (row, tokens) in result.rows {
                let Some(tokens) = tokens else { continue };
                let start = snapshot.serial(row, 0).unwrap_or(0);
                let next_start = snapshot.serial(row + 1, 0).unwrap_or(usize::MAX - 1);
                // Tokens never cross rows, so every stale interval of this row
                // starts inside it.
                let stale: Vec<(usize, usize, TokenKind)> = store
                    .intervals
                    .query_overlapping(start, next_start)
                    .into_iter()
                    .filter(|&(s, _, _)| s >= start && s < next_start)
                    .map(|(s, e, kind)| (s, e, *kind))
                    .collect();
                for (s, e, kind) in stale {
                    store.intervals.remove(s, e, &kind);
                }
                for token in &tokens {
                    if token.kind != TokenKind::Whitespace && token.end > token.start {
                        store
                            .intervals
                            .insert(start + token.start, start + token.end, token.kind);
                    }
                }
                store.rows[row] = tokens;
            }
            store.version = store.version.max(version);
        }

        let mut cache = self.cache.lock();
        chunk + 1 < cache.chunk_count(snapshot.rows())
            && cache.set_checkpoint(chunk + 1, result.next_ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::Document;

    fn highlighter() -> Highlighter {
        Highlighter::new(LanguageRules::c_like())
    }

    #[test]
    fn test_full_parse_produces_spans_and_intervals() {
        let doc = Document::new("fn main() {\n    return 42;\n}");
        let hl = highlighter();
        hl.parse_document(&doc.snapshot());

        let spans = hl.spans_for_row(0);
        assert!(spans.iter().any(|t| t.kind == TokenKind::Keyword && t.start == 0));
        assert!(spans.iter().any(|t| t.kind == TokenKind::Identifier));

        // "42" lives at serial offsets 23..25.
        let offset = doc.serial(1, 11).unwrap();
        let hits = hl.query_overlapping(offset, offset);
        assert!(hits.iter().any(|&(_, _, kind)| kind == TokenKind::Number));
    }

    #[test]
    fn test_reparse_of_unchanged_snapshot_skips_lexer() {
        let doc = Document::new("let a = 1;\nlet b = 2;\nlet c = 3;");
        let hl = highlighter();
        let snap = doc.snapshot();

        hl.parse_document(&snap);
        let calls = hl.lex_calls();
        assert_eq!(calls, 3);

        hl.parse_document(&snap);
        assert_eq!(hl.lex_calls(), calls, "identical re-parse is free");
    }

    #[test]
    fn test_single_row_edit_relexes_only_that_row() {
        let mut doc = Document::new("let a = 1;\nlet b = 2;\nlet c = 3;");
        let hl = highlighter();
        hl.parse_document(&doc.snapshot());
        let calls = hl.lex_calls();

        doc.insert(1, 9, "9").unwrap();
        doc.flush();
        hl.parse_rows(&doc.snapshot(), 1, 1);

        assert_eq!(hl.lex_calls(), calls + 1);
        let spans = hl.spans_for_row(1);
        assert!(spans.iter().any(|t| t.kind == TokenKind::Number && t.start == 8 && t.end == 10));
    }

    #[test]
    fn test_block_comment_open_spills_downstream() {
        let mut doc = Document::new("let a = 1;\nlet b = 2;\nlet c = 3;");
        let hl = highlighter();
        hl.parse_document(&doc.snapshot());

        // Opening a block comment on row 0 re-states every following row.
        doc.insert(0, 0, "/* ").unwrap();
        doc.flush();
        hl.parse_rows(&doc.snapshot(), 0, 0);

        for row in 0..3 {
            let spans = hl.spans_for_row(row);
            assert_eq!(spans.len(), 1, "row {row} is one comment token");
            assert_eq!(spans[0].kind, TokenKind::Comment);
        }
    }

    #[test]
    fn test_newline_insert_shifts_cached_rows() {
        let mut doc = Document::new("let a = 1;\nlet b = 2;\nlet c = 3;");
        let hl = highlighter();
        hl.parse_document(&doc.snapshot());

        doc.insert(0, 10, "\n").unwrap();
        let snap = doc.snapshot();
        hl.parse_rows(&snap, 0, 1);

        assert_eq!(snap.rows(), 4);
        // Old rows 1 and 2 moved down; their spans follow without re-lexing.
        let spans = hl.spans_for_row(2);
        assert!(spans.iter().any(|t| t.kind == TokenKind::Keyword));
        let spans = hl.spans_for_row(3);
        assert!(spans.iter().any(|t| t.kind == TokenKind::Keyword));
    }

    #[test]
    fn test_stale_chunk_result_cannot_overwrite_newer_commit() {
        let mut doc = Document::new("let a = 1;");
        let hl = highlighter();

        // A worker computes a result from the old snapshot but stalls before
        // committing it.
        let old = doc.snapshot();
        let chunks = hl.begin_update(&old, 0, 0);
        let stale = hl.process_chunk(&old, chunks[0]).expect("chunk 0 exists");

        doc.insert(0, 4, "bb").unwrap();
        doc.flush();
        let new = doc.snapshot();
        hl.parse_rows(&new, 0, 0);
        assert_eq!(hl.version(), new.version());

        // The stalled commit lands last and must be dropped.
        assert!(!hl.commit_chunk(&old, chunks[0], stale));
        assert_eq!(hl.version(), new.version(), "stale commit must not regress the store");
        assert!(
            hl.spans_for_row(0)
                .iter()
                .any(|t| t.kind == TokenKind::Identifier && t.start == 4 && t.end == 7)
        );
    }

    #[test]
    fn test_interval_shift_tracks_edits_between_parses() {
        let doc = Document::new("x = 42;");
        let hl = highlighter();
        hl.parse_document(&doc.snapshot());

        let before = hl.query_overlapping(4, 5);
        assert!(before.iter().any(|&(s, e, kind)| {
            kind == TokenKind::Number && s == 4 && e == 6
        }));

        // Three characters inserted at the line start, not yet re-parsed.
        hl.shift_for_insertion(0, 3);
        let after = hl.query_overlapping(7, 8);
        assert!(after.iter().any(|&(s, e, kind)| {
            kind == TokenKind::Number && s == 7 && e == 9
        }));
    }
}
