//! Parse cache: per-row lex results plus per-chunk state checkpoints.
//!
//! The document is split into fixed-size chunks of rows; the chunk size depends
//! on the document's row-count band, so small files re-parse in fine granules
//! and large files amortize scheduling overhead. For every chunk the cache
//! keeps a checkpoint: the lexer context valid at the chunk's first row. For
//! every row it keeps the content hash and the incoming/outgoing contexts of
//! the last lex, bounded by an LRU policy.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::ops::Range;

use lru::LruCache;

use crate::lexer::LexContext;

/// Default bound on cached line entries.
pub const DEFAULT_LINE_CAPACITY: usize = 10_000;

/// Chunk size for a document of `rows` rows.
pub fn chunk_size_for(rows: usize) -> usize {
    if rows < 2_000 {
        15
    } else if rows < 10_000 {
        30
    } else if rows < 50_000 {
        60
    } else {
        120
    }
}

/// Hash of one row's text, used to detect content changes.
pub(crate) fn hash_line(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

/// Cached lex result for one row.
#[derive(Debug, Clone)]
pub(crate) struct LineEntry {
    /// Hash of the row text at lex time.
    pub hash: u64,
    /// Context the row was lexed from.
    pub ctx_in: LexContext,
    /// Context the row left for its successor.
    pub ctx_out: LexContext,
}

/// Row-level and chunk-level lex state cache.
pub(crate) struct ParseCache {
    lines: LruCache<usize, LineEntry>,
    /// Checkpoint `i` is the context at chunk `i`'s first row. Index 0 is
    /// always present and always the default context.
    checkpoints: Vec<LexContext>,
    chunk_size: usize,
    rows: usize,
}

impl ParseCache {
    pub fn new(line_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(line_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            lines: LruCache::new(capacity),
            checkpoints: vec![LexContext::default()],
            chunk_size: chunk_size_for(1),
            rows: 0,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_of_row(&self, row: usize) -> usize {
        row / self.chunk_size
    }

    pub fn chunk_count(&self, total_rows: usize) -> usize {
        total_rows.div_ceil(self.chunk_size).max(1)
    }

    pub fn rows_of_chunk(&self, chunk: usize, total_rows: usize) -> Range<usize> {
        let start = chunk * self.chunk_size;
        start..total_rows.min(start + self.chunk_size).max(start)
    }

    /// The last chunk with a known checkpoint; re-parses starting past it must
    /// begin here instead.
    pub fn last_known_chunk(&self) -> usize {
        self.checkpoints.len() - 1
    }

    /// Adjust chunking and row keys for a document now `total_rows` long whose
    /// first changed row is `first_changed_row`.
    pub fn update_layout(&mut self, total_rows: usize, first_changed_row: usize) {
        let new_size = chunk_size_for(total_rows);
        if new_size != self.chunk_size {
            // Band crossing moves every chunk boundary; only the fixed chunk-0
            // state survives.
            self.chunk_size = new_size;
            self.checkpoints.truncate(1);
        }
        if total_rows != self.rows {
            if total_rows > self.rows {
                self.rows_inserted(first_changed_row, total_rows - self.rows);
            } else {
                self.rows_removed(first_changed_row, self.rows - total_rows);
            }
            // Downstream chunk boundaries moved relative to content; forget
            // their checkpoints so the next pass revalidates them.
            self.checkpoints
                .truncate(self.chunk_of_row(first_changed_row) + 1);
        }
        self.checkpoints.truncate(self.chunk_count(total_rows));
        self.rows = total_rows;
    }

    pub fn checkpoint(&self, chunk: usize) -> Option<&LexContext> {
        self.checkpoints.get(chunk)
    }

    /// Record the context at `chunk`'s first row; returns `true` when the
    /// stored value changed (the previous chunk's results spill over).
    ///
    /// `chunk` may land past the known tail when a concurrent layout change
    /// truncated the checkpoints; the gap backfills with default contexts and
    /// the next pass revalidates them.
    pub fn set_checkpoint(&mut self, chunk: usize, ctx: LexContext) -> bool {
        if let Some(stored) = self.checkpoints.get_mut(chunk) {
            if *stored == ctx {
                false
            } else {
                *stored = ctx;
                true
            }
        } else {
            self.checkpoints.resize(chunk, LexContext::default());
            self.checkpoints.push(ctx);
            true
        }
    }

    /// Outgoing context of `row` if its text and incoming context are
    /// unchanged since the last lex.
    pub fn lookup(&mut self, row: usize, hash: u64, ctx_in: &LexContext) -> Option<LexContext> {
        let entry = self.lines.get(&row)?;
        (entry.hash == hash && entry.ctx_in == *ctx_in).then(|| entry.ctx_out.clone())
    }

    pub fn store(&mut self, row: usize, entry: LineEntry) {
        self.lines.put(row, entry);
    }

    /// Remap row keys after `count` rows appeared following `after`.
    fn rows_inserted(&mut self, after: usize, count: usize) {
        let mut entries = Vec::with_capacity(self.lines.len());
        // pop_lru drains in recency order; re-putting in the same order keeps it.
        while let Some((row, entry)) = self.lines.pop_lru() {
            let row = if row > after { row + count } else { row };
            entries.push((row, entry));
        }
        for (row, entry) in entries {
            self.lines.put(row, entry);
        }
    }

    /// Remap row keys after `count` rows following `after` were removed.
    fn rows_removed(&mut self, after: usize, count: usize) {
        let mut entries = Vec::with_capacity(self.lines.len());
        while let Some((row, entry)) = self.lines.pop_lru() {
            if row <= after {
                entries.push((row, entry));
            } else if row > after + count {
                entries.push((row - count, entry));
            }
        }
        for (row, entry) in entries {
            self.lines.put(row, entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::LexState;

    fn entry(hash: u64) -> LineEntry {
        LineEntry {
            hash,
            ctx_in: LexContext::default(),
            ctx_out: LexContext::default(),
        }
    }

    #[test]
    fn test_chunk_size_bands() {
        assert_eq!(chunk_size_for(0), 15);
        assert_eq!(chunk_size_for(1_999), 15);
        assert_eq!(chunk_size_for(2_000), 30);
        assert_eq!(chunk_size_for(9_999), 30);
        assert_eq!(chunk_size_for(10_000), 60);
        assert_eq!(chunk_size_for(49_999), 60);
        assert_eq!(chunk_size_for(50_000), 120);
    }

    #[test]
    fn test_chunk_mapping() {
        let mut cache = ParseCache::new(16);
        cache.update_layout(100, 0);
        assert_eq!(cache.chunk_size(), 15);
        assert_eq!(cache.chunk_of_row(0), 0);
        assert_eq!(cache.chunk_of_row(14), 0);
        assert_eq!(cache.chunk_of_row(15), 1);
        assert_eq!(cache.chunk_count(100), 7);
        assert_eq!(cache.rows_of_chunk(6, 100), 90..100);
        assert!(cache.rows_of_chunk(7, 100).is_empty());
    }

    #[test]
    fn test_lookup_requires_matching_hash_and_context() {
        let mut cache = ParseCache::new(16);
        let block = LexContext {
            state: LexState::InBlockComment,
            stack: Vec::new(),
        };
        cache.store(
            3,
            LineEntry {
                hash: 42,
                ctx_in: LexContext::default(),
                ctx_out: block.clone(),
            },
        );

        let hit = cache.lookup(3, 42, &LexContext::default());
        assert_eq!(hit, Some(block.clone()));
        assert!(cache.lookup(3, 43, &LexContext::default()).is_none());
        assert!(cache.lookup(3, 42, &block).is_none());
        assert!(cache.lookup(4, 42, &LexContext::default()).is_none());
    }

    #[test]
    fn test_lru_bound_evicts_oldest() {
        let mut cache = ParseCache::new(2);
        cache.store(0, entry(0));
        cache.store(1, entry(1));
        cache.store(2, entry(2));
        assert!(cache.lookup(0, 0, &LexContext::default()).is_none());
        assert!(cache.lookup(2, 2, &LexContext::default()).is_some());
    }

    #[test]
    fn test_row_insertion_remaps_keys() {
        let mut cache = ParseCache::new(16);
        cache.update_layout(10, 0);
        cache.store(2, entry(2));
        cache.store(5, entry(5));

        // Two rows inserted after row 2.
        cache.update_layout(12, 2);
        assert!(cache.lookup(2, 2, &LexContext::default()).is_some());
        assert!(cache.lookup(5, 5, &LexContext::default()).is_none());
        assert!(cache.lookup(7, 5, &LexContext::default()).is_some());
    }

    #[test]
    fn test_row_removal_drops_and_remaps_keys() {
        let mut cache = ParseCache::new(16);
        cache.update_layout(10, 0);
        cache.store(2, entry(2));
        cache.store(3, entry(3));
        cache.store(6, entry(6));

        // Rows 3 and 4 collapsed into row 2.
        cache.update_layout(8, 2);
        assert!(cache.lookup(2, 2, &LexContext::default()).is_some());
        assert!(cache.lookup(3, 3, &LexContext::default()).is_none());
        assert!(cache.lookup(4, 6, &LexContext::default()).is_some());
    }

    #[test]
    fn test_checkpoint_change_detection() {
        let mut cache = ParseCache::new(16);
        cache.update_layout(30, 0);
        let block = LexContext {
            state: LexState::InBlockComment,
            stack: Vec::new(),
        };

        assert!(cache.set_checkpoint(1, LexContext::default()), "new checkpoint");
        assert!(!cache.set_checkpoint(1, LexContext::default()), "unchanged");
        assert!(cache.set_checkpoint(1, block.clone()), "value changed");
        assert_eq!(cache.checkpoint(1), Some(&block));
        assert_eq!(cache.last_known_chunk(), 1);
    }

    #[test]
    fn test_late_checkpoint_after_truncation_backfills() {
        let mut cache = ParseCache::new(16);
        cache.update_layout(60, 0);
        let block = LexContext {
            state: LexState::InBlockComment,
            stack: Vec::new(),
        };
        cache.set_checkpoint(1, LexContext::default());
        cache.set_checkpoint(2, LexContext::default());
        cache.set_checkpoint(3, LexContext::default());

        // A row inserted at the top truncates the downstream checkpoints while
        // an in-flight pass may still report one for a later chunk.
        cache.update_layout(61, 0);
        assert_eq!(cache.last_known_chunk(), 0);

        assert!(cache.set_checkpoint(3, block.clone()));
        assert_eq!(cache.checkpoint(3), Some(&block));
        assert_eq!(cache.checkpoint(2), Some(&LexContext::default()));
    }

    #[test]
    fn test_band_crossing_resets_checkpoints() {
        let mut cache = ParseCache::new(16);
        cache.update_layout(1_000, 0);
        cache.set_checkpoint(1, LexContext::default());
        cache.set_checkpoint(2, LexContext::default());
        assert_eq!(cache.last_known_chunk(), 2);

        cache.update_layout(3_000, 999);
        assert_eq!(cache.chunk_size(), 30);
        assert_eq!(cache.last_known_chunk(), 0);
        assert_eq!(cache.checkpoint(0), Some(&LexContext::default()));
    }

    #[test]
    fn test_row_change_without_count_change_keeps_checkpoints() {
        let mut cache = ParseCache::new(16);
        cache.update_layout(60, 0);
        cache.set_checkpoint(1, LexContext::default());
        cache.set_checkpoint(2, LexContext::default());

        cache.update_layout(60, 20);
        assert_eq!(cache.last_known_chunk(), 2);
    }
}
