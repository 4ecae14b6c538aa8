//! Piece-table content store.
//!
//! The document body lives in two buffers: a read-only original buffer holding the
//! text the document was opened with, and an append-only add buffer receiving every
//! inserted fragment. The visible content is the in-order concatenation of *pieces*,
//! each referencing a contiguous range of one buffer. Unedited text is never copied.
//!
//! All public offsets and lengths are in **characters**, not bytes.

/// Which buffer a piece references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// The read-only buffer the store was created from.
    Original,
    /// The append-only buffer receiving inserted text.
    Add,
}

/// A contiguous fragment of one of the two buffers.
#[derive(Debug, Clone)]
struct Piece {
    buffer: BufferKind,
    /// Byte offset of the fragment start within its buffer.
    start: usize,
    /// Fragment length in bytes.
    bytes: usize,
    /// Fragment length in characters.
    chars: usize,
}

impl Piece {
    fn new(buffer: BufferKind, start: usize, bytes: usize, chars: usize) -> Self {
        Self {
            buffer,
            start,
            bytes,
            chars,
        }
    }
}

/// Errors produced by the content store.
///
/// Only write-path arguments are validated; reads are clamped instead (see
/// [`PieceTable::get`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An insert/delete position or range fell outside `0..=len()`.
    OutOfRange {
        /// The offending character offset.
        offset: usize,
        /// The document length at the time of the call.
        len: usize,
    },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::OutOfRange { offset, len } => {
                write!(f, "offset {} out of range (document length {})", offset, len)
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Piece-table text storage.
///
/// # Example
///
/// ```rust
/// use vellum_core::PieceTable;
///
/// let mut store = PieceTable::new("a large text");
/// store.insert(8, "span of ").unwrap();
/// store.delete(1, 6).unwrap();
/// assert_eq!(store.text(), "a span of text");
/// ```
pub struct PieceTable {
    original: Vec<u8>,
    add: Vec<u8>,
    pieces: Vec<Piece>,
    /// Cached total character count, kept in sync on every mutation.
    total_chars: usize,
    /// Mutations since the last add-buffer compaction.
    ops_since_gc: usize,
    gc_threshold: usize,
}

impl PieceTable {
    /// Create a store holding `text` in the original buffer.
    pub fn new(text: &str) -> Self {
        let chars = text.chars().count();
        let pieces = if text.is_empty() {
            Vec::new()
        } else {
            vec![Piece::new(BufferKind::Original, 0, text.len(), chars)]
        };
        Self {
            original: text.as_bytes().to_vec(),
            add: Vec::new(),
            pieces,
            total_chars: chars,
            ops_since_gc: 0,
            gc_threshold: 1024,
        }
    }

    /// Create an empty store.
    pub fn empty() -> Self {
        Self::new("")
    }

    /// Total document length in characters.
    pub fn len(&self) -> usize {
        self.total_chars
    }

    /// Returns `true` if the document is empty.
    pub fn is_empty(&self) -> bool {
        self.total_chars == 0
    }

    /// Total document length in bytes.
    pub fn byte_len(&self) -> usize {
        self.pieces.iter().map(|p| p.bytes).sum()
    }

    /// Insert `text` at character offset `offset`.
    ///
    /// Offsets beyond the current length are a range error; inserting the empty
    /// string is a no-op.
    pub fn insert(&mut self, offset: usize, text: &str) -> Result<(), StoreError> {
        if offset > self.total_chars {
            return Err(StoreError::OutOfRange {
                offset,
                len: self.total_chars,
            });
        }
        if text.is_empty() {
            return Ok(());
        }

        let add_start = self.add.len();
        self.add.extend_from_slice(text.as_bytes());
        let inserted = Piece::new(BufferKind::Add, add_start, text.len(), text.chars().count());
        self.total_chars += inserted.chars;

        match self.locate(offset) {
            Some((idx, 0)) => self.pieces.insert(idx, inserted),
            Some((idx, within)) => {
                let (left, right) = self.split(&self.pieces[idx], within);
                self.pieces.splice(idx..=idx, [left, inserted, right]);
            }
            // Empty piece list, or offset == len() past the last piece.
            None => self.pieces.push(inserted),
        }

        self.coalesce();
        self.bump_ops();
        Ok(())
    }

    /// Delete `len` characters starting at `offset`.
    ///
    /// The whole range must lie within the document; zero-length deletes are no-ops.
    pub fn delete(&mut self, offset: usize, len: usize) -> Result<(), StoreError> {
        let end = offset.checked_add(len).ok_or(StoreError::OutOfRange {
            offset,
            len: self.total_chars,
        })?;
        if end > self.total_chars {
            return Err(StoreError::OutOfRange {
                offset: end,
                len: self.total_chars,
            });
        }
        if len == 0 {
            return Ok(());
        }

        // Both endpoints are valid, so locate() cannot fail here.
        let (first, first_off) = self.locate(offset).expect("start piece");
        let (last, last_off) = self.locate_end(end);

        let mut kept: Vec<Piece> = Vec::with_capacity(2);
        if first_off > 0 {
            let (left, _) = self.split(&self.pieces[first], first_off);
            kept.push(left);
        }
        if last_off < self.pieces[last].chars {
            let (_, right) = self.split(&self.pieces[last], last_off);
            kept.push(right);
        }
        self.pieces.splice(first..=last, kept);

        self.total_chars -= len;
        self.bump_ops();
        Ok(())
    }

    /// Read up to `len` characters starting at `offset`.
    ///
    /// Reads past the end of the document are clamped, not errors: the result is
    /// the (possibly empty) available prefix of the requested range. This mirrors
    /// the permissive `position()` contract of the row index.
    pub fn get(&self, offset: usize, len: usize) -> String {
        let mut out = String::new();
        if len == 0 {
            return out;
        }
        let end = offset.saturating_add(len);
        let mut at = 0usize;

        for piece in &self.pieces {
            let piece_end = at + piece.chars;
            if at >= end {
                break;
            }
            if piece_end > offset {
                let skip = offset.saturating_sub(at);
                let take = end.min(piece_end) - at.max(offset);
                let text = self.piece_str(piece);
                out.extend(text.chars().skip(skip).take(take));
            }
            at = piece_end;
        }
        out
    }

    /// The full document content.
    pub fn text(&self) -> String {
        let mut out = String::with_capacity(self.byte_len());
        for piece in &self.pieces {
            out.push_str(self.piece_str(piece));
        }
        out
    }

    /// Current size of the append-only add buffer in bytes.
    ///
    /// Exposed so tests can observe compaction behaviour.
    pub fn add_buffer_size(&self) -> usize {
        self.add.len()
    }

    /// Set how many mutations may elapse before the add buffer is compacted.
    pub fn set_gc_threshold(&mut self, threshold: usize) {
        self.gc_threshold = threshold.max(1);
    }

    /// Compact the add buffer down to the byte ranges still referenced by pieces.
    ///
    /// Deleting text leaves dead fragments behind in the add buffer; this rewrites
    /// the buffer to contain only live ranges and remaps piece offsets. Runs
    /// automatically every `gc_threshold` mutations.
    pub fn compact(&mut self) {
        let mut live: Vec<(usize, usize)> = self
            .pieces
            .iter()
            .filter(|p| p.buffer == BufferKind::Add)
            .map(|p| (p.start, p.start + p.bytes))
            .collect();

        if live.is_empty() {
            self.add.clear();
            self.ops_since_gc = 0;
            return;
        }

        live.sort_unstable_by_key(|r| r.0);
        let mut merged: Vec<(usize, usize)> = vec![live[0]];
        for &(start, end) in &live[1..] {
            let last = merged.last_mut().expect("non-empty");
            if start <= last.1 {
                last.1 = last.1.max(end);
            } else {
                merged.push((start, end));
            }
        }

        let mut compacted = Vec::new();
        // (old_start, old_end, new_start) per surviving range.
        let mut remap: Vec<(usize, usize, usize)> = Vec::with_capacity(merged.len());
        for (start, end) in merged {
            remap.push((start, end, compacted.len()));
            compacted.extend_from_slice(&self.add[start..end]);
        }

        for piece in &mut self.pieces {
            if piece.buffer != BufferKind::Add {
                continue;
            }
            let idx = remap
                .partition_point(|&(old_start, _, _)| old_start <= piece.start)
                .saturating_sub(1);
            let (old_start, old_end, new_start) = remap[idx];
            debug_assert!(piece.start >= old_start && piece.start + piece.bytes <= old_end);
            piece.start = new_start + (piece.start - old_start);
        }

        self.add = compacted;
        self.ops_since_gc = 0;
    }

    /// Number of pieces (test observability for merge behaviour).
    #[cfg(test)]
    fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    fn bump_ops(&mut self) {
        self.ops_since_gc += 1;
        if self.ops_since_gc >= self.gc_threshold {
            self.compact();
        }
    }

    fn buffer(&self, kind: BufferKind) -> &[u8] {
        match kind {
            BufferKind::Original => &self.original,
            BufferKind::Add => &self.add,
        }
    }

    fn piece_str<'a>(&'a self, piece: &Piece) -> &'a str {
        let bytes = &self.buffer(piece.buffer)[piece.start..piece.start + piece.bytes];
        // Pieces are only ever split on character boundaries.
        std::str::from_utf8(bytes).expect("piece spans a char boundary")
    }

    /// Find the piece containing character offset `offset`, preferring the piece
    /// *starting* at the offset when it lands on a boundary. Returns the piece
    /// index and the character offset within it, or `None` when the offset is at
    /// (or past) the end of the piece list.
    fn locate(&self, offset: usize) -> Option<(usize, usize)> {
        let mut at = 0usize;
        for (idx, piece) in self.pieces.iter().enumerate() {
            if offset < at + piece.chars {
                return Some((idx, offset - at));
            }
            at += piece.chars;
        }
        // Offset is at the end of the document (append position).
        None
    }

    /// Find the piece containing character offset `end` treated as an *exclusive*
    /// endpoint: a boundary offset resolves to the end of the preceding piece.
    fn locate_end(&self, end: usize) -> (usize, usize) {
        debug_assert!(end > 0 && end <= self.total_chars);
        let mut at = 0usize;
        for (idx, piece) in self.pieces.iter().enumerate() {
            if end <= at + piece.chars {
                return (idx, end - at);
            }
            at += piece.chars;
        }
        unreachable!("end offset validated by caller")
    }

    /// Split `piece` at character offset `at` (both halves non-empty unless the
    /// split falls on a boundary, which callers avoid).
    fn split(&self, piece: &Piece, at: usize) -> (Piece, Piece) {
        let text = self.piece_str(piece);
        let byte_at = text
            .char_indices()
            .nth(at)
            .map(|(b, _)| b)
            .unwrap_or(piece.bytes);

        let left = Piece::new(piece.buffer, piece.start, byte_at, at);
        let right = Piece::new(
            piece.buffer,
            piece.start + byte_at,
            piece.bytes - byte_at,
            piece.chars - at,
        );
        (left, right)
    }

    /// Merge adjacent add-buffer pieces with contiguous byte ranges. Consecutive
    /// typing would otherwise grow the piece list by one per keystroke.
    fn coalesce(&mut self) {
        let mut i = 0;
        while i + 1 < self.pieces.len() {
            let (a, b) = (&self.pieces[i], &self.pieces[i + 1]);
            let contiguous = a.buffer == BufferKind::Add
                && b.buffer == BufferKind::Add
                && a.start + a.bytes == b.start;
            if contiguous {
                let merged = Piece::new(a.buffer, a.start, a.bytes + b.bytes, a.chars + b.chars);
                self.pieces.splice(i..=i + 1, [merged]);
            } else {
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_empty() {
        let store = PieceTable::new("Hello, World!");
        assert_eq!(store.text(), "Hello, World!");
        assert_eq!(store.len(), 13);

        let empty = PieceTable::empty();
        assert_eq!(empty.text(), "");
        assert_eq!(empty.len(), 0);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_insert_positions() {
        let mut store = PieceTable::new("World");
        store.insert(0, "Hello, ").unwrap();
        assert_eq!(store.text(), "Hello, World");

        let mut store = PieceTable::new("Hello");
        store.insert(5, ", World").unwrap();
        assert_eq!(store.text(), "Hello, World");

        let mut store = PieceTable::new("Hlo");
        store.insert(1, "el").unwrap();
        assert_eq!(store.text(), "Hello");
    }

    #[test]
    fn test_insert_out_of_range() {
        let mut store = PieceTable::new("abc");
        let err = store.insert(4, "x").unwrap_err();
        assert_eq!(err, StoreError::OutOfRange { offset: 4, len: 3 });
        assert_eq!(store.text(), "abc");
    }

    #[test]
    fn test_delete_positions() {
        let mut store = PieceTable::new("Hello, World");
        store.delete(0, 7).unwrap();
        assert_eq!(store.text(), "World");

        let mut store = PieceTable::new("Hello, World");
        store.delete(5, 7).unwrap();
        assert_eq!(store.text(), "Hello");

        let mut store = PieceTable::new("Hello, World");
        store.delete(5, 2).unwrap();
        assert_eq!(store.text(), "HelloWorld");
    }

    #[test]
    fn test_delete_out_of_range() {
        let mut store = PieceTable::new("abc");
        assert!(store.delete(2, 2).is_err());
        assert_eq!(store.text(), "abc");
    }

    #[test]
    fn test_zero_length_ops_are_noops() {
        let mut store = PieceTable::new("abc");
        store.insert(1, "").unwrap();
        store.delete(1, 0).unwrap();
        assert_eq!(store.text(), "abc");
    }

    #[test]
    fn test_get_is_clamped() {
        let store = PieceTable::new("Hello, World!");
        assert_eq!(store.get(0, 5), "Hello");
        assert_eq!(store.get(7, 5), "World");
        assert_eq!(store.get(7, 100), "World!");
        assert_eq!(store.get(100, 5), "");
    }

    #[test]
    fn test_insert_then_delete_span_of_text() {
        let mut store = PieceTable::new("a large text");
        store.insert(8, "span of ").unwrap();
        store.delete(1, 6).unwrap();
        assert_eq!(store.text(), "a span of text");
    }

    #[test]
    fn test_multibyte_characters() {
        let mut store = PieceTable::new("你好");
        assert_eq!(store.len(), 2);
        assert_eq!(store.byte_len(), 6);

        store.insert(1, "们").unwrap();
        assert_eq!(store.text(), "你们好");
        assert_eq!(store.len(), 3);

        let mut store = PieceTable::new("Hello 👋");
        store.insert(6, "World ").unwrap();
        assert_eq!(store.text(), "Hello World 👋");
    }

    #[test]
    fn test_consecutive_inserts_coalesce() {
        let mut store = PieceTable::new("Hello");
        store.insert(5, " ").unwrap();
        store.insert(6, "W").unwrap();
        store.insert(7, "orld").unwrap();
        assert_eq!(store.text(), "Hello World");
        // One original piece plus one merged add piece.
        assert_eq!(store.piece_count(), 2);
    }

    #[test]
    fn test_compact_drops_dead_fragments() {
        let mut store = PieceTable::new("Hello");
        store.insert(5, " World").unwrap();
        store.insert(11, "!").unwrap();
        let before = store.add_buffer_size();

        store.delete(5, 6).unwrap();
        store.compact();

        assert_eq!(store.text(), "Hello!");
        assert!(store.add_buffer_size() < before);
    }

    #[test]
    fn test_compact_preserves_referenced_data() {
        let mut store = PieceTable::new("ABC");
        store.insert(1, "1").unwrap();
        store.insert(3, "2").unwrap();
        store.insert(5, "3").unwrap();
        assert_eq!(store.text(), "A1B2C3");

        store.compact();
        assert_eq!(store.text(), "A1B2C3");
    }

    #[test]
    fn test_auto_compaction_trigger() {
        let mut store = PieceTable::new("Test");
        store.set_gc_threshold(4);
        for i in 0..6 {
            store.insert(4 + i, "x").unwrap();
        }
        assert!(store.ops_since_gc < 6);
        assert_eq!(store.text(), "Testxxxxxx");
    }
}
