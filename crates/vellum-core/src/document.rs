//! The document edit engine.
//!
//! [`Document`] owns the piece-table store and the live row index, and is the
//! single writer for both. Caller-facing operations build [`Edit`] values, try to
//! merge them with the most recently queued edit (so consecutive typed characters
//! commit as one undo step), and either defer them in a pending queue or commit
//! them immediately.
//!
//! While edits are queued, reads are served from a per-row preview overlay
//! replayed over the committed text; the committed store and index are only
//! touched on commit. Any edit whose text contains a line terminator is committed
//! immediately, which bounds the overlay to single-row patches.

use std::collections::BTreeMap;
use std::sync::Arc;

use unicode_segmentation::UnicodeSegmentation;

use crate::edit::{Caret, Edit};
use crate::line_ending::LineEnding;
use crate::row_index::{CharMeasure, RowIndex};
use crate::snapshot::Snapshot;
use crate::storage::PieceTable;

/// Errors from caller-facing document operations.
///
/// Range errors are programming errors on the caller's side: arguments are
/// validated up front and nothing is retried or recovered internally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    /// The row argument is not a valid row.
    RowOutOfRange {
        /// Requested row.
        row: usize,
        /// Current row count.
        rows: usize,
    },
    /// The column argument exceeds the row's length.
    ColumnOutOfRange {
        /// Requested row.
        row: usize,
        /// Requested column.
        column: usize,
        /// The row's length in characters.
        len: usize,
    },
    /// An internal structure rejected a supposedly-valid operation.
    ///
    /// This indicates a bookkeeping bug, not caller error.
    Internal(String),
}

impl std::fmt::Display for EditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditError::RowOutOfRange { row, rows } => {
                write!(f, "row {} out of range ({} rows)", row, rows)
            }
            EditError::ColumnOutOfRange { row, column, len } => {
                write!(f, "column {} out of range on row {} (length {})", column, row, len)
            }
            EditError::Internal(msg) => write!(f, "internal document error: {}", msg),
        }
    }
}

impl std::error::Error for EditError {}

/// Change notification delivered to listeners on every commit.
#[derive(Clone)]
pub struct ChangeEvent {
    /// First row affected by the committed edits.
    pub first_row: usize,
    /// Last row affected by the committed edits (pre-edit coordinates).
    pub last_row: usize,
    /// Snapshot of the document after the commit.
    pub snapshot: Arc<Snapshot>,
}

/// Callback invoked with a [`ChangeEvent`] after each commit.
pub type ChangeListener = Box<dyn FnMut(&ChangeEvent) + Send>;

/// The mutable document: content store, row index, pending edits, and history.
///
/// # Example
///
/// ```rust
/// use vellum_core::Document;
///
/// let mut doc = Document::new("hello world");
/// doc.insert(0, 5, ",").unwrap();
/// doc.flush();
/// assert_eq!(doc.text(), "hello, world");
///
/// doc.undo().unwrap();
/// assert_eq!(doc.text(), "hello world");
/// ```
pub struct Document {
    store: PieceTable,
    index: RowIndex<CharMeasure>,
    line_ending: LineEnding,
    /// Committed row texts (terminator-free), shared with snapshots.
    rows: Arc<Vec<String>>,
    /// Queued edits not yet applied to the committed structures.
    pending: Vec<Edit>,
    /// Preview overlay: per-row text replaying the queued edits.
    overlay: BTreeMap<usize, String>,
    /// Inverse edits, most recent last.
    undo_stack: Vec<Edit>,
    redo_stack: Vec<Edit>,
    max_undo: usize,
    /// Undo depth at the last clean point; `None` once the clean state became
    /// unreachable.
    clean_depth: Option<usize>,
    version: u64,
    listeners: Vec<ChangeListener>,
}

impl Document {
    /// Create a document from raw source text.
    ///
    /// The dominant line ending is detected and the content normalized to `'\n'`
    /// internally; [`Document::line_ending`] reports the original flavour so the
    /// caller can restore it when saving.
    pub fn new(text: &str) -> Self {
        let line_ending = LineEnding::detect(text);
        let normalized = line_ending.normalize(text);
        let rows: Vec<String> = normalized.split('\n').map(str::to_string).collect();
        Self {
            store: PieceTable::new(&normalized),
            index: RowIndex::from_text(&normalized, CharMeasure),
            line_ending,
            rows: Arc::new(rows),
            pending: Vec::new(),
            overlay: BTreeMap::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_undo: 1000,
            clean_depth: Some(0),
            version: 0,
            listeners: Vec::new(),
        }
    }

    /// Create an empty document.
    pub fn empty() -> Self {
        Self::new("")
    }

    /// Bound the undo history depth; the oldest steps are dropped beyond it.
    pub fn set_max_undo(&mut self, max_undo: usize) {
        self.max_undo = max_undo.max(1);
    }

    /// The line ending detected when the document was opened.
    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    /// Current committed document version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of rows visible through the preview.
    pub fn rows(&self) -> usize {
        // Queued edits never span rows, so the preview row count matches the
        // committed one.
        self.index.row_count()
    }

    /// Register a listener invoked on every commit.
    pub fn subscribe(&mut self, listener: ChangeListener) {
        self.listeners.push(listener);
    }

    /// Take an immutable snapshot of the current state, overlay included.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::new(Snapshot::new(
            self.version,
            self.index.snapshot(),
            Arc::clone(&self.rows),
            self.overlay.clone(),
        ))
    }

    // ---- queries -----------------------------------------------------------

    /// Text of `row` as seen through the preview overlay.
    pub fn text_of_row(&self, row: usize) -> Option<String> {
        if let Some(masked) = self.overlay.get(&row) {
            return Some(masked.clone());
        }
        if self.rows.is_empty() && row == 0 {
            return Some(String::new());
        }
        self.rows.get(row).cloned()
    }

    /// Full document text as seen through the preview overlay.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for row in 0..self.rows() {
            if row > 0 {
                out.push('\n');
            }
            if let Some(text) = self.text_of_row(row) {
                out.push_str(&text);
            }
        }
        out
    }

    /// Text between two carets (preview view); the carets may be given in either
    /// order and are clamped to the document.
    pub fn text_between(&self, a: Caret, b: Caret) -> String {
        let (from, to) = if a <= b { (a, b) } else { (b, a) };
        let mut out = String::new();
        let last_row = to.row.min(self.rows().saturating_sub(1));
        for row in from.row..=last_row {
            let Some(text) = self.text_of_row(row) else { break };
            let start = if row == from.row { from.col } else { 0 };
            let end = if row == to.row {
                to.col.min(text.chars().count())
            } else {
                text.chars().count()
            };
            if row > from.row {
                out.push('\n');
            }
            if start < end {
                let s = char_to_byte(&text, start);
                let e = char_to_byte(&text, end);
                out.push_str(&text[s..e]);
            }
        }
        out
    }

    /// Serial offset of `(row, col)` in the committed index.
    pub fn serial(&self, row: usize, col: usize) -> Option<usize> {
        Some(self.index.offset_of_row(row)? + col)
    }

    /// Map a committed serial offset to `(row, col)`, clamped past end.
    pub fn position(&self, serial: usize) -> (usize, usize) {
        self.index.position(serial)
    }

    /// Returns `true` if there are edits queued but not yet committed.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Returns `true` if an undo step is available.
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty() || self.has_pending()
    }

    /// Returns `true` if a redo step is available.
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Returns `true` if the document differs from the last clean point.
    pub fn is_modified(&self) -> bool {
        self.has_pending() || self.clean_depth != Some(self.undo_stack.len())
    }

    /// Mark the current committed state as clean (e.g. after saving).
    pub fn mark_clean(&mut self) {
        self.flush();
        self.clean_depth = Some(self.undo_stack.len());
    }

    // ---- edits -------------------------------------------------------------

    /// Insert `text` at `(row, col)`; returns the caret after the inserted text.
    pub fn insert(&mut self, row: usize, col: usize, text: &str) -> Result<Caret, EditError> {
        self.check_position(row, col)?;
        if text.is_empty() {
            return Ok(Caret::new(row, col));
        }
        let text = self.line_ending.normalize(text);
        let to = caret_after_insert(Caret::new(row, col), &text);
        let edit = Edit::Insert {
            from: Caret::new(row, col),
            to,
            text,
        };
        self.queue(edit)?;
        Ok(to)
    }

    /// Delete `len` characters (terminators included) starting at `(row, col)`.
    ///
    /// The length is clamped to the end of the document. Returns the caret at the
    /// deletion start.
    pub fn delete(&mut self, row: usize, col: usize, len: usize) -> Result<Caret, EditError> {
        self.check_position(row, col)?;
        let (text, to) = self.read_forward(row, col, len);
        if text.is_empty() {
            return Ok(Caret::new(row, col));
        }
        let edit = Edit::Delete {
            from: Caret::new(row, col),
            to,
            text,
        };
        self.queue(edit)?;
        Ok(Caret::new(row, col))
    }

    /// Delete the grapheme cluster before `(row, col)`, joining rows at column 0.
    ///
    /// Returns the caret after the deletion.
    pub fn backspace(&mut self, row: usize, col: usize) -> Result<Caret, EditError> {
        self.check_position(row, col)?;
        if col == 0 {
            if row == 0 {
                return Ok(Caret::new(0, 0));
            }
            let prev_len = self.preview_row_len(row - 1);
            self.delete(row - 1, prev_len, 1)?;
            return Ok(Caret::new(row - 1, prev_len));
        }

        let text = self.text_of_row(row).expect("row checked");
        // Walk grapheme clusters to find the boundary preceding `col`.
        let mut start_col = 0;
        let mut chars_before = 0;
        for grapheme in text.graphemes(true) {
            let grapheme_chars = grapheme.chars().count();
            if chars_before + grapheme_chars >= col {
                start_col = chars_before;
                break;
            }
            chars_before += grapheme_chars;
        }
        self.delete(row, start_col, col - start_col)?;
        Ok(Caret::new(row, start_col))
    }

    /// Replace the text between two carets with `text`, as one undoable unit.
    ///
    /// Returns the caret after the inserted text.
    pub fn replace(&mut self, from: Caret, to: Caret, text: &str) -> Result<Caret, EditError> {
        let (from, to) = if from <= to { (from, to) } else { (to, from) };
        self.check_position(from.row, from.col)?;
        self.check_position(to.row, to.col)?;

        let text = self.line_ending.normalize(text);
        let mut members = Vec::with_capacity(2);
        let removed = self.text_between(from, to);
        if !removed.is_empty() {
            members.push(Edit::Delete {
                from,
                to,
                text: removed,
            });
        }
        let caret = if text.is_empty() {
            from
        } else {
            let end = caret_after_insert(from, &text);
            members.push(Edit::Insert {
                from,
                to: end,
                text,
            });
            end
        };

        match members.len() {
            0 => Ok(from),
            1 => {
                let edit = members.pop().expect("checked");
                self.commit_now(edit)?;
                Ok(caret)
            }
            _ => {
                self.commit_now(Edit::Compound(members))?;
                Ok(caret)
            }
        }
    }

    /// Commit all queued edits to the store and index.
    ///
    /// Each queued edit becomes its own undo step; the redo stack is cleared, the
    /// version incremented, the overlay dropped, and listeners notified.
    pub fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let edits = std::mem::take(&mut self.pending);
        let mut first_row = usize::MAX;
        let mut last_row = 0usize;
        for edit in edits {
            first_row = first_row.min(edit.min().row);
            last_row = last_row.max(edit.max().row);
            if let Err(err) = self.apply(&edit) {
                // Queued edits were validated against the preview; failure here
                // means the preview and the committed state diverged.
                debug_assert!(false, "commit of validated edit failed: {}", err);
                continue;
            }
            self.push_undo(edit.flip());
        }
        self.overlay.clear();
        self.redo_stack.clear();
        self.finish_commit(first_row, last_row);
    }

    /// Undo the most recent commit; queued edits are flushed first.
    ///
    /// Returns the caret to place after the undo, or `None` when the history is
    /// empty.
    pub fn undo(&mut self) -> Result<Option<Caret>, EditError> {
        self.flush();
        let Some(edit) = self.undo_stack.pop() else {
            return Ok(None);
        };
        self.apply(&edit)?;
        self.redo_stack.push(edit.flip());
        let caret = resulting_caret(&edit);
        self.finish_commit(edit.min().row, edit.max().row);
        Ok(Some(caret))
    }

    /// Redo the most recently undone commit.
    pub fn redo(&mut self) -> Result<Option<Caret>, EditError> {
        self.flush();
        let Some(edit) = self.redo_stack.pop() else {
            return Ok(None);
        };
        self.apply(&edit)?;
        self.undo_stack.push(edit.flip());
        let caret = resulting_caret(&edit);
        self.finish_commit(edit.min().row, edit.max().row);
        Ok(Some(caret))
    }

    // ---- internals ---------------------------------------------------------

    /// Queue an edit, merging with the last queued edit when possible. Edits
    /// containing a terminator commit immediately.
    fn queue(&mut self, edit: Edit) -> Result<(), EditError> {
        if edit.spans_rows() {
            self.flush();
            return self.commit_now(edit);
        }

        let merged = self
            .pending
            .last()
            .and_then(|last| last.merge(&edit));

        let queued = match merged {
            Some(merged) => {
                // The merged edit replaces the one it absorbed; everything else
                // queued before it is committed for consistency. The absorbed
                // edit's overlay entry is dropped so the merged edit replays
                // cleanly against the committed text.
                self.pending.pop();
                self.flush();
                self.overlay.clear();
                merged
            }
            None => edit,
        };
        self.preview_apply(&queued);
        self.pending.push(queued);
        Ok(())
    }

    /// Commit a single edit directly, bypassing the queue.
    fn commit_now(&mut self, edit: Edit) -> Result<(), EditError> {
        self.flush();
        let (first_row, last_row) = (edit.min().row, edit.max().row);
        self.apply(&edit)?;
        self.push_undo(edit.flip());
        self.overlay.clear();
        self.redo_stack.clear();
        self.finish_commit(first_row, last_row);
        Ok(())
    }

    fn finish_commit(&mut self, first_row: usize, last_row: usize) {
        self.version += 1;
        if first_row == usize::MAX {
            return;
        }
        if self.listeners.is_empty() {
            return;
        }
        let event = ChangeEvent {
            first_row,
            last_row,
            snapshot: self.snapshot(),
        };
        let mut listeners = std::mem::take(&mut self.listeners);
        for listener in listeners.iter_mut() {
            listener(&event);
        }
        self.listeners = listeners;
    }

    fn push_undo(&mut self, inverse: Edit) {
        if self.undo_stack.len() >= self.max_undo {
            self.undo_stack.remove(0);
            match self.clean_depth {
                Some(0) => self.clean_depth = None,
                Some(depth) => self.clean_depth = Some(depth - 1),
                None => {}
            }
        }
        self.undo_stack.push(inverse);
    }

    /// Apply an edit to the committed store, index, and row texts together.
    fn apply(&mut self, edit: &Edit) -> Result<(), EditError> {
        match edit {
            Edit::Insert { from, text, .. } => {
                let serial = self
                    .serial(from.row, from.col)
                    .ok_or_else(|| EditError::Internal(format!("insert row {} vanished", from.row)))?;
                self.store
                    .insert(serial, text)
                    .map_err(|e| EditError::Internal(e.to_string()))?;
                self.index
                    .insert(from.row, from.col, text)
                    .map_err(|e| EditError::Internal(e.to_string()))?;
                rows_insert(Arc::make_mut(&mut self.rows), from.row, from.col, text);
                Ok(())
            }
            Edit::Delete { from, text, .. } => {
                let len = text.chars().count();
                let serial = self
                    .serial(from.row, from.col)
                    .ok_or_else(|| EditError::Internal(format!("delete row {} vanished", from.row)))?;
                self.store
                    .delete(serial, len)
                    .map_err(|e| EditError::Internal(e.to_string()))?;
                self.index
                    .delete(from.row, from.col, len)
                    .map_err(|e| EditError::Internal(e.to_string()))?;
                rows_delete(Arc::make_mut(&mut self.rows), from.row, from.col, len);
                Ok(())
            }
            Edit::Compound(edits) => {
                for edit in edits {
                    self.apply(edit)?;
                }
                Ok(())
            }
        }
    }

    /// Replay a queued single-row edit onto the preview overlay.
    fn preview_apply(&mut self, edit: &Edit) {
        debug_assert!(!edit.spans_rows(), "queued edits are single-row");
        let row = edit.min().row;
        let Some(current) = self.text_of_row(row) else {
            return;
        };
        let updated = match edit {
            Edit::Insert { from, text, .. } => {
                let mut s = current;
                s.insert_str(char_to_byte(&s, from.col), text);
                s
            }
            Edit::Delete { from, text, .. } => {
                let mut s = current;
                let start = char_to_byte(&s, from.col);
                let end = char_to_byte(&s, from.col + text.chars().count());
                s.replace_range(start..end, "");
                s
            }
            Edit::Compound(_) => return,
        };
        self.overlay.insert(row, updated);
    }

    fn preview_row_len(&self, row: usize) -> usize {
        self.text_of_row(row)
            .map(|t| t.chars().count())
            .unwrap_or(0)
    }

    fn check_position(&self, row: usize, col: usize) -> Result<(), EditError> {
        let rows = self.rows();
        if row >= rows {
            return Err(EditError::RowOutOfRange { row, rows });
        }
        let len = self.preview_row_len(row);
        if col > len {
            return Err(EditError::ColumnOutOfRange {
                row,
                column: col,
                len,
            });
        }
        Ok(())
    }

    /// Read `len` characters forward from `(row, col)` in the preview, clamped to
    /// end of document. Returns the text and the caret at the range end.
    fn read_forward(&self, row: usize, col: usize, len: usize) -> (String, Caret) {
        let mut out = String::new();
        let mut at = Caret::new(row, col);
        let mut remaining = len;
        while remaining > 0 {
            let Some(text) = self.text_of_row(at.row) else { break };
            let row_len = text.chars().count();
            let avail = row_len - at.col.min(row_len);
            if remaining <= avail {
                let s = char_to_byte(&text, at.col);
                let e = char_to_byte(&text, at.col + remaining);
                out.push_str(&text[s..e]);
                at = Caret::new(at.row, at.col + remaining);
                remaining = 0;
            } else {
                let s = char_to_byte(&text, at.col);
                out.push_str(&text[s..]);
                remaining -= avail;
                if at.row + 1 >= self.rows() {
                    at = Caret::new(at.row, row_len);
                    break;
                }
                out.push('\n');
                remaining -= 1;
                at = Caret::new(at.row + 1, 0);
            }
        }
        (out, at)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::empty()
    }
}

/// Caret position after inserting `text` at `from`.
fn caret_after_insert(from: Caret, text: &str) -> Caret {
    match text.rfind('\n') {
        None => Caret::new(from.row, from.col + text.chars().count()),
        Some(last_nl) => {
            let rows_added = text.matches('\n').count();
            let tail_chars = text[last_nl + 1..].chars().count();
            Caret::new(from.row + rows_added, tail_chars)
        }
    }
}

/// Caret to restore after applying an undo/redo edit.
fn resulting_caret(edit: &Edit) -> Caret {
    match edit {
        Edit::Insert { to, .. } => *to,
        Edit::Delete { from, .. } => *from,
        Edit::Compound(edits) => edits.last().map(resulting_caret).unwrap_or(Caret::new(0, 0)),
    }
}

/// Byte index of character `ch` within `s`, clamped to the end.
fn char_to_byte(s: &str, ch: usize) -> usize {
    s.char_indices().nth(ch).map(|(b, _)| b).unwrap_or(s.len())
}

/// Patch the committed row texts for an insert at `(row, col)`.
fn rows_insert(rows: &mut Vec<String>, row: usize, col: usize, text: &str) {
    if rows.is_empty() {
        rows.push(String::new());
    }
    let current = rows[row].clone();
    let at = char_to_byte(&current, col);
    if !text.contains('\n') {
        rows[row].insert_str(at, text);
        return;
    }

    let tail = current[at..].to_string();
    let segments: Vec<&str> = text.split('\n').collect();
    let mut replacement = Vec::with_capacity(segments.len());
    let mut head = current[..at].to_string();
    head.push_str(segments[0]);
    replacement.push(head);
    for (i, segment) in segments.iter().enumerate().skip(1) {
        let mut s = segment.to_string();
        if i == segments.len() - 1 {
            s.push_str(&tail);
        }
        replacement.push(s);
    }
    rows.splice(row..=row, replacement);
}

/// Patch the committed row texts for a delete of `len` characters at `(row, col)`.
fn rows_delete(rows: &mut Vec<String>, row: usize, col: usize, len: usize) {
    let current = rows[row].clone();
    let row_chars = current.chars().count();
    let avail = row_chars - col;
    if len <= avail {
        let start = char_to_byte(&current, col);
        let end = char_to_byte(&current, col + len);
        rows[row].replace_range(start..end, "");
        return;
    }

    let prefix = current[..char_to_byte(&current, col)].to_string();
    let mut remaining = len - avail;
    let mut end_row = row;
    let mut suffix = String::new();
    while remaining > 0 && end_row + 1 < rows.len() {
        remaining -= 1; // terminator
        end_row += 1;
        let next = &rows[end_row];
        let next_chars = next.chars().count();
        if remaining <= next_chars {
            suffix = next[char_to_byte(next, remaining)..].to_string();
            remaining = 0;
        } else {
            remaining -= next_chars;
        }
    }
    let mut joined = prefix;
    joined.push_str(&suffix);
    rows.splice(row..=end_row, [joined]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_read() {
        let mut doc = Document::new("hello world");
        let caret = doc.insert(0, 5, ",").unwrap();
        assert_eq!(caret, Caret::new(0, 6));
        assert_eq!(doc.text(), "hello, world");
    }

    #[test]
    fn test_multi_row_insert() {
        let mut doc = Document::new("ab");
        let caret = doc.insert(0, 1, "x\ny").unwrap();
        assert_eq!(caret, Caret::new(1, 1));
        assert_eq!(doc.text(), "ax\nyb");
        assert_eq!(doc.rows(), 2);
        // Terminator edits commit immediately.
        assert!(!doc.has_pending());
    }

    #[test]
    fn test_preview_defers_commit() {
        let mut doc = Document::new("abc");
        let v = doc.version();
        doc.insert(0, 3, "d").unwrap();
        assert!(doc.has_pending());
        assert_eq!(doc.version(), v);
        // Reads see the preview.
        assert_eq!(doc.text_of_row(0).as_deref(), Some("abcd"));

        doc.flush();
        assert!(!doc.has_pending());
        assert_eq!(doc.version(), v + 1);
        assert_eq!(doc.text(), "abcd");
    }

    #[test]
    fn test_typing_merges_into_one_undo_step() {
        let mut doc = Document::empty();
        doc.insert(0, 0, "a").unwrap();
        doc.insert(0, 1, "b").unwrap();
        doc.insert(0, 2, "c").unwrap();
        doc.flush();
        assert_eq!(doc.text(), "abc");

        // One undo removes all three characters.
        let caret = doc.undo().unwrap();
        assert_eq!(doc.text(), "");
        assert_eq!(caret, Some(Caret::new(0, 0)));
    }

    #[test]
    fn test_delete_and_undo() {
        let mut doc = Document::new("hello world");
        doc.delete(0, 5, 6).unwrap();
        doc.flush();
        assert_eq!(doc.text(), "hello");

        doc.undo().unwrap();
        assert_eq!(doc.text(), "hello world");
        doc.redo().unwrap();
        assert_eq!(doc.text(), "hello");
    }

    #[test]
    fn test_delete_across_rows() {
        let mut doc = Document::new("aa\nbb\ncc");
        // Delete "a\nbb\nc" from (0,1).
        doc.delete(0, 1, 6).unwrap();
        assert_eq!(doc.text(), "ac");
        assert_eq!(doc.rows(), 1);

        doc.undo().unwrap();
        assert_eq!(doc.text(), "aa\nbb\ncc");
    }

    #[test]
    fn test_backspace() {
        let mut doc = Document::new("ab\ncd");
        let caret = doc.backspace(1, 1).unwrap();
        assert_eq!(caret, Caret::new(1, 0));
        assert_eq!(doc.text(), "ab\nd");

        // Backspace at column 0 joins rows.
        let caret = doc.backspace(1, 0).unwrap();
        assert_eq!(caret, Caret::new(0, 2));
        assert_eq!(doc.text(), "abd");

        // Backspace at document start is a no-op.
        let caret = doc.backspace(0, 0).unwrap();
        assert_eq!(caret, Caret::new(0, 0));
        assert_eq!(doc.text(), "abd");
    }

    #[test]
    fn test_backspace_removes_whole_grapheme() {
        // "e" + combining acute is one grapheme of two chars.
        let mut doc = Document::new("ae\u{0301}b");
        doc.backspace(0, 3).unwrap();
        assert_eq!(doc.text(), "ab");
    }

    #[test]
    fn test_replace_is_single_undo_unit() {
        let mut doc = Document::new("one two three");
        let caret = doc
            .replace(Caret::new(0, 4), Caret::new(0, 7), "2")
            .unwrap();
        assert_eq!(caret, Caret::new(0, 5));
        assert_eq!(doc.text(), "one 2 three");

        doc.undo().unwrap();
        assert_eq!(doc.text(), "one two three");
        doc.redo().unwrap();
        assert_eq!(doc.text(), "one 2 three");
    }

    #[test]
    fn test_undo_flushes_pending_first() {
        let mut doc = Document::new("x");
        doc.insert(0, 1, "y").unwrap();
        assert!(doc.has_pending());
        doc.undo().unwrap();
        assert_eq!(doc.text(), "x");
        assert!(!doc.has_pending());
    }

    #[test]
    fn test_redo_cleared_by_new_edit() {
        let mut doc = Document::empty();
        doc.insert(0, 0, "a").unwrap();
        doc.flush();
        doc.undo().unwrap();
        assert!(doc.can_redo());

        doc.insert(0, 0, "b").unwrap();
        doc.flush();
        assert!(!doc.can_redo());
        assert_eq!(doc.text(), "b");
    }

    #[test]
    fn test_range_errors() {
        let mut doc = Document::new("abc");
        assert!(matches!(
            doc.insert(1, 0, "x"),
            Err(EditError::RowOutOfRange { row: 1, rows: 1 })
        ));
        assert!(matches!(
            doc.insert(0, 4, "x"),
            Err(EditError::ColumnOutOfRange { column: 4, .. })
        ));
    }

    #[test]
    fn test_change_notification() {
        use std::sync::Mutex;
        use std::sync::atomic::{AtomicUsize, Ordering};

        static COMMITS: AtomicUsize = AtomicUsize::new(0);
        static LAST_RANGE: Mutex<(usize, usize)> = Mutex::new((0, 0));

        let mut doc = Document::new("a\nb\nc");
        doc.subscribe(Box::new(|event| {
            COMMITS.fetch_add(1, Ordering::SeqCst);
            *LAST_RANGE.lock().unwrap() = (event.first_row, event.last_row);
        }));

        doc.insert(1, 0, "x").unwrap();
        doc.flush();
        assert_eq!(COMMITS.load(Ordering::SeqCst), 1);
        assert_eq!(*LAST_RANGE.lock().unwrap(), (1, 1));
    }

    #[test]
    fn test_clean_point_tracking() {
        let mut doc = Document::new("a");
        assert!(!doc.is_modified());
        doc.insert(0, 1, "b").unwrap();
        assert!(doc.is_modified());
        doc.mark_clean();
        assert!(!doc.is_modified());
        doc.undo().unwrap();
        assert!(doc.is_modified());
    }

    #[test]
    fn test_crlf_normalization() {
        let mut doc = Document::new("a\r\nb");
        assert_eq!(doc.line_ending(), LineEnding::Crlf);
        assert_eq!(doc.text(), "a\nb");
        doc.insert(0, 1, "\r\n").unwrap();
        assert_eq!(doc.text(), "a\n\nb");
    }

    #[test]
    fn test_interleaved_insert_delete_sequence() {
        let mut doc = Document::empty();
        doc.insert(0, 0, "1").unwrap();
        doc.insert(0, 1, "\n").unwrap();
        doc.insert(1, 0, "\n").unwrap();
        doc.insert(2, 0, "2").unwrap();
        doc.insert(2, 1, "3").unwrap();
        doc.delete(0, 1, 1).unwrap();
        doc.flush();

        assert_eq!(doc.text(), "1\n23");
        // get(0, 2) and get(2, 2) in serial offsets.
        assert_eq!(doc.store_get(0, 2), "1\n");
        assert_eq!(doc.store_get(2, 2), "23");
    }

    impl Document {
        fn store_get(&self, offset: usize, len: usize) -> String {
            self.store.get(offset, len)
        }
    }
}
