//! Row index: an order-statistic AVL tree over line lengths.
//!
//! One node per document row, ordered by row position (the in-order index of a
//! node *is* its row number). Every node carries its subtree size, subtree length
//! sum, and height, which gives O(log n) rank lookups, offset-to-position mapping,
//! and structural edits.
//!
//! Lengths are in *measure units* (characters or bytes, chosen by the
//! [`RowMeasure`] strategy) and exclude the line terminator. Serial offsets, on
//! the other hand, count one terminator unit between consecutive rows, so
//! `offset_of_row` / `position` agree with offsets into the flat document text.

/// Strategy turning one inserted payload into per-row length increments.
///
/// Payloads are split on the internal `'\n'` terminator; a payload without a
/// terminator yields a single segment. The measure decides what "length" means
/// for each segment.
pub trait RowMeasure {
    /// Lengths of the payload's row segments, in measure units.
    fn segments(&self, text: &str) -> Vec<usize>;
}

/// Measures row segments in decoded characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharMeasure;

impl RowMeasure for CharMeasure {
    fn segments(&self, text: &str) -> Vec<usize> {
        text.split('\n').map(|s| s.chars().count()).collect()
    }
}

/// Measures row segments in raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteMeasure;

impl RowMeasure for ByteMeasure {
    fn segments(&self, text: &str) -> Vec<usize> {
        text.split('\n').map(|s| s.len()).collect()
    }
}

/// Errors for row-index mutations with out-of-bounds arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
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
        /// The row's length in measure units.
        len: usize,
    },
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::RowOutOfRange { row, rows } => {
                write!(f, "row {} out of range ({} rows)", row, rows)
            }
            IndexError::ColumnOutOfRange { row, column, len } => {
                write!(f, "column {} out of range on row {} (length {})", column, row, len)
            }
        }
    }
}

impl std::error::Error for IndexError {}

type Link = Option<Box<Node>>;

#[derive(Debug, Clone)]
struct Node {
    /// Row length in measure units, excluding the terminator.
    len: usize,
    /// `1 + size(left) + size(right)`.
    size: usize,
    /// `len + sum(left) + sum(right)`.
    sum: usize,
    /// AVL height of this subtree.
    height: u32,
    left: Link,
    right: Link,
}

impl Node {
    fn leaf(len: usize) -> Box<Node> {
        Box::new(Node {
            len,
            size: 1,
            sum: len,
            height: 1,
            left: None,
            right: None,
        })
    }
}

fn size(link: &Link) -> usize {
    link.as_ref().map_or(0, |n| n.size)
}

fn sum(link: &Link) -> usize {
    link.as_ref().map_or(0, |n| n.sum)
}

fn height(link: &Link) -> u32 {
    link.as_ref().map_or(0, |n| n.height)
}

fn update(node: &mut Node) {
    node.size = 1 + size(&node.left) + size(&node.right);
    node.sum = node.len + sum(&node.left) + sum(&node.right);
    node.height = 1 + height(&node.left).max(height(&node.right));
}

fn balance_factor(node: &Node) -> i32 {
    height(&node.left) as i32 - height(&node.right) as i32
}

fn rotate_right(link: &mut Link) {
    let mut node = link.take().expect("rotate on empty link");
    let mut new_root = node.left.take().expect("left child for right rotation");
    node.left = new_root.right.take();
    update(&mut node);
    new_root.right = Some(node);
    update(&mut new_root);
    *link = Some(new_root);
}

fn rotate_left(link: &mut Link) {
    let mut node = link.take().expect("rotate on empty link");
    let mut new_root = node.right.take().expect("right child for left rotation");
    node.right = new_root.left.take();
    update(&mut node);
    new_root.left = Some(node);
    update(&mut new_root);
    *link = Some(new_root);
}

/// Recompute aggregates and restore `|height(l) - height(r)| <= 1`.
fn rebalance(link: &mut Link) {
    let Some(node) = link.as_mut() else { return };
    update(node);
    let bf = balance_factor(node);
    if bf > 1 {
        if balance_factor(node.left.as_ref().expect("left-heavy")) < 0 {
            rotate_left(&mut node.left);
        }
        rotate_right(link);
    } else if bf < -1 {
        if balance_factor(node.right.as_ref().expect("right-heavy")) > 0 {
            rotate_right(&mut node.right);
        }
        rotate_left(link);
    }
}

/// Insert a new row so that its in-order rank becomes `rank`.
fn insert_at(link: &mut Link, rank: usize, len: usize) {
    match link {
        None => {
            debug_assert_eq!(rank, 0, "insert rank within subtree bounds");
            *link = Some(Node::leaf(len));
        }
        Some(node) => {
            let left_size = size(&node.left);
            if rank <= left_size {
                insert_at(&mut node.left, rank, len);
            } else {
                insert_at(&mut node.right, rank - left_size - 1, len);
            }
            rebalance(link);
        }
    }
}

/// Remove the row at `rank` and return its length.
fn remove_at(link: &mut Link, rank: usize) -> usize {
    let node = link.as_mut().expect("rank within subtree bounds");
    let left_size = size(&node.left);

    let removed = if rank < left_size {
        remove_at(&mut node.left, rank)
    } else if rank > left_size {
        remove_at(&mut node.right, rank - left_size - 1)
    } else {
        let removed = node.len;
        match (node.left.take(), node.right.take()) {
            (None, None) => {
                *link = None;
                return removed;
            }
            (Some(child), None) | (None, Some(child)) => {
                *link = Some(child);
                return removed;
            }
            (left, right) => {
                node.left = left;
                node.right = right;
                // Replace this node's payload with its in-order successor.
                node.len = remove_min(&mut node.right);
                removed
            }
        }
    };

    rebalance(link);
    removed
}

/// Remove the leftmost row of the subtree and return its length.
fn remove_min(link: &mut Link) -> usize {
    let node = link.as_mut().expect("non-empty subtree");
    let removed = if node.left.is_some() {
        let removed = remove_min(&mut node.left);
        rebalance(link);
        removed
    } else {
        let removed = node.len;
        *link = node.right.take();
        removed
    };
    removed
}

/// Apply `f` to the length of the row at `rank`, refreshing sums on the way up.
fn with_len_mut(link: &mut Link, rank: usize, f: impl FnOnce(&mut usize)) {
    let node = link.as_mut().expect("rank within subtree bounds");
    let left_size = size(&node.left);
    if rank < left_size {
        with_len_mut(&mut node.left, rank, f);
    } else if rank > left_size {
        with_len_mut(&mut node.right, rank - left_size - 1, f);
    } else {
        f(&mut node.len);
    }
    update(node);
}

/// Row index over an augmented balanced tree, generic over the unit measure.
///
/// A fresh index always contains one empty row (the empty document has one line).
///
/// # Example
///
/// ```rust
/// use vellum_core::row_index::{CharMeasure, RowIndex};
///
/// let index = RowIndex::from_text("ab\ncdef", CharMeasure);
/// assert_eq!(index.row_count(), 2);
/// assert_eq!(index.row_length(1), Some(4));
/// assert_eq!(index.position(5), (1, 2));
/// ```
#[derive(Debug, Clone)]
pub struct RowIndex<M> {
    root: Link,
    measure: M,
}

impl<M: RowMeasure> RowIndex<M> {
    /// Create an index for the empty document (a single empty row).
    pub fn new(measure: M) -> Self {
        Self {
            root: Some(Node::leaf(0)),
            measure,
        }
    }

    /// Build an index from the initial document text.
    pub fn from_text(text: &str, measure: M) -> Self {
        let mut index = Self {
            root: None,
            measure,
        };
        for (rank, len) in index.measure.segments(text).into_iter().enumerate() {
            insert_at(&mut index.root, rank, len);
        }
        index
    }

    /// Number of rows (always at least 1).
    pub fn row_count(&self) -> usize {
        size(&self.root)
    }

    /// Length of row `row` in measure units, or `None` if out of bounds.
    pub fn row_length(&self, row: usize) -> Option<usize> {
        if row >= self.row_count() {
            return None;
        }
        let mut link = &self.root;
        let mut rank = row;
        loop {
            let node = link.as_ref().expect("row in bounds");
            let left_size = size(&node.left);
            if rank < left_size {
                link = &node.left;
            } else if rank > left_size {
                rank -= left_size + 1;
                link = &node.right;
            } else {
                return Some(node.len);
            }
        }
    }

    /// Serial offset of the first unit of row `row`.
    ///
    /// Each preceding row contributes its length plus one terminator unit.
    pub fn offset_of_row(&self, row: usize) -> Option<usize> {
        if row >= self.row_count() {
            return None;
        }
        let mut link = &self.root;
        let mut rank = row;
        let mut acc = 0usize;
        loop {
            let node = link.as_ref().expect("row in bounds");
            let left_size = size(&node.left);
            if rank < left_size {
                link = &node.left;
            } else if rank > left_size {
                acc += sum(&node.left) + left_size + node.len + 1;
                rank -= left_size + 1;
                link = &node.right;
            } else {
                return Some(acc + sum(&node.left) + left_size);
            }
        }
    }

    /// Total document length in serial units, terminators included.
    pub fn total_len(&self) -> usize {
        sum(&self.root) + self.row_count() - 1
    }

    /// Map a serial offset to `(row, column)`.
    ///
    /// An offset pointing at a terminator maps to the end of its row; offsets past
    /// the end of the document clamp to the last row's end. Cursor clamping is
    /// defined behavior here, not an error.
    pub fn position(&self, serial: usize) -> (usize, usize) {
        let mut s = serial.min(self.total_len());
        let mut link = &self.root;
        let mut row_base = 0usize;
        loop {
            let node = link.as_ref().expect("index is never empty");
            // Units covered by the left subtree, one terminator per row.
            let left_units = sum(&node.left) + size(&node.left);
            if s < left_units {
                link = &node.left;
            } else if s - left_units <= node.len {
                return (row_base + size(&node.left), s - left_units);
            } else {
                s -= left_units + node.len + 1;
                row_base += size(&node.left) + 1;
                link = &node.right;
            }
        }
    }

    /// Insert a payload at `(row, col)`.
    ///
    /// A payload spanning multiple rows updates the target row's length with the
    /// first segment and inserts one new row per additional segment; the tail of
    /// the split row moves to the last inserted row.
    pub fn insert(&mut self, row: usize, col: usize, text: &str) -> Result<(), IndexError> {
        let row_len = self.check_position(row, col)?;
        let segments = self.measure.segments(text);

        if segments.len() == 1 {
            with_len_mut(&mut self.root, row, |len| *len += segments[0]);
            return Ok(());
        }

        let tail = row_len - col;
        with_len_mut(&mut self.root, row, |len| *len = col + segments[0]);
        let last = segments.len() - 1;
        for (i, seg) in segments.into_iter().enumerate().skip(1) {
            let len = if i == last { seg + tail } else { seg };
            insert_at(&mut self.root, row + i, len);
        }
        Ok(())
    }

    /// Delete `len` serial units starting at `(row, col)`.
    ///
    /// A deletion running past the end of the target row consumes following rows:
    /// whole rows are removed, and the final partially-consumed row's suffix is
    /// appended to the target row. The consumed length is clamped to the end of
    /// the document. The boundary policy is exclusive: a deletion ending exactly
    /// at a row boundary does not touch the following row.
    pub fn delete(&mut self, row: usize, col: usize, len: usize) -> Result<(), IndexError> {
        let row_len = self.check_position(row, col)?;

        let tail = row_len - col;
        if len <= tail {
            with_len_mut(&mut self.root, row, |l| *l -= len);
            return Ok(());
        }

        let mut remaining = len - tail;
        with_len_mut(&mut self.root, row, |l| *l = col);

        while remaining > 0 {
            if row + 1 >= self.row_count() {
                // Deletion ran past end of document; clamp.
                break;
            }
            remaining -= 1; // the terminator joining the next row
            let next_len = remove_at(&mut self.root, row + 1);
            if remaining <= next_len {
                let suffix = next_len - remaining;
                with_len_mut(&mut self.root, row, |l| *l += suffix);
                remaining = 0;
            } else {
                remaining -= next_len;
            }
        }
        Ok(())
    }

    /// A structurally independent deep copy sharing no state with the live index.
    pub fn snapshot(&self) -> Self
    where
        M: Clone,
    {
        self.clone()
    }

    /// All row lengths in order. O(n); intended for diagnostics and tests.
    pub fn row_lengths(&self) -> Vec<usize> {
        fn walk(link: &Link, out: &mut Vec<usize>) {
            if let Some(node) = link {
                walk(&node.left, out);
                out.push(node.len);
                walk(&node.right, out);
            }
        }
        let mut out = Vec::with_capacity(self.row_count());
        walk(&self.root, &mut out);
        out
    }

    fn check_position(&self, row: usize, col: usize) -> Result<usize, IndexError> {
        let rows = self.row_count();
        if row >= rows {
            return Err(IndexError::RowOutOfRange { row, rows });
        }
        let len = self.row_length(row).expect("row checked");
        if col > len {
            return Err(IndexError::ColumnOutOfRange {
                row,
                column: col,
                len,
            });
        }
        Ok(len)
    }

    /// Verify the augmented-tree invariants; used by tests after edit sequences.
    #[cfg(test)]
    fn assert_invariants(&self) {
        fn check(link: &Link) -> (usize, usize, u32) {
            let Some(node) = link else { return (0, 0, 0) };
            let (ls, lsum, lh) = check(&node.left);
            let (rs, rsum, rh) = check(&node.right);
            assert_eq!(node.size, 1 + ls + rs, "size invariant");
            assert_eq!(node.sum, node.len + lsum + rsum, "sum invariant");
            assert_eq!(node.height, 1 + lh.max(rh), "height invariant");
            assert!(
                (lh as i32 - rh as i32).abs() <= 1,
                "balance invariant: |{} - {}| > 1",
                lh,
                rh
            );
            (node.size, node.sum, node.height)
        }
        check(&self.root);
        assert!(self.row_count() >= 1, "index is never empty");
    }
}

impl Default for RowIndex<CharMeasure> {
    fn default() -> Self {
        Self::new(CharMeasure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_index(text: &str) -> RowIndex<CharMeasure> {
        RowIndex::from_text(text, CharMeasure)
    }

    #[test]
    fn test_empty_document_has_one_row() {
        let index = RowIndex::new(CharMeasure);
        assert_eq!(index.row_count(), 1);
        assert_eq!(index.row_length(0), Some(0));
        assert_eq!(index.total_len(), 0);
    }

    #[test]
    fn test_from_text() {
        let index = char_index("First line\nSecond line\nThird line");
        assert_eq!(index.row_count(), 3);
        assert_eq!(index.row_length(0), Some(10));
        assert_eq!(index.row_length(1), Some(11));
        assert_eq!(index.row_length(2), Some(10));
        assert_eq!(index.row_length(3), None);
        index.assert_invariants();
    }

    #[test]
    fn test_trailing_terminator_creates_empty_row() {
        let index = char_index("ab\n");
        assert_eq!(index.row_count(), 2);
        assert_eq!(index.row_length(1), Some(0));
    }

    #[test]
    fn test_offset_of_row() {
        let index = char_index("ABC\nDEF\nGHI");
        assert_eq!(index.offset_of_row(0), Some(0));
        assert_eq!(index.offset_of_row(1), Some(4));
        assert_eq!(index.offset_of_row(2), Some(8));
        assert_eq!(index.offset_of_row(3), None);
    }

    #[test]
    fn test_position_round_trip() {
        let index = char_index("ABC\nDEF\nGHI");
        for row in 0..index.row_count() {
            let offset = index.offset_of_row(row).unwrap();
            assert_eq!(index.position(offset), (row, 0));
        }
        assert_eq!(index.position(2), (0, 2));
        // The terminator offset belongs to the end of its row.
        assert_eq!(index.position(3), (0, 3));
        assert_eq!(index.position(4), (1, 0));
    }

    #[test]
    fn test_position_clamps_past_end() {
        let index = char_index("ABC\nDE");
        assert_eq!(index.total_len(), 6);
        assert_eq!(index.position(6), (1, 2));
        assert_eq!(index.position(1000), (1, 2));
    }

    #[test]
    fn test_single_segment_insert() {
        let mut index = char_index("Hello\nWorld");
        index.insert(1, 2, "xyz").unwrap();
        assert_eq!(index.row_lengths(), vec![5, 8]);
        index.assert_invariants();
    }

    #[test]
    fn test_multi_row_insert_splits_tail() {
        let mut index = char_index("HelloWorld");
        index.insert(0, 5, "-\n-").unwrap();
        // "Hello-" / "-World"
        assert_eq!(index.row_lengths(), vec![6, 6]);

        let mut index = char_index("ab");
        index.insert(0, 1, "\n\n").unwrap();
        // "a" / "" / "b"
        assert_eq!(index.row_lengths(), vec![1, 0, 1]);
        index.assert_invariants();
    }

    #[test]
    fn test_delete_within_row() {
        let mut index = char_index("Hello\nWorld");
        index.delete(0, 1, 3).unwrap();
        assert_eq!(index.row_lengths(), vec![2, 5]);
    }

    #[test]
    fn test_delete_merges_rows() {
        // Deleting across the terminator merges the suffix into the first row.
        let mut index = char_index("Hello\nWorld");
        index.delete(0, 3, 5).unwrap();
        // "Hel" + "rld"
        assert_eq!(index.row_lengths(), vec![6]);
        index.assert_invariants();
    }

    #[test]
    fn test_delete_consumes_whole_rows() {
        let mut index = char_index("aa\nbb\ncc\ndd");
        // From (0,1), delete "a\nbb\nc" = 6 units.
        index.delete(0, 1, 6).unwrap();
        // "a" + "c" then "dd" untouched.
        assert_eq!(index.row_lengths(), vec![2, 2]);
        index.assert_invariants();
    }

    #[test]
    fn test_delete_exclusive_boundary() {
        // Deletion ending exactly at a row boundary must not consume the next row.
        let mut index = char_index("aa\nbb\ncc");
        // From (0,1), delete "a\nbb" = 4 units: ends right before bb's terminator.
        index.delete(0, 1, 4).unwrap();
        // "a" keeps bb's terminator after it; "cc" untouched.
        assert_eq!(index.row_lengths(), vec![1, 2]);
    }

    #[test]
    fn test_delete_clamps_to_end_of_document() {
        let mut index = char_index("aa\nbb");
        index.delete(0, 1, 100).unwrap();
        assert_eq!(index.row_lengths(), vec![1]);
        index.assert_invariants();
    }

    #[test]
    fn test_out_of_range_arguments() {
        let mut index = char_index("abc");
        assert!(matches!(
            index.insert(1, 0, "x"),
            Err(IndexError::RowOutOfRange { row: 1, rows: 1 })
        ));
        assert!(matches!(
            index.delete(0, 4, 1),
            Err(IndexError::ColumnOutOfRange { column: 4, .. })
        ));
    }

    #[test]
    fn test_byte_measure() {
        let index = RowIndex::from_text("你好\nab", ByteMeasure);
        assert_eq!(index.row_length(0), Some(6));
        assert_eq!(index.row_length(1), Some(2));
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut index = char_index("one\ntwo");
        let snap = index.snapshot();
        index.insert(0, 0, "zero\n").unwrap();

        assert_eq!(index.row_count(), 3);
        assert_eq!(snap.row_count(), 2);
        assert_eq!(snap.row_lengths(), vec![3, 3]);
    }

    #[test]
    fn test_balance_under_many_inserts() {
        let mut index = RowIndex::new(CharMeasure);
        for _ in 0..1000 {
            let last = index.row_count() - 1;
            index.insert(last, 0, "line\n").unwrap();
        }
        assert_eq!(index.row_count(), 1001);
        index.assert_invariants();
    }

    #[test]
    fn test_sum_matches_flat_text() {
        let text = "alpha\nbeta\n\ngamma delta\nx";
        let index = char_index(text);
        let lengths = index.row_lengths();
        let total: usize = lengths.iter().sum::<usize>() + lengths.len() - 1;
        assert_eq!(total, text.chars().count());
        assert_eq!(index.total_len(), text.chars().count());
    }
}
