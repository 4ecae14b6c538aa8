//! Immutable, versioned document snapshots.
//!
//! A snapshot combines a structural copy of the row index, the committed row
//! texts, and the "dry" overlay of rows with queued-but-uncommitted edits.
//! Background consumers (highlighting, rendering) read snapshots exclusively, so
//! they can never observe a partially-applied multi-row edit on the live
//! structures.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::row_index::{CharMeasure, RowIndex};

/// An immutable view of the document at a specific version.
///
/// Snapshots are produced by the document on every commit and on every preview
/// change, and shared as `Arc<Snapshot>`. Consumers never mutate them.
#[derive(Clone)]
pub struct Snapshot {
    version: u64,
    index: RowIndex<CharMeasure>,
    /// Committed row texts, terminator-free, shared across snapshots of the same
    /// committed state.
    rows: Arc<Vec<String>>,
    /// Uncommitted row texts masking the committed rows.
    overlay: BTreeMap<usize, String>,
}

impl Snapshot {
    pub(crate) fn new(
        version: u64,
        index: RowIndex<CharMeasure>,
        rows: Arc<Vec<String>>,
        overlay: BTreeMap<usize, String>,
    ) -> Self {
        Self {
            version,
            index,
            rows,
            overlay,
        }
    }

    /// The document version this snapshot was taken at.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of rows visible through this snapshot.
    ///
    /// The overlay can extend past the committed rows, so this is the maximum of
    /// the committed row count and `1 +` the highest overlay row.
    pub fn rows(&self) -> usize {
        let committed = self.rows.len().max(1);
        match self.overlay.last_key_value() {
            Some((&row, _)) => committed.max(row + 1),
            None => committed,
        }
    }

    /// Text of `row` with the overlay applied, or `None` when out of bounds.
    pub fn text_of_row(&self, row: usize) -> Option<String> {
        if let Some(masked) = self.overlay.get(&row) {
            return Some(masked.clone());
        }
        if self.rows.is_empty() && row == 0 {
            return Some(String::new());
        }
        self.rows.get(row).cloned()
    }

    /// Full document text with the overlay applied.
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

    /// Serial offset of `(row, col)` in the committed index, or `None` when the
    /// row is out of bounds.
    pub fn serial(&self, row: usize, col: usize) -> Option<usize> {
        Some(self.index.offset_of_row(row)? + col)
    }

    /// Map a serial offset to `(row, col)`; past-end offsets clamp to the last
    /// row's end.
    pub fn position(&self, serial: usize) -> (usize, usize) {
        self.index.position(serial)
    }

    /// The committed row index copy backing this snapshot.
    pub fn row_index(&self) -> &RowIndex<CharMeasure> {
        &self.index
    }

    /// Rows currently masked by the preview overlay.
    pub fn overlay_rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.overlay.keys().copied()
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("version", &self.version)
            .field("rows", &self.rows())
            .field("overlay_rows", &self.overlay.len())
            .finish()
    }
}
