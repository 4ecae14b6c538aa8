#![warn(missing_docs)]
//! Vellum Core - headless text-storage engine for interactive editors
//!
//! # Overview
//!
//! `vellum-core` is the document engine beneath an interactive text editor. It
//! stores content, maps between linear offsets and `(row, column)` coordinates,
//! supports undo/redo with edit coalescing, and hands out immutable snapshots
//! for background consumers. It performs no rendering, input decoding, or file
//! I/O; those live with the caller and talk to the engine through the
//! [`Document`] API and [`Snapshot`] values.
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Document (edit engine, undo/redo, preview) │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  Snapshot (immutable versioned views)       │  ← Background consumers
//! ├──────────────────────┬──────────────────────┤
//! │  RowIndex (AVL tree) │ PieceTable (storage) │  ← Leaves
//! └──────────────────────┴──────────────────────┘
//! ```
//!
//! The [`IntervalTree`] is an independent leaf used by highlight consumers (see
//! the `vellum-core-highlight` crate) for overlap-queryable span storage.
//!
//! # Quick Start
//!
//! ```rust
//! use vellum_core::Document;
//!
//! let mut doc = Document::new("fn main() {}\n");
//! doc.insert(0, 11, " /* body */ ").unwrap();
//! doc.flush();
//!
//! assert_eq!(doc.rows(), 2);
//! assert_eq!(doc.text_of_row(0).unwrap(), "fn main() { /* body */ }");
//!
//! doc.undo().unwrap();
//! assert_eq!(doc.text(), "fn main() {}\n");
//! ```
//!
//! # Module Description
//!
//! - [`storage`] - piece-table content store
//! - [`row_index`] - order-statistic AVL tree over row lengths
//! - [`edit`] - edit values, merging, and inversion
//! - [`document`] - the edit engine and change notification
//! - [`snapshot`] - immutable versioned document views
//! - [`intervals`] - augmented interval tree with overlap queries
//! - [`search`] - plain/regex search over document text
//! - [`line_ending`] - LF/CRLF detection and normalization

pub mod document;
pub mod edit;
pub mod intervals;
pub mod line_ending;
pub mod row_index;
pub mod search;
pub mod snapshot;
pub mod storage;

pub use document::{ChangeEvent, ChangeListener, Document, EditError};
pub use edit::{Caret, Edit};
pub use intervals::IntervalTree;
pub use line_ending::LineEnding;
pub use row_index::{ByteMeasure, CharMeasure, IndexError, RowIndex, RowMeasure};
pub use search::{SearchError, SearchMatch, SearchOptions};
pub use snapshot::Snapshot;
pub use storage::{PieceTable, StoreError};
