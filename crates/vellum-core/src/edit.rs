//! Edit values: immutable descriptions of document mutations.
//!
//! Every user-facing operation is expressed as an [`Edit`] before it touches the
//! content store or the row index. Edits are plain values: they can be queued,
//! merged with a neighbouring edit, inverted for undo, and replayed.

use std::cmp::Ordering;

/// A caret position: zero-based row and column (in characters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Caret {
    /// Zero-based row.
    pub row: usize,
    /// Zero-based column in characters within the row.
    pub col: usize,
}

impl Caret {
    /// Create a caret at `(row, col)`.
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl Ord for Caret {
    fn cmp(&self, other: &Self) -> Ordering {
        self.row
            .cmp(&other.row)
            .then_with(|| self.col.cmp(&other.col))
    }
}

impl PartialOrd for Caret {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One document mutation, or an ordered group of them.
///
/// `from`/`to` are the caret bounds of the affected text: for an insert, `from`
/// is where typing started and `to` is the caret after the inserted text; for a
/// delete they bound the removed text, which is carried in `text` so the edit
/// can be inverted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    /// Insert `text` between the two carets.
    Insert {
        /// Caret before the inserted text.
        from: Caret,
        /// Caret after the inserted text.
        to: Caret,
        /// The inserted text.
        text: String,
    },
    /// Delete the text between the two carets.
    Delete {
        /// Caret at the start of the removed range.
        from: Caret,
        /// Caret at the end of the removed range.
        to: Caret,
        /// The removed text (needed to build the inverse edit).
        text: String,
    },
    /// An ordered group of edits applied as one undoable unit.
    Compound(Vec<Edit>),
}

/// Coarse classification used by [`Edit::merge`]: consecutive keystrokes merge
/// only while they stay in the same class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Word,
    Space,
    Other,
}

fn char_class(ch: char) -> CharClass {
    if ch.is_alphanumeric() || ch == '_' {
        CharClass::Word
    } else if ch.is_whitespace() {
        CharClass::Space
    } else {
        CharClass::Other
    }
}

impl Edit {
    /// The smaller of the two caret bounds.
    pub fn min(&self) -> Caret {
        match self {
            Edit::Insert { from, to, .. } | Edit::Delete { from, to, .. } => (*from).min(*to),
            Edit::Compound(edits) => edits
                .iter()
                .map(Edit::min)
                .min()
                .unwrap_or(Caret::new(0, 0)),
        }
    }

    /// The larger of the two caret bounds.
    pub fn max(&self) -> Caret {
        match self {
            Edit::Insert { from, to, .. } | Edit::Delete { from, to, .. } => (*from).max(*to),
            Edit::Compound(edits) => edits
                .iter()
                .map(Edit::max)
                .max()
                .unwrap_or(Caret::new(0, 0)),
        }
    }

    /// The text carried by this edit (concatenated in order for compounds).
    pub fn text(&self) -> String {
        match self {
            Edit::Insert { text, .. } | Edit::Delete { text, .. } => text.clone(),
            Edit::Compound(edits) => edits.iter().map(Edit::text).collect(),
        }
    }

    /// The inverse edit: applying `flip()` after the edit restores prior state.
    ///
    /// Compounds reverse their member order *and* flip each member, so undoing a
    /// compound replays inverses strictly back-to-front.
    pub fn flip(&self) -> Edit {
        match self {
            Edit::Insert { from, to, text } => Edit::Delete {
                from: *from,
                to: *to,
                text: text.clone(),
            },
            Edit::Delete { from, to, text } => Edit::Insert {
                from: *from,
                to: *to,
                text: text.clone(),
            },
            Edit::Compound(edits) => {
                Edit::Compound(edits.iter().rev().map(Edit::flip).collect())
            }
        }
    }

    /// Returns `true` if the carried text contains a line terminator.
    ///
    /// Such edits are committed immediately instead of being queued, which bounds
    /// the preview overlay to single-row patches.
    pub fn spans_rows(&self) -> bool {
        match self {
            Edit::Insert { text, .. } | Edit::Delete { text, .. } => text.contains('\n'),
            Edit::Compound(edits) => edits.iter().any(Edit::spans_rows),
        }
    }

    /// Try to merge `next` into `self`, producing the combined edit.
    ///
    /// Merging succeeds only for same-direction, position-adjacent edits whose
    /// texts are single characters of the same class, i.e. consecutive typed
    /// characters. Anything else (direction change, caret jump, class change,
    /// multi-character or multi-row text) returns `None`.
    pub fn merge(&self, next: &Edit) -> Option<Edit> {
        match (self, next) {
            (
                Edit::Insert {
                    from,
                    to,
                    text: prev_text,
                },
                Edit::Insert {
                    from: next_from,
                    to: next_to,
                    text: next_text,
                },
            ) => {
                if to != next_from {
                    return None;
                }
                if !Self::mergeable_chars(prev_text, next_text) {
                    return None;
                }
                let mut text = prev_text.clone();
                text.push_str(next_text);
                Some(Edit::Insert {
                    from: *from,
                    to: *next_to,
                    text,
                })
            }
            (
                Edit::Delete {
                    from,
                    to,
                    text: prev_text,
                },
                Edit::Delete {
                    from: next_from,
                    to: next_to,
                    text: next_text,
                },
            ) => {
                // Backspacing: each deletion ends where the previous one started.
                if next_to != from {
                    return None;
                }
                if !Self::mergeable_chars(next_text, prev_text) {
                    return None;
                }
                let mut text = next_text.clone();
                text.push_str(prev_text);
                Some(Edit::Delete {
                    from: *next_from,
                    to: *to,
                    text,
                })
            }
            _ => None,
        }
    }

    fn mergeable_chars(prev: &str, next: &str) -> bool {
        let mut next_chars = next.chars();
        let (Some(last_prev), Some(first_next), None) =
            (prev.chars().next_back(), next_chars.next(), next_chars.next())
        else {
            return false;
        };
        first_next != '\n' && char_class(last_prev) == char_class(first_next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(from: (usize, usize), to: (usize, usize), text: &str) -> Edit {
        Edit::Insert {
            from: Caret::new(from.0, from.1),
            to: Caret::new(to.0, to.1),
            text: text.to_string(),
        }
    }

    fn delete(from: (usize, usize), to: (usize, usize), text: &str) -> Edit {
        Edit::Delete {
            from: Caret::new(from.0, from.1),
            to: Caret::new(to.0, to.1),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_caret_ordering() {
        assert!(Caret::new(0, 5) < Caret::new(1, 0));
        assert!(Caret::new(1, 2) < Caret::new(1, 3));
        assert_eq!(Caret::new(2, 2), Caret::new(2, 2));
    }

    #[test]
    fn test_flip_round_trip() {
        let edit = insert((0, 0), (0, 3), "abc");
        let flipped = edit.flip();
        assert_eq!(flipped, delete((0, 0), (0, 3), "abc"));
        assert_eq!(flipped.flip(), edit);
    }

    #[test]
    fn test_compound_flip_reverses_order() {
        let compound = Edit::Compound(vec![
            insert((0, 0), (0, 1), "a"),
            delete((1, 0), (1, 2), "bc"),
        ]);
        let flipped = compound.flip();
        let Edit::Compound(members) = &flipped else {
            panic!("flip of compound is compound");
        };
        assert_eq!(members[0], insert((1, 0), (1, 2), "bc"));
        assert_eq!(members[1], delete((0, 0), (0, 1), "a"));
    }

    #[test]
    fn test_merge_consecutive_inserts() {
        let a = insert((0, 0), (0, 1), "a");
        let b = insert((0, 1), (0, 2), "b");
        let merged = a.merge(&b).expect("adjacent same-class inserts merge");
        assert_eq!(merged, insert((0, 0), (0, 2), "ab"));
    }

    #[test]
    fn test_merge_rejects_gap() {
        let a = insert((0, 0), (0, 1), "a");
        let b = insert((0, 5), (0, 6), "b");
        assert!(a.merge(&b).is_none());
    }

    #[test]
    fn test_merge_rejects_class_change() {
        let a = insert((0, 0), (0, 1), "a");
        let space = insert((0, 1), (0, 2), " ");
        assert!(a.merge(&space).is_none());
    }

    #[test]
    fn test_merge_rejects_newline_and_multichar() {
        let a = insert((0, 0), (0, 1), "a");
        let newline = insert((0, 1), (1, 0), "\n");
        assert!(a.merge(&newline).is_none());

        let multi = insert((0, 1), (0, 4), "abc");
        assert!(a.merge(&multi).is_none());
    }

    #[test]
    fn test_merge_rejects_direction_change() {
        let a = insert((0, 0), (0, 1), "a");
        let d = delete((0, 0), (0, 1), "a");
        assert!(a.merge(&d).is_none());
    }

    #[test]
    fn test_merge_backspaces() {
        // Backspace over "ab": first deletes 'b' at (0,1)..(0,2), then 'a'.
        let first = delete((0, 1), (0, 2), "b");
        let second = delete((0, 0), (0, 1), "a");
        let merged = first.merge(&second).expect("consecutive backspaces merge");
        assert_eq!(merged, delete((0, 0), (0, 2), "ab"));
    }

    #[test]
    fn test_bounds_and_text() {
        let edit = delete((1, 2), (3, 0), "xy\nz\n");
        assert_eq!(edit.min(), Caret::new(1, 2));
        assert_eq!(edit.max(), Caret::new(3, 0));
        assert_eq!(edit.text(), "xy\nz\n");
        assert!(edit.spans_rows());
    }

    #[test]
    fn test_compound_bounds() {
        let compound = Edit::Compound(vec![
            insert((2, 0), (2, 1), "a"),
            insert((0, 3), (0, 4), "b"),
        ]);
        assert_eq!(compound.min(), Caret::new(0, 3));
        assert_eq!(compound.max(), Caret::new(2, 1));
    }
}
