//! Highlight interval index: an augmented AVL tree with overlap queries.
//!
//! Nodes are ordered by `(start, end)` and each tracks the maximum `end` across
//! its subtree, which lets an overlap query prune every subtree whose maximum end
//! precedes the query start. Intervals with identical bounds but distinct
//! payloads share one node rather than duplicating tree entries.
//!
//! The tree also supports shifting stored intervals when text is inserted or
//! deleted, so highlight spans track document edits between re-parses.

type Link<T> = Option<Box<Node<T>>>;

#[derive(Debug, Clone)]
struct Node<T> {
    start: usize,
    end: usize,
    /// Maximum `end` over this node and both subtrees.
    max_end: usize,
    height: u32,
    /// Distinct payloads attached to this exact `(start, end)` key.
    payloads: Vec<T>,
    left: Link<T>,
    right: Link<T>,
}

fn height<T>(link: &Link<T>) -> u32 {
    link.as_ref().map_or(0, |n| n.height)
}

fn max_end<T>(link: &Link<T>) -> usize {
    link.as_ref().map_or(0, |n| n.max_end)
}

fn update<T>(node: &mut Node<T>) {
    node.height = 1 + height(&node.left).max(height(&node.right));
    node.max_end = node
        .end
        .max(max_end(&node.left))
        .max(max_end(&node.right));
}

fn balance_factor<T>(node: &Node<T>) -> i32 {
    height(&node.left) as i32 - height(&node.right) as i32
}

fn rotate_right<T>(link: &mut Link<T>) {
    let mut node = link.take().expect("rotate on empty link");
    let mut new_root = node.left.take().expect("left child for right rotation");
    node.left = new_root.right.take();
    update(&mut node);
    new_root.right = Some(node);
    update(&mut new_root);
    *link = Some(new_root);
}

fn rotate_left<T>(link: &mut Link<T>) {
    let mut node = link.take().expect("rotate on empty link");
    let mut new_root = node.right.take().expect("right child for left rotation");
    node.right = new_root.left.take();
    update(&mut node);
    new_root.left = Some(node);
    update(&mut new_root);
    *link = Some(new_root);
}

fn rebalance<T>(link: &mut Link<T>) {
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

/// Interval index keyed by `(start, end)` half-open ranges with payloads of `T`.
///
/// # Example
///
/// ```rust
/// use vellum_core::IntervalTree;
///
/// let mut tree = IntervalTree::new();
/// tree.insert(0, 5, "a");
/// tree.insert(3, 8, "b");
///
/// let hits = tree.query_overlapping(4, 4);
/// assert_eq!(hits.len(), 2);
/// assert!(tree.query_overlapping(9, 10).is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct IntervalTree<T> {
    root: Link<T>,
    len: usize,
}

impl<T> IntervalTree<T> {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self { root: None, len: 0 }
    }

    /// Number of stored intervals (payload entries, not nodes).
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no intervals are stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drop all intervals.
    pub fn clear(&mut self) {
        self.root = None;
        self.len = 0;
    }
}

impl<T: PartialEq> IntervalTree<T> {
    /// Insert `(start, end, payload)`.
    ///
    /// An identical `(start, end)` key stores the payload on the existing node;
    /// an exact duplicate (same bounds *and* payload) is ignored. Returns `true`
    /// if the interval was added.
    pub fn insert(&mut self, start: usize, end: usize, payload: T) -> bool {
        fn go<T: PartialEq>(link: &mut Link<T>, start: usize, end: usize, payload: T) -> bool {
            match link {
                None => {
                    *link = Some(Box::new(Node {
                        start,
                        end,
                        max_end: end,
                        height: 1,
                        payloads: vec![payload],
                        left: None,
                        right: None,
                    }));
                    true
                }
                Some(node) => {
                    let added = match (start, end).cmp(&(node.start, node.end)) {
                        std::cmp::Ordering::Less => go(&mut node.left, start, end, payload),
                        std::cmp::Ordering::Greater => go(&mut node.right, start, end, payload),
                        std::cmp::Ordering::Equal => {
                            if node.payloads.contains(&payload) {
                                false
                            } else {
                                node.payloads.push(payload);
                                true
                            }
                        }
                    };
                    rebalance(link);
                    added
                }
            }
        }

        let added = go(&mut self.root, start, end, payload);
        if added {
            self.len += 1;
        }
        added
    }

    /// Remove the interval with exactly these bounds and payload.
    pub fn remove(&mut self, start: usize, end: usize, payload: &T) -> bool {
        fn go<T: PartialEq>(link: &mut Link<T>, start: usize, end: usize, payload: &T) -> bool {
            let Some(node) = link.as_mut() else {
                return false;
            };
            let removed = match (start, end).cmp(&(node.start, node.end)) {
                std::cmp::Ordering::Less => go(&mut node.left, start, end, payload),
                std::cmp::Ordering::Greater => go(&mut node.right, start, end, payload),
                std::cmp::Ordering::Equal => {
                    let Some(idx) = node.payloads.iter().position(|p| p == payload) else {
                        return false;
                    };
                    node.payloads.remove(idx);
                    if node.payloads.is_empty() {
                        remove_node(link);
                        return true;
                    }
                    true
                }
            };
            rebalance(link);
            removed
        }

        let removed = go(&mut self.root, start, end, payload);
        if removed {
            self.len -= 1;
        }
        removed
    }

    /// Returns `true` if an interval with these bounds and payload is stored.
    pub fn contains(&self, start: usize, end: usize, payload: &T) -> bool {
        let mut link = &self.root;
        while let Some(node) = link {
            match (start, end).cmp(&(node.start, node.end)) {
                std::cmp::Ordering::Less => link = &node.left,
                std::cmp::Ordering::Greater => link = &node.right,
                std::cmp::Ordering::Equal => return node.payloads.contains(payload),
            }
        }
        false
    }
}

impl<T> IntervalTree<T> {
    /// All intervals overlapping the query range, in key order.
    ///
    /// The query endpoints are inclusive: a point query `(p, p)` returns every
    /// interval containing `p`. Subtrees whose maximum end does not reach past
    /// the query start are pruned without being visited.
    pub fn query_overlapping(&self, start: usize, end: usize) -> Vec<(usize, usize, &T)> {
        fn go<'a, T>(
            link: &'a Link<T>,
            start: usize,
            end: usize,
            out: &mut Vec<(usize, usize, &'a T)>,
        ) {
            let Some(node) = link else { return };
            // Descend left only while something there can still reach the query.
            if max_end(&node.left) > start {
                go(&node.left, start, end, out);
            }
            if node.start <= end && node.end > start {
                for payload in &node.payloads {
                    out.push((node.start, node.end, payload));
                }
            }
            // Keys right of the query start cannot overlap once start > end.
            if node.start <= end {
                go(&node.right, start, end, out);
            }
        }

        let mut out = Vec::new();
        go(&self.root, start, end, &mut out);
        out
    }

    /// In-order iteration over `(start, end, payload)` entries.
    pub fn iter(&self) -> Iter<'_, T> {
        let mut iter = Iter {
            stack: Vec::new(),
            current: None,
            payload_idx: 0,
        };
        iter.push_left(&self.root);
        iter
    }

    /// Shift intervals for an insertion of `delta` units at `pos`.
    ///
    /// Intervals starting at or after `pos` move right; intervals spanning `pos`
    /// grow.
    pub fn shift_for_insertion(&mut self, pos: usize, delta: usize)
    where
        T: Clone,
    {
        if delta == 0 {
            return;
        }
        self.rebuild_with(|start, end| {
            if start >= pos {
                Some((start + delta, end + delta))
            } else if end > pos {
                Some((start, end + delta))
            } else {
                Some((start, end))
            }
        });
    }

    /// Shift intervals for a deletion of the range `[start, end)`.
    ///
    /// Intervals fully inside the deleted range are dropped; boundary-crossing
    /// intervals shrink; later intervals move left.
    pub fn shift_for_deletion(&mut self, del_start: usize, del_end: usize)
    where
        T: Clone,
    {
        if del_start >= del_end {
            return;
        }
        let delta = del_end - del_start;
        self.rebuild_with(|start, end| {
            if end <= del_start {
                Some((start, end))
            } else if start >= del_end {
                Some((start - delta, end - delta))
            } else if start >= del_start && end <= del_end {
                None
            } else if start < del_start && end > del_end {
                Some((start, end - delta))
            } else if start < del_start {
                Some((start, del_start))
            } else {
                Some((del_start, end - delta))
            }
        });
    }

    /// Rebuild the tree applying `f` to every interval's bounds; `None` drops it.
    fn rebuild_with(&mut self, f: impl Fn(usize, usize) -> Option<(usize, usize)>)
    where
        T: Clone,
    {
        let mut entries: Vec<(usize, usize, T)> = self
            .iter()
            .filter_map(|(start, end, payload)| {
                f(start, end).map(|(s, e)| (s, e, payload.clone()))
            })
            .collect();
        // Shifts can reorder ties on equal starts; restore key order before the
        // balanced rebuild.
        entries.sort_by_key(|&(start, end, _)| (start, end));

        self.clear();
        let grouped = group_by_key(entries);
        self.len = grouped.iter().map(|(_, _, p)| p.len()).sum();
        self.root = build_balanced(&mut grouped.into_iter());
    }
}

/// Group sorted entries by `(start, end)` into payload vectors.
fn group_by_key<T>(entries: Vec<(usize, usize, T)>) -> Vec<(usize, usize, Vec<T>)> {
    let mut grouped: Vec<(usize, usize, Vec<T>)> = Vec::new();
    for (start, end, payload) in entries {
        match grouped.last_mut() {
            Some((s, e, payloads)) if *s == start && *e == end => payloads.push(payload),
            _ => grouped.push((start, end, vec![payload])),
        }
    }
    grouped
}

/// Build a height-balanced tree from grouped nodes; consumes the iterator
/// in order using its exact length.
fn build_balanced<T, I>(entries: &mut I) -> Link<T>
where
    I: ExactSizeIterator<Item = (usize, usize, Vec<T>)>,
{
    fn go<T>(
        entries: &mut impl Iterator<Item = (usize, usize, Vec<T>)>,
        count: usize,
    ) -> Link<T> {
        if count == 0 {
            return None;
        }
        let left_count = count / 2;
        let left = go(entries, left_count);
        let (start, end, payloads) = entries.next().expect("count entries available");
        let right = go(entries, count - left_count - 1);
        let mut node = Box::new(Node {
            start,
            end,
            max_end: end,
            height: 1,
            payloads,
            left,
            right,
        });
        update(&mut node);
        Some(node)
    }

    let count = entries.len();
    go(entries, count)
}

/// Standard AVL node removal: splice out, or replace with in-order successor.
fn remove_node<T>(link: &mut Link<T>) {
    let node = link.as_mut().expect("node to remove");
    match (node.left.take(), node.right.take()) {
        (None, None) => *link = None,
        (Some(child), None) | (None, Some(child)) => *link = Some(child),
        (left, right) => {
            node.left = left;
            node.right = right;
            let successor = pop_min(&mut node.right).expect("right subtree non-empty");
            node.start = successor.start;
            node.end = successor.end;
            node.payloads = successor.payloads;
            rebalance(link);
        }
    }
}

fn pop_min<T>(link: &mut Link<T>) -> Option<Box<Node<T>>> {
    let node = link.as_mut()?;
    let popped = if node.left.is_some() {
        let popped = pop_min(&mut node.left);
        rebalance(link);
        popped
    } else {
        let mut node = link.take().expect("checked");
        *link = node.right.take();
        Some(node)
    };
    popped
}

impl<T> Default for IntervalTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// In-order iterator over tree entries.
pub struct Iter<'a, T> {
    stack: Vec<&'a Node<T>>,
    current: Option<&'a Node<T>>,
    payload_idx: usize,
}

impl<'a, T> Iter<'a, T> {
    fn push_left(&mut self, mut link: &'a Link<T>) {
        while let Some(node) = link {
            self.stack.push(node);
            link = &node.left;
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (usize, usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(node) = self.current {
                if self.payload_idx < node.payloads.len() {
                    let item = (node.start, node.end, &node.payloads[self.payload_idx]);
                    self.payload_idx += 1;
                    return Some(item);
                }
                self.current = None;
            }
            let node = self.stack.pop()?;
            self.push_left(&node.right);
            self.current = Some(node);
            self.payload_idx = 0;
        }
    }
}
