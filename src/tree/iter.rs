//! Ordered iteration: callbacks, iterators and the merge view.

use std::iter::Peekable;
use std::ops::ControlFlow;

use super::cursor::Cursor;
use super::Art;
use crate::encoding::NodePtr;
use crate::leaf::Leaf;
use crate::stats::Op;

impl Art {
    /// Iterate all keys in ascending order.
    pub fn iter(&self) -> Iter<'_> {
        let mut cursor = self.cursor();
        cursor.seek_first();
        Iter { cursor, end: None }
    }

    /// Iterate keys `>= start` in ascending order.
    pub fn iter_from(&self, start: &[u8]) -> Iter<'_> {
        let mut cursor = self.cursor();
        cursor.seek(start);
        Iter { cursor, end: None }
    }

    /// Iterate keys in `[start, end)` in ascending order.
    pub fn iter_range(&self, start: &[u8], end: &[u8]) -> Iter<'_> {
        let mut iter = self.iter_from(start);
        iter.end = Some(end.to_vec());
        iter
    }

    /// Call `f` on every leaf in ascending key order until it breaks.
    pub fn for_each<'a, B>(&'a self, mut f: impl FnMut(Leaf<'a>) -> ControlFlow<B>) -> ControlFlow<B> {
        self.walk(self.root, &mut f)
    }

    /// Call `f` on every leaf with `start <= key < end`, in ascending order,
    /// until it breaks.
    pub fn range<'a, B>(
        &'a self,
        start: &[u8],
        end: &[u8],
        mut f: impl FnMut(Leaf<'a>) -> ControlFlow<B>,
    ) -> ControlFlow<B> {
        self.ops.bump(Op::Range);
        if start >= end {
            return ControlFlow::Continue(());
        }
        let mut cursor = self.cursor();
        let mut leaf = cursor.locate(start);
        while let Some(current) = leaf {
            if current.key() >= end {
                break;
            }
            self.ops.bump(Op::IterRange);
            f(current)?;
            leaf = cursor.move_next();
        }
        ControlFlow::Continue(())
    }

    /// Call `f` on every leaf whose key starts with `prefix`, in ascending
    /// order, until it breaks.
    pub fn for_each_prefix<'a, B>(
        &'a self,
        prefix: &[u8],
        mut f: impl FnMut(Leaf<'a>) -> ControlFlow<B>,
    ) -> ControlFlow<B> {
        let mut ptr = self.root;
        let mut depth = 0;
        loop {
            let addr = match ptr {
                NodePtr::Empty => return ControlFlow::Continue(()),
                NodePtr::Leaf(addr) => {
                    let leaf = self.leaf(addr);
                    if leaf.key().starts_with(prefix) {
                        self.ops.bump(Op::Iter);
                        return f(leaf);
                    }
                    return ControlFlow::Continue(());
                }
                NodePtr::Node(addr) => addr,
            };
            if depth == prefix.len() {
                return self.walk(ptr, &mut f);
            }

            let node = self.node(addr);
            let prefix_len = node.header.prefix_len;
            if prefix_len > 0 {
                let wanted = prefix_len.min(prefix.len() - depth);
                if self.prefix_match_len(addr, prefix, depth) < wanted {
                    return ControlFlow::Continue(());
                }
                if wanted < prefix_len {
                    // The probe ends inside this node's prefix.
                    return self.walk(ptr, &mut f);
                }
                depth += prefix_len;
                if depth == prefix.len() {
                    return self.walk(ptr, &mut f);
                }
            }

            let Some(slot) = node.find(prefix[depth]) else {
                return ControlFlow::Continue(());
            };
            ptr = node.child(slot);
            depth += 1;
        }
    }

    /// Depth-first walk of a subtree in key order.
    fn walk<'a, B>(&'a self, ptr: NodePtr, f: &mut impl FnMut(Leaf<'a>) -> ControlFlow<B>) -> ControlFlow<B> {
        match ptr {
            NodePtr::Empty => ControlFlow::Continue(()),
            NodePtr::Leaf(addr) => {
                self.ops.bump(Op::Iter);
                f(self.leaf(addr))
            }
            NodePtr::Node(addr) => {
                let node = self.node(addr);
                let mut pos = node.first_position();
                while let Some(p) = pos {
                    self.walk(node.child_at(p), f)?;
                    pos = node.next_position(p);
                }
                ControlFlow::Continue(())
            }
        }
    }
}

/// Ascending iterator over leaves, optionally bounded above.
pub struct Iter<'a> {
    cursor: Cursor<'a>,
    end: Option<Vec<u8>>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = Leaf<'a>;

    fn next(&mut self) -> Option<Leaf<'a>> {
        let leaf = self.cursor.leaf()?;
        if self.end.as_deref().is_some_and(|end| leaf.key() >= end) {
            self.cursor.invalidate();
            return None;
        }
        self.cursor.move_next();
        Some(leaf)
    }
}

/// Union of several iterators in ascending key order. A key present in
/// more than one source is yielded once, from the earliest source.
pub struct MergeIter<'a> {
    sources: Vec<Peekable<Iter<'a>>>,
}

impl<'a> MergeIter<'a> {
    pub fn new(sources: impl IntoIterator<Item = Iter<'a>>) -> Self {
        Self {
            sources: sources.into_iter().map(Iterator::peekable).collect(),
        }
    }
}

impl<'a> Iterator for MergeIter<'a> {
    type Item = Leaf<'a>;

    fn next(&mut self) -> Option<Leaf<'a>> {
        let mut best: Option<(usize, &'a [u8])> = None;
        for (i, source) in self.sources.iter_mut().enumerate() {
            let Some(key) = source.peek().map(|l| l.key()) else {
                continue;
            };
            if best.map_or(true, |(_, k)| key < k) {
                best = Some((i, key));
            }
        }
        let (index, key) = best?;
        let leaf = self.sources[index].next()?;
        for source in &mut self.sources {
            while source.peek().is_some_and(|l| l.key() == key) {
                source.next();
            }
        }
        Some(leaf)
    }
}
