//! Traces and cursors.
//!
//! Nodes have no parent pointers. A trace records the path from the root to
//! the current leaf as `(node, position)` pairs, so stepping to a neighbour
//! only touches the levels that change.

use std::cmp::Ordering;

use smallvec::SmallVec;

use super::Art;
use crate::address::LogicalAddress;
use crate::encoding::NodePtr;
use crate::leaf::{Leaf, LeafOptions};
use crate::node::{Position, Predicate};
use crate::stats::Op;

/// One level of a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TraceElement {
    pub(crate) node: LogicalAddress,
    pub(crate) position: Position,
    pub(crate) child: NodePtr,
}

pub(crate) type Trace = SmallVec<[TraceElement; 16]>;

impl Art {
    fn push_position(&self, trace: &mut Trace, node: LogicalAddress, position: Position) -> NodePtr {
        let child = self.node(node).child_at(position);
        trace.push(TraceElement { node, position, child });
        child
    }

    /// Descend from `ptr` along first (or last) positions, recording each
    /// level, and return the leaf reached.
    pub(crate) fn extend_trace(&self, trace: &mut Trace, mut ptr: NodePtr, last: bool) -> Option<LogicalAddress> {
        loop {
            match ptr {
                NodePtr::Empty => return None,
                NodePtr::Leaf(addr) => return Some(addr),
                NodePtr::Node(addr) => {
                    let node = self.node(addr);
                    let pos = if last {
                        node.last_position()
                    } else {
                        node.first_position()
                    };
                    let Some(pos) = pos else {
                        panic!("internal node {} has no entries", addr);
                    };
                    ptr = self.push_position(trace, addr, pos);
                }
            }
        }
    }

    /// Advance the trace to the next leaf in key order.
    pub(crate) fn increment_trace(&self, trace: &mut Trace) -> Option<LogicalAddress> {
        while let Some(top) = trace.last_mut() {
            let node = self.node(top.node);
            if let Some(pos) = node.next_position(top.position) {
                top.position = pos;
                top.child = node.child_at(pos);
                let child = top.child;
                return self.extend_trace(trace, child, false);
            }
            trace.pop();
        }
        None
    }

    /// Move the trace to the previous leaf in key order.
    pub(crate) fn decrement_trace(&self, trace: &mut Trace) -> Option<LogicalAddress> {
        while let Some(top) = trace.last_mut() {
            let node = self.node(top.node);
            if let Some(pos) = node.prev_position(top.position) {
                top.position = pos;
                top.child = node.child_at(pos);
                let child = top.child;
                return self.extend_trace(trace, child, true);
            }
            trace.pop();
        }
        None
    }

    /// Order of the node's full prefix against `key[depth..]`. A key that
    /// ends inside the prefix sorts below every key in the subtree.
    fn compare_prefix(&self, addr: LogicalAddress, key: &[u8], depth: usize) -> Ordering {
        let prefix_len = self.node(addr).header.prefix_len;
        let available = key.len() - depth;
        let matched = self.prefix_match_len(addr, key, depth);
        if matched == prefix_len {
            return Ordering::Equal;
        }
        if matched == available {
            return Ordering::Greater;
        }
        let prefix = self.load_prefix(addr, depth);
        prefix[matched].cmp(&key[depth + matched])
    }

    /// Position `trace` on the smallest leaf whose key is `>= key`.
    pub(crate) fn seek_trace(&self, trace: &mut Trace, key: &[u8]) -> Option<LogicalAddress> {
        trace.clear();
        let mut ptr = self.root;
        let mut depth = 0;
        loop {
            let addr = match ptr {
                NodePtr::Empty => return None,
                NodePtr::Leaf(addr) => {
                    return if self.leaf(addr).key() >= key {
                        Some(addr)
                    } else {
                        self.increment_trace(trace)
                    };
                }
                NodePtr::Node(addr) => addr,
            };

            let node = self.node(addr);
            if node.header.prefix_len > 0 {
                match self.compare_prefix(addr, key, depth) {
                    Ordering::Greater => return self.extend_trace(trace, ptr, false),
                    Ordering::Less => return self.increment_trace(trace),
                    Ordering::Equal => depth += node.header.prefix_len,
                }
            }
            if depth == key.len() {
                return self.extend_trace(trace, ptr, false);
            }

            match node.lower_bound_child(key[depth]) {
                Some((pos, true)) => {
                    ptr = self.push_position(trace, addr, pos);
                    depth += 1;
                }
                Some((pos, false)) => {
                    let child = self.push_position(trace, addr, pos);
                    return self.extend_trace(trace, child, false);
                }
                None => {
                    // Every entry here sorts below the key.
                    let Some(pos) = node.last_position() else {
                        panic!("internal node {} has no entries", addr);
                    };
                    self.push_position(trace, addr, pos);
                    return self.increment_trace(trace);
                }
            }
        }
    }

    /// Position `trace` on the largest leaf whose key is `<= key`.
    pub(crate) fn seek_floor_trace(&self, trace: &mut Trace, key: &[u8]) -> Option<LogicalAddress> {
        trace.clear();
        let mut ptr = self.root;
        let mut depth = 0;
        loop {
            let addr = match ptr {
                NodePtr::Empty => return None,
                NodePtr::Leaf(addr) => {
                    return if self.leaf(addr).key() <= key {
                        Some(addr)
                    } else {
                        self.decrement_trace(trace)
                    };
                }
                NodePtr::Node(addr) => addr,
            };

            let node = self.node(addr);
            if node.header.prefix_len > 0 {
                match self.compare_prefix(addr, key, depth) {
                    Ordering::Greater => return self.decrement_trace(trace),
                    Ordering::Less => return self.extend_trace(trace, ptr, true),
                    Ordering::Equal => depth += node.header.prefix_len,
                }
            }
            if depth == key.len() {
                return self.floor_at_terminal(trace, addr);
            }

            match node.index(key[depth], Predicate::LessEqual) {
                Some(pos @ Position::Child { key: byte, .. }) if byte == key[depth] => {
                    ptr = self.push_position(trace, addr, pos);
                    depth += 1;
                }
                Some(pos) => {
                    let child = self.push_position(trace, addr, pos);
                    return self.extend_trace(trace, child, true);
                }
                // Every child sorts above the key.
                None => return self.floor_at_terminal(trace, addr),
            }
        }
    }

    /// The node's terminal when it has one, else the leaf before the node.
    fn floor_at_terminal(&self, trace: &mut Trace, addr: LogicalAddress) -> Option<LogicalAddress> {
        let terminal = self.node(addr).header.terminal;
        if terminal.is_null() {
            return self.decrement_trace(trace);
        }
        self.push_position(trace, addr, Position::Terminal);
        Some(terminal)
    }

    /// Smallest leaf whose key is `>= key`.
    pub fn lower_bound(&self, key: &[u8]) -> Option<Leaf<'_>> {
        self.ops.bump(Op::LowerBound);
        let mut trace = Trace::new();
        self.seek_trace(&mut trace, key).map(|a| self.leaf(a))
    }

    /// An unpositioned cursor.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor {
            tree: self,
            trace: Trace::new(),
            current: None,
        }
    }

    /// An unpositioned cursor that can rewrite or remove the leaf under it.
    pub fn cursor_mut(&mut self) -> CursorMut<'_> {
        CursorMut {
            tree: self,
            trace: Trace::new(),
            current: None,
        }
    }

    fn count_leaves(&self, ptr: NodePtr) -> usize {
        match ptr {
            NodePtr::Empty => 0,
            NodePtr::Leaf(_) => 1,
            NodePtr::Node(addr) => {
                let node = self.node(addr);
                let mut count = 0;
                let mut pos = node.first_position();
                while let Some(p) = pos {
                    count += self.count_leaves(node.child_at(p));
                    pos = node.next_position(p);
                }
                count
            }
        }
    }

    /// Number of leaves sorting before a trace position. Past the end is
    /// `len`.
    fn rank(&self, trace: &Trace, current: Option<LogicalAddress>) -> usize {
        if current.is_none() {
            return self.len;
        }
        trace
            .iter()
            .map(|level| {
                let node = self.node(level.node);
                let mut before = 0;
                let mut pos = node.first_position();
                while let Some(p) = pos.filter(|&p| p != level.position) {
                    before += self.count_leaves(node.child_at(p));
                    pos = node.next_position(p);
                }
                before
            })
            .sum()
    }

    /// Keys from `from` up to `to`, counted by stepping a copy of the trace.
    fn signed_steps(&self, from: (&Trace, Option<LogicalAddress>), to: (&Trace, Option<LogicalAddress>)) -> i64 {
        let key = |addr: Option<LogicalAddress>| addr.map(|a| self.leaf(a).key());
        let walk = |(trace, start): (&Trace, Option<LogicalAddress>), end: Option<LogicalAddress>| {
            let mut trace = trace.clone();
            let mut current = start;
            let mut steps = 0i64;
            while current != end {
                assert!(current.is_some(), "cursor walk ran past its target");
                current = self.increment_trace(&mut trace);
                steps += 1;
            }
            steps
        };
        match position_order(key(from.1), key(to.1)) {
            Ordering::Equal => 0,
            Ordering::Less => walk(from, to.1),
            Ordering::Greater => -walk(to, from.1),
        }
    }
}

/// Order of two cursor keys, `None` standing past the last key.
fn position_order(a: Option<&[u8]>, b: Option<&[u8]>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => a.cmp(b),
    }
}

/// Bidirectional position in a tree.
///
/// Holds a shared borrow of the tree, so the tree cannot change while the
/// cursor is alive. Once a move runs off either end the cursor is
/// exhausted until it is positioned again.
pub struct Cursor<'a> {
    tree: &'a Art,
    trace: Trace,
    current: Option<LogicalAddress>,
}

impl<'a> Cursor<'a> {
    /// Position on the smallest key `>= key`.
    pub fn seek(&mut self, key: &[u8]) -> Option<Leaf<'a>> {
        self.tree.ops.bump(Op::LowerBound);
        self.locate(key)
    }

    /// Position on the largest key `<= key`.
    pub fn seek_floor(&mut self, key: &[u8]) -> Option<Leaf<'a>> {
        self.current = self.tree.seek_floor_trace(&mut self.trace, key);
        self.leaf()
    }

    /// Same as [`seek`](Self::seek) without counting a lower-bound operation.
    pub(crate) fn locate(&mut self, key: &[u8]) -> Option<Leaf<'a>> {
        self.current = self.tree.seek_trace(&mut self.trace, key);
        self.leaf()
    }

    pub fn seek_first(&mut self) -> Option<Leaf<'a>> {
        self.trace.clear();
        self.current = self.tree.extend_trace(&mut self.trace, self.tree.root, false);
        self.leaf()
    }

    pub fn seek_last(&mut self) -> Option<Leaf<'a>> {
        self.trace.clear();
        self.current = self.tree.extend_trace(&mut self.trace, self.tree.root, true);
        self.leaf()
    }

    /// Step to the next key.
    pub fn move_next(&mut self) -> Option<Leaf<'a>> {
        if self.current.is_some() {
            self.current = self.tree.increment_trace(&mut self.trace);
        }
        self.leaf()
    }

    /// Step to the previous key.
    pub fn move_prev(&mut self) -> Option<Leaf<'a>> {
        if self.current.is_some() {
            self.current = self.tree.decrement_trace(&mut self.trace);
        }
        self.leaf()
    }

    /// Leaf under the cursor.
    pub fn leaf(&self) -> Option<Leaf<'a>> {
        let tree: &'a Art = self.tree;
        self.current.map(|a| tree.leaf(a))
    }

    pub fn key(&self) -> Option<&'a [u8]> {
        self.leaf().map(|l| l.key())
    }

    pub fn value(&self) -> Option<&'a [u8]> {
        self.leaf().map(|l| l.value())
    }

    pub fn is_valid(&self) -> bool {
        self.current.is_some()
    }

    /// Number of internal nodes on the current path.
    pub fn depth(&self) -> usize {
        self.trace.len()
    }

    /// Signed number of keys from this position to `other`'s: positive
    /// when `other` sorts after. An exhausted or unpositioned cursor stands
    /// past the last key. Steps leaf by leaf.
    pub fn distance(&self, other: &Cursor<'_>) -> i64 {
        assert!(std::ptr::eq(self.tree, other.tree), "cursors over different trees");
        self.tree
            .signed_steps((&self.trace, self.current), (&other.trace, other.current))
    }

    /// [`distance`](Self::distance) to where [`seek`](Self::seek) would land
    /// for `key`.
    pub fn distance_to(&self, key: &[u8]) -> i64 {
        let mut trace = Trace::new();
        let target = self.tree.seek_trace(&mut trace, key);
        self.tree.signed_steps((&self.trace, self.current), (&trace, target))
    }

    /// Same result as [`distance`](Self::distance), computed from the two
    /// traces by counting the subtrees to the left of each path.
    pub fn fast_distance(&self, other: &Cursor<'_>) -> i64 {
        assert!(std::ptr::eq(self.tree, other.tree), "cursors over different trees");
        let to = self.tree.rank(&other.trace, other.current) as i64;
        let from = self.tree.rank(&self.trace, self.current) as i64;
        to - from
    }

    pub(crate) fn invalidate(&mut self) {
        self.trace.clear();
        self.current = None;
    }
}

/// Cursor holding the tree exclusively, for in-place edits while walking.
///
/// Every edit goes through the tree's own insert and remove paths, then
/// re-seeks, so the trace stays valid across grow, shrink and collapse.
pub struct CursorMut<'a> {
    tree: &'a mut Art,
    trace: Trace,
    current: Option<LogicalAddress>,
}

impl CursorMut<'_> {
    pub fn seek(&mut self, key: &[u8]) -> Option<Leaf<'_>> {
        self.tree.ops.bump(Op::LowerBound);
        self.current = self.tree.seek_trace(&mut self.trace, key);
        self.leaf()
    }

    pub fn seek_first(&mut self) -> Option<Leaf<'_>> {
        self.trace.clear();
        self.current = self.tree.extend_trace(&mut self.trace, self.tree.root, false);
        self.leaf()
    }

    pub fn seek_last(&mut self) -> Option<Leaf<'_>> {
        self.trace.clear();
        self.current = self.tree.extend_trace(&mut self.trace, self.tree.root, true);
        self.leaf()
    }

    pub fn move_next(&mut self) -> Option<Leaf<'_>> {
        if self.current.is_some() {
            self.current = self.tree.increment_trace(&mut self.trace);
        }
        self.leaf()
    }

    pub fn move_prev(&mut self) -> Option<Leaf<'_>> {
        if self.current.is_some() {
            self.current = self.tree.decrement_trace(&mut self.trace);
        }
        self.leaf()
    }

    pub fn leaf(&self) -> Option<Leaf<'_>> {
        self.current.map(|a| self.tree.leaf(a))
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.leaf().map(|l| l.key())
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.leaf().map(|l| l.value())
    }

    pub fn is_valid(&self) -> bool {
        self.current.is_some()
    }

    /// Replace the value under the cursor, keeping its options. Returns
    /// false when the cursor is not on a leaf.
    pub fn update(&mut self, value: &[u8]) -> bool {
        let Some(options) = self.leaf().map(|l| l.options()) else {
            return false;
        };
        self.update_with(value, options)
    }

    /// Replace the value and options under the cursor.
    pub fn update_with(&mut self, value: &[u8], options: LeafOptions) -> bool {
        let Some(key) = self.key().map(<[u8]>::to_vec) else {
            return false;
        };
        self.tree.insert_with(&key, value, options, true);
        self.current = self.tree.seek_trace(&mut self.trace, &key);
        true
    }

    /// Change expiry and volatility under the cursor, keeping the value.
    pub fn update_expiry(&mut self, expiry: Option<i64>, volatile: bool) -> bool {
        let Some(leaf) = self.leaf() else {
            return false;
        };
        let value = leaf.value().to_vec();
        let options = LeafOptions {
            expiry,
            volatile,
            ..leaf.options()
        };
        self.update_with(&value, options)
    }

    /// Remove the key under the cursor and move to its successor. Returns
    /// the removed value.
    pub fn remove(&mut self) -> Option<Vec<u8>> {
        let key = self.key()?.to_vec();
        let value = self.tree.remove(&key);
        self.current = self.tree.seek_trace(&mut self.trace, &key);
        value
    }
}
