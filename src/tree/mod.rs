//! The adaptive radix tree engine.
//!
//! [`Art`] owns the root pointer, both arenas and the statistics. Mutation
//! is recursive: every step returns the pointer its parent slot should now
//! hold, so growth, shrinking, widening and collapse all redirect the
//! parent without parent back-references.

mod cursor;
mod insert;
mod iter;
mod remove;

pub use cursor::{Cursor, CursorMut};
pub use iter::{Iter, MergeIter};

use std::borrow::Cow;

use crate::address::LogicalAddress;
use crate::arena::{LogicalAllocator, NodeArena};
use crate::config::ArtConfig;
use crate::encoding::NodePtr;
use crate::error::Result;
use crate::leaf::{self, Leaf, LeafOptions};
use crate::node::{Entries, Header, Node, NodeKind, Predicate, MAX_PREFIX_LEN};
use crate::stats::{ArtStatistics, NodeCounters, Op, OpCounters, OpsStatistics};

/// Ordered byte-key to byte-value map on an adaptive radix tree.
///
/// Not internally synchronized: one writer at a time, readers excluded
/// while it runs. [`SharedArt`](crate::SharedArt) supplies that latch.
pub struct Art {
    pub(crate) root: NodePtr,
    pub(crate) len: usize,
    pub(crate) leaves: LogicalAllocator,
    pub(crate) nodes: NodeArena<Node>,
    pub(crate) counters: NodeCounters,
    pub(crate) ops: OpCounters,
    pub(crate) config: ArtConfig,
}

impl Default for Art {
    fn default() -> Self {
        Self::new()
    }
}

impl Art {
    /// Create an empty tree with the default configuration.
    pub fn new() -> Self {
        Self::build(ArtConfig::default())
    }

    /// Create an empty tree with `config`.
    pub fn with_config(config: ArtConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: ArtConfig) -> Self {
        Self {
            root: NodePtr::Empty,
            len: 0,
            leaves: LogicalAllocator::with_capacity(config.initial_pages(), config.validate_addresses),
            nodes: NodeArena::new(),
            counters: NodeCounters::default(),
            ops: OpCounters::default(),
            config,
        }
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.ops.bump(Op::Size);
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn config(&self) -> &ArtConfig {
        &self.config
    }

    /// Current root pointer.
    pub fn root_ptr(&self) -> NodePtr {
        self.root
    }

    /// Leaf storage, for collaborators that enumerate or serialize pages.
    pub fn allocator(&self) -> &LogicalAllocator {
        &self.leaves
    }

    /// Whether leaf storage fragmentation exceeds the configured threshold.
    pub fn needs_compaction(&self) -> bool {
        self.leaves.fragmentation_ratio() > self.config.compaction_threshold
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.search(key).map(|leaf| leaf.value())
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.search(key).is_some()
    }

    /// Leaf stored under `key`.
    pub fn search(&self, key: &[u8]) -> Option<Leaf<'_>> {
        self.ops.bump(Op::Get);
        let mut ptr = self.root;
        let mut depth = 0;
        loop {
            match ptr {
                NodePtr::Empty => return None,
                NodePtr::Leaf(addr) => {
                    let leaf = self.leaf(addr);
                    return leaf.matches(key).then_some(leaf);
                }
                NodePtr::Node(addr) => {
                    let node = self.node(addr);
                    if node.header.prefix_len > 0 {
                        if !stored_prefix_matches(&node.header, key, depth) {
                            return None;
                        }
                        depth += node.header.prefix_len;
                    }
                    if depth == key.len() {
                        let terminal = node.header.terminal;
                        if terminal.is_null() {
                            return None;
                        }
                        let leaf = self.leaf(terminal);
                        return leaf.matches(key).then_some(leaf);
                    }
                    let pos = node.index(key[depth], Predicate::Equal)?;
                    ptr = node.child_at(pos);
                    depth += 1;
                }
            }
        }
    }

    /// Smallest key.
    pub fn minimum(&self) -> Option<Leaf<'_>> {
        self.ops.bump(Op::Min);
        self.extreme_leaf(self.root, false).map(|a| self.leaf(a))
    }

    /// Largest key.
    pub fn maximum(&self) -> Option<Leaf<'_>> {
        self.ops.bump(Op::Max);
        self.extreme_leaf(self.root, true).map(|a| self.leaf(a))
    }

    /// Set or clear the tombstone flag of `key` in place. Returns false if
    /// the key is absent.
    pub fn set_deleted(&mut self, key: &[u8], deleted: bool) -> bool {
        let Some(addr) = self.search(key).map(|l| l.address()) else {
            return false;
        };
        leaf::set_deleted(self.leaves.modify(addr), deleted);
        true
    }

    /// Population and memory snapshot.
    pub fn statistics(&self) -> ArtStatistics {
        self.counters.snapshot(
            self.leaves.allocated_bytes(),
            self.leaves.page_count(),
            self.nodes.page_count(),
            self.leaves.fragmentation_bytes(),
        )
    }

    /// Operation counters.
    pub fn ops_statistics(&self) -> OpsStatistics {
        self.ops.snapshot()
    }

    /// Remove every key and release all storage.
    pub fn clear(&mut self) {
        self.root = NodePtr::Empty;
        self.len = 0;
        self.leaves.clear();
        self.nodes.clear();
        self.counters = NodeCounters::default();
    }

    // =========================================================================
    // Arena helpers
    // =========================================================================

    #[inline]
    #[track_caller]
    pub(crate) fn leaf(&self, addr: LogicalAddress) -> Leaf<'_> {
        Leaf::parse(addr, self.leaves.read(addr))
    }

    #[inline]
    #[track_caller]
    pub(crate) fn node(&self, addr: LogicalAddress) -> &Node {
        self.nodes.get(addr)
    }

    pub(crate) fn make_leaf(&mut self, key: &[u8], value: &[u8], options: &LeafOptions) -> LogicalAddress {
        let size = leaf::record_size(key, value, options);
        let addr = self.leaves.new_address(size);
        leaf::write(&mut self.leaves.modify(addr)[..size], key, value, options);
        let written = self.leaf(addr).byte_size();
        assert_eq!(written, size, "leaf header disagrees with reserved size");
        self.counters.leaves += 1;
        addr
    }

    pub(crate) fn free_leaf(&mut self, addr: LogicalAddress) {
        let size = self.leaf(addr).byte_size();
        leaf::mark_freed(self.leaves.modify(addr));
        self.leaves.free(addr, size);
        self.counters.leaves -= 1;
    }

    /// Allocate a node, picking narrow slots when every child fits.
    pub(crate) fn alloc_node(&mut self, kind: NodeKind, header: Header, entries: &[(u8, NodePtr)]) -> LogicalAddress {
        let preferred = self.config.pointer_width;
        let mut chosen = preferred;
        let addr = self.nodes.insert_with(|addr| {
            let base = addr.page_start();
            chosen = Node::pick_width(base, preferred, entries);
            Node::build(kind, header, entries, base, chosen)
                .unwrap_or_else(|e| panic!("node build failed after width selection: {}", e))
        });
        if chosen != preferred {
            tracing::debug!(%addr, %kind, width = ?chosen, "widened node pointers");
        }
        self.counters.node_created(self.nodes.get(addr));
        addr
    }

    pub(crate) fn free_node(&mut self, addr: LogicalAddress) -> Node {
        let node = self.nodes.remove(addr);
        self.counters.node_freed(&node);
        node
    }

    /// Replace the node at `addr` with a `kind` node holding `entries` and
    /// the old header.
    pub(crate) fn rebuild_node(&mut self, addr: LogicalAddress, kind: NodeKind, entries: &[(u8, NodePtr)]) -> LogicalAddress {
        let old = self.free_node(addr);
        self.alloc_node(kind, old.header, entries)
    }

    /// Point the child for `byte` at `ptr`, rebuilding the node with wide
    /// slots if `ptr` does not fit. Returns the node's (possibly new)
    /// address.
    pub(crate) fn replace_child(&mut self, addr: LogicalAddress, slot: usize, byte: u8, ptr: NodePtr) -> LogicalAddress {
        if self.nodes.get_mut(addr).try_replace(slot, ptr).is_ok() {
            return addr;
        }
        let node = self.node(addr);
        let kind = node.kind();
        let mut entries = node.entries();
        for entry in entries.iter_mut().filter(|e| e.0 == byte) {
            entry.1 = ptr;
        }
        self.rebuild_node(addr, kind, &entries)
    }

    // =========================================================================
    // Prefix helpers
    // =========================================================================

    /// First or last leaf under `ptr`.
    pub(crate) fn extreme_leaf(&self, mut ptr: NodePtr, last: bool) -> Option<LogicalAddress> {
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
                    ptr = node.child_at(pos);
                }
            }
        }
    }

    /// Full compressed prefix of the node at `addr`, whose prefix starts at
    /// key offset `depth`. Prefixes longer than the inline maximum are read
    /// from the subtree's minimum leaf.
    pub(crate) fn load_prefix(&self, addr: LogicalAddress, depth: usize) -> Cow<'_, [u8]> {
        let header = &self.node(addr).header;
        if header.prefix_len <= MAX_PREFIX_LEN {
            return Cow::Borrowed(header.stored_prefix());
        }
        let end = depth + header.prefix_len;
        let Some(min) = self.extreme_leaf(NodePtr::Node(addr), false) else {
            panic!("internal node {} has no leaves", addr);
        };
        let key = self.leaf(min).key();
        assert!(key.len() >= end, "leaf under node {} is shorter than its prefix", addr);
        debug_assert!(
            self.extreme_leaf(NodePtr::Node(addr), true)
                .map(|max| self.leaf(max).key().get(depth..end) == Some(&key[depth..end]))
                .unwrap_or(false),
            "minimum and maximum leaves under node {} disagree on its prefix",
            addr
        );
        Cow::Borrowed(&key[depth..end])
    }

    /// Number of leading prefix bytes of the node at `addr` that match
    /// `key[depth..]`, compared exactly.
    pub(crate) fn prefix_match_len(&self, addr: LogicalAddress, key: &[u8], depth: usize) -> usize {
        let header = &self.node(addr).header;
        let limit = header.prefix_len.min(key.len().saturating_sub(depth));
        let stored = header.stored_prefix();
        let inline = limit.min(stored.len());
        if let Some(i) = (0..inline).find(|&i| stored[i] != key[depth + i]) {
            return i;
        }
        if limit <= inline {
            return limit;
        }
        let full = self.load_prefix(addr, depth);
        (inline..limit).find(|&i| full[i] != key[depth + i]).unwrap_or(limit)
    }
}

/// Optimistic prefix check against the inline bytes only. Callers confirm
/// with a full leaf comparison.
#[inline]
pub(crate) fn stored_prefix_matches(header: &Header, key: &[u8], depth: usize) -> bool {
    if key.len() < depth + header.prefix_len {
        return false;
    }
    let stored = header.stored_prefix();
    key[depth..depth + stored.len()] == *stored
}

/// Insert `(byte, ptr)` into ordered entries.
pub(crate) fn push_sorted(entries: &mut Entries, byte: u8, ptr: NodePtr) {
    let at = entries.iter().position(|e| e.0 > byte).unwrap_or(entries.len());
    entries.insert(at, (byte, ptr));
}

#[cfg(test)]
mod tests;
