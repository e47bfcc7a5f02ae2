//! Insertion.

use super::{push_sorted, Art};
use crate::address::LogicalAddress;
use crate::encoding::NodePtr;
use crate::leaf::{self, LeafOptions};
use crate::node::{AddError, Entries, Header, NodeKind};
use crate::stats::Op;

struct Upsert<'k> {
    key: &'k [u8],
    value: &'k [u8],
    options: LeafOptions,
    replace: bool,
}

impl Art {
    /// Insert or replace `key`. Returns the previous value.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Option<Vec<u8>> {
        self.insert_with(key, value, LeafOptions::default(), true)
    }

    /// Insert `key` with leaf options. An existing key keeps its value
    /// unless `replace` is set; either way its current value is returned.
    pub fn insert_with(
        &mut self,
        key: &[u8],
        value: &[u8],
        options: LeafOptions,
        replace: bool,
    ) -> Option<Vec<u8>> {
        self.ops.bump(if replace { Op::Set } else { Op::Insert });
        let up = Upsert {
            key,
            value,
            options,
            replace,
        };
        let mut previous = None;
        self.root = self.insert_at(self.root, &up, 0, &mut previous);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    fn insert_at(
        &mut self,
        ptr: NodePtr,
        up: &Upsert<'_>,
        depth: usize,
        previous: &mut Option<Vec<u8>>,
    ) -> NodePtr {
        match ptr {
            NodePtr::Empty => NodePtr::Leaf(self.make_leaf(up.key, up.value, &up.options)),
            NodePtr::Leaf(addr) => {
                if self.leaf(addr).matches(up.key) {
                    return NodePtr::Leaf(self.update_leaf(addr, up, previous));
                }
                NodePtr::Node(self.split_leaf(addr, up, depth))
            }
            NodePtr::Node(addr) => self.insert_into_node(addr, up, depth, previous),
        }
    }

    fn insert_into_node(
        &mut self,
        addr: LogicalAddress,
        up: &Upsert<'_>,
        mut depth: usize,
        previous: &mut Option<Vec<u8>>,
    ) -> NodePtr {
        let prefix_len = self.node(addr).header.prefix_len;
        if prefix_len > 0 {
            let matched = self.prefix_match_len(addr, up.key, depth);
            if matched < prefix_len {
                return NodePtr::Node(self.split_prefix(addr, up, depth, matched));
            }
            depth += prefix_len;
        }

        if depth == up.key.len() {
            let terminal = self.node(addr).header.terminal;
            let terminal = if terminal.is_null() {
                self.make_leaf(up.key, up.value, &up.options)
            } else {
                assert!(
                    self.leaf(terminal).matches(up.key),
                    "terminal leaf of node {} does not match its path",
                    addr
                );
                self.update_leaf(terminal, up, previous)
            };
            self.nodes.get_mut(addr).header.terminal = terminal;
            return NodePtr::Node(addr);
        }

        let byte = up.key[depth];
        let node = self.node(addr);
        match node.find(byte) {
            Some(slot) => {
                let child = node.child(slot);
                let updated = self.insert_at(child, up, depth + 1, previous);
                if updated == child {
                    NodePtr::Node(addr)
                } else {
                    NodePtr::Node(self.replace_child(addr, slot, byte, updated))
                }
            }
            None => {
                let leaf = NodePtr::Leaf(self.make_leaf(up.key, up.value, &up.options));
                NodePtr::Node(self.add_child(addr, byte, leaf))
            }
        }
    }

    /// Existing key: report its value and overwrite it if asked. Returns the
    /// address the slot should hold.
    fn update_leaf(&mut self, addr: LogicalAddress, up: &Upsert<'_>, previous: &mut Option<Vec<u8>>) -> LogicalAddress {
        let existing = self.leaf(addr);
        *previous = Some(existing.value().to_vec());
        if !up.replace {
            return addr;
        }

        let size = leaf::record_size(up.key, up.value, &up.options);
        if existing.byte_size() == size {
            leaf::rewrite_value(&mut self.leaves.modify(addr)[..size], up.value, &up.options);
            return addr;
        }
        let fresh = self.make_leaf(up.key, up.value, &up.options);
        self.free_leaf(addr);
        self.counters.leaves_replaced += 1;
        fresh
    }

    /// Two different keys meet at a leaf: put both under a new Node4 that
    /// carries their common prefix from `depth`.
    fn split_leaf(&mut self, existing: LogicalAddress, up: &Upsert<'_>, depth: usize) -> LogicalAddress {
        let (common, existing_byte) = {
            let key = self.leaf(existing).key();
            let common = key[depth..]
                .iter()
                .zip(&up.key[depth..])
                .take_while(|(a, b)| a == b)
                .count();
            (common, key.get(depth + common).copied())
        };
        let split = depth + common;

        let fresh = self.make_leaf(up.key, up.value, &up.options);
        let mut header = Header::with_prefix(&up.key[depth..split]);
        let mut entries = Entries::new();
        match existing_byte {
            Some(b) => entries.push((b, NodePtr::Leaf(existing))),
            None => header.terminal = existing,
        }
        match up.key.get(split) {
            Some(&b) => push_sorted(&mut entries, b, NodePtr::Leaf(fresh)),
            None => header.terminal = fresh,
        }
        self.alloc_node(NodeKind::Node4, header, &entries)
    }

    /// The key leaves the node's prefix after `matched` bytes: hoist the
    /// shared part into a new Node4 above the node.
    fn split_prefix(&mut self, addr: LogicalAddress, up: &Upsert<'_>, depth: usize, matched: usize) -> LogicalAddress {
        let full = self.load_prefix(addr, depth).into_owned();
        let node_byte = full[matched];
        let rest = &full[matched + 1..];
        self.nodes.get_mut(addr).header.set_prefix(rest, rest.len());

        let fresh = self.make_leaf(up.key, up.value, &up.options);
        let mut header = Header::with_prefix(&full[..matched]);
        let mut entries = Entries::new();
        entries.push((node_byte, NodePtr::Node(addr)));
        match up.key.get(depth + matched) {
            Some(&b) => {
                debug_assert_ne!(b, node_byte);
                push_sorted(&mut entries, b, NodePtr::Leaf(fresh));
            }
            None => header.terminal = fresh,
        }
        tracing::trace!(node = %addr, at = matched, "split compressed prefix");
        self.alloc_node(NodeKind::Node4, header, &entries)
    }

    /// Add a child for an absent byte, growing or widening the node when it
    /// cannot take it in place.
    fn add_child(&mut self, addr: LogicalAddress, byte: u8, ptr: NodePtr) -> LogicalAddress {
        let node = self.nodes.get_mut(addr);
        let kind = node.kind();
        let err = match node.try_add(byte, ptr) {
            Ok(()) => {
                self.counters.occupancy_changed(kind, true);
                return addr;
            }
            Err(err) => err,
        };

        let mut entries = node.entries();
        push_sorted(&mut entries, byte, ptr);
        let target = match err {
            AddError::Full => {
                let Some(grown) = kind.grown() else {
                    unreachable!("{} reported full", kind);
                };
                tracing::debug!(node = %addr, from = %kind, to = %grown, "grew node");
                grown
            }
            AddError::Encode(e) => {
                tracing::debug!(node = %addr, %kind, error = %e, "child does not fit narrow slots");
                kind
            }
        };
        self.rebuild_node(addr, target, &entries)
    }
}
