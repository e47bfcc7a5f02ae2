//! Deletion, shrinking and path compression.

use smallvec::SmallVec;

use super::{stored_prefix_matches, Art};
use crate::address::LogicalAddress;
use crate::encoding::NodePtr;
use crate::node::{NodeKind, MAX_PREFIX_LEN};
use crate::stats::Op;

impl Art {
    /// Remove `key`. Returns its value.
    pub fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.ops.bump(Op::Delete);
        let (root, removed) = self.remove_at(self.root, key, 0);
        self.root = root;
        let addr = removed?;
        let value = self.leaf(addr).value().to_vec();
        self.free_leaf(addr);
        self.len -= 1;
        Some(value)
    }

    /// Detach the leaf for `key` from the subtree at `ptr`. Returns the
    /// pointer the parent slot should hold and the detached leaf.
    fn remove_at(&mut self, ptr: NodePtr, key: &[u8], depth: usize) -> (NodePtr, Option<LogicalAddress>) {
        let addr = match ptr {
            NodePtr::Empty => return (ptr, None),
            NodePtr::Leaf(addr) => {
                return if self.leaf(addr).matches(key) {
                    (NodePtr::Empty, Some(addr))
                } else {
                    (ptr, None)
                };
            }
            NodePtr::Node(addr) => addr,
        };

        let node = self.node(addr);
        let mut depth = depth;
        if node.header.prefix_len > 0 {
            if !stored_prefix_matches(&node.header, key, depth) {
                return (ptr, None);
            }
            depth += node.header.prefix_len;
        }

        if depth == key.len() {
            let terminal = node.header.terminal;
            if terminal.is_null() || !self.leaf(terminal).matches(key) {
                return (ptr, None);
            }
            self.nodes.get_mut(addr).header.terminal = LogicalAddress::NULL;
            return (self.after_removal(addr), Some(terminal));
        }

        let byte = key[depth];
        let Some(slot) = node.find(byte) else {
            return (ptr, None);
        };
        match node.child(slot) {
            NodePtr::Leaf(leaf) => {
                if !self.leaf(leaf).matches(key) {
                    return (ptr, None);
                }
                let node = self.nodes.get_mut(addr);
                let kind = node.kind();
                node.remove(slot, byte);
                self.counters.occupancy_changed(kind, false);
                (self.after_removal(addr), Some(leaf))
            }
            child @ NodePtr::Node(_) => {
                let (updated, removed) = self.remove_at(child, key, depth + 1);
                if removed.is_none() {
                    return (ptr, None);
                }
                assert!(!updated.is_empty(), "internal node collapsed to nothing");
                let addr = if updated == child {
                    addr
                } else {
                    self.replace_child(addr, slot, byte, updated)
                };
                (NodePtr::Node(addr), removed)
            }
            NodePtr::Empty => panic!("occupied slot {} of node {} decoded as empty", slot, addr),
        }
    }

    /// Apply the shrink table to the node at `addr` after one of its
    /// entries went away.
    fn after_removal(&mut self, addr: LogicalAddress) -> NodePtr {
        let node = self.node(addr);
        let kind = node.kind();
        let occupants = node.occupants();
        let has_terminal = node.header.has_terminal();

        if kind == NodeKind::Node4 {
            return match (occupants, has_terminal) {
                (0, true) => {
                    let terminal = node.header.terminal;
                    self.free_node(addr);
                    tracing::debug!(node = %addr, "collapsed node into its terminal leaf");
                    NodePtr::Leaf(terminal)
                }
                (0, false) => panic!("node {} lost its last entry", addr),
                (1, false) => self.collapse(addr),
                _ => NodePtr::Node(addr),
            };
        }

        match kind.shrink() {
            Some((threshold, smaller)) if occupants <= threshold => {
                let entries = node.entries();
                tracing::debug!(node = %addr, from = %kind, to = %smaller, "shrank node");
                NodePtr::Node(self.rebuild_node(addr, smaller, &entries))
            }
            _ => NodePtr::Node(addr),
        }
    }

    /// Replace a Node4 holding one child and no terminal by that child. An
    /// internal child absorbs this node's prefix and the key byte.
    fn collapse(&mut self, addr: LogicalAddress) -> NodePtr {
        let old = self.free_node(addr);
        let Some(&(byte, child)) = old.entries().first() else {
            panic!("collapsing node {} without children", addr);
        };
        let NodePtr::Node(child_addr) = child else {
            tracing::debug!(node = %addr, "collapsed node into its only leaf");
            return child;
        };

        let parent = &old.header;
        let child_node = self.nodes.get_mut(child_addr);
        let mut stored: SmallVec<[u8; 2 * MAX_PREFIX_LEN + 1]> = SmallVec::new();
        stored.extend_from_slice(parent.stored_prefix());
        if parent.prefix_len < MAX_PREFIX_LEN {
            stored.push(byte);
            stored.extend_from_slice(child_node.header.stored_prefix());
        }
        let len = parent.prefix_len + 1 + child_node.header.prefix_len;
        child_node.header.set_prefix(&stored, len);
        tracing::debug!(node = %addr, into = %child_addr, prefix_len = len, "merged node into its only child");
        child
    }
}
