//! Debug utilities for tree troubleshooting.

use std::fmt::Write;

use crate::encoding::{NodePtr, PointerWidth};
use crate::node::{NodeKind, Position, MAX_PREFIX_LEN};
use crate::tree::Art;

/// Shape of one internal node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub kind: NodeKind,
    /// Full prefix length.
    pub prefix_len: usize,
    /// Inline prefix bytes (at most 12).
    pub prefix: Vec<u8>,
    pub occupants: usize,
    pub width: PointerWidth,
    pub terminal: Option<Vec<u8>>,
    /// Children in key order.
    pub children: Vec<(u8, NodePtr)>,
}

impl Art {
    /// Describe the internal node behind `ptr`, `None` for leaves and
    /// empty pointers.
    pub fn node_info(&self, ptr: NodePtr) -> Option<NodeInfo> {
        let NodePtr::Node(addr) = ptr else {
            return None;
        };
        let node = self.node(addr);
        Some(NodeInfo {
            kind: node.kind(),
            prefix_len: node.header.prefix_len,
            prefix: node.header.stored_prefix().to_vec(),
            occupants: node.occupants(),
            width: node.width(),
            terminal: node
                .header
                .has_terminal()
                .then(|| self.leaf(node.header.terminal).key().to_vec()),
            children: node.entries().into_vec(),
        })
    }

    /// Describe the root if it is an internal node.
    pub fn root_info(&self) -> Option<NodeInfo> {
        self.node_info(self.root)
    }

    /// Render the tree structure.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== ART ({} keys) ===", self.len);
        if self.root.is_empty() {
            out.push_str("(empty)\n");
        } else {
            self.dump_ptr(&mut out, self.root, 0);
        }
        out
    }

    fn dump_ptr(&self, out: &mut String, ptr: NodePtr, depth: usize) {
        let indent = "  ".repeat(depth);
        match ptr {
            NodePtr::Empty => {
                let _ = writeln!(out, "{}(empty)", indent);
            }
            NodePtr::Leaf(addr) => {
                let leaf = self.leaf(addr);
                let _ = writeln!(
                    out,
                    "{}Leaf {:?} ({} value bytes{})",
                    indent,
                    String::from_utf8_lossy(leaf.key()),
                    leaf.value().len(),
                    if leaf.is_deleted() { ", deleted" } else { "" }
                );
            }
            NodePtr::Node(addr) => {
                let node = self.node(addr);
                let _ = writeln!(
                    out,
                    "{}{} @{} (prefix={:?}/{}, children={}, {:?})",
                    indent,
                    node.kind(),
                    addr,
                    String::from_utf8_lossy(node.header.stored_prefix()),
                    node.header.prefix_len,
                    node.occupants(),
                    node.width()
                );
                let mut pos = node.first_position();
                while let Some(p) = pos {
                    match p {
                        Position::Terminal => {
                            let _ = writeln!(out, "{}  [$] ->", indent);
                        }
                        Position::Child { key, .. } => {
                            let _ = writeln!(out, "{}  [{:#04x}] ->", indent, key);
                        }
                    }
                    self.dump_ptr(out, node.child_at(p), depth + 2);
                    pos = node.next_position(p);
                }
            }
        }
    }

    /// Verify tree integrity. Returns the problems found; empty means the
    /// tree is consistent.
    pub fn verify_integrity(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let mut leaves = 0usize;
        let mut kinds = [0u64; 4];
        let mut path = Vec::new();
        // An empty root is a drained tree; below the root `Empty` is a hole.
        if !self.root.is_empty() {
            self.verify_ptr(self.root, &mut path, &mut issues, &mut leaves, &mut kinds);
        }

        if leaves != self.len {
            issues.push(format!("reachable leaves {} != len {}", leaves, self.len));
        }
        let stats = self.statistics();
        let counted = [stats.node4_nodes, stats.node16_nodes, stats.node48_nodes, stats.node256_nodes];
        if kinds != counted {
            issues.push(format!("node counts {:?} != statistics {:?}", kinds, counted));
        }
        if stats.leaf_nodes != self.len as u64 {
            issues.push(format!("leaf counter {} != len {}", stats.leaf_nodes, self.len));
        }
        if self.nodes.len() as u64 != kinds.iter().sum::<u64>() {
            issues.push(format!("node arena holds {} nodes, {} reachable", self.nodes.len(), kinds.iter().sum::<u64>()));
        }
        issues
    }

    fn verify_ptr(
        &self,
        ptr: NodePtr,
        path: &mut Vec<u8>,
        issues: &mut Vec<String>,
        leaves: &mut usize,
        kinds: &mut [u64; 4],
    ) {
        match ptr {
            NodePtr::Empty => issues.push(format!("empty pointer below path {:?}", path)),
            NodePtr::Leaf(addr) => {
                *leaves += 1;
                let key = self.leaf(addr).key();
                if !key.starts_with(path) {
                    issues.push(format!("leaf {:?} is stored under path {:?}", key, path));
                }
            }
            NodePtr::Node(addr) => {
                let node = self.node(addr);
                let kind = node.kind();
                let occupants = node.occupants();
                let has_terminal = node.header.has_terminal();
                kinds[match kind {
                    NodeKind::Node4 => 0,
                    NodeKind::Node16 => 1,
                    NodeKind::Node48 => 2,
                    NodeKind::Node256 => 3,
                }] += 1;

                let min = match kind {
                    NodeKind::Node4 => usize::from(!has_terminal) + 1,
                    NodeKind::Node16 => 4,
                    NodeKind::Node48 => 13,
                    NodeKind::Node256 => 38,
                };
                if occupants < min || occupants > kind.capacity() {
                    issues.push(format!("{} at {:?} holds {} children", kind, path, occupants));
                }
                if node.base() != addr.page_start() {
                    issues.push(format!("{} at {:?} has base {} but lives at {}", kind, path, node.base(), addr));
                }

                let depth = path.len();
                if node.header.prefix_len > MAX_PREFIX_LEN {
                    let lo = self.extreme_leaf(ptr, false).map(|a| self.leaf(a).key());
                    let hi = self.extreme_leaf(ptr, true).map(|a| self.leaf(a).key());
                    let end = depth + node.header.prefix_len;
                    if lo.and_then(|k| k.get(depth..end)) != hi.and_then(|k| k.get(depth..end)) {
                        issues.push(format!("long prefix at {:?} disagrees between min and max leaves", path));
                    }
                }
                path.extend_from_slice(&self.load_prefix(addr, depth));
                let prefixed = path.len();

                if has_terminal {
                    let key = self.leaf(node.header.terminal).key();
                    if key != path.as_slice() {
                        issues.push(format!("terminal {:?} does not end at path {:?}", key, path));
                    }
                    *leaves += 1;
                }
                let entries = node.entries();
                for pair in entries.windows(2) {
                    if pair[0].0 >= pair[1].0 {
                        issues.push(format!("children out of order at {:?}", path));
                    }
                }
                for (byte, child) in entries {
                    path.push(byte);
                    self.verify_ptr(child, path, issues, leaves, kinds);
                    path.truncate(prefixed);
                }
                path.truncate(depth);
            }
        }
    }
}
