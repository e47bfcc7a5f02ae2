//! Statistics.
//!
//! Structural counters ([`NodeCounters`]) are mutated only by the single
//! writer and passed by `&mut` into allocation paths. Operation counters
//! ([`OpCounters`]) are relaxed atomics so read-only operations can count
//! through `&self`.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::node::{Node, NodeKind};

/// Snapshot of tree population and memory use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtStatistics {
    /// Live leaves.
    pub leaf_nodes: u64,
    pub node4_nodes: u64,
    pub node16_nodes: u64,
    pub node48_nodes: u64,
    pub node256_nodes: u64,
    /// Children held by all Node256s.
    pub node256_occupants: u64,
    /// Bytes of live leaf records.
    pub bytes_allocated: u64,
    /// Bytes of internal nodes.
    pub bytes_interior: u64,
    /// Leaves reallocated because a replacement value changed size.
    pub leaf_nodes_replaced: u64,
    /// Open leaf pages.
    pub pages: u64,
    /// Pages holding internal nodes.
    pub node_pages: u64,
    /// Bytes of freed leaf records not yet reused.
    pub fragmentation: u64,
}

impl ArtStatistics {
    /// Total internal nodes across all variants.
    pub fn interior_nodes(&self) -> u64 {
        self.node4_nodes + self.node16_nodes + self.node48_nodes + self.node256_nodes
    }
}

/// Snapshot of operation counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpsStatistics {
    pub delete_ops: u64,
    pub set_ops: u64,
    pub iter_ops: u64,
    pub iter_range_ops: u64,
    pub range_ops: u64,
    pub get_ops: u64,
    pub lb_ops: u64,
    pub size_ops: u64,
    pub insert_ops: u64,
    pub min_ops: u64,
    pub max_ops: u64,
}

/// Counted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Delete,
    Set,
    Iter,
    IterRange,
    Range,
    Get,
    LowerBound,
    Size,
    Insert,
    Min,
    Max,
}

const OPS: usize = 11;

#[derive(Debug, Default)]
pub(crate) struct OpCounters {
    counts: [AtomicU64; OPS],
}

impl OpCounters {
    #[inline]
    pub(crate) fn bump(&self, op: Op) {
        self.counts[op as usize].fetch_add(1, Ordering::Relaxed);
    }

    fn get(&self, op: Op) -> u64 {
        self.counts[op as usize].load(Ordering::Relaxed)
    }

    pub(crate) fn snapshot(&self) -> OpsStatistics {
        OpsStatistics {
            delete_ops: self.get(Op::Delete),
            set_ops: self.get(Op::Set),
            iter_ops: self.get(Op::Iter),
            iter_range_ops: self.get(Op::IterRange),
            range_ops: self.get(Op::Range),
            get_ops: self.get(Op::Get),
            lb_ops: self.get(Op::LowerBound),
            size_ops: self.get(Op::Size),
            insert_ops: self.get(Op::Insert),
            min_ops: self.get(Op::Min),
            max_ops: self.get(Op::Max),
        }
    }
}

/// Population counters owned by the tree.
#[derive(Debug, Clone, Default)]
pub(crate) struct NodeCounters {
    pub(crate) leaves: u64,
    pub(crate) nodes: [u64; 4],
    pub(crate) node256_occupants: u64,
    pub(crate) interior_bytes: u64,
    pub(crate) leaves_replaced: u64,
}

impl NodeCounters {
    fn slot(kind: NodeKind) -> usize {
        match kind {
            NodeKind::Node4 => 0,
            NodeKind::Node16 => 1,
            NodeKind::Node48 => 2,
            NodeKind::Node256 => 3,
        }
    }

    pub(crate) fn node_created(&mut self, node: &Node) {
        self.nodes[Self::slot(node.kind())] += 1;
        self.interior_bytes += node.byte_size() as u64;
        if node.kind() == NodeKind::Node256 {
            self.node256_occupants += node.occupants() as u64;
        }
    }

    pub(crate) fn node_freed(&mut self, node: &Node) {
        self.nodes[Self::slot(node.kind())] -= 1;
        self.interior_bytes -= node.byte_size() as u64;
        if node.kind() == NodeKind::Node256 {
            self.node256_occupants -= node.occupants() as u64;
        }
    }

    /// A child was added to or removed from an existing node in place.
    pub(crate) fn occupancy_changed(&mut self, kind: NodeKind, added: bool) {
        if kind == NodeKind::Node256 {
            if added {
                self.node256_occupants += 1;
            } else {
                self.node256_occupants -= 1;
            }
        }
    }

    pub(crate) fn snapshot(
        &self,
        bytes_allocated: usize,
        pages: usize,
        node_pages: usize,
        fragmentation: usize,
    ) -> ArtStatistics {
        ArtStatistics {
            leaf_nodes: self.leaves,
            node4_nodes: self.nodes[0],
            node16_nodes: self.nodes[1],
            node48_nodes: self.nodes[2],
            node256_nodes: self.nodes[3],
            node256_occupants: self.node256_occupants,
            bytes_allocated: bytes_allocated as u64,
            bytes_interior: self.interior_bytes,
            leaf_nodes_replaced: self.leaves_replaced,
            pages: pages as u64,
            node_pages: node_pages as u64,
            fragmentation: fragmentation as u64,
        }
    }
}
