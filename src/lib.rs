//! # compact-art
//!
//! An ordered byte-key to byte-value engine built on an Adaptive Radix Tree
//! (ART), with leaves and nodes stored in paged arenas and addressed through
//! compact logical pointers.
//!
//! Based on "The Adaptive Radix Tree: ARTful Indexing for Main-Memory
//! Databases" (ICDE 2013, Leis et al.)
//!
//! ## Layout
//!
//! - Leaves are variable-sized records in 256 KiB pages, reached through a
//!   [`LogicalAddress`] (page number and offset).
//! - Internal nodes come in four fan-outs (4, 16, 48, 256) and store their
//!   children as 4-byte deltas from the node's page, widening to 8-byte
//!   absolute addresses when a child is out of reach.
//! - Common prefixes are compressed into node headers; a key that ends at a
//!   node lives in that node's terminal slot.
//!
//! ## Example
//!
//! ```rust
//! use compact_art::Art;
//! use std::ops::ControlFlow;
//!
//! let mut tree = Art::new();
//! tree.insert(b"user:1001", b"alice");
//! tree.insert(b"user:1002", b"bob");
//! tree.insert(b"user", b"root");
//!
//! assert_eq!(tree.get(b"user:1001"), Some(&b"alice"[..]));
//! assert_eq!(tree.lower_bound(b"user:1").unwrap().key(), b"user:1001");
//!
//! let mut keys = Vec::new();
//! let _: ControlFlow<()> = tree.for_each_prefix(b"user:", |leaf| {
//!     keys.push(leaf.key().to_vec());
//!     ControlFlow::Continue(())
//! });
//! assert_eq!(keys.len(), 2);
//! ```
//!
//! [`Art`] is single-writer and performs no locking; [`SharedArt`] puts it
//! behind a read/write latch.

#![deny(unsafe_op_in_unsafe_fn)]

mod address;
mod arena;
mod config;
mod debug;
mod encoding;
mod error;
mod leaf;
mod node;
mod shared;
mod stats;
mod tree;

pub use address::{LogicalAddress, PAGE_SHIFT, PAGE_SIZE};
pub use arena::{LogicalAllocator, PageInfo, MAX_INLINE_RECORD, PAGE_HEADER};
pub use config::ArtConfig;
pub use debug::NodeInfo;
pub use encoding::{NodePtr, PointerWidth};
pub use error::{ConfigError, EncodeError};
pub use leaf::{Leaf, LeafOptions};
pub use node::{NodeKind, MAX_PREFIX_LEN};
pub use shared::{SharedArt, SharedWriteGuard};
pub use stats::{ArtStatistics, OpsStatistics};
pub use tree::{Art, Cursor, CursorMut, Iter, MergeIter};

#[cfg(test)]
mod proptests;
