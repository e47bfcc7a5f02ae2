//! Tagged child pointers and their compact slot encoding.
//!
//! A node stores its children in a [`ChildSlots`] array. Each slot holds one
//! of:
//!
//! - **Narrow** (4 bytes): the signed distance from the node's base to the
//!   child's address.
//! - **Wide** (8 bytes): the child's absolute address.
//!
//! The base of a node is the start of the page the node itself lives in, so
//! children allocated close to their parent almost always fit the narrow
//! form. A raw value of zero means the slot is empty; the arenas guarantee
//! that no record address ever equals a page start.
//!
//! Leaves and internal nodes live in different arenas, so every slot also
//! carries a tag saying which arena its address belongs to.

use crate::address::LogicalAddress;
use crate::error::EncodeError;

/// Bytes used per child slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PointerWidth {
    /// 4-byte slots relative to the node base.
    #[default]
    Narrow,
    /// 8-byte absolute slots.
    Wide,
}

impl PointerWidth {
    /// Size of one encoded slot.
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            PointerWidth::Narrow => 4,
            PointerWidth::Wide => 8,
        }
    }
}

/// Tagged reference to a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodePtr {
    /// Subtree absent.
    #[default]
    Empty,
    /// A leaf record in the leaf allocator.
    Leaf(LogicalAddress),
    /// An internal node in the node arena.
    Node(LogicalAddress),
}

impl NodePtr {
    #[inline]
    pub fn is_empty(self) -> bool {
        matches!(self, NodePtr::Empty)
    }

    #[inline]
    pub fn is_leaf(self) -> bool {
        matches!(self, NodePtr::Leaf(_))
    }

    #[inline]
    pub fn is_node(self) -> bool {
        matches!(self, NodePtr::Node(_))
    }

    /// Address behind the pointer, null for [`NodePtr::Empty`].
    #[inline]
    pub fn address(self) -> LogicalAddress {
        match self {
            NodePtr::Empty => LogicalAddress::NULL,
            NodePtr::Leaf(a) | NodePtr::Node(a) => a,
        }
    }

    /// Leaf address. Panics if the pointer is not a leaf.
    #[inline]
    #[track_caller]
    pub fn leaf(self) -> LogicalAddress {
        match self {
            NodePtr::Leaf(a) => a,
            other => panic!("expected a leaf pointer, found {:?}", other),
        }
    }

    /// Internal node address. Panics if the pointer is not an internal node.
    #[inline]
    #[track_caller]
    pub fn node(self) -> LogicalAddress {
        match self {
            NodePtr::Node(a) => a,
            other => panic!("expected an internal node pointer, found {:?}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum SlotTag {
    Empty = 0,
    Leaf = 1,
    Node = 2,
}

#[derive(Debug, Clone)]
enum SlotArray {
    Narrow(Box<[i32]>),
    Wide(Box<[u64]>),
}

/// Fixed-capacity array of encoded child pointers.
#[derive(Debug, Clone)]
pub(crate) struct ChildSlots {
    base: LogicalAddress,
    tags: Box<[SlotTag]>,
    values: SlotArray,
}

impl ChildSlots {
    pub(crate) fn new(capacity: usize, base: LogicalAddress, width: PointerWidth) -> Self {
        let values = match width {
            PointerWidth::Narrow => SlotArray::Narrow(vec![0; capacity].into_boxed_slice()),
            PointerWidth::Wide => SlotArray::Wide(vec![0; capacity].into_boxed_slice()),
        };
        Self {
            base,
            tags: vec![SlotTag::Empty; capacity].into_boxed_slice(),
            values,
        }
    }

    /// Narrow encoding of `address` relative to `base`, if it fits.
    #[inline]
    pub(crate) fn narrow(base: LogicalAddress, address: LogicalAddress) -> Option<i32> {
        let delta = address.raw() as i128 - base.raw() as i128;
        if delta == 0 || delta <= i32::MIN as i128 || delta >= i32::MAX as i128 {
            return None;
        }
        Some(delta as i32)
    }

    /// Whether `ptr` can be stored at `width` in a node based at `base`.
    pub(crate) fn fits_width(base: LogicalAddress, width: PointerWidth, ptr: NodePtr) -> bool {
        match (ptr, width) {
            (NodePtr::Empty, _) | (_, PointerWidth::Wide) => true,
            (p, PointerWidth::Narrow) => Self::narrow(base, p.address()).is_some(),
        }
    }

    /// Report whether `ptr` fits this array's width without storing it.
    pub(crate) fn check(&self, ptr: NodePtr) -> Result<(), EncodeError> {
        if Self::fits_width(self.base, self.width(), ptr) {
            Ok(())
        } else {
            Err(EncodeError::AddressOutOfRange {
                address: ptr.address(),
                base: self.base,
                width: self.width(),
            })
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.tags.len()
    }

    #[inline]
    pub(crate) fn base(&self) -> LogicalAddress {
        self.base
    }

    #[inline]
    pub(crate) fn width(&self) -> PointerWidth {
        match self.values {
            SlotArray::Narrow(_) => PointerWidth::Narrow,
            SlotArray::Wide(_) => PointerWidth::Wide,
        }
    }

    /// Encoded size in bytes (tags plus values).
    pub(crate) fn byte_size(&self) -> usize {
        self.capacity() * (1 + self.width().bytes())
    }

    /// Store `ptr` at `slot`, or report that it does not fit this width.
    pub(crate) fn try_store(&mut self, slot: usize, ptr: NodePtr) -> Result<(), EncodeError> {
        let (tag, address) = match ptr {
            NodePtr::Empty => {
                self.clear(slot);
                return Ok(());
            }
            NodePtr::Leaf(a) => (SlotTag::Leaf, a),
            NodePtr::Node(a) => (SlotTag::Node, a),
        };
        assert!(!address.is_null(), "storing a null address in slot {}", slot);
        match &mut self.values {
            SlotArray::Narrow(values) => match Self::narrow(self.base, address) {
                Some(v) => values[slot] = v,
                None => {
                    return Err(EncodeError::AddressOutOfRange {
                        address,
                        base: self.base,
                        width: PointerWidth::Narrow,
                    })
                }
            },
            SlotArray::Wide(values) => values[slot] = address.raw(),
        }
        self.tags[slot] = tag;
        Ok(())
    }

    /// Decode the pointer at `slot`.
    #[inline]
    #[track_caller]
    pub(crate) fn get(&self, slot: usize) -> NodePtr {
        let (raw_zero, address) = match &self.values {
            SlotArray::Narrow(values) => {
                let v = values[slot];
                (
                    v == 0,
                    LogicalAddress::from_raw((self.base.raw() as i64 + v as i64) as u64),
                )
            }
            SlotArray::Wide(values) => (values[slot] == 0, LogicalAddress::from_raw(values[slot])),
        };
        match (self.tags[slot], raw_zero) {
            (SlotTag::Empty, true) => NodePtr::Empty,
            (SlotTag::Leaf, false) => NodePtr::Leaf(address),
            (SlotTag::Node, false) => NodePtr::Node(address),
            (tag, zero) => panic!(
                "corrupt child slot {}: tag {:?} with zero value {}",
                slot, tag, zero
            ),
        }
    }

    #[inline]
    pub(crate) fn is_occupied(&self, slot: usize) -> bool {
        self.tags[slot] != SlotTag::Empty
    }

    pub(crate) fn clear(&mut self, slot: usize) {
        self.tags[slot] = SlotTag::Empty;
        match &mut self.values {
            SlotArray::Narrow(values) => values[slot] = 0,
            SlotArray::Wide(values) => values[slot] = 0,
        }
    }

    /// Move slots `at..len` one position right, leaving `at` empty.
    pub(crate) fn open_gap(&mut self, at: usize, len: usize) {
        debug_assert!(len < self.capacity());
        self.tags.copy_within(at..len, at + 1);
        match &mut self.values {
            SlotArray::Narrow(values) => values.copy_within(at..len, at + 1),
            SlotArray::Wide(values) => values.copy_within(at..len, at + 1),
        }
        self.clear(at);
    }

    /// Move slots `at + 1..len` one position left, overwriting `at`.
    pub(crate) fn close_gap(&mut self, at: usize, len: usize) {
        debug_assert!(at < len && len <= self.capacity());
        self.tags.copy_within(at + 1..len, at);
        match &mut self.values {
            SlotArray::Narrow(values) => values.copy_within(at + 1..len, at),
            SlotArray::Wide(values) => values.copy_within(at + 1..len, at),
        }
        self.clear(len - 1);
    }
}
