//! Internal nodes.
//!
//! Every internal node carries a [`Header`] (compressed prefix and optional
//! terminal leaf) and one of four fan-out bodies:
//!
//! - Node4: up to 4 children, sorted keys
//! - Node16: 5-16 children, sorted keys scanned as a bitmask
//! - Node48: 17-48 children behind a 256-entry byte index
//! - Node256: 49-256 children indexed directly by key byte
//!
//! A node never changes its variant in place. Growth, shrinking and
//! widening all build a new node from [`Node::entries`] and the caller
//! redirects the parent slot.

mod node256;
mod node48;
mod sorted;

use std::fmt;

use smallvec::SmallVec;

use crate::address::LogicalAddress;
use crate::encoding::{ChildSlots, NodePtr, PointerWidth};
use crate::error::EncodeError;

pub(crate) use node256::Node256;
pub(crate) use node48::Node48;
pub(crate) use sorted::{Node16, Node4};

/// Prefix bytes stored inline in a node header. Longer prefixes keep only
/// their length beyond this point; the bytes are recovered from a leaf.
pub const MAX_PREFIX_LEN: usize = 12;

/// Ordered `(key byte, child)` pairs of a node.
pub(crate) type Entries = SmallVec<[(u8, NodePtr); 16]>;

/// Fan-out variant of an internal node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Node4,
    Node16,
    Node48,
    Node256,
}

impl NodeKind {
    /// Maximum number of children.
    pub const fn capacity(self) -> usize {
        match self {
            NodeKind::Node4 => 4,
            NodeKind::Node16 => 16,
            NodeKind::Node48 => 48,
            NodeKind::Node256 => 256,
        }
    }

    /// Variant to move to when a child is added to a full node.
    pub(crate) const fn grown(self) -> Option<NodeKind> {
        match self {
            NodeKind::Node4 => Some(NodeKind::Node16),
            NodeKind::Node16 => Some(NodeKind::Node48),
            NodeKind::Node48 => Some(NodeKind::Node256),
            NodeKind::Node256 => None,
        }
    }

    /// Occupancy at which the node shrinks, and the variant it shrinks to.
    pub(crate) const fn shrink(self) -> Option<(usize, NodeKind)> {
        match self {
            NodeKind::Node4 => None,
            NodeKind::Node16 => Some((3, NodeKind::Node4)),
            NodeKind::Node48 => Some((12, NodeKind::Node16)),
            NodeKind::Node256 => Some((37, NodeKind::Node48)),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Node4 => "Node4",
            NodeKind::Node16 => "Node16",
            NodeKind::Node48 => "Node48",
            NodeKind::Node256 => "Node256",
        };
        f.write_str(name)
    }
}

/// Where a trace stands inside a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// The node's terminal leaf. Sorts before every child.
    Terminal,
    /// A child slot and the key byte leading to it.
    Child { slot: usize, key: u8 },
}

/// Comparison used by [`Node::index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Equal,
    /// Greatest key byte below the probe.
    Less,
    /// Greatest key byte not above the probe.
    LessEqual,
    /// Smallest key byte not below the probe.
    GreaterEqual,
    /// Smallest key byte above the probe.
    Greater,
}

/// Prefix and terminal state shared by every variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Header {
    /// Full compressed prefix length; may exceed [`MAX_PREFIX_LEN`].
    pub(crate) prefix_len: usize,
    pub(crate) partial: [u8; MAX_PREFIX_LEN],
    /// Leaf whose key ends right after this node's prefix, or null.
    pub(crate) terminal: LogicalAddress,
}

impl Header {
    /// Header for a node whose full prefix is `prefix`.
    pub(crate) fn with_prefix(prefix: &[u8]) -> Self {
        let mut header = Self::default();
        header.set_prefix(prefix, prefix.len());
        header
    }

    /// Store `stored` (at least `min(len, MAX_PREFIX_LEN)` leading bytes of
    /// the prefix) as a prefix of `len` bytes.
    pub(crate) fn set_prefix(&mut self, stored: &[u8], len: usize) {
        let keep = len.min(MAX_PREFIX_LEN);
        assert!(stored.len() >= keep, "prefix of {} bytes given {} stored", len, stored.len());
        self.partial = [0; MAX_PREFIX_LEN];
        self.partial[..keep].copy_from_slice(&stored[..keep]);
        self.prefix_len = len;
    }

    /// Inline prefix bytes.
    #[inline]
    pub(crate) fn stored_prefix(&self) -> &[u8] {
        &self.partial[..self.prefix_len.min(MAX_PREFIX_LEN)]
    }

    #[inline]
    pub(crate) fn has_terminal(&self) -> bool {
        !self.terminal.is_null()
    }
}

#[derive(Debug)]
pub(crate) enum AddError {
    Full,
    Encode(EncodeError),
}

/// Operations every fan-out body provides. Slots are storage positions;
/// the paired `u8` is the key byte, so traversal works in key order
/// regardless of how a variant lays out its slots.
pub(crate) trait Fanout: Sized {
    const KIND: NodeKind;

    fn empty(base: LogicalAddress, width: PointerWidth) -> Self;
    fn len(&self) -> usize;
    fn slots(&self) -> &ChildSlots;
    fn slots_mut(&mut self) -> &mut ChildSlots;
    fn find(&self, byte: u8) -> Option<usize>;
    /// Add a child for an absent key byte.
    fn try_add(&mut self, byte: u8, ptr: NodePtr) -> Result<(), AddError>;
    fn remove(&mut self, slot: usize, byte: u8);
    fn first(&self) -> Option<(usize, u8)>;
    fn last(&self) -> Option<(usize, u8)>;
    /// First child whose key byte is `>= byte`.
    fn ceil(&self, byte: u8) -> Option<(usize, u8)>;
    /// Last child whose key byte is `<= byte`.
    fn floor(&self, byte: u8) -> Option<(usize, u8)>;
    /// Approximate encoded size of the body.
    fn byte_size(&self) -> usize;
}

#[derive(Debug, Clone)]
pub(crate) enum Body {
    Node4(Node4),
    Node16(Node16),
    Node48(Node48),
    Node256(Node256),
}

macro_rules! dispatch {
    ($body:expr, $n:ident => $e:expr) => {
        match $body {
            Body::Node4($n) => $e,
            Body::Node16($n) => $e,
            Body::Node48($n) => $e,
            Body::Node256($n) => $e,
        }
    };
}

#[inline]
fn child_position((slot, key): (usize, u8)) -> Position {
    Position::Child { slot, key }
}

/// An internal node: header plus fan-out body.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) header: Header,
    body: Body,
}

impl Node {
    /// Width to use for a node based at `base` holding `entries`.
    pub(crate) fn pick_width(
        base: LogicalAddress,
        preferred: PointerWidth,
        entries: &[(u8, NodePtr)],
    ) -> PointerWidth {
        match preferred {
            PointerWidth::Wide => PointerWidth::Wide,
            PointerWidth::Narrow => {
                let fits = entries
                    .iter()
                    .all(|&(_, ptr)| ChildSlots::fits_width(base, PointerWidth::Narrow, ptr));
                if fits {
                    PointerWidth::Narrow
                } else {
                    PointerWidth::Wide
                }
            }
        }
    }

    /// Build a node of `kind` from ordered entries.
    pub(crate) fn build(
        kind: NodeKind,
        header: Header,
        entries: &[(u8, NodePtr)],
        base: LogicalAddress,
        width: PointerWidth,
    ) -> Result<Self, EncodeError> {
        assert!(
            entries.len() <= kind.capacity(),
            "{} entries do not fit a {}",
            entries.len(),
            kind
        );
        debug_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0), "entries out of order");

        let mut body = match kind {
            NodeKind::Node4 => Body::Node4(Node4::empty(base, width)),
            NodeKind::Node16 => Body::Node16(Node16::empty(base, width)),
            NodeKind::Node48 => Body::Node48(Node48::empty(base, width)),
            NodeKind::Node256 => Body::Node256(Node256::empty(base, width)),
        };
        for &(byte, ptr) in entries {
            let added = dispatch!(&mut body, n => n.try_add(byte, ptr));
            match added {
                Ok(()) => {}
                Err(AddError::Encode(e)) => return Err(e),
                Err(AddError::Full) => unreachable!("capacity checked above"),
            }
        }
        Ok(Self { header, body })
    }

    #[inline]
    pub(crate) fn kind(&self) -> NodeKind {
        match self.body {
            Body::Node4(_) => Node4::KIND,
            Body::Node16(_) => Node16::KIND,
            Body::Node48(_) => Node48::KIND,
            Body::Node256(_) => Node256::KIND,
        }
    }

    /// Number of children, terminal excluded.
    #[inline]
    pub(crate) fn occupants(&self) -> usize {
        dispatch!(&self.body, n => n.len())
    }

    #[inline]
    pub(crate) fn width(&self) -> PointerWidth {
        dispatch!(&self.body, n => n.slots().width())
    }

    #[inline]
    pub(crate) fn base(&self) -> LogicalAddress {
        dispatch!(&self.body, n => n.slots().base())
    }

    pub(crate) fn byte_size(&self) -> usize {
        std::mem::size_of::<Header>() + dispatch!(&self.body, n => n.byte_size())
    }

    #[inline]
    pub(crate) fn find(&self, byte: u8) -> Option<usize> {
        dispatch!(&self.body, n => n.find(byte))
    }

    #[inline]
    #[track_caller]
    pub(crate) fn child(&self, slot: usize) -> NodePtr {
        dispatch!(&self.body, n => n.slots().get(slot))
    }

    /// Position of the child for `byte`, if present.
    pub(crate) fn position_of(&self, byte: u8) -> Option<Position> {
        self.find(byte).map(|slot| Position::Child { slot, key: byte })
    }

    /// Child or terminal at `pos`.
    #[track_caller]
    pub(crate) fn child_at(&self, pos: Position) -> NodePtr {
        match pos {
            Position::Terminal => {
                assert!(self.header.has_terminal(), "trace points at a missing terminal");
                NodePtr::Leaf(self.header.terminal)
            }
            Position::Child { slot, .. } => self.child(slot),
        }
    }

    /// Smallest position: the terminal if any, else the first child.
    pub(crate) fn first_position(&self) -> Option<Position> {
        if self.header.has_terminal() {
            return Some(Position::Terminal);
        }
        dispatch!(&self.body, n => n.first()).map(child_position)
    }

    pub(crate) fn last_position(&self) -> Option<Position> {
        match dispatch!(&self.body, n => n.last()) {
            Some(entry) => Some(child_position(entry)),
            None if self.header.has_terminal() => Some(Position::Terminal),
            None => None,
        }
    }

    pub(crate) fn next_position(&self, pos: Position) -> Option<Position> {
        match pos {
            Position::Terminal => dispatch!(&self.body, n => n.first()).map(child_position),
            Position::Child { key, .. } => self.index(key, Predicate::Greater),
        }
    }

    pub(crate) fn prev_position(&self, pos: Position) -> Option<Position> {
        match pos {
            Position::Terminal => None,
            Position::Child { key, .. } => match self.index(key, Predicate::Less) {
                Some(pos) => Some(pos),
                None if self.header.has_terminal() => Some(Position::Terminal),
                None => None,
            },
        }
    }

    /// First child whose key byte is `>= byte`, and whether it is an exact
    /// match.
    pub(crate) fn lower_bound_child(&self, byte: u8) -> Option<(Position, bool)> {
        self.index(byte, Predicate::GreaterEqual)
            .map(|pos| (pos, matches!(pos, Position::Child { key, .. } if key == byte)))
    }

    /// Child selected by comparing key bytes against `byte`.
    pub(crate) fn index(&self, byte: u8, predicate: Predicate) -> Option<Position> {
        let found = match predicate {
            Predicate::Equal => return self.position_of(byte),
            Predicate::GreaterEqual => dispatch!(&self.body, n => n.ceil(byte)),
            Predicate::Greater => byte
                .checked_add(1)
                .and_then(|b| dispatch!(&self.body, n => n.ceil(b))),
            Predicate::LessEqual => dispatch!(&self.body, n => n.floor(byte)),
            Predicate::Less => byte
                .checked_sub(1)
                .and_then(|b| dispatch!(&self.body, n => n.floor(b))),
        };
        found.map(child_position)
    }

    /// Add a child for an absent key byte.
    pub(crate) fn try_add(&mut self, byte: u8, ptr: NodePtr) -> Result<(), AddError> {
        dispatch!(&mut self.body, n => n.try_add(byte, ptr))
    }

    /// Point an occupied slot at a different subtree.
    pub(crate) fn try_replace(&mut self, slot: usize, ptr: NodePtr) -> Result<(), EncodeError> {
        assert!(!ptr.is_empty(), "replacing slot {} with an empty pointer", slot);
        dispatch!(&mut self.body, n => {
            assert!(n.slots().is_occupied(slot), "replacing empty slot {}", slot);
            n.slots_mut().try_store(slot, ptr)
        })
    }

    pub(crate) fn remove(&mut self, slot: usize, byte: u8) {
        dispatch!(&mut self.body, n => n.remove(slot, byte))
    }

    /// Children in key order.
    pub(crate) fn entries(&self) -> Entries {
        let mut entries = Entries::new();
        let mut cur = dispatch!(&self.body, n => n.first());
        while let Some((slot, key)) = cur {
            entries.push((key, self.child(slot)));
            cur = key.checked_add(1).and_then(|b| dispatch!(&self.body, n => n.ceil(b)));
        }
        entries
    }
}
