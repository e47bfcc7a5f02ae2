//! Node4 and Node16: sorted key array plus parallel child slots.

use super::{AddError, Fanout, NodeKind};
use crate::address::LogicalAddress;
use crate::encoding::{ChildSlots, NodePtr, PointerWidth};

/// Up to `N` children kept in ascending key order.
#[derive(Debug, Clone)]
pub(crate) struct SortedNode<const N: usize> {
    len: u8,
    keys: [u8; N],
    slots: ChildSlots,
}

pub(crate) type Node4 = SortedNode<4>;
pub(crate) type Node16 = SortedNode<16>;

impl<const N: usize> SortedNode<N> {
    /// Bitmask of populated slots whose key satisfies `pred`. Written as a
    /// branch-free sweep so the compiler can vectorize the Node16 case.
    #[inline]
    fn mask(&self, pred: impl Fn(u8) -> bool) -> u32 {
        let mut mask = 0u32;
        for (i, &k) in self.keys.iter().enumerate() {
            mask |= (pred(k) as u32) << i;
        }
        mask & ((1u32 << self.len) - 1)
    }

    #[inline]
    fn at(&self, slot: usize) -> (usize, u8) {
        (slot, self.keys[slot])
    }
}

impl<const N: usize> Fanout for SortedNode<N> {
    const KIND: NodeKind = if N == 4 { NodeKind::Node4 } else { NodeKind::Node16 };

    fn empty(base: LogicalAddress, width: PointerWidth) -> Self {
        Self {
            len: 0,
            keys: [0; N],
            slots: ChildSlots::new(N, base, width),
        }
    }

    #[inline]
    fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    fn slots(&self) -> &ChildSlots {
        &self.slots
    }

    #[inline]
    fn slots_mut(&mut self) -> &mut ChildSlots {
        &mut self.slots
    }

    #[inline]
    fn find(&self, byte: u8) -> Option<usize> {
        let mask = self.mask(|k| k == byte);
        (mask != 0).then(|| mask.trailing_zeros() as usize)
    }

    fn try_add(&mut self, byte: u8, ptr: NodePtr) -> Result<(), AddError> {
        let len = self.len();
        if len == N {
            return Err(AddError::Full);
        }
        self.slots.check(ptr).map_err(AddError::Encode)?;
        debug_assert!(self.find(byte).is_none(), "duplicate key byte {:#04x}", byte);

        let mask = self.mask(|k| k > byte);
        let at = if mask == 0 { len } else { mask.trailing_zeros() as usize };
        self.keys.copy_within(at..len, at + 1);
        self.keys[at] = byte;
        self.slots.open_gap(at, len);
        self.slots.try_store(at, ptr).map_err(AddError::Encode)?;
        self.len += 1;
        Ok(())
    }

    fn remove(&mut self, slot: usize, _byte: u8) {
        let len = self.len();
        assert!(slot < len, "removing slot {} of {}", slot, len);
        self.keys.copy_within(slot + 1..len, slot);
        self.keys[len - 1] = 0;
        self.slots.close_gap(slot, len);
        self.len -= 1;
    }

    fn first(&self) -> Option<(usize, u8)> {
        (self.len > 0).then(|| self.at(0))
    }

    fn last(&self) -> Option<(usize, u8)> {
        (self.len > 0).then(|| self.at(self.len() - 1))
    }

    fn ceil(&self, byte: u8) -> Option<(usize, u8)> {
        let mask = self.mask(|k| k >= byte);
        (mask != 0).then(|| self.at(mask.trailing_zeros() as usize))
    }

    fn floor(&self, byte: u8) -> Option<(usize, u8)> {
        let mask = self.mask(|k| k <= byte);
        (mask != 0).then(|| self.at(31 - mask.leading_zeros() as usize))
    }

    fn byte_size(&self) -> usize {
        1 + N + self.slots.byte_size()
    }
}
