//! Node256: one child slot per key byte.

use super::{AddError, Fanout, NodeKind};
use crate::address::LogicalAddress;
use crate::encoding::{ChildSlots, NodePtr, PointerWidth};

#[derive(Debug, Clone)]
pub(crate) struct Node256 {
    len: u16,
    slots: ChildSlots,
}

impl Node256 {
    #[inline]
    fn entry(&self, byte: usize) -> Option<(usize, u8)> {
        self.slots.is_occupied(byte).then_some((byte, byte as u8))
    }
}

impl Fanout for Node256 {
    const KIND: NodeKind = NodeKind::Node256;

    fn empty(base: LogicalAddress, width: PointerWidth) -> Self {
        Self {
            len: 0,
            slots: ChildSlots::new(256, base, width),
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
        self.entry(byte as usize).map(|(slot, _)| slot)
    }

    fn try_add(&mut self, byte: u8, ptr: NodePtr) -> Result<(), AddError> {
        debug_assert!(!self.slots.is_occupied(byte as usize), "duplicate key byte {:#04x}", byte);
        self.slots.try_store(byte as usize, ptr).map_err(AddError::Encode)?;
        self.len += 1;
        Ok(())
    }

    fn remove(&mut self, slot: usize, _byte: u8) {
        assert!(self.slots.is_occupied(slot), "removing empty Node256 slot {}", slot);
        self.slots.clear(slot);
        self.len -= 1;
    }

    fn first(&self) -> Option<(usize, u8)> {
        (0..256).find_map(|b| self.entry(b))
    }

    fn last(&self) -> Option<(usize, u8)> {
        (0..256).rev().find_map(|b| self.entry(b))
    }

    fn ceil(&self, byte: u8) -> Option<(usize, u8)> {
        (byte as usize..256).find_map(|b| self.entry(b))
    }

    fn floor(&self, byte: u8) -> Option<(usize, u8)> {
        (0..=byte as usize).rev().find_map(|b| self.entry(b))
    }

    fn byte_size(&self) -> usize {
        2 + self.slots.byte_size()
    }
}
