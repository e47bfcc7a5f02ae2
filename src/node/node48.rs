//! Node48: 256-entry byte index into 48 child slots.

use super::{AddError, Fanout, NodeKind};
use crate::address::LogicalAddress;
use crate::encoding::{ChildSlots, NodePtr, PointerWidth};

const CAPACITY: usize = 48;

#[derive(Debug, Clone)]
pub(crate) struct Node48 {
    len: u8,
    /// `slot + 1` for each present key byte, 0 when absent.
    index: Box<[u8; 256]>,
    slots: ChildSlots,
}

impl Node48 {
    #[inline]
    fn entry(&self, byte: usize) -> Option<(usize, u8)> {
        match self.index[byte] {
            0 => None,
            i => Some((i as usize - 1, byte as u8)),
        }
    }
}

impl Fanout for Node48 {
    const KIND: NodeKind = NodeKind::Node48;

    fn empty(base: LogicalAddress, width: PointerWidth) -> Self {
        Self {
            len: 0,
            index: Box::new([0; 256]),
            slots: ChildSlots::new(CAPACITY, base, width),
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
        if self.len() == CAPACITY {
            return Err(AddError::Full);
        }
        self.slots.check(ptr).map_err(AddError::Encode)?;
        debug_assert_eq!(self.index[byte as usize], 0, "duplicate key byte {:#04x}", byte);

        let Some(slot) = (0..CAPACITY).find(|&s| !self.slots.is_occupied(s)) else {
            panic!("Node48 holds {} children but has no free slot", self.len);
        };
        self.slots.try_store(slot, ptr).map_err(AddError::Encode)?;
        self.index[byte as usize] = slot as u8 + 1;
        self.len += 1;
        Ok(())
    }

    fn remove(&mut self, slot: usize, byte: u8) {
        assert_eq!(
            self.index[byte as usize] as usize,
            slot + 1,
            "Node48 index out of sync for byte {:#04x}",
            byte
        );
        self.index[byte as usize] = 0;
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
        1 + 256 + self.slots.byte_size()
    }
}
