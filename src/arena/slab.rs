//! Typed node storage.

use crate::address::{LogicalAddress, PAGE_SIZE};

/// Address spacing between node slots.
pub(crate) const NODE_STRIDE: usize = 64;

/// Slots per node page. Slot offsets start at one stride so that no node
/// sits on its page start.
pub(crate) const NODES_PER_PAGE: usize = PAGE_SIZE / NODE_STRIDE - 1;

/// Paged slab of `T` addressed by [`LogicalAddress`].
pub(crate) struct NodeArena<T> {
    /// Indexed by page number; page 0 is reserved and stays empty.
    pages: Vec<Vec<Option<T>>>,
    free: Vec<LogicalAddress>,
    live: usize,
}

impl<T> Default for NodeArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> NodeArena<T> {
    pub(crate) fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            free: Vec::new(),
            live: 0,
        }
    }

    /// Store the value produced by `build`, which receives the slot's
    /// address before the value exists.
    pub(crate) fn insert_with(&mut self, build: impl FnOnce(LogicalAddress) -> T) -> LogicalAddress {
        let addr = match self.free.pop() {
            Some(addr) => addr,
            None => self.bump(),
        };
        let value = build(addr);
        let (page, slot) = Self::locate(addr);
        let entry = &mut self.pages[page][slot];
        debug_assert!(entry.is_none(), "node slot {} reissued while live", addr);
        *entry = Some(value);
        self.live += 1;
        addr
    }

    #[inline]
    #[track_caller]
    pub(crate) fn get(&self, addr: LogicalAddress) -> &T {
        let (page, slot) = Self::locate(addr);
        match self.pages.get(page).and_then(|p| p.get(slot)) {
            Some(Some(value)) => value,
            _ => panic!("stale or invalid node address {}", addr),
        }
    }

    #[inline]
    #[track_caller]
    pub(crate) fn get_mut(&mut self, addr: LogicalAddress) -> &mut T {
        let (page, slot) = Self::locate(addr);
        match self.pages.get_mut(page).and_then(|p| p.get_mut(slot)) {
            Some(Some(value)) => value,
            _ => panic!("stale or invalid node address {}", addr),
        }
    }

    #[track_caller]
    pub(crate) fn remove(&mut self, addr: LogicalAddress) -> T {
        let (page, slot) = Self::locate(addr);
        let taken = self
            .pages
            .get_mut(page)
            .and_then(|p| p.get_mut(slot))
            .and_then(Option::take);
        match taken {
            Some(value) => {
                self.free.push(addr);
                self.live -= 1;
                value
            }
            None => panic!("freeing stale or invalid node address {}", addr),
        }
    }

    /// Live values.
    pub(crate) fn len(&self) -> usize {
        self.live
    }

    /// Pages holding at least one slot.
    pub(crate) fn page_count(&self) -> usize {
        self.pages.len() - 1
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::new();
    }

    fn bump(&mut self) -> LogicalAddress {
        let needs_page = self.pages.len() == 1
            || self.pages.last().map_or(true, |p| p.len() == NODES_PER_PAGE);
        if needs_page {
            self.pages.push(Vec::new());
            tracing::trace!(page = self.pages.len() - 1, "opened node page");
        }
        let page = self.pages.len() - 1;
        let slots = &mut self.pages[page];
        slots.push(None);
        LogicalAddress::from_page_offset(page, slots.len() * NODE_STRIDE)
    }

    #[inline]
    #[track_caller]
    fn locate(addr: LogicalAddress) -> (usize, usize) {
        let offset = addr.offset();
        assert!(
            offset >= NODE_STRIDE && offset % NODE_STRIDE == 0,
            "misaligned node address {}",
            addr
        );
        (addr.page(), offset / NODE_STRIDE - 1)
    }
}
