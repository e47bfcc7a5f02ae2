//! Paged storage behind logical addresses.
//!
//! Two arenas back the tree:
//!
//! - [`LogicalAllocator`]: variable-sized byte records (leaves), bump
//!   allocated inside 256 KiB pages with per-size free bins.
//! - [`NodeArena`]: typed slots for internal nodes, grouped into pages with
//!   the same address geometry.
//!
//! Both hand out [`LogicalAddress`]es whose offset is never 0, which is what
//! lets encoded child slots use 0 for "empty".

mod slab;

pub(crate) use slab::NodeArena;

use std::collections::{HashMap, HashSet};

use crate::address::{LogicalAddress, PAGE_SIZE};

/// Bytes reserved at the start of every leaf page.
pub const PAGE_HEADER: usize = 8;

/// Records are padded to this alignment.
const ALIGN: usize = 8;

/// Largest record that shares a page with others. Bigger records get a
/// dedicated page.
pub const MAX_INLINE_RECORD: usize = PAGE_SIZE - PAGE_HEADER;

#[inline]
fn padded(size: usize) -> usize {
    (size + ALIGN - 1) & !(ALIGN - 1)
}

struct Page {
    /// Page bytes up to the bump position. Header included.
    data: Vec<u8>,
    live: usize,
    fragmentation: usize,
    dedicated: bool,
}

impl Page {
    fn new(number: usize, mut data: Vec<u8>, dedicated: bool) -> Self {
        data.clear();
        data.extend_from_slice(&(number as u64).to_le_bytes());
        Self {
            data,
            live: 0,
            fragmentation: 0,
            dedicated,
        }
    }
}

/// Summary of one live page, for defragmentation and persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    /// Page number (the high bits of every address in it).
    pub page: usize,
    /// Bytes written so far, header included.
    pub used: usize,
    /// Records currently allocated in the page.
    pub live_records: usize,
    /// Bytes held by freed records that have not been reused.
    pub fragmentation: usize,
    /// The page holds a single oversize record.
    pub dedicated: bool,
}

/// Allocator for variable-sized records addressed by [`LogicalAddress`].
///
/// Not thread-safe; callers coordinate through the same latch that guards
/// the tree.
pub struct LogicalAllocator {
    /// Indexed by page number. Page 0 is reserved and always `None`.
    pages: Vec<Option<Page>>,
    /// Page numbers whose page was released and may be reissued.
    released: Vec<usize>,
    /// Reserved but unused page buffers.
    spare: Vec<Vec<u8>>,
    /// Freed records keyed by padded size.
    bins: HashMap<usize, Vec<LogicalAddress>>,
    /// Page receiving bump allocations, 0 when none is open.
    current: usize,
    allocated: usize,
    fragmentation: usize,
    live_records: usize,
    /// Freed addresses, tracked only when validation is on.
    freed: Option<HashSet<LogicalAddress>>,
}

impl Default for LogicalAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl LogicalAllocator {
    /// Create an empty allocator with address validation off.
    pub fn new() -> Self {
        Self::with_capacity(0, false)
    }

    /// Create an allocator with `pages` page buffers reserved up front.
    pub fn with_capacity(pages: usize, validate: bool) -> Self {
        let mut all = Vec::with_capacity(pages + 1);
        all.push(None);
        Self {
            pages: all,
            released: Vec::new(),
            spare: (0..pages).map(|_| Vec::with_capacity(PAGE_SIZE)).collect(),
            bins: HashMap::new(),
            current: 0,
            allocated: 0,
            fragmentation: 0,
            live_records: 0,
            freed: validate.then(HashSet::new),
        }
    }

    /// Address of the first page. Relative encodings are computed against
    /// page starts, and this is the lowest one ever issued.
    pub fn base(&self) -> LogicalAddress {
        LogicalAddress::from_page_offset(1, 0)
    }

    /// Reserve a zeroed record of `size` bytes.
    pub fn new_address(&mut self, size: usize) -> LogicalAddress {
        assert!(size > 0, "zero-sized record");
        let size = padded(size);

        let addr = match self.bins.get_mut(&size).and_then(Vec::pop) {
            Some(addr) => {
                let page = self.page_mut(addr);
                page.data[addr.offset()..addr.offset() + size].fill(0);
                page.live += 1;
                page.fragmentation -= size;
                self.fragmentation -= size;
                addr
            }
            None if size > MAX_INLINE_RECORD => {
                let number = self.open_page(Vec::with_capacity(PAGE_HEADER + size), true);
                let Some(page) = self.pages[number].as_mut() else {
                    unreachable!("page {} was just opened", number);
                };
                page.data.resize(PAGE_HEADER + size, 0);
                page.live += 1;
                LogicalAddress::from_page_offset(number, PAGE_HEADER)
            }
            None => {
                let needs_page = match self.pages.get(self.current) {
                    Some(Some(page)) => page.data.len() + size > PAGE_SIZE,
                    _ => true,
                };
                if needs_page {
                    let buffer = self
                        .spare
                        .pop()
                        .unwrap_or_else(|| Vec::with_capacity(PAGE_SIZE));
                    self.current = self.open_page(buffer, false);
                }
                let number = self.current;
                let Some(page) = self.pages[number].as_mut() else {
                    unreachable!("current page {} is open", number);
                };
                let offset = page.data.len();
                page.data.resize(offset + size, 0);
                page.live += 1;
                LogicalAddress::from_page_offset(number, offset)
            }
        };

        if let Some(freed) = self.freed.as_mut() {
            freed.remove(&addr);
        }
        self.allocated += size;
        self.live_records += 1;
        addr
    }

    /// Bytes starting at `addr`, through the end of its page's written
    /// region. Panics on a stale or out-of-range address.
    #[track_caller]
    pub fn read(&self, addr: LogicalAddress) -> &[u8] {
        self.check_live(addr);
        let page = self.page(addr);
        &page.data[addr.offset()..]
    }

    /// Mutable view of the bytes starting at `addr`.
    #[track_caller]
    pub fn modify(&mut self, addr: LogicalAddress) -> &mut [u8] {
        self.check_live(addr);
        let page = self.page_mut(addr);
        &mut page.data[addr.offset()..]
    }

    /// Release a record previously reserved with `size` bytes.
    #[track_caller]
    pub fn free(&mut self, addr: LogicalAddress, size: usize) {
        let size = padded(size);
        if let Some(freed) = self.freed.as_mut() {
            assert!(freed.insert(addr), "double free of record {}", addr);
        }
        let page = self.page_mut(addr);
        assert!(
            addr.offset() + size <= page.data.len(),
            "record {} of {} bytes overruns its page",
            addr,
            size
        );
        page.live -= 1;
        let emptied = page.live == 0;
        if !emptied {
            page.fragmentation += size;
        }
        self.allocated -= size;
        self.live_records -= 1;

        if emptied {
            self.release_page(addr.page());
        } else {
            self.fragmentation += size;
            self.bins.entry(size).or_default().push(addr);
        }
    }

    /// Bytes held by live records (padding included).
    pub fn allocated_bytes(&self) -> usize {
        self.allocated
    }

    /// Bytes held by freed records awaiting reuse.
    pub fn fragmentation_bytes(&self) -> usize {
        self.fragmentation
    }

    /// Share of reserved record bytes that are free holes.
    pub fn fragmentation_ratio(&self) -> f64 {
        let total = self.allocated + self.fragmentation;
        if total == 0 {
            0.0
        } else {
            self.fragmentation as f64 / total as f64
        }
    }

    /// Number of live records.
    pub fn live_records(&self) -> usize {
        self.live_records
    }

    /// Number of open pages.
    pub fn page_count(&self) -> usize {
        self.pages.iter().filter(|p| p.is_some()).count()
    }

    /// Enumerate open pages in page-number order.
    pub fn pages(&self) -> impl Iterator<Item = PageInfo> + '_ {
        self.pages.iter().enumerate().filter_map(|(number, page)| {
            page.as_ref().map(|p| PageInfo {
                page: number,
                used: p.data.len(),
                live_records: p.live,
                fragmentation: p.fragmentation,
                dedicated: p.dedicated,
            })
        })
    }

    /// Raw bytes of a page (header included), `None` if it is not open.
    pub fn page_buffer(&self, page: usize) -> Option<&[u8]> {
        self.pages
            .get(page)
            .and_then(Option::as_ref)
            .map(|p| p.data.as_slice())
    }

    /// Up to `max` fragmented pages, most fragmented first.
    pub fn fragmentation_list(&self, max: usize) -> Vec<usize> {
        let mut pages: Vec<PageInfo> = self.pages().filter(|p| p.fragmentation > 0).collect();
        pages.sort_by(|a, b| b.fragmentation.cmp(&a.fragmentation).then(a.page.cmp(&b.page)));
        pages.into_iter().take(max).map(|p| p.page).collect()
    }

    /// Drop every page and reset accounting.
    pub fn clear(&mut self) {
        let validate = self.freed.is_some();
        *self = Self::with_capacity(0, validate);
    }

    /// Burn `n` page numbers so the next page opened lies far from the
    /// ones before it.
    #[cfg(test)]
    pub(crate) fn skip_pages(&mut self, n: usize) {
        self.pages.extend((0..n).map(|_| None));
        self.current = 0;
    }

    fn open_page(&mut self, buffer: Vec<u8>, dedicated: bool) -> usize {
        let number = match self.released.pop() {
            Some(n) => n,
            None => {
                self.pages.push(None);
                self.pages.len() - 1
            }
        };
        self.pages[number] = Some(Page::new(number, buffer, dedicated));
        tracing::trace!(page = number, dedicated, "opened leaf page");
        number
    }

    fn release_page(&mut self, number: usize) {
        let Some(page) = self.pages[number].as_mut() else {
            return;
        };
        self.fragmentation -= page.fragmentation;
        page.fragmentation = 0;

        for list in self.bins.values_mut() {
            list.retain(|a| a.page() != number);
        }
        self.bins.retain(|_, list| !list.is_empty());
        if let Some(freed) = self.freed.as_mut() {
            freed.retain(|a| a.page() != number);
        }

        if number == self.current {
            // Keep the bump page; rewind it past the header.
            page.data.truncate(PAGE_HEADER);
            tracing::trace!(page = number, "rewound empty leaf page");
        } else {
            let page = self.pages[number].take();
            if let Some(page) = page.filter(|p| !p.dedicated) {
                self.spare.push(page.data);
            }
            self.released.push(number);
            tracing::trace!(page = number, "released leaf page");
        }
    }

    #[track_caller]
    fn check_live(&self, addr: LogicalAddress) {
        if let Some(freed) = self.freed.as_ref() {
            assert!(!freed.contains(&addr), "access to freed record {}", addr);
        }
    }

    #[track_caller]
    fn page(&self, addr: LogicalAddress) -> &Page {
        let page = self
            .pages
            .get(addr.page())
            .and_then(Option::as_ref)
            .unwrap_or_else(|| panic!("record {} is not in an open page", addr));
        assert!(
            addr.offset() >= PAGE_HEADER && addr.offset() < page.data.len(),
            "record {} is outside its page",
            addr
        );
        page
    }

    #[track_caller]
    fn page_mut(&mut self, addr: LogicalAddress) -> &mut Page {
        let page = self
            .pages
            .get_mut(addr.page())
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("record {} is not in an open page", addr));
        assert!(
            addr.offset() >= PAGE_HEADER && addr.offset() < page.data.len(),
            "record {} is outside its page",
            addr
        );
        page
    }
}
