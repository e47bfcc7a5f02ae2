//! Logical addresses.
//!
//! Every record stored by the engine is named by a [`LogicalAddress`]: a page
//! number and a byte offset packed into one `u64`. Addresses are never
//! dereferenced directly; they are resolved through the arena that issued
//! them.
//!
//! Page 0 is never handed out and no record lives at offset 0 of a page, so
//! the raw value 0 is free to mean "null" and the distance between a record
//! and any page start is never zero.

use std::fmt;

/// log2 of [`PAGE_SIZE`].
pub const PAGE_SHIFT: u32 = 18;

/// Size of one arena page in bytes (256 KiB).
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

const OFFSET_MASK: u64 = (PAGE_SIZE as u64) - 1;

/// Arena-relative handle of a stored record.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct LogicalAddress(u64);

impl LogicalAddress {
    /// The null address. Never names a record.
    pub const NULL: Self = Self(0);

    /// Wrap a raw address value.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Build an address from a page number and an offset inside that page.
    #[inline]
    pub const fn from_page_offset(page: usize, offset: usize) -> Self {
        debug_assert!(offset < PAGE_SIZE);
        Self(((page as u64) << PAGE_SHIFT) | offset as u64)
    }

    /// Raw `u64` value.
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Page number component.
    #[inline]
    pub const fn page(self) -> usize {
        (self.0 >> PAGE_SHIFT) as usize
    }

    /// Byte offset inside the page.
    #[inline]
    pub const fn offset(self) -> usize {
        (self.0 & OFFSET_MASK) as usize
    }

    /// Start of the page this address lives in.
    #[inline]
    pub const fn page_start(self) -> Self {
        Self(self.0 & !OFFSET_MASK)
    }
}

impl fmt::Debug for LogicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "LogicalAddress(null)")
        } else {
            write!(f, "LogicalAddress({}:{})", self.page(), self.offset())
        }
    }
}

impl fmt::Display for LogicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.page(), self.offset())
    }
}
