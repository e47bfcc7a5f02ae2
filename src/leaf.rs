//! Leaf records.
//!
//! A leaf is one variable-length record in the [`LogicalAllocator`]:
//!
//! ```text
//! [flags u8][pad 3][key_len u32][val_len u32][expiry i64]?[compressed u32]? key value
//! ```
//!
//! The optional fields are present only when the matching flag is set.
//!
//! [`LogicalAllocator`]: crate::arena::LogicalAllocator

use std::cmp::Ordering;
use std::fmt;

use crate::address::LogicalAddress;

const FLAG_DELETED: u8 = 1 << 0;
const FLAG_VOLATILE: u8 = 1 << 1;
const FLAG_EXPIRY: u8 = 1 << 2;
const FLAG_COMPRESSED: u8 = 1 << 3;
/// Set on release. Reuse zeroes the record, so a set bit means the address
/// is stale.
const FLAG_FREED: u8 = 1 << 7;

const FIXED_HEADER: usize = 12;

/// Optional per-leaf attributes set at insert time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeafOptions {
    /// Absolute expiry timestamp in milliseconds.
    pub expiry: Option<i64>,
    /// Whether the key is eligible for volatile eviction policies.
    pub volatile: bool,
    /// Original size when the stored value is compressed.
    pub compressed_size: Option<u32>,
}

impl LeafOptions {
    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.volatile {
            flags |= FLAG_VOLATILE;
        }
        if self.expiry.is_some() {
            flags |= FLAG_EXPIRY;
        }
        if self.compressed_size.is_some() {
            flags |= FLAG_COMPRESSED;
        }
        flags
    }
}

fn optional_len(flags: u8) -> usize {
    let mut len = 0;
    if flags & FLAG_EXPIRY != 0 {
        len += 8;
    }
    if flags & FLAG_COMPRESSED != 0 {
        len += 4;
    }
    len
}

/// Bytes a leaf with these contents occupies.
pub(crate) fn record_size(key: &[u8], value: &[u8], options: &LeafOptions) -> usize {
    FIXED_HEADER + optional_len(options.flags()) + key.len() + value.len()
}

/// Initialize a freshly reserved record.
pub(crate) fn write(buf: &mut [u8], key: &[u8], value: &[u8], options: &LeafOptions) {
    let key_len = u32::try_from(key.len()).unwrap_or_else(|_| panic!("key of {} bytes is too long", key.len()));
    let val_len =
        u32::try_from(value.len()).unwrap_or_else(|_| panic!("value of {} bytes is too long", value.len()));
    let flags = options.flags();
    buf[0] = flags;
    buf[1..4].fill(0);
    buf[4..8].copy_from_slice(&key_len.to_le_bytes());
    buf[8..12].copy_from_slice(&val_len.to_le_bytes());

    let mut at = FIXED_HEADER;
    if let Some(expiry) = options.expiry {
        buf[at..at + 8].copy_from_slice(&expiry.to_le_bytes());
        at += 8;
    }
    if let Some(size) = options.compressed_size {
        buf[at..at + 4].copy_from_slice(&size.to_le_bytes());
        at += 4;
    }
    buf[at..at + key.len()].copy_from_slice(key);
    at += key.len();
    buf[at..at + value.len()].copy_from_slice(value);
}

/// Rewrite a record in place with a new value and options. The record
/// size must not change. Clears the tombstone flag.
pub(crate) fn rewrite_value(buf: &mut [u8], value: &[u8], options: &LeafOptions) {
    let key_len = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
    let mut key = Vec::with_capacity(key_len);
    key.extend_from_slice(&buf[FIXED_HEADER + optional_len(buf[0])..][..key_len]);
    write(buf, &key, value, options);
}

/// Poison a record that is about to be released.
pub(crate) fn mark_freed(buf: &mut [u8]) {
    buf[0] |= FLAG_FREED;
}

pub(crate) fn set_deleted(buf: &mut [u8], deleted: bool) {
    if deleted {
        buf[0] |= FLAG_DELETED;
    } else {
        buf[0] &= !FLAG_DELETED;
    }
}

/// Read-only view of a stored leaf.
#[derive(Clone, Copy)]
pub struct Leaf<'a> {
    address: LogicalAddress,
    flags: u8,
    key: &'a [u8],
    value: &'a [u8],
    extra: &'a [u8],
}

impl<'a> Leaf<'a> {
    /// Parse the record at the front of `bytes`.
    #[track_caller]
    pub(crate) fn parse(address: LogicalAddress, bytes: &'a [u8]) -> Self {
        assert!(bytes.len() >= FIXED_HEADER, "truncated leaf header at {}", address);
        let flags = bytes[0];
        assert!(flags & FLAG_FREED == 0, "stale leaf record at {}", address);
        let key_len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let val_len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let extra_len = optional_len(flags);
        let total = FIXED_HEADER + extra_len + key_len + val_len;
        assert!(bytes.len() >= total, "leaf at {} overruns its page", address);

        let extra = &bytes[FIXED_HEADER..FIXED_HEADER + extra_len];
        let key = &bytes[FIXED_HEADER + extra_len..][..key_len];
        let value = &bytes[FIXED_HEADER + extra_len + key_len..][..val_len];
        Self {
            address,
            flags,
            key,
            value,
            extra,
        }
    }

    /// Where this leaf is stored.
    #[inline]
    pub fn address(&self) -> LogicalAddress {
        self.address
    }

    #[inline]
    pub fn key(&self) -> &'a [u8] {
        self.key
    }

    #[inline]
    pub fn value(&self) -> &'a [u8] {
        self.value
    }

    /// Expiry timestamp in milliseconds, if one was set.
    pub fn expiry(&self) -> Option<i64> {
        if self.flags & FLAG_EXPIRY == 0 {
            return None;
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.extra[..8]);
        Some(i64::from_le_bytes(raw))
    }

    pub fn is_volatile(&self) -> bool {
        self.flags & FLAG_VOLATILE != 0
    }

    /// Tombstone flag.
    pub fn is_deleted(&self) -> bool {
        self.flags & FLAG_DELETED != 0
    }

    pub fn compressed_size(&self) -> Option<u32> {
        if self.flags & FLAG_COMPRESSED == 0 {
            return None;
        }
        let at = if self.flags & FLAG_EXPIRY != 0 { 8 } else { 0 };
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.extra[at..at + 4]);
        Some(u32::from_le_bytes(raw))
    }

    /// Options this leaf was written with.
    pub fn options(&self) -> LeafOptions {
        LeafOptions {
            expiry: self.expiry(),
            volatile: self.is_volatile(),
            compressed_size: self.compressed_size(),
        }
    }

    /// Record size computed from the header.
    pub fn byte_size(&self) -> usize {
        FIXED_HEADER + self.extra.len() + self.key.len() + self.value.len()
    }

    /// Exact byte-wise comparison of the stored key with `key`.
    #[inline]
    pub fn compare(&self, key: &[u8]) -> Ordering {
        self.key.cmp(key)
    }

    #[inline]
    pub fn matches(&self, key: &[u8]) -> bool {
        self.key == key
    }
}

impl fmt::Debug for Leaf<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Leaf")
            .field("address", &self.address)
            .field("key", &String::from_utf8_lossy(self.key))
            .field("value_len", &self.value.len())
            .field("deleted", &self.is_deleted())
            .finish()
    }
}
