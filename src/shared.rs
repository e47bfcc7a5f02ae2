//! Latched access to a tree shared between threads.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::arena::LogicalAllocator;
use crate::config::ArtConfig;
use crate::error::Result;
use crate::leaf::LeafOptions;
use crate::tree::Art;

/// An [`Art`] behind a read/write latch.
///
/// Readers share the latch; inserts and removes take it exclusively for
/// their whole duration, so a split or merge is never observed half done.
pub struct SharedArt {
    inner: RwLock<Art>,
    /// Number of entries, readable without the latch.
    len: AtomicUsize,
}

impl Default for SharedArt {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedArt {
    pub fn new() -> Self {
        Self::from_tree(Art::new())
    }

    pub fn with_config(config: ArtConfig) -> Result<Self> {
        Ok(Self::from_tree(Art::with_config(config)?))
    }

    /// Wrap an existing tree.
    pub fn from_tree(tree: Art) -> Self {
        let len = tree.len;
        Self {
            inner: RwLock::new(tree),
            len: AtomicUsize::new(len),
        }
    }

    /// Insert or replace a key. Returns the previous value.
    pub fn insert(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Option<Vec<u8>> {
        self.insert_with(key, value, LeafOptions::default(), true)
    }

    pub fn insert_with(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        options: LeafOptions,
        replace: bool,
    ) -> Option<Vec<u8>> {
        let mut inner = self.inner.write();
        let old = inner.insert_with(key.as_ref(), value.as_ref(), options, replace);
        if old.is_none() {
            self.len.fetch_add(1, Ordering::Relaxed);
        }
        old
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<Vec<u8>> {
        let inner = self.inner.read();
        inner.get(key.as_ref()).map(<[u8]>::to_vec)
    }

    pub fn contains(&self, key: impl AsRef<[u8]>) -> bool {
        self.inner.read().contains_key(key.as_ref())
    }

    /// Remove a key. Returns its value.
    pub fn remove(&self, key: impl AsRef<[u8]>) -> Option<Vec<u8>> {
        let mut inner = self.inner.write();
        let old = inner.remove(key.as_ref());
        if old.is_some() {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
        old
    }

    /// Entries in `[start, end)`.
    pub fn range(&self, start: impl AsRef<[u8]>, end: impl AsRef<[u8]>) -> Vec<(Vec<u8>, Vec<u8>)> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        let _: ControlFlow<()> = inner.range(start.as_ref(), end.as_ref(), |leaf| {
            out.push((leaf.key().to_vec(), leaf.value().to_vec()));
            ControlFlow::Continue(())
        });
        out
    }

    /// Entries whose key starts with `prefix`.
    pub fn prefix(&self, prefix: impl AsRef<[u8]>) -> Vec<(Vec<u8>, Vec<u8>)> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        let _: ControlFlow<()> = inner.for_each_prefix(prefix.as_ref(), |leaf| {
            out.push((leaf.key().to_vec(), leaf.value().to_vec()));
            ControlFlow::Continue(())
        });
        out
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shared latch over the whole tree.
    pub fn read(&self) -> RwLockReadGuard<'_, Art> {
        self.inner.read()
    }

    /// Exclusive latch over the whole tree. The cached length is
    /// republished when the guard drops.
    pub fn write(&self) -> SharedWriteGuard<'_> {
        SharedWriteGuard {
            guard: self.inner.write(),
            len: &self.len,
        }
    }

    /// Run `f` over the raw leaf pages while holding the exclusive latch,
    /// so page inspection never overlaps a mutation.
    pub fn with_pages<R>(&self, f: impl FnOnce(&LogicalAllocator) -> R) -> R {
        let inner = self.inner.write();
        f(inner.allocator())
    }
}

/// Exclusive latch that republishes the entry count on release.
pub struct SharedWriteGuard<'a> {
    guard: RwLockWriteGuard<'a, Art>,
    len: &'a AtomicUsize,
}

impl std::ops::Deref for SharedWriteGuard<'_> {
    type Target = Art;

    fn deref(&self) -> &Art {
        &self.guard
    }
}

impl std::ops::DerefMut for SharedWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut Art {
        &mut self.guard
    }
}

impl Drop for SharedWriteGuard<'_> {
    fn drop(&mut self) {
        self.len.store(self.guard.len, Ordering::Relaxed);
    }
}
