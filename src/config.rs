//! Tree configuration.

use crate::address::PAGE_SIZE;
use crate::encoding::PointerWidth;
use crate::error::{ConfigError, Result};

/// Largest number of pages `initial_capacity` may pre-reserve.
const MAX_INITIAL_PAGES: usize = 1 << 16;

/// Configuration for an [`Art`](crate::Art).
#[derive(Debug, Clone)]
pub struct ArtConfig {
    /// Bytes of leaf storage to reserve up front (rounded up to whole pages).
    pub initial_capacity: usize,
    /// Preferred child slot width for new nodes. Nodes fall back to
    /// [`PointerWidth::Wide`] when a child does not fit.
    pub pointer_width: PointerWidth,
    /// Track every freed leaf address so stale reads and double frees
    /// panic even after the record's bytes are reused. Costs a hash set
    /// lookup per access; on by default in debug builds.
    ///
    /// Without it a freed record still panics when read, until the
    /// allocator hands its bytes to a new record. A stale address that
    /// outlives the reuse resolves to the new record.
    pub validate_addresses: bool,
    /// Fragmentation ratio above which
    /// [`Art::needs_compaction`](crate::Art::needs_compaction) reports true.
    pub compaction_threshold: f64,
}

impl Default for ArtConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            pointer_width: PointerWidth::Narrow,
            validate_addresses: cfg!(debug_assertions),
            compaction_threshold: 0.5,
        }
    }
}

impl ArtConfig {
    /// Check that every field is usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.compaction_threshold > 0.0 && self.compaction_threshold <= 1.0) {
            return Err(ConfigError::CompactionThreshold(self.compaction_threshold));
        }
        if self.initial_pages() > MAX_INITIAL_PAGES {
            return Err(ConfigError::InitialCapacity(self.initial_capacity));
        }
        Ok(())
    }

    /// Number of leaf pages `initial_capacity` asks for.
    pub(crate) fn initial_pages(&self) -> usize {
        self.initial_capacity.div_ceil(PAGE_SIZE)
    }
}
