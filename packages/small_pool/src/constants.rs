// A poisoned pool lock means a slab free list may be half-updated. Cells handed out from it can
// no longer be trusted, so we refuse to continue (we panic).
pub(crate) const ERR_POISONED_LOCK: &str = "encountered poisoned pool lock - the free list of the \
    pool may be corrupted and continued execution could hand out aliased cells";

/// Cells per slab. A pool grows by one slab at a time.
#[cfg(not(miri))]
pub(crate) const SLAB_CAPACITY: usize = 128;

// Under Miri, we use a smaller slab capacity because Miri test runtime scales by memory usage.
#[cfg(miri)]
pub(crate) const SLAB_CAPACITY: usize = 4;
