use std::any::type_name;
use std::fmt;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use num_integer::Integer;
use tracing::{debug, trace};

use crate::constants::{ERR_POISONED_LOCK, SLAB_CAPACITY};
use crate::{CellSlab, CountedCell, registry};

/// A pool of reference-counted cells holding payloads of type `T`.
///
/// Every thread lazily gets its own pool per payload type, obtained through
/// [`for_current_thread()`][Self::for_current_thread]. Pooled [`Small`][crate::Small] handles
/// allocate their cells from the pool of the thread that created them and keep that pool alive
/// through an [`Arc`], so a pool outlives its thread for as long as any of its cells is still
/// referenced. When the last handle to a cell is dropped, the cell goes back to the pool that
/// allocated it, whichever thread that drop happens on.
///
/// The pool is thread-safe. All slot bookkeeping happens under one mutex per pool; pools for
/// different payload types or different threads never contend with each other.
///
/// # Reentrancy
///
/// A payload is constructed before the pool lock is taken and dropped after it is released, so
/// payloads whose constructors or destructors create or drop handles of the same payload type
/// do not deadlock.
///
/// # Resource usage
///
/// The pool grows one slab at a time as cells are allocated and never gives memory back on its
/// own. Use [`shrink_to_fit()`][Self::shrink_to_fit] to release empty slabs at the end of the
/// pool and [`reserve()`][Self::reserve] to grow ahead of a burst of allocations.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use small_pool::{CellPool, Small};
///
/// let pool = CellPool::<String>::for_current_thread();
/// assert!(Arc::ptr_eq(&pool, &CellPool::<String>::for_current_thread()));
///
/// let before = pool.len();
/// let greeting = Small::new("hello".to_string());
/// assert_eq!(pool.len(), before + 1);
///
/// drop(greeting);
/// assert_eq!(pool.len(), before);
/// ```
pub struct CellPool<T> {
    core: Mutex<CellPoolCore<T>>,

    /// The thread the pool was created for.
    thread: ThreadId,
}

/// Everything that is guarded by the pool lock.
struct CellPoolCore<T> {
    slabs: Vec<CellSlab<T, SLAB_CAPACITY>>,

    /// Lowest index of any slab that has a vacant slot, if known. This is a cache, not the
    /// ground truth: `None` means "unknown", not "all slabs are full".
    slab_with_vacant_slot_index: Option<usize>,
}

/// Identifies a slot in a [`CellPool`] and points at the cell stored in it.
///
/// Copied freely between the handles that share the cell; only the handle that retires the cell
/// hands it back to the pool.
#[derive(Debug)]
pub(crate) struct CellRef<T> {
    key: SlotKey,
    cell: NonNull<CountedCell<T>>,
}

impl<T> CellRef<T> {
    /// # Safety
    ///
    /// The cell must not have been released to its pool yet.
    pub(crate) unsafe fn cell<'a>(&self) -> &'a CountedCell<T> {
        // SAFETY: Forwarding the guarantee from the caller. Cells do not move while occupied.
        unsafe { self.cell.as_ref() }
    }

    pub(crate) fn cell_ptr(&self) -> NonNull<CountedCell<T>> {
        self.cell
    }
}

impl<T> Clone for CellRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for CellRef<T> {}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct SlotKey {
    index_in_pool: usize,
}

impl SlotKey {
    #[must_use]
    fn from_parts(slab_index: usize, index_in_slab: usize) -> Self {
        Self {
            index_in_pool: slab_index.checked_mul(SLAB_CAPACITY)
                .and_then(|x| x.checked_add(index_in_slab))
                .expect("slot key indicates a cell beyond the range of virtual memory - impossible to reach this point from a valid history"),
        }
    }

    #[must_use]
    fn into_parts(self) -> (usize, usize) {
        self.index_in_pool.div_rem(&SLAB_CAPACITY)
    }
}

impl<T> CellPool<T> {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            core: Mutex::new(CellPoolCore {
                slabs: Vec::new(),
                slab_with_vacant_slot_index: None,
            }),
            thread: thread::current().id(),
        }
    }

    /// Returns the current thread's pool for payloads of type `T`.
    ///
    /// The first call on a thread creates the pool; later calls on the same thread return the
    /// same instance. Pools for different payload types are unrelated.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use std::thread;
    ///
    /// use small_pool::CellPool;
    ///
    /// let here = CellPool::<Vec<u8>>::for_current_thread();
    /// let there = thread::spawn(CellPool::<Vec<u8>>::for_current_thread)
    ///     .join()
    ///     .unwrap();
    ///
    /// assert!(Arc::ptr_eq(&here, &CellPool::<Vec<u8>>::for_current_thread()));
    /// assert!(!Arc::ptr_eq(&here, &there));
    /// ```
    #[must_use]
    pub fn for_current_thread() -> Arc<Self>
    where
        T: 'static,
    {
        registry::current_thread_pool::<T>()
    }

    /// The thread this pool was created for.
    ///
    /// Cells keep returning to this pool after that thread has exited.
    #[must_use]
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// The number of cells currently allocated from the pool, i.e. the number of distinct
    /// payloads referenced by live pooled handles.
    ///
    /// This operation may block if another thread is currently accessing the pool.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use.
    pub fn len(&self) -> usize {
        let core = self.core.lock().expect(ERR_POISONED_LOCK);
        core.len()
    }

    /// Whether the pool has no allocated cells. An empty pool may still hold capacity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let core = self.core.lock().expect(ERR_POISONED_LOCK);
        core.slabs.iter().all(CellSlab::is_empty)
    }

    /// The number of cells the pool can hold without obtaining more memory.
    #[must_use]
    pub fn capacity(&self) -> usize {
        let core = self.core.lock().expect(ERR_POISONED_LOCK);
        core.capacity()
    }

    /// Ensures that at least `additional` more cells can be allocated without obtaining more
    /// memory. Does nothing if capacity is already sufficient.
    ///
    /// # Panics
    ///
    /// Panics if the required capacity overflows `usize`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use small_pool::CellPool;
    ///
    /// let pool = CellPool::<String>::for_current_thread();
    /// pool.reserve(1000);
    ///
    /// assert!(pool.capacity() >= pool.len() + 1000);
    /// ```
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use.
    pub fn reserve(&self, additional: usize) {
        let mut core = self.core.lock().expect(ERR_POISONED_LOCK);

        let required_capacity = core
            .len()
            .checked_add(additional)
            .expect("capacity overflow: requested capacity exceeds maximum possible value");

        if core.capacity() >= required_capacity {
            return;
        }

        let required_slabs = required_capacity.div_ceil(SLAB_CAPACITY);
        let additional_slabs = required_slabs.saturating_sub(core.slabs.len());

        for _ in 0..additional_slabs {
            core.slabs.push(CellSlab::new());
        }

        trace!(
            payload = type_name::<T>(),
            additional_slabs,
            capacity = core.capacity(),
            "reserved pool capacity"
        );
    }

    /// Releases empty slabs at the end of the pool.
    ///
    /// Slabs that still hold at least one cell are kept because cells never move.
    ///
    /// # Example
    ///
    /// ```rust
    /// use small_pool::{CellPool, Small};
    ///
    /// let pool = CellPool::<Vec<u32>>::for_current_thread();
    ///
    /// let values = (0..300_u32).map(|i| Small::new(vec![i])).collect::<Vec<_>>();
    /// let grown = pool.capacity();
    ///
    /// drop(values);
    /// pool.shrink_to_fit();
    ///
    /// assert!(pool.capacity() < grown);
    /// ```
    #[cfg_attr(test, mutants::skip)] // Too annoying to test the vacant index caching.
    pub fn shrink_to_fit(&self) {
        let mut core = self.core.lock().expect(ERR_POISONED_LOCK);

        let new_len = core
            .slabs
            .iter()
            .rposition(|slab| !slab.is_empty())
            .map_or(0, |index| {
                index.checked_add(1).expect("slab index cannot overflow")
            });

        let released = core.slabs.len().saturating_sub(new_len);

        if released == 0 {
            return;
        }

        // The cache might point at a slab that is about to be removed.
        core.slab_with_vacant_slot_index = None;
        core.slabs.truncate(new_len);

        trace!(
            payload = type_name::<T>(),
            released,
            capacity = core.capacity(),
            "released empty slabs"
        );
    }

    /// Moves `value` into a vacant slot as a new cell with a use count of 1.
    ///
    /// The returned reference stays valid until it is passed to [`release()`][Self::release].
    #[must_use]
    pub(crate) fn allocate(&self, value: T) -> CellRef<T> {
        let mut core = self.core.lock().expect(ERR_POISONED_LOCK);
        core.insert(value)
    }

    /// Retires a cell whose use count has reached zero and drops its payload.
    ///
    /// The payload is dropped after the pool lock has been released.
    ///
    /// # Panics
    ///
    /// Panics if the cell was not allocated from this pool or was already released.
    pub(crate) fn release(&self, cell: CellRef<T>) {
        let value = {
            let mut core = self.core.lock().expect(ERR_POISONED_LOCK);
            core.remove(cell)
        };

        drop(value);
    }
}

impl<T> CellPoolCore<T> {
    #[must_use]
    fn len(&self) -> usize {
        self.slabs.iter().map(CellSlab::len).sum()
    }

    #[must_use]
    fn capacity(&self) -> usize {
        self.slabs.len()
            .checked_mul(SLAB_CAPACITY)
            .expect("overflow here would mean the pool can hold more cells than virtual memory can fit, which makes no sense - it would never grow that big")
    }

    #[must_use]
    fn insert(&mut self, value: T) -> CellRef<T> {
        let slab_index = self.index_of_slab_with_vacant_slot();

        let slab = self
            .slabs
            .get_mut(slab_index)
            .expect("we just verified that there is a slab with a vacant slot at this index");

        let (index_in_slab, cell) = slab.insert(value);

        if slab.is_full() {
            self.slab_with_vacant_slot_index = None;
        }

        CellRef {
            key: SlotKey::from_parts(slab_index, index_in_slab),
            cell,
        }
    }

    #[must_use]
    fn remove(&mut self, cell: CellRef<T>) -> T {
        let (slab_index, index_in_slab) = cell.key.into_parts();

        let Some(slab) = self.slabs.get_mut(slab_index) else {
            panic!(
                "cell was not allocated from this pool of {}",
                type_name::<T>()
            )
        };

        debug_assert_eq!(
            slab.cell_ptr(index_in_slab),
            cell.cell,
            "cell reference does not match the slot it claims to occupy"
        );

        let value = slab.remove(index_in_slab);

        // We try to remember the lowest index of a slab with a vacant slot, so we fill the
        // pool from the start (to enable easier shrinking later).
        self.update_vacant_slot_cache(slab_index);

        value
    }

    #[must_use]
    fn index_of_slab_with_vacant_slot(&mut self) -> usize {
        if let Some(index) = self.slab_with_vacant_slot_index {
            return index;
        }

        let index = if let Some(index) = self.slabs.iter().position(|slab| !slab.is_full()) {
            index
        } else {
            self.slabs.push(CellSlab::new());

            trace!(
                payload = type_name::<T>(),
                slabs = self.slabs.len(),
                "pool grew by one slab"
            );

            self.slabs
                .len()
                .checked_sub(1)
                .expect("we just pushed a slab, so this cannot overflow because len >= 1")
        };

        self.slab_with_vacant_slot_index = Some(index);
        index
    }

    #[cfg_attr(test, mutants::skip)] // This is just a cache, so mutations only cost performance.
    fn update_vacant_slot_cache(&mut self, slab_with_vacant_slot_index: usize) {
        if self
            .slab_with_vacant_slot_index
            .is_none_or(|current| current > slab_with_vacant_slot_index)
        {
            self.slab_with_vacant_slot_index = Some(slab_with_vacant_slot_index);
        }
    }
}

impl<T> fmt::Debug for CellPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("CellPool");

        debug
            .field("payload", &format_args!("{}", type_name::<T>()))
            .field("thread", &self.thread);

        // Never block in Debug - the lock may be held by the thread doing the formatting.
        if let Ok(core) = self.core.try_lock() {
            debug
                .field("len", &core.len())
                .field("capacity", &core.capacity());
        }

        debug.finish_non_exhaustive()
    }
}

impl<T> Drop for CellPool<T> {
    fn drop(&mut self) {
        debug!(
            payload = type_name::<T>(),
            thread = ?self.thread,
            "dropping cell pool"
        );
    }
}
