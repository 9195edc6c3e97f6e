use std::process;
use std::sync::atomic::{self, AtomicUsize, Ordering};

/// Upper bound on the use count. Going past this means handles are being leaked in a loop and
/// the counter is about to wrap, at which point we could free a cell that is still in use.
const MAX_USES: usize = isize::MAX.unsigned_abs();

/// A payload plus the number of pooled handles that currently reference it.
///
/// Lives inside a slab slot of the pool that allocated it. The use count starts at 1 and the
/// cell is retired by whichever handle observes it dropping from 1 to 0.
#[derive(Debug)]
pub(crate) struct CountedCell<T> {
    value: T,
    uses: AtomicUsize,
}

impl<T> CountedCell<T> {
    #[must_use]
    pub(crate) fn new(value: T) -> Self {
        Self {
            value,
            uses: AtomicUsize::new(1),
        }
    }

    #[must_use]
    pub(crate) fn value(&self) -> &T {
        &self.value
    }

    #[must_use]
    pub(crate) fn into_value(self) -> T {
        self.value
    }

    /// Registers one more handle referencing this cell.
    ///
    /// The caller must itself be a live handle, so the count is at least 1 throughout.
    /// Relaxed is enough: new references can only be made from existing ones, and passing a
    /// handle to another thread already provides whatever synchronization is required.
    pub(crate) fn acquire(&self) {
        let previous = self.uses.fetch_add(1, Ordering::Relaxed);

        if previous > MAX_USES {
            process::abort();
        }
    }

    /// Unregisters one handle. Returns `true` for exactly one caller: the one whose decrement
    /// took the count to zero. That caller is now the sole owner of the cell and must return
    /// it to its pool.
    #[must_use]
    pub(crate) fn release(&self) -> bool {
        let previous = self.uses.fetch_sub(1, Ordering::Release);

        debug_assert!(previous != 0, "released a cell that had no uses left");

        if previous != 1 {
            return false;
        }

        // Pairs with the Release decrements of every other handle, so all their reads of the
        // payload happen-before the payload is dropped by us.
        atomic::fence(Ordering::Acquire);
        true
    }

    #[must_use]
    pub(crate) fn uses(&self) -> usize {
        self.uses.load(Ordering::Relaxed)
    }
}
