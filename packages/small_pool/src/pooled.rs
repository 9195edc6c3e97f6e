use std::any::type_name;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::{CellPool, CellRef};

/// The pooled representation of a [`Small`][crate::Small] handle: a shared reference to a
/// reference-counted cell allocated from the pool of the thread that created the handle.
///
/// Cloning increments the use count of the cell and never clones the payload. Dropping
/// decrements it, and the handle that takes the count to zero returns the cell to the pool it
/// was allocated from. That pool is recorded in the handle, so the cell goes home even when the
/// last handle is dropped on a different thread, or after the creating thread has exited.
///
/// There is no way to mutate the payload through a pooled handle.
///
/// You would normally use this through [`Small`][crate::Small], which selects it for payloads
/// that are large or that have their own clone logic.
///
/// # Example
///
/// ```rust
/// use small_pool::Pooled;
///
/// let original = Pooled::new("Common".to_string());
/// let copy = original.clone();
///
/// assert!(Pooled::ptr_eq(&original, &copy));
/// assert_eq!(original.use_count(), 2);
///
/// drop(original);
/// assert_eq!(*copy, "Common");
/// assert_eq!(copy.use_count(), 1);
/// ```
pub struct Pooled<T: 'static> {
    /// Keeps the owning pool alive for as long as this handle exists.
    pool: Arc<CellPool<T>>,

    cell: CellRef<T>,
}

impl<T: 'static> Pooled<T> {
    /// Moves `value` into a new cell allocated from the current thread's pool.
    #[must_use]
    pub fn new(value: T) -> Self {
        let pool = CellPool::for_current_thread();
        let cell = pool.allocate(value);

        Self { pool, cell }
    }

    /// Returns a reference to the payload.
    #[must_use]
    #[inline]
    pub fn get(&self) -> &T {
        // SAFETY: This handle holds one use of the cell, so it has not been released.
        unsafe { self.cell.cell() }.value()
    }

    /// The number of pooled handles currently sharing the payload with this one, including
    /// this one.
    ///
    /// Other threads may change the count at any time, so treat the result as a snapshot.
    #[must_use]
    pub fn use_count(&self) -> usize {
        // SAFETY: This handle holds one use of the cell, so it has not been released.
        unsafe { self.cell.cell() }.uses()
    }

    /// The pool that allocated the cell and that will get it back.
    #[must_use]
    pub fn owner(&self) -> &Arc<CellPool<T>> {
        &self.pool
    }

    /// Whether both handles refer to the same cell.
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.cell.cell_ptr() == other.cell.cell_ptr()
    }
}

impl<T: 'static> Clone for Pooled<T> {
    #[inline]
    fn clone(&self) -> Self {
        // SAFETY: This handle holds one use of the cell, so it has not been released.
        unsafe { self.cell.cell() }.acquire();

        Self {
            pool: Arc::clone(&self.pool),
            cell: self.cell,
        }
    }
}

impl<T: 'static> Drop for Pooled<T> {
    fn drop(&mut self) {
        // SAFETY: This handle still holds its use of the cell until the release below.
        let last = unsafe { self.cell.cell() }.release();

        if last {
            // We observed the transition to zero, so no other handle can reach the cell.
            self.pool.release(self.cell);
        }
    }
}

impl<T: 'static> Deref for Pooled<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.get()
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("payload", &format_args!("{}", type_name::<T>()))
            .field("value", self.get())
            .field("use_count", &self.use_count())
            .field("owner_thread", &self.pool.thread())
            .finish()
    }
}

// SAFETY: Moving a handle to another thread lets that thread read the payload (needs `Sync`)
// and possibly drop the payload as the last handle (needs `Send`). The use count is atomic and
// the pool is thread-safe. Same requirements as `Arc<T>`.
unsafe impl<T: Send + Sync + 'static> Send for Pooled<T> {}

// SAFETY: A shared `&Pooled<T>` only gives out `&T` and can create clones, which can then be
// moved and dropped elsewhere. Same requirements as `Arc<T>`.
unsafe impl<T: Send + Sync + 'static> Sync for Pooled<T> {}
