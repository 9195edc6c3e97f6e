use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

use crate::{Payload, Storage};

/// A read-only value handle that stores its payload inline or in a shared pooled cell,
/// depending on the payload type.
///
/// The representation is chosen at compile time by the [`Payload`] implementation of `T`:
///
/// * **Inline** for small `Copy` types and for types that are themselves shared handles. Cloning
///   the handle clones the payload; there is no allocation and no pool involvement.
/// * **Pooled** for everything else. The payload lives in a reference-counted cell allocated
///   from a per-thread [`CellPool`][crate::CellPool]. Cloning the handle bumps an atomic
///   counter; the payload is never cloned. The last handle to go returns the cell to the pool it
///   came from, on whatever thread that happens.
///
/// Either way, the handle behaves like an immutable value: it dereferences to `&T`, compares,
/// hashes and formats like `T`. Use [`Small::INLINED`] to check which representation a type got.
///
/// Payloads must not form reference cycles through pooled handles. Such cycles are never freed.
///
/// # Example
///
/// ```rust
/// use small_pool::Small;
///
/// let number = Small::new(3_i32);
/// assert_eq!(*number, 3);
/// assert!(Small::<i32>::INLINED);
///
/// let text = Small::new("Common".to_string());
/// let copy = text.clone();
/// assert!(!Small::<String>::INLINED);
/// assert!(Small::ptr_eq(&text, &copy));
///
/// drop(text);
/// assert_eq!(*copy, "Common");
/// ```
///
/// # Thread safety
///
/// The handle is [`Send`] and [`Sync`] when the payload is both. Pooled handles may be cloned
/// and dropped from any number of threads concurrently.
pub struct Small<T: Payload> {
    storage: T::Storage,
}

impl<T: Payload> Small<T> {
    /// Whether handles for payloads of type `T` store the payload inline (`true`) or in a
    /// pooled cell (`false`).
    ///
    /// This is decided at compile time and never changes.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    ///
    /// use small_pool::Small;
    ///
    /// assert!(Small::<u64>::INLINED);
    /// assert!(Small::<Arc<String>>::INLINED);
    /// assert!(!Small::<String>::INLINED);
    /// ```
    pub const INLINED: bool = <T::Storage as Storage<T>>::INLINED;

    /// Creates a handle holding `value`.
    ///
    /// For pooled payloads this allocates a cell from the current thread's pool, creating the
    /// pool if this is the first pooled handle of this payload type on this thread.
    ///
    /// # Panics
    ///
    /// Aborts the process through [`handle_alloc_error`][std::alloc::handle_alloc_error] if the
    /// pool needs more memory and the allocator cannot provide it.
    #[must_use]
    #[inline]
    pub fn new(value: T) -> Self {
        Self {
            storage: T::Storage::store(value),
        }
    }

    /// Returns a reference to the payload.
    #[must_use]
    #[inline]
    pub fn get(&self) -> &T {
        self.storage.payload()
    }

    /// Returns a copy of the payload.
    ///
    /// # Example
    ///
    /// ```rust
    /// use small_pool::Small;
    ///
    /// let handle = Small::new(42_u64);
    /// let value: u64 = handle.copied();
    /// assert_eq!(value, 42);
    /// ```
    #[must_use]
    #[inline]
    pub fn copied(&self) -> T
    where
        T: Copy,
    {
        *self.get()
    }

    /// Whether two handles share one payload instance.
    ///
    /// This is `true` for clones of the same pooled handle. Inline handles each own their
    /// payload, so for them this is only `true` when both arguments are the same handle.
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.storage.same_payload(&other.storage)
    }

    /// The number of handles sharing the payload, or `None` for inline handles.
    ///
    /// Other threads may change the count at any time, so treat the result as a snapshot.
    ///
    /// # Example
    ///
    /// ```rust
    /// use small_pool::Small;
    ///
    /// let a = Small::new(vec![1, 2, 3]);
    /// let b = a.clone();
    /// assert_eq!(Small::use_count(&a), Some(2));
    ///
    /// drop(b);
    /// assert_eq!(Small::use_count(&a), Some(1));
    ///
    /// assert_eq!(Small::use_count(&Small::new(1_u8)), None);
    /// ```
    #[must_use]
    pub fn use_count(this: &Self) -> Option<usize> {
        this.storage.use_count()
    }

    /// Returns the underlying storage, for callers that need representation-specific
    /// operations such as [`Pooled::owner()`][crate::Pooled::owner].
    #[must_use]
    pub fn storage(this: &Self) -> &T::Storage {
        &this.storage
    }
}

impl<T: Payload> Clone for Small<T> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
        }
    }
}

impl<T: Payload> Copy for Small<T> where T::Storage: Copy {}

impl<T: Payload> Deref for Small<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.get()
    }
}

impl<T: Payload> AsRef<T> for Small<T> {
    fn as_ref(&self) -> &T {
        self.get()
    }
}

impl<T: Payload> Borrow<T> for Small<T> {
    fn borrow(&self) -> &T {
        self.get()
    }
}

impl<T: Payload> From<T> for Small<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Payload + Default> Default for Small<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Payload + fmt::Debug> fmt::Debug for Small<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Small")
            .field("inlined", &Self::INLINED)
            .field("value", self.get())
            .finish()
    }
}

impl<T: Payload + fmt::Display> fmt::Display for Small<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.get(), f)
    }
}

impl<T: Payload + PartialEq> PartialEq for Small<T> {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl<T: Payload + Eq> Eq for Small<T> {}

impl<T: Payload + PartialOrd> PartialOrd for Small<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.get().partial_cmp(other.get())
    }
}

impl<T: Payload + Ord> Ord for Small<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.get().cmp(other.get())
    }
}

impl<T: Payload + Hash> Hash for Small<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.get().hash(state);
    }
}

/// A handle is itself a shared handle: copying it never copies a pooled payload.
impl<T: Payload> Payload for Small<T> {
    type Storage = crate::Inline<Self>;
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::rc::Rc;
    use std::sync::Arc;

    use super::*;
    use crate::{CellPool, Pooled};

    static_assertions::assert_impl_all!(Small<u32>: Copy, Send, Sync);
    static_assertions::assert_impl_all!(Small<String>: Clone, Send, Sync);
    static_assertions::assert_not_impl_any!(Small<String>: Copy);
    static_assertions::assert_not_impl_any!(Small<Rc<u32>>: Send, Sync);
    static_assertions::const_assert!(Small::<Small<String>>::INLINED);

    #[test]
    fn inline_int_round_trips() {
        let handle = Small::new(3_i32);

        assert!(Small::<i32>::INLINED);
        assert_eq!(*handle, 3);
        assert_eq!(handle.copied(), 3);
        assert_eq!(Small::use_count(&handle), None);
    }

    #[test]
    fn pooled_string_survives_original() {
        let h1 = Small::new("long string that lives in a pooled cell".to_string());
        let h2 = h1.clone();

        assert!(Small::ptr_eq(&h1, &h2));
        drop(h1);

        assert_eq!(*h2, "long string that lives in a pooled cell");
        assert_eq!(Small::use_count(&h2), Some(1));
    }

    #[test]
    fn equality_and_ordering_follow_payload() {
        let a = Small::new("a".to_string());
        let b = Small::new("b".to_string());
        let a2 = Small::new("a".to_string());

        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert!(a < b);
        assert_eq!(a.cmp(&a2), Ordering::Equal);
    }

    #[test]
    fn hashes_like_payload() {
        let mut set = HashSet::new();
        set.insert(Small::new("x".to_string()));
        set.insert(Small::new("x".to_string()));
        set.insert(Small::new("y".to_string()));

        assert_eq!(set.len(), 2);
        assert!(set.contains(&"x".to_string()));
    }

    #[test]
    fn formats_like_payload() {
        let handle = Small::new(7_u8);

        assert_eq!(handle.to_string(), "7");
        assert_eq!(format!("{handle:?}"), "Small { inlined: true, value: 7 }");
    }

    #[test]
    fn default_and_from() {
        let empty: Small<String> = Small::default();
        assert_eq!(*empty, "");

        let from: Small<u16> = 9.into();
        assert_eq!(*from, 9);
    }

    #[test]
    fn arc_payload_is_inline_and_shares_referent() {
        let shared = Arc::new("big".repeat(100));
        let a = Small::new(Arc::clone(&shared));
        let b = a.clone();

        assert!(Small::<Arc<String>>::INLINED);
        assert!(!Small::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(Arc::strong_count(&shared), 3);
    }

    #[test]
    fn storage_exposes_owner_pool() {
        let handle = Small::new(vec![1_u32]);
        let pooled: &Pooled<Vec<u32>> = Small::storage(&handle);

        assert!(Arc::ptr_eq(
            pooled.owner(),
            &CellPool::<Vec<u32>>::for_current_thread()
        ));
    }

    #[test]
    fn nested_handle_copies_share_inner_cell() {
        let inner = Small::new("inner".to_string());
        let outer = Small::new(inner.clone());
        let outer_copy = outer.clone();

        // The original, the one inside `outer` and the one inside `outer_copy`.
        assert_eq!(Small::use_count(&inner), Some(3));
        assert_eq!(**outer_copy, "inner");
    }
}
