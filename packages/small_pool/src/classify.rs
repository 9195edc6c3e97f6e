use std::any::TypeId;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::ffi::{CString, OsString};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::num::{
    NonZeroI8, NonZeroI16, NonZeroI32, NonZeroI64, NonZeroI128, NonZeroIsize, NonZeroU8,
    NonZeroU16, NonZeroU32, NonZeroU64, NonZeroU128, NonZeroUsize,
};
use std::path::PathBuf;
use std::rc::{self, Rc};
use std::sync::{self, Arc};
use std::time::{Duration, Instant, SystemTime};

use crate::{Inline, Pooled};

/// The largest payload, in bytes, that may be stored inline if it is also `Copy`.
pub const MAX_INLINE_SIZE: usize = 64;

/// Whether a payload of type `T` is small enough to be stored inline.
///
/// This only looks at the size. Whether `T` may be stored inline at all is decided by its
/// [`Payload`] implementation.
#[must_use]
pub const fn fits_inline<T>() -> bool {
    size_of::<T>() <= MAX_INLINE_SIZE
}

/// A payload type that can be held by a [`Small`][crate::Small] handle.
///
/// The implementation decides, once per type and at compile time, how the handle stores the
/// payload:
///
/// 1. Types that are themselves shared handles (`Arc`, `Rc` and their weak counterparts, or
///    your own types declared with [`shared_payload!`][crate::shared_payload]) are stored
///    inline regardless of how large the value they point to is. Copying them is already cheap.
/// 2. `Copy` types no larger than [`MAX_INLINE_SIZE`] bytes are stored inline.
/// 3. Everything else is stored in a reference-counted cell from a per-thread pool.
///
/// The crate implements this trait for primitives, common standard library types, and tuples,
/// arrays and `Option`s of payloads (see [`Components`][crate::Components]). For your own types,
/// use one of the declaration macros rather than implementing the trait by hand:
///
/// * [`copy_payload!`][crate::copy_payload] for `Copy` types - picks rule 2 or 3 by size.
/// * [`shared_payload!`][crate::shared_payload] for shared handle types - rule 1.
/// * [`pooled_payload!`][crate::pooled_payload] for everything else - rule 3.
///
/// # Example
///
/// ```rust
/// use small_pool::{Small, copy_payload, pooled_payload};
///
/// #[derive(Clone, Copy)]
/// struct Point {
///     x: f32,
///     y: f32,
/// }
///
/// #[derive(Clone, Copy)]
/// struct Matrix([[f64; 4]; 4]);
///
/// struct Document {
///     title: String,
/// }
///
/// copy_payload!(Point, Matrix);
/// pooled_payload!(Document);
///
/// assert!(Small::<Point>::INLINED);
/// assert!(!Small::<Matrix>::INLINED); // 128 bytes, too large.
/// assert!(!Small::<Document>::INLINED);
/// ```
pub trait Payload: Sized {
    /// The storage selected for this payload type.
    type Storage: Storage<Self>;
}

/// A storage representation for payloads of type `T`: [`Inline<T>`], [`Pooled<T>`] or, for
/// tuples, arrays and `Option`, [`Composite<T>`][crate::Composite].
///
/// This trait is sealed. It exists so that [`Small`][crate::Small] can forward its operations
/// to whichever representation the payload type selected.
pub trait Storage<T>: Clone + sealed::Sealed {
    /// Whether this representation stores the payload inline.
    const INLINED: bool;

    /// Stores a payload.
    #[must_use]
    fn store(value: T) -> Self;

    /// Returns a reference to the stored payload.
    #[must_use]
    fn payload(&self) -> &T;

    /// Whether both storages refer to the same payload instance.
    #[must_use]
    fn same_payload(&self, other: &Self) -> bool;

    /// The number of handles sharing the payload, if the payload is shared.
    #[must_use]
    fn use_count(&self) -> Option<usize>;
}

mod sealed {
    #[expect(
        unnameable_types,
        reason = "sealed trait, implementable only inside this crate"
    )]
    pub trait Sealed {}

    impl<T> Sealed for crate::Inline<T> {}
    impl<T: 'static> Sealed for crate::Pooled<T> {}
    impl<T: crate::Components> Sealed for crate::Composite<T> {}
}

impl<T: Clone> Storage<T> for Inline<T> {
    const INLINED: bool = true;

    #[inline]
    fn store(value: T) -> Self {
        Self::new(value)
    }

    #[inline]
    fn payload(&self) -> &T {
        self.get()
    }

    fn same_payload(&self, other: &Self) -> bool {
        // Every inline handle owns its own copy of the payload.
        std::ptr::eq(self, other)
    }

    fn use_count(&self) -> Option<usize> {
        None
    }
}

impl<T: 'static> Storage<T> for Pooled<T> {
    const INLINED: bool = false;

    #[inline]
    fn store(value: T) -> Self {
        Self::new(value)
    }

    #[inline]
    fn payload(&self) -> &T {
        self.get()
    }

    fn same_payload(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other)
    }

    fn use_count(&self) -> Option<usize> {
        Some(Self::use_count(self))
    }
}

/// Support machinery for the declaration macros. Not part of the public API.
#[doc(hidden)]
pub mod __private {
    use crate::{Inline, Pooled, Storage};

    pub use static_assertions;

    /// Type-level carrier for the result of the size check in `copy_payload!`.
    #[derive(Debug)]
    pub struct Eligibility<const INLINE: bool>;

    /// Maps an eligibility verdict to a storage type.
    pub trait SelectStorage<T> {
        /// The storage for payloads with this verdict.
        type Storage: Storage<T>;
    }

    impl<T: Copy> SelectStorage<T> for Eligibility<true> {
        type Storage = Inline<T>;
    }

    impl<T: 'static> SelectStorage<T> for Eligibility<false> {
        type Storage = Pooled<T>;
    }
}

/// Declares `Copy` types as [`Payload`][crate::Payload]s.
///
/// Types no larger than [`MAX_INLINE_SIZE`][crate::MAX_INLINE_SIZE] bytes are stored inline,
/// larger ones in pooled cells. The choice is made at compile time from the size of each type.
///
/// Fails to compile if a type is not `Copy`.
///
/// # Example
///
/// ```rust
/// use small_pool::{Small, copy_payload};
///
/// #[derive(Clone, Copy, Debug, PartialEq)]
/// struct Rgb(u8, u8, u8);
///
/// copy_payload!(Rgb);
///
/// let red = Small::new(Rgb(255, 0, 0));
/// assert!(Small::<Rgb>::INLINED);
/// assert_eq!(*red, Rgb(255, 0, 0));
/// ```
#[macro_export]
macro_rules! copy_payload {
    ($($t:ty),+ $(,)?) => {
        $(
            $crate::__private::static_assertions::assert_impl_all!($t: ::core::marker::Copy);

            impl $crate::Payload for $t {
                type Storage = <$crate::__private::Eligibility<{ $crate::fits_inline::<$t>() }>
                    as $crate::__private::SelectStorage<$t>>::Storage;
            }
        )+
    };
}

/// Declares shared handle types as [`Payload`][crate::Payload]s that are always stored inline.
///
/// Use this for types whose `Clone` is cheap and shares the underlying data instead of copying
/// it, for example a newtype around an `Arc`. The size of the type is not checked.
///
/// Fails to compile if a type is not `Clone`.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use small_pool::{Small, shared_payload};
///
/// #[derive(Clone)]
/// struct Config(Arc<[u8; 4096]>);
///
/// shared_payload!(Config);
///
/// assert!(Small::<Config>::INLINED);
/// ```
#[macro_export]
macro_rules! shared_payload {
    ($($t:ty),+ $(,)?) => {
        $(
            $crate::__private::static_assertions::assert_impl_all!($t: ::core::clone::Clone);

            impl $crate::Payload for $t {
                type Storage = $crate::Inline<$t>;
            }
        )+
    };
}

/// Declares types as [`Payload`][crate::Payload]s that are always stored in pooled cells.
///
/// Use this for types that own heap data or have custom `Clone` or `Drop` logic. Copies of a
/// pooled handle share the payload, so the type does not need to implement `Clone` at all.
///
/// # Example
///
/// ```rust
/// use small_pool::{Small, pooled_payload};
///
/// struct Connection {
///     peer: String,
/// }
///
/// pooled_payload!(Connection);
///
/// let a = Small::new(Connection {
///     peer: "example".to_string(),
/// });
/// let b = a.clone();
///
/// assert!(!Small::<Connection>::INLINED);
/// assert!(Small::ptr_eq(&a, &b));
/// ```
#[macro_export]
macro_rules! pooled_payload {
    ($($t:ty),+ $(,)?) => {
        $(
            impl $crate::Payload for $t {
                type Storage = $crate::Pooled<$t>;
            }
        )+
    };
}

copy_payload!(
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    bool,
    char,
    (),
    &'static str,
    Duration,
    Instant,
    SystemTime,
    TypeId,
    std::cmp::Ordering,
    NonZeroU8,
    NonZeroU16,
    NonZeroU32,
    NonZeroU64,
    NonZeroU128,
    NonZeroUsize,
    NonZeroI8,
    NonZeroI16,
    NonZeroI32,
    NonZeroI64,
    NonZeroI128,
    NonZeroIsize,
    IpAddr,
    Ipv4Addr,
    Ipv6Addr,
    SocketAddr,
    SocketAddrV4,
    SocketAddrV6,
);

impl<T: ?Sized> Payload for Arc<T> {
    type Storage = Inline<Self>;
}

impl<T: ?Sized> Payload for sync::Weak<T> {
    type Storage = Inline<Self>;
}

impl<T: ?Sized> Payload for Rc<T> {
    type Storage = Inline<Self>;
}

impl<T: ?Sized> Payload for rc::Weak<T> {
    type Storage = Inline<Self>;
}

pooled_payload!(String, PathBuf, OsString, CString);

impl<T: 'static> Payload for Vec<T> {
    type Storage = Pooled<Self>;
}

impl<T: ?Sized + 'static> Payload for Box<T> {
    type Storage = Pooled<Self>;
}

impl<T: 'static> Payload for VecDeque<T> {
    type Storage = Pooled<Self>;
}

impl<K: 'static, V: 'static> Payload for BTreeMap<K, V> {
    type Storage = Pooled<Self>;
}

impl<T: 'static> Payload for BTreeSet<T> {
    type Storage = Pooled<Self>;
}

impl<K: 'static, V: 'static, S: 'static> Payload for HashMap<K, V, S> {
    type Storage = Pooled<Self>;
}

impl<T: 'static, S: 'static> Payload for HashSet<T, S> {
    type Storage = Pooled<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn inlined<T: Payload>() -> bool {
        <T::Storage as Storage<T>>::INLINED
    }

    #[derive(Clone, Copy)]
    struct AtThreshold([u8; MAX_INLINE_SIZE]);

    #[derive(Clone, Copy)]
    struct OverThreshold([u8; MAX_INLINE_SIZE + 1]);

    #[derive(Clone)]
    struct SharedBlob(Arc<[u8; 1024]>);

    struct Opaque;

    copy_payload!(AtThreshold, OverThreshold);
    shared_payload!(SharedBlob);
    pooled_payload!(Opaque);

    static_assertions::const_assert!(inlined::<u8>());
    static_assertions::const_assert!(inlined::<u128>());
    static_assertions::const_assert!(inlined::<&'static str>());
    static_assertions::const_assert!(inlined::<AtThreshold>());
    static_assertions::const_assert!(!inlined::<OverThreshold>());
    static_assertions::const_assert!(inlined::<Arc<[u8; 4096]>>());
    static_assertions::const_assert!(inlined::<Rc<str>>());
    static_assertions::const_assert!(inlined::<SharedBlob>());
    static_assertions::const_assert!(!inlined::<String>());
    static_assertions::const_assert!(!inlined::<Vec<u8>>());
    static_assertions::const_assert!(!inlined::<Box<u8>>());
    static_assertions::const_assert!(!inlined::<Opaque>());

    #[test]
    fn size_check_is_inclusive() {
        assert!(fits_inline::<[u8; MAX_INLINE_SIZE]>());
        assert!(!fits_inline::<[u8; MAX_INLINE_SIZE + 1]>());
        assert!(fits_inline::<()>());
    }

    #[test]
    fn oversized_copy_payload_is_pooled() {
        let a = <OverThreshold as Payload>::Storage::store(OverThreshold([7; MAX_INLINE_SIZE + 1]));
        let b = a.clone();

        assert!(a.same_payload(&b));
        assert_eq!(Storage::use_count(&a), Some(2));
        assert_eq!(b.payload().0[MAX_INLINE_SIZE], 7);
    }

    #[test]
    fn inline_storage_never_reports_sharing() {
        let a = <AtThreshold as Payload>::Storage::store(AtThreshold([1; MAX_INLINE_SIZE]));
        let b = a;

        assert!(a.same_payload(&a));
        assert!(!a.same_payload(&b));
        assert_eq!(Storage::use_count(&a), None);
    }
}
