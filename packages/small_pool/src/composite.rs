use std::any::type_name;
use std::fmt;
use std::ops::Deref;

use crate::{Payload, Pooled, Storage, fits_inline};

/// A payload type assembled from other payloads: tuples, arrays and `Option`.
///
/// Such a type is stored inline when every component is stored inline on its own and the whole
/// value fits in [`MAX_INLINE_SIZE`][crate::MAX_INLINE_SIZE] bytes. Otherwise it is pooled.
///
/// The crate implements this for `Option<T>`, `[T; N]` and tuples of up to 8 elements whose
/// components are [`Payload`]s that implement `Clone`.
pub trait Components: Clone + 'static {
    /// Whether every component of the type is stored inline when used as a payload by itself.
    const ALL_INLINE: bool;
}

/// The storage for [`Components`] payloads: inline or pooled, decided per type at compile time.
///
/// Unlike [`Inline<T>`][crate::Inline], this storage is never `Copy`, even when the payload is,
/// because the same Rust type has to cover the pooled case as well. Copies of an inline
/// composite clone the payload; copies of a pooled composite share it.
///
/// You would normally use this through [`Small`][crate::Small].
///
/// # Example
///
/// ```rust
/// use small_pool::Small;
///
/// let pair = Small::new((1_u32, 2_u32));
/// assert!(Small::<(u32, u32)>::INLINED);
/// assert_eq!(pair.1, 2);
///
/// let named = Small::new((7_u32, "seven".to_string()));
/// assert!(!Small::<(u32, String)>::INLINED);
/// assert!(Small::ptr_eq(&named, &named.clone()));
/// ```
pub struct Composite<T: Components> {
    repr: Repr<T>,
}

enum Repr<T: 'static> {
    Inline(T),
    Pooled(Pooled<T>),
}

impl<T: Components> Composite<T> {
    /// Whether payloads of type `T` are stored inline.
    pub const INLINED: bool = T::ALL_INLINE && fits_inline::<T>();

    /// Stores `value` inline or in a new cell from the current thread's pool.
    #[must_use]
    pub fn new(value: T) -> Self {
        let repr = if Self::INLINED {
            Repr::Inline(value)
        } else {
            Repr::Pooled(Pooled::new(value))
        };

        Self { repr }
    }

    /// Returns a reference to the payload.
    #[must_use]
    #[inline]
    pub fn get(&self) -> &T {
        match &self.repr {
            Repr::Inline(value) => value,
            Repr::Pooled(pooled) => pooled.get(),
        }
    }

    /// The pooled handle behind this storage, or `None` if the payload is stored inline.
    #[must_use]
    pub fn as_pooled(&self) -> Option<&Pooled<T>> {
        match &self.repr {
            Repr::Inline(_) => None,
            Repr::Pooled(pooled) => Some(pooled),
        }
    }
}

impl<T: Components> Clone for Composite<T> {
    fn clone(&self) -> Self {
        let repr = match &self.repr {
            Repr::Inline(value) => Repr::Inline(value.clone()),
            Repr::Pooled(pooled) => Repr::Pooled(pooled.clone()),
        };

        Self { repr }
    }
}

impl<T: Components> Deref for Composite<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.get()
    }
}

impl<T: Components + fmt::Debug> fmt::Debug for Composite<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composite")
            .field("payload", &format_args!("{}", type_name::<T>()))
            .field("inlined", &Self::INLINED)
            .field("value", self.get())
            .finish()
    }
}

impl<T: Components> Storage<T> for Composite<T> {
    const INLINED: bool = T::ALL_INLINE && fits_inline::<T>();

    #[inline]
    fn store(value: T) -> Self {
        Self::new(value)
    }

    #[inline]
    fn payload(&self) -> &T {
        self.get()
    }

    fn same_payload(&self, other: &Self) -> bool {
        match (&self.repr, &other.repr) {
            (Repr::Pooled(a), Repr::Pooled(b)) => Pooled::ptr_eq(a, b),
            _ => std::ptr::eq(self, other),
        }
    }

    fn use_count(&self) -> Option<usize> {
        self.as_pooled().map(Pooled::use_count)
    }
}

const fn inlined<T: Payload>() -> bool {
    <T::Storage as Storage<T>>::INLINED
}

impl<T: Payload + Clone + 'static> Components for Option<T> {
    const ALL_INLINE: bool = inlined::<T>();
}

impl<T: Payload + Clone + 'static> Payload for Option<T> {
    type Storage = Composite<Self>;
}

impl<T: Payload + Clone + 'static, const N: usize> Components for [T; N] {
    const ALL_INLINE: bool = inlined::<T>();
}

impl<T: Payload + Clone + 'static, const N: usize> Payload for [T; N] {
    type Storage = Composite<Self>;
}

macro_rules! tuple_payload {
    ($($name:ident),+) => {
        impl<$($name: Payload + Clone + 'static),+> Components for ($($name,)+) {
            const ALL_INLINE: bool = $(inlined::<$name>())&&+;
        }

        impl<$($name: Payload + Clone + 'static),+> Payload for ($($name,)+) {
            type Storage = Composite<Self>;
        }
    };
}

tuple_payload!(A);
tuple_payload!(A, B);
tuple_payload!(A, B, C);
tuple_payload!(A, B, C, D);
tuple_payload!(A, B, C, D, E);
tuple_payload!(A, B, C, D, E, F);
tuple_payload!(A, B, C, D, E, F, G);
tuple_payload!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::MAX_INLINE_SIZE;

    static_assertions::const_assert!(Composite::<(u32, u32)>::INLINED);
    static_assertions::const_assert!(Composite::<(u8,)>::INLINED);
    static_assertions::const_assert!(Composite::<[u8; 16]>::INLINED);
    static_assertions::const_assert!(Composite::<[u8; MAX_INLINE_SIZE]>::INLINED);
    static_assertions::const_assert!(!Composite::<[u8; MAX_INLINE_SIZE + 1]>::INLINED);
    static_assertions::const_assert!(Composite::<Option<u64>>::INLINED);
    static_assertions::const_assert!(Composite::<Option<Arc<String>>>::INLINED);
    static_assertions::const_assert!(Composite::<Option<[u32; 4]>>::INLINED);
    static_assertions::const_assert!(!Composite::<Option<String>>::INLINED);
    static_assertions::const_assert!(!Composite::<(u32, String)>::INLINED);
    static_assertions::const_assert!(!Composite::<[String; 2]>::INLINED);
    static_assertions::const_assert!(!Composite::<([u64; 8], u8)>::INLINED);

    static_assertions::assert_impl_all!(Composite<(u32, u32)>: Clone, Send, Sync);
    static_assertions::assert_not_impl_any!(Composite<(u32, u32)>: Copy);
    static_assertions::assert_not_impl_any!(Composite<Option<std::rc::Rc<u8>>>: Send, Sync);

    #[test]
    fn inline_composite_clones_payload() {
        let a = Composite::new((1_u32, 2_u32));
        let b = a.clone();

        assert!(a.as_pooled().is_none());
        assert_eq!(*a, *b);
        assert!(!std::ptr::eq(a.get(), b.get()));
        assert!(a.same_payload(&a));
        assert!(!a.same_payload(&b));
        assert_eq!(Storage::use_count(&a), None);
    }

    #[test]
    fn pooled_composite_shares_payload() {
        let a = Composite::new(Some("shared".to_string()));
        let b = a.clone();

        assert!(a.same_payload(&b));
        assert!(std::ptr::eq(a.get(), b.get()));
        assert_eq!(Storage::use_count(&a), Some(2));

        drop(a);
        assert_eq!(b.as_deref(), Some("shared"));
        assert_eq!(Storage::use_count(&b), Some(1));
    }

    #[test]
    fn oversized_array_of_inline_elements_is_pooled() {
        let a = Composite::new([3_u8; MAX_INLINE_SIZE + 1]);

        let pooled = a.as_pooled().unwrap();
        assert!(Arc::ptr_eq(
            pooled.owner(),
            &crate::CellPool::<[u8; MAX_INLINE_SIZE + 1]>::for_current_thread()
        ));
        assert_eq!(a.get().last(), Some(&3));
    }

    #[test]
    fn debug_shows_representation() {
        let output = format!("{:?}", Composite::new(Some(5_u16)));

        assert!(output.contains("inlined: true"));
        assert!(output.contains("Some(5)"));
    }
}
