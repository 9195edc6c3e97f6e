use std::ops::Deref;

/// The inline representation of a [`Small`][crate::Small] handle: the payload itself, stored by
/// value.
///
/// Cloning clones the payload (once per clone) and dropping drops it. No pool is involved.
///
/// You would normally use this through [`Small`][crate::Small], which selects it for small
/// `Copy` payloads and for payloads that are themselves shared handles such as [`Arc`].
///
/// [`Arc`]: std::sync::Arc
#[derive(Clone, Copy, Debug, Default)]
pub struct Inline<T> {
    value: T,
}

impl<T> Inline<T> {
    /// Stores `value` in the handle.
    #[must_use]
    #[inline]
    pub fn new(value: T) -> Self {
        Self { value }
    }

    /// Returns a reference to the payload.
    #[must_use]
    #[inline]
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Returns the payload, consuming the handle.
    #[must_use]
    #[inline]
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for Inline<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.value
    }
}
