//! This package provides [`Small`], a read-only value handle that keeps small payloads inline
//! and shares everything else through reference-counted cells drawn from per-thread pools.
//!
//! Which representation a payload type gets is decided at compile time:
//!
//! - **Inline** for `Copy` types of at most [`MAX_INLINE_SIZE`] bytes and for types that are
//!   themselves shared handles, such as [`Arc`][std::sync::Arc] or [`Rc`][std::rc::Rc]. The
//!   handle holds the payload by value.
//! - **Pooled** for everything else. The handle points at a cell in the [`CellPool`] of the
//!   thread that created it. Copies of the handle share the cell and bump its atomic use count.
//!
//! Check [`Small::INLINED`] to see which representation a type got.
//!
//! # Features
//!
//! - **Value semantics**: handles dereference to `&T` and compare, hash and format like `T`.
//! - **No copies of large payloads**: cloning a pooled handle never clones the payload.
//! - **Per-thread pools**: each thread allocates from its own pool per payload type, so threads
//!   do not contend with each other when creating handles.
//! - **Cross-thread release**: the last handle to a cell may be dropped on any thread. The cell
//!   returns to the pool that allocated it, which stays alive as long as it has live cells.
//! - **Stable Rust**: no unstable Rust features required.
//!
//! # Example
//!
//! ```rust
//! use small_pool::Small;
//!
//! // Small `Copy` payloads live inside the handle.
//! let count = Small::new(42_u64);
//! assert!(Small::<u64>::INLINED);
//! assert_eq!(*count, 42);
//!
//! // Larger payloads live in a pooled cell shared by all copies of the handle.
//! let name = Small::new("a fairly long string".to_string());
//! let same_name = name.clone();
//! assert!(!Small::<String>::INLINED);
//! assert!(Small::ptr_eq(&name, &same_name));
//! assert_eq!(Small::use_count(&name), Some(2));
//! ```
//!
//! Handles can travel to other threads and be dropped there:
//!
//! ```rust
//! use std::thread;
//!
//! use small_pool::Small;
//!
//! let message = Small::new(vec![1, 2, 3]);
//!
//! thread::spawn(move || {
//!     assert_eq!(*message, [1, 2, 3]);
//!     // The cell returns to the pool of the main thread here.
//! })
//! .join()
//! .unwrap();
//! ```
//!
//! Your own types become payloads through a declaration macro:
//!
//! ```rust
//! use small_pool::{Small, copy_payload, pooled_payload};
//!
//! #[derive(Clone, Copy)]
//! struct Celsius(f32);
//!
//! struct Report {
//!     lines: Vec<String>,
//! }
//!
//! copy_payload!(Celsius);
//! pooled_payload!(Report);
//!
//! assert!(Small::<Celsius>::INLINED);
//! assert!(!Small::<Report>::INLINED);
//! ```
//!
//! # Logging
//!
//! Pool lifecycle events (pool creation and destruction, slab growth and release) are reported
//! through [`tracing`] at `debug` and `trace` level.

mod cell;
mod classify;
mod composite;
mod constants;
mod inline;
mod pool;
mod pooled;
mod registry;
mod slab;
mod small;

pub(crate) use cell::*;
pub use classify::*;
pub use composite::*;
pub use inline::*;
pub use pool::*;
pub use pooled::*;
pub(crate) use slab::*;
pub use small::*;
