use std::any::{Any, TypeId, type_name};
use std::cell::RefCell;
use std::sync::Arc;
use std::thread;

use foldhash::{HashMap, HashMapExt};
use tracing::debug;

use crate::CellPool;

thread_local! {
    /// The pools of the current thread, one per payload type. Each value is an
    /// `Arc<CellPool<T>>` for the `T` whose `TypeId` is the key.
    ///
    /// The registry holds one reference to each pool. When the thread exits the registry is
    /// dropped, and every pool without live cells goes with it.
    static POOLS: RefCell<HashMap<TypeId, Box<dyn Any>>> = RefCell::new(HashMap::new());
}

/// Returns the pool for payloads of type `T` that belongs to the current thread, creating it on
/// first use.
///
/// If the thread is already tearing down its thread-local state (e.g. a handle is created from
/// the destructor of another thread-local), the registry is gone and a fresh pool is returned
/// instead. That pool lives exactly as long as the cells allocated from it.
pub(crate) fn current_thread_pool<T: 'static>() -> Arc<CellPool<T>> {
    POOLS
        .try_with(|pools| {
            let mut pools = pools.borrow_mut();

            let entry = pools.entry(TypeId::of::<T>()).or_insert_with(|| {
                debug!(
                    payload = type_name::<T>(),
                    thread = ?thread::current().id(),
                    "creating cell pool for thread"
                );

                let pool: Box<dyn Any> = Box::new(Arc::new(CellPool::<T>::new()));
                pool
            });

            let pool = entry
                .downcast_ref::<Arc<CellPool<T>>>()
                .expect("registry entries are always keyed by the TypeId of their payload type");

            Arc::clone(pool)
        })
        .unwrap_or_else(|_| {
            debug!(
                payload = type_name::<T>(),
                "thread-local pool registry already destroyed - using a detached pool"
            );

            Arc::new(CellPool::new())
        })
}
