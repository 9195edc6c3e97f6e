//! Integration tests for pooled handles that are created, shared and dropped across threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;

use futures::channel::oneshot;
use futures::executor::block_on;
use small_pool::{CellPool, Pooled, Small, pooled_payload};
use testing::{on_threads, with_watchdog};

/// Counts its drops through a shared counter.
struct Tracked {
    id: usize,
    drops: Arc<AtomicUsize>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::Relaxed);
    }
}

pooled_payload!(Tracked);

#[test]
fn two_threads_allocate_from_their_own_pools() {
    with_watchdog(|| {
        const ALLOCATIONS: usize = 1000;

        let results = on_threads(2, |index| {
            let pool = CellPool::<String>::for_current_thread();

            let handles = (0..ALLOCATIONS)
                .map(|i| Small::new(format!("thread {index} value {i}")))
                .collect::<Vec<_>>();

            assert_eq!(pool.len(), ALLOCATIONS);
            assert!(
                handles
                    .iter()
                    .all(|handle| Arc::ptr_eq(Small::storage(handle).owner(), &pool))
            );

            drop(handles);

            // Every cell went back to the pool.
            assert!(pool.is_empty());

            // Keep the pool alive so the two can be compared after both threads finished.
            pool
        });

        let [first, second] = <[_; 2]>::try_from(results).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_ne!(first.thread(), second.thread());
    });
}

#[test]
fn last_drop_on_other_thread_returns_cell_to_creating_pool() {
    with_watchdog(|| {
        let owner = CellPool::<Vec<u32>>::for_current_thread();
        let before = owner.len();

        let handle = Small::new(vec![1_u32, 2, 3]);
        assert!(Arc::ptr_eq(Small::storage(&handle).owner(), &owner));
        assert_eq!(owner.len(), before + 1);

        thread::spawn(move || {
            let local = CellPool::<Vec<u32>>::for_current_thread();

            assert_eq!(*handle, [1, 2, 3]);
            drop(handle);

            assert!(local.is_empty());
        })
        .join()
        .unwrap();

        assert_eq!(owner.len(), before);
    });
}

#[test]
fn async_task_on_other_thread_releases_to_creating_pool() {
    with_watchdog(|| {
        let owner = CellPool::<String>::for_current_thread();
        let before = owner.len();

        let handle = Small::new("captured by an async task".to_string());
        let captured = handle.clone();
        assert_eq!(owner.len(), before + 1);

        let (release_tx, release_rx) = oneshot::channel::<()>();

        let task = async move {
            // Wait until the creating thread has dropped its own handle.
            release_rx.await.unwrap();

            assert_eq!(Small::use_count(&captured), Some(1));
            assert_eq!(*captured, "captured by an async task");

            let owner_thread = Small::storage(&captured).owner().thread();
            assert_ne!(owner_thread, thread::current().id());

            drop(captured);
            owner_thread
        };

        let worker = thread::spawn(move || block_on(task));

        drop(handle);
        release_tx.send(()).unwrap();

        let owner_thread = worker.join().unwrap();

        assert_eq!(owner_thread, thread::current().id());
        assert_eq!(owner.len(), before);

        // The free list survived the foreign release.
        let reused = Small::new("reused".to_string());
        assert_eq!(owner.len(), before + 1);
        assert_eq!(*reused, "reused");
    });
}

#[test]
fn handle_outlives_creating_thread() {
    with_watchdog(|| {
        let (tx, rx) = mpsc::channel();

        let creator = thread::spawn(move || {
            let handle = Small::new("from a thread that has exited".to_string());
            let weak_pool = Arc::downgrade(Small::storage(&handle).owner());

            tx.send((handle, weak_pool)).unwrap();
            thread::current().id()
        });

        let creator_id = creator.join().unwrap();
        let (handle, weak_pool) = rx.recv().unwrap();

        // The creating thread is gone but its pool lives on through the handle.
        let storage: &Pooled<String> = Small::storage(&handle);
        assert_eq!(storage.owner().thread(), creator_id);
        assert_eq!(storage.owner().len(), 1);
        assert_eq!(*handle, "from a thread that has exited");

        let copy = handle.clone();
        drop(handle);
        assert_eq!(*copy, "from a thread that has exited");

        // The last handle takes the orphaned pool with it.
        drop(copy);
        assert!(weak_pool.upgrade().is_none());
    });
}

#[test]
fn concurrent_clone_and_drop_drops_payload_once() {
    with_watchdog(|| {
        const THREADS: usize = 8;
        const ITERATIONS: usize = 1000;

        let drops = Arc::new(AtomicUsize::new(0));

        let shared = Small::new(Tracked {
            id: 42,
            drops: Arc::clone(&drops),
        });

        let results = on_threads(THREADS, {
            let shared = shared.clone();

            move |_| {
                for _ in 0..ITERATIONS {
                    let copy = shared.clone();
                    assert_eq!(copy.id, 42);
                    drop(copy);
                }
            }
        });
        assert_eq!(results.len(), THREADS);

        assert_eq!(drops.load(Ordering::Relaxed), 0);
        assert_eq!(Small::use_count(&shared), Some(1));

        drop(shared);
        assert_eq!(drops.load(Ordering::Relaxed), 1);
    });
}

#[test]
fn handles_fan_out_to_many_threads_and_all_drop_there() {
    with_watchdog(|| {
        const THREADS: usize = 8;

        let drops = Arc::new(AtomicUsize::new(0));
        let owner = CellPool::<Tracked>::for_current_thread();

        let handles = (0..THREADS)
            .map(|id| {
                Small::new(Tracked {
                    id,
                    drops: Arc::clone(&drops),
                })
            })
            .collect::<Vec<_>>();

        assert_eq!(owner.len(), THREADS);

        let workers = handles
            .iter()
            .map(|handle| {
                let copy = handle.clone();
                thread::spawn(move || copy.id)
            })
            .collect::<Vec<_>>();

        // Drop our handles while the workers may still hold theirs.
        drop(handles);

        let mut ids = workers
            .into_iter()
            .map(|worker| worker.join().unwrap())
            .collect::<Vec<_>>();
        ids.sort_unstable();

        assert_eq!(ids, (0..THREADS).collect::<Vec<_>>());
        assert_eq!(drops.load(Ordering::Relaxed), THREADS);
        assert!(owner.is_empty());
    });
}
