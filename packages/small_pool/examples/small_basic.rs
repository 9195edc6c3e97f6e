//! Basic usage of the `small_pool` crate:
//!
//! * Storing a small `Copy` value inline.
//! * Sharing a string between handles through a pooled cell.
//! * Creating a handle in an async task on another thread and using it on the main thread.

use std::thread;

use futures::executor::block_on;
use small_pool::{CellPool, Small};

fn main() {
    // Small `Copy` values live inside the handle. Copying the handle copies the value.
    let count = Small::new(3_i32);
    let count_copy = count;

    println!(
        "Small<i32> inlined: {}, value: {}, copy: {}",
        Small::<i32>::INLINED,
        count,
        count_copy
    );

    // A string is stored in a cell from this thread's pool. Copies of the handle share the cell.
    let greeting = Small::new("hello from a pooled cell".to_string());
    let greeting_copy = greeting.clone();

    println!(
        "Small<String> inlined: {}, use count: {:?}",
        Small::<String>::INLINED,
        Small::use_count(&greeting)
    );

    // The copy keeps the payload alive after the original is gone.
    drop(greeting);
    println!("Copy still reads: {greeting_copy}");

    // A handle created by an async task on another thread comes from that thread's pool.
    let from_task = thread::spawn(|| block_on(async { Small::new(vec![1_u64, 2, 3]) }))
        .join()
        .expect("worker thread panicked");

    let sum: u64 = from_task.iter().sum();
    println!(
        "Handle from async task: {:?}, sum: {sum}, created on {:?}, used on {:?}",
        *from_task,
        Small::storage(&from_task).owner().thread(),
        thread::current().id()
    );

    // The creating thread has exited, but its pool lives on until the last handle is dropped.
    let main_pool = CellPool::<Vec<u64>>::for_current_thread();
    println!(
        "Main thread pool for Vec<u64> holds {} cells",
        main_pool.len()
    );

    drop(from_task);
}
