//! Tests for ResourcePool
//!
//! These tests verify:
//! - Lazy creation up to capacity
//! - Blocking while every instance is checked out
//! - Instances returned on drop, including on panic
//! - A panicking factory does not use up a slot
//! - Closing disposes of instances and fails later checkouts

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use contentstore::block::ResourcePool;
use contentstore::StoreError;

// =============================================================================
// Helper Functions
// =============================================================================

fn counting_pool(capacity: usize) -> (ResourcePool<Vec<u8>>, Arc<AtomicUsize>) {
    let made = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&made);
    let pool = ResourcePool::new("test buffers", capacity, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        vec![0u8; 16]
    });
    (pool, made)
}

// =============================================================================
// Checkout Tests
// =============================================================================

#[test]
fn test_created_lazily() {
    let (pool, made) = counting_pool(4);
    assert_eq!(pool.created(), 0);

    {
        let _a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        assert_eq!(pool.created(), 2);
        assert_eq!(pool.idle(), 0);
    }

    assert_eq!(pool.idle(), 2);
    let _c = pool.acquire().unwrap();
    assert_eq!(made.load(Ordering::SeqCst), 2);
}

#[test]
fn test_state_preserved_between_checkouts() {
    let (pool, _) = counting_pool(1);
    pool.acquire().unwrap()[0] = 42;
    assert_eq!(pool.acquire().unwrap()[0], 42);
}

#[test]
fn test_capacity_minimum_one() {
    let (pool, _) = counting_pool(0);
    assert_eq!(pool.capacity(), 1);
    assert!(pool.acquire().is_ok());
}

#[test]
fn test_acquire_blocks_until_release() {
    let (pool, made) = counting_pool(1);
    let pool = Arc::new(pool);
    let acquired = Arc::new(AtomicBool::new(false));

    let guard = pool.acquire().unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        let acquired = Arc::clone(&acquired);
        thread::spawn(move || {
            let _item = pool.acquire().unwrap();
            acquired.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!acquired.load(Ordering::SeqCst));

    drop(guard);
    waiter.join().unwrap();
    assert!(acquired.load(Ordering::SeqCst));
    assert_eq!(made.load(Ordering::SeqCst), 1);
}

#[test]
fn test_many_threads_small_pool() {
    let (pool, made) = counting_pool(2);
    let pool = Arc::new(pool);
    let in_use = Arc::new(AtomicUsize::new(0));
    let max_in_use = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let in_use = Arc::clone(&in_use);
            let max_in_use = Arc::clone(&max_in_use);
            thread::spawn(move || {
                for _ in 0..50 {
                    let _item = pool.acquire().unwrap();
                    let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_use.fetch_max(now, Ordering::SeqCst);
                    thread::yield_now();
                    in_use.fetch_sub(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(max_in_use.load(Ordering::SeqCst) <= 2);
    assert!(made.load(Ordering::SeqCst) <= 2);
}

#[test]
fn test_returned_on_panic() {
    let (pool, _) = counting_pool(1);

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _item = pool.acquire().unwrap();
        panic!("boom");
    }));
    assert!(result.is_err());

    assert_eq!(pool.idle(), 1);
    assert!(pool.acquire().is_ok());
}

#[test]
fn test_factory_panic_frees_slot() {
    let failed_once = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&failed_once);
    let pool = ResourcePool::new("flaky buffers", 1, move || {
        if !flag.swap(true, Ordering::SeqCst) {
            panic!("first construction fails");
        }
        vec![1u8; 4]
    });

    let result = panic::catch_unwind(AssertUnwindSafe(|| pool.acquire().map(|_| ())));
    assert!(result.is_err());
    assert_eq!(pool.created(), 0);

    // capacity is 1: this would block forever if the slot had leaked
    let item = pool.acquire().unwrap();
    assert_eq!(*item, vec![1u8; 4]);
    assert_eq!(pool.created(), 1);
}

#[test]
fn test_factory_panic_wakes_waiter() {
    let started = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&started);
    let pool = Arc::new(ResourcePool::new("slow flaky buffers", 1, move || {
        if !flag.swap(true, Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
            panic!("first construction fails");
        }
        vec![2u8; 4]
    }));

    let failing = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.acquire().map(|_| ()))
    };
    while !started.load(Ordering::SeqCst) {
        thread::yield_now();
    }

    // blocks on the reserved slot until the factory unwinds
    let item = pool.acquire().unwrap();
    assert_eq!(*item, vec![2u8; 4]);
    assert!(failing.join().is_err());
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_close_disposes_idle() {
    let (pool, _) = counting_pool(3);
    drop(pool.acquire().unwrap());
    assert_eq!(pool.idle(), 1);

    pool.close();
    assert!(pool.is_closed());
    assert_eq!(pool.idle(), 0);
    assert_eq!(pool.created(), 0);
}

#[test]
fn test_acquire_after_close_fails() {
    let (pool, _) = counting_pool(1);
    pool.close();
    assert!(matches!(pool.acquire(), Err(StoreError::PoolClosed(_))));
}

#[test]
fn test_outstanding_checkout_disposed_on_return() {
    let (pool, _) = counting_pool(2);
    let item = pool.acquire().unwrap();

    pool.close();
    assert_eq!(pool.created(), 1);

    drop(item);
    assert_eq!(pool.created(), 0);
    assert_eq!(pool.idle(), 0);
}

#[test]
fn test_close_wakes_waiters() {
    let (pool, _) = counting_pool(1);
    let pool = Arc::new(pool);
    let guard = pool.acquire().unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.acquire().map(|_| ()))
    };

    thread::sleep(Duration::from_millis(50));
    pool.close();
    let result = waiter.join().unwrap();
    assert!(matches!(result, Err(StoreError::PoolClosed(_))));
    drop(guard);
}
