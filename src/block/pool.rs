//! Bounded resource pool
//!
//! Hands out exclusive instances of expensive, stateful resources
//! (compressors, decompressors, scratch buffers). Instances are created
//! lazily up to the pool's capacity; once that many are checked out,
//! `acquire` blocks until a [`Pooled`] guard is dropped.

use std::mem;
use std::ops::{Deref, DerefMut};

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, StoreError};

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// A bounded pool of reusable resources
pub struct ResourcePool<T> {
    /// Used in error messages
    name: &'static str,
    capacity: usize,
    state: Mutex<PoolState<T>>,
    returned: Condvar,
    factory: Factory<T>,
}

struct PoolState<T> {
    /// Instances not checked out
    idle: Vec<T>,
    /// Instances alive (idle + checked out)
    created: usize,
    closed: bool,
}

impl<T> ResourcePool<T> {
    /// Create a pool of at most `capacity` instances made by `factory`
    pub fn new(
        name: &'static str,
        capacity: usize,
        factory: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            name,
            capacity,
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(capacity),
                created: 0,
                closed: false,
            }),
            returned: Condvar::new(),
            factory: Box::new(factory),
        }
    }

    /// Check out an instance, blocking while all of them are in use
    pub fn acquire(&self) -> Result<Pooled<'_, T>> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(StoreError::PoolClosed(self.name.to_string()));
            }
            if let Some(item) = state.idle.pop() {
                return Ok(Pooled::new(self, item));
            }
            if state.created < self.capacity {
                state.created += 1;
                drop(state);
                let reserved = SlotReservation { pool: self };
                let item = (self.factory)();
                mem::forget(reserved);
                return Ok(Pooled::new(self, item));
            }
            self.returned.wait(&mut state);
        }
    }

    /// Give back a slot reserved for an instance that was never created
    fn forfeit_slot(&self) {
        self.state.lock().created -= 1;
        self.returned.notify_one();
    }

    fn release(&self, item: T) {
        let mut state = self.state.lock();
        if state.closed {
            state.created -= 1;
            drop(state);
            drop(item);
            return;
        }
        state.idle.push(item);
        drop(state);
        self.returned.notify_one();
    }

    /// Dispose of every idle instance; instances still checked out are
    /// disposed when returned. Later `acquire` calls fail.
    pub fn close(&self) {
        let idle = {
            let mut state = self.state.lock();
            state.closed = true;
            state.created -= state.idle.len();
            mem::take(&mut state.idle)
        };
        drop(idle);
        self.returned.notify_all();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Instances currently alive
    pub fn created(&self) -> usize {
        self.state.lock().created
    }

    /// Instances alive but not checked out
    pub fn idle(&self) -> usize {
        self.state.lock().idle.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Slot counted in `created` while the factory runs; handed back if the
/// factory panics
struct SlotReservation<'a, T> {
    pool: &'a ResourcePool<T>,
}

impl<T> Drop for SlotReservation<'_, T> {
    fn drop(&mut self) {
        self.pool.forfeit_slot();
    }
}

/// Exclusive checkout of a pooled instance; returned to the pool on drop,
/// including during unwinding.
pub struct Pooled<'a, T> {
    pool: &'a ResourcePool<T>,
    /// Always `Some` until dropped
    item: Option<T>,
}

impl<'a, T> Pooled<'a, T> {
    fn new(pool: &'a ResourcePool<T>, item: T) -> Self {
        Self {
            pool,
            item: Some(item),
        }
    }
}

impl<T> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.item.as_ref().expect("pooled item taken before drop")
    }
}

impl<T> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("pooled item taken before drop")
    }
}

impl<T> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.release(item);
        }
    }
}
