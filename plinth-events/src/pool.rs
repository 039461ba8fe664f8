//! Per-type payload recycling.
//!
//! High-frequency events allocate the same payload shapes over and over.
//! A [`Pool`] keeps released instances around and hands them back out,
//! reset to their default state. Acquisition is scoped: [`Pooled`] returns
//! its value to the pool when dropped, on every exit path.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Capacity increment applied when a release finds the pool full.
pub const DEFAULT_GROWTH: usize = 5;

/// A payload type that can be recycled.
pub trait Poolable: Default + Send + 'static {
    /// Restores the instance to its default state before it is reused.
    ///
    /// Override this to keep allocations (e.g. `Vec::clear`) instead of
    /// replacing the value.
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Return path used by [`Pooled`] on drop.
trait Recycle<T>: Send + Sync {
    fn recycle(&self, value: T);
}

struct PoolState<T> {
    items: Vec<T>,
    capacity: usize,
}

/// Recycling pool for a single payload type.
pub struct Pool<T> {
    state: Mutex<PoolState<T>>,
    growth: usize,
    allocated: AtomicUsize,
}

impl<T: Poolable> Pool<T> {
    /// Creates an empty pool with an initial capacity of one growth step.
    pub fn new(growth: usize) -> Self {
        let growth = growth.max(1);
        Self {
            state: Mutex::new(PoolState {
                items: Vec::with_capacity(growth),
                capacity: growth,
            }),
            growth,
            allocated: AtomicUsize::new(0),
        }
    }

    /// Takes a recycled instance, or allocates one when the pool is empty.
    pub fn acquire(self: &Arc<Self>) -> Pooled<T> {
        let recycled = self.lock().items.pop();
        let value = recycled.unwrap_or_else(|| {
            self.allocated.fetch_add(1, Ordering::Relaxed);
            T::default()
        });
        Pooled {
            value: Some(value),
            home: Arc::clone(self) as Arc<dyn Recycle<T>>,
        }
    }

    /// Resets `value` and stores it for reuse.
    ///
    /// A full pool grows by the configured increment rather than dropping
    /// the instance.
    pub fn release(&self, mut value: T) {
        value.reset();
        let mut state = self.lock();
        if state.items.len() >= state.capacity {
            state.capacity += self.growth;
            let additional = state.capacity - state.items.len();
            state.items.reserve(additional);
        }
        state.items.push(value);
    }

    /// Number of instances ready for reuse.
    pub fn available(&self) -> usize {
        self.lock().items.len()
    }

    /// Current capacity before the next growth step.
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Number of instances this pool has ever allocated.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Poolable> Recycle<T> for Pool<T> {
    fn recycle(&self, value: T) {
        self.release(value);
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("type", &std::any::type_name::<T>())
            .field("growth", &self.growth)
            .field("allocated", &self.allocated.load(Ordering::Relaxed))
            .finish()
    }
}

/// Scoped handle to a pooled value.
///
/// Dereferences to the value and hands it back to its pool when dropped.
/// Callers must not keep data borrowed from the value past the guard.
pub struct Pooled<T> {
    value: Option<T>,
    home: Arc<dyn Recycle<T>>,
}

impl<T> Pooled<T> {
    /// Detaches the value from the pool; it will not be recycled.
    pub fn into_inner(mut self) -> T {
        match self.value.take() {
            Some(value) => value,
            None => unreachable!("pooled value already taken"),
        }
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.value {
            Some(value) => value,
            None => unreachable!("pooled value already taken"),
        }
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.value {
            Some(value) => value,
            None => unreachable!("pooled value already taken"),
        }
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.home.recycle(value);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.value).finish()
    }
}

/// Thread-safe registry of per-type pools.
pub struct ArgPool {
    pools: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    growth: usize,
}

impl ArgPool {
    pub fn new() -> Self {
        Self::with_growth(DEFAULT_GROWTH)
    }

    /// Creates a registry whose pools grow by `growth` when full.
    pub fn with_growth(growth: usize) -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            growth,
        }
    }

    /// Returns the pool for `T`, creating it on first use.
    pub fn pool<T: Poolable>(&self) -> Arc<Pool<T>> {
        let mut pools = self.pools.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = pools
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(Pool::<T>::new(self.growth)) as Arc<dyn Any + Send + Sync>);
        match Arc::clone(entry).downcast::<Pool<T>>() {
            Ok(pool) => pool,
            Err(_) => unreachable!("pool registered under a foreign TypeId"),
        }
    }

    /// Acquires a `T` from its pool.
    pub fn acquire<T: Poolable>(&self) -> Pooled<T> {
        self.pool::<T>().acquire()
    }

    /// Growth increment used for new pools.
    pub fn growth(&self) -> usize {
        self.growth
    }
}

impl Default for ArgPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ArgPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.pools.lock().map(|p| p.len()).unwrap_or_default();
        f.debug_struct("ArgPool")
            .field("pools", &count)
            .field("growth", &self.growth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Counter {
        hits: u32,
    }

    impl Poolable for Counter {}

    #[derive(Debug, Default)]
    struct Batch {
        names: Vec<String>,
    }

    impl Poolable for Batch {
        fn reset(&mut self) {
            self.names.clear();
        }
    }

    #[test]
    fn empty_pool_allocates() {
        let pool = Arc::new(Pool::<Counter>::new(DEFAULT_GROWTH));
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.allocated(), 2);
        drop((a, b));
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn release_resets_to_default() {
        let pool = Arc::new(Pool::<Counter>::new(DEFAULT_GROWTH));
        {
            let mut c = pool.acquire();
            c.hits = 9;
        }
        let c = pool.acquire();
        assert_eq!(*c, Counter::default());
        assert_eq!(pool.allocated(), 1);
    }

    #[test]
    fn reacquire_returns_same_instance() {
        let pool = Arc::new(Pool::<Batch>::new(DEFAULT_GROWTH));
        let ptr = {
            let mut batch = pool.acquire();
            batch.names.push("alpha".into());
            batch.names.as_ptr()
        };
        let batch = pool.acquire();
        assert!(batch.names.is_empty());
        assert_eq!(batch.names.as_ptr(), ptr);
    }

    #[test]
    fn full_pool_grows_instead_of_dropping() {
        let pool = Pool::<Counter>::new(2);
        for _ in 0..3 {
            pool.release(Counter::default());
        }
        assert_eq!(pool.available(), 3);
        assert_eq!(pool.capacity(), 4);
    }

    #[test]
    fn into_inner_detaches() {
        let pool = Arc::new(Pool::<Counter>::new(DEFAULT_GROWTH));
        let value = pool.acquire().into_inner();
        assert_eq!(value.hits, 0);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn registry_shares_pool_per_type() {
        let registry = ArgPool::new();
        drop(registry.acquire::<Counter>());
        assert_eq!(registry.pool::<Counter>().available(), 1);
        assert_eq!(registry.pool::<Batch>().available(), 0);
    }

    #[test]
    fn guard_returns_value_on_unwind() {
        let pool = Arc::new(Pool::<Counter>::new(DEFAULT_GROWTH));
        let cloned = Arc::clone(&pool);
        let result = std::panic::catch_unwind(move || {
            let _guard = cloned.acquire();
            panic!("subscriber blew up");
        });
        assert!(result.is_err());
        assert_eq!(pool.available(), 1);
    }
}
