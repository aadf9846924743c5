//! Platform abstraction for the locking primitives used by the coordination
//! objects.
//!
//! Everything that needs a lock goes through this module so the backing
//! implementation can be swapped in one place. The host build uses
//! `parking_lot`, whose guards never poison: a panicking task must not leave
//! the event register or the queue permanently unusable for everyone else.

pub use std::sync::Arc;

pub type MutexGuard<'a, T> = parking_lot::MutexGuard<'a, T>;

/// Mutex wrapper with an infallible `lock`.
pub struct Mutex<T: ?Sized> {
    inner: parking_lot::Mutex<T>,
}

impl<T> Mutex<T> {
    /// Creates a new mutex protecting the given value.
    pub fn new(value: T) -> Self {
        Self {
            inner: parking_lot::Mutex::new(value),
        }
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Acquires the mutex, blocking until it becomes available.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Condition variable paired with [`Mutex`].
#[derive(Default)]
pub struct Condvar {
    inner: parking_lot::Condvar,
}

impl Condvar {
    pub fn new() -> Self {
        Self {
            inner: parking_lot::Condvar::new(),
        }
    }

    /// Blocks until notified. Spurious wakeups are possible; callers loop on
    /// their own predicate.
    pub fn wait<T>(&self, guard: &mut MutexGuard<'_, T>) {
        self.inner.wait(guard);
    }

    /// Blocks until notified or `deadline` passes. Returns `true` on timeout.
    pub fn wait_until<T>(&self, guard: &mut MutexGuard<'_, T>, deadline: std::time::Instant) -> bool {
        self.inner.wait_until(guard, deadline).timed_out()
    }

    pub fn notify_one(&self) {
        self.inner.notify_one();
    }

    pub fn notify_all(&self) {
        self.inner.notify_all();
    }
}
