//! Safe global initialization without `static mut`.
//!
//! This kernel carries no heap allocator (every table is a fixed-capacity
//! array, per the data model), so only the `Mutex<Option<T>>`-backed
//! [`GlobalState`] variant of the teacher's `sync::once_lock` survives here;
//! the `Box`-backed `OnceLock`/`LazyLock` variants needed `alloc` and are
//! dropped.

use spin::{Mutex, MutexGuard};

/// Lazily-initialized process-wide state behind a spinlock.
///
/// Every major table in the kernel (frame allocator, process table, thread
/// table, endpoint table, GIC, logger) is a `static GlobalState<T>`,
/// initialized exactly once during boot before interrupts are enabled.
pub struct GlobalState<T> {
    inner: Mutex<Option<T>>,
}

impl<T> GlobalState<T> {
    /// Create new uninitialized global state.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Initialize the global state. Fails if already initialized.
    pub fn init(&self, value: T) -> Result<(), T> {
        let mut lock = self.inner.lock();
        if lock.is_some() {
            Err(value)
        } else {
            *lock = Some(value);
            Ok(())
        }
    }

    /// Run `f` with a shared reference to the inner value, if initialized.
    pub fn with<R, F: FnOnce(&T) -> R>(&self, f: F) -> Option<R> {
        let lock = self.inner.lock();
        lock.as_ref().map(f)
    }

    /// Run `f` with an exclusive reference to the inner value, if
    /// initialized.
    pub fn with_mut<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> Option<R> {
        let mut lock = self.inner.lock();
        lock.as_mut().map(f)
    }

    /// Lock and return the guard directly, for callers that need to hold
    /// the lock across several operations.
    pub fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.inner.lock()
    }

    /// Whether the state has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.inner.lock().is_some()
    }
}

impl<T> Default for GlobalState<T> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: GlobalState<T> can be sent across threads if T: Send. The inner
// spin::Mutex provides mutual exclusion, so the contained Option<T> is only
// accessed by one thread at a time.
unsafe impl<T: Send> Send for GlobalState<T> {}
// SAFETY: GlobalState<T> can be shared across threads if T: Send. The
// spin::Mutex serializes all access, so T need not be Sync itself.
unsafe impl<T: Send> Sync for GlobalState<T> {}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn init_once() {
        let g: GlobalState<u32> = GlobalState::new();
        assert!(g.init(7).is_ok());
        assert_eq!(g.init(9), Err(9));
        assert_eq!(g.with(|v| *v), Some(7));
    }

    #[test]
    fn with_mut_updates_in_place() {
        let g: GlobalState<u32> = GlobalState::new();
        g.init(1).unwrap();
        g.with_mut(|v| *v += 1);
        assert_eq!(g.with(|v| *v), Some(2));
    }
}
