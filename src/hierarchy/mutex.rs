use std::{
    cell::UnsafeCell,
    fmt,
    marker::PhantomData,
    mem::ManuallyDrop,
    ops::{Deref, DerefMut},
};

use super::{HierarchyError, RawHierarchicalMutex, TryLockError};

/// A Mutex protecting some Data, that can only be acquired in the Order of
/// its Hierarchy-Level.
///
/// # Example
/// ```
/// use lockstep::hierarchy::HierarchicalMutex;
///
/// let accounts = HierarchicalMutex::new(100, vec![10u64, 20]);
/// let journal = HierarchicalMutex::new(50, Vec::new());
///
/// let mut accounts_guard = accounts.lock().unwrap();
/// let mut journal_guard = journal.lock().unwrap();
///
/// accounts_guard[0] -= 5;
/// accounts_guard[1] += 5;
/// journal_guard.push("moved 5");
/// ```
pub struct HierarchicalMutex<T: ?Sized> {
    raw: RawHierarchicalMutex,
    data: UnsafeCell<T>,
}

// # Safety:
// The Mutex only ever gives out access to the Data to the single Thread
// holding the Lock, so sharing it is fine as long as the Data itself can be
// sent to the Thread that ends up acquiring it
unsafe impl<T: ?Sized + Send> Send for HierarchicalMutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for HierarchicalMutex<T> {}

impl<T> HierarchicalMutex<T> {
    /// Creates a new unlocked Mutex with the given Level, protecting the
    /// given Data
    pub const fn new(level: u64, data: T) -> Self {
        Self {
            raw: RawHierarchicalMutex::new(level),
            data: UnsafeCell::new(data),
        }
    }

    /// Consumes the Mutex and returns the Data it protected
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> HierarchicalMutex<T> {
    /// The Hierarchy-Level of this Mutex
    pub fn level(&self) -> u64 {
        self.raw.level()
    }

    /// Acquires the Mutex, blocking until it becomes available.
    ///
    /// # Returns
    /// * `Ok(guard)` which releases the Lock once it is dropped
    /// * `Err(_)` if the current Thread already holds a Lock with a Level
    /// lower than or equal to this one
    pub fn lock(&self) -> Result<HierarchicalMutexGuard<'_, T>, HierarchyError> {
        self.raw.lock()?;

        Ok(HierarchicalMutexGuard::new(self))
    }

    /// Attempts to acquire the Mutex without blocking
    pub fn try_lock(&self) -> Result<HierarchicalMutexGuard<'_, T>, TryLockError> {
        if !self.raw.try_lock()? {
            return Err(TryLockError::WouldBlock);
        }

        Ok(HierarchicalMutexGuard::new(self))
    }

    /// Checks if the Mutex is currently locked by any Thread
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// Gives direct access to the Data, as the exclusive Borrow already
    /// guarantees that no one else holds the Lock
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: ?Sized> fmt::Debug for HierarchicalMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HierarchicalMutex (level: {})", self.level())
    }
}

/// The RAII-Guard for a locked [`HierarchicalMutex`], the Lock is released
/// once the Guard is dropped.
///
/// The Guard must be dropped on the Thread that acquired it and in the
/// reverse Order of acquisition. Dropping it out of Order still releases the
/// Mutex, but then panics (unless the Thread is already panicking), as the
/// Code holding it is broken. Use [`HierarchicalMutexGuard::unlock`] to get
/// the Violation as an Error instead.
pub struct HierarchicalMutexGuard<'a, T: ?Sized> {
    mutex: &'a HierarchicalMutex<T>,
    /// The Hierarchy-State lives in a thread-local, so the Guard must not
    /// leave the Thread
    _not_send: PhantomData<*const ()>,
}

// # Safety:
// A shared Reference to the Guard only gives out shared References to the
// Data
unsafe impl<T: ?Sized + Sync> Sync for HierarchicalMutexGuard<'_, T> {}

impl<'a, T: ?Sized> HierarchicalMutexGuard<'a, T> {
    fn new(mutex: &'a HierarchicalMutex<T>) -> Self {
        Self {
            mutex,
            _not_send: PhantomData,
        }
    }

    /// Releases the Lock explicitly.
    ///
    /// # Returns
    /// * `Ok(())` if the Lock was released
    /// * `Err((error, guard))` if this was not the Lock acquired last by the
    /// current Thread, the Lock is still held and the Guard is handed back
    pub fn unlock(self) -> Result<(), (HierarchyError, Self)> {
        let guard = ManuallyDrop::new(self);

        // # Safety:
        // The existence of the Guard proves that the current Thread holds
        // the Lock
        match unsafe { guard.mutex.raw.unlock() } {
            Ok(()) => Ok(()),
            Err(err) => Err((err, ManuallyDrop::into_inner(guard))),
        }
    }
}

impl<T: ?Sized> Deref for HierarchicalMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // # Safety:
        // The Guard only exists while the Lock is held, so no one else can
        // access the Data
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for HierarchicalMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // # Safety:
        // See `deref`, additionally the exclusive Borrow of the Guard makes
        // sure there is only one mutable Reference
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for HierarchicalMutexGuard<'_, T> {
    fn drop(&mut self) {
        // # Safety:
        // The Guard proves that the current Thread holds the Lock
        if let Err(err) = unsafe { self.mutex.raw.unlock() } {
            unsafe { self.mutex.raw.release_unchecked() };

            if !std::thread::panicking() {
                panic!("{}", err);
            }
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for HierarchicalMutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
