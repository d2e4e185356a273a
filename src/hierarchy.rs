//! # Hierarchical Locks
//! A Mutex that carries a Hierarchy-Level and checks at runtime, that every
//! Thread acquires its Locks in strictly decreasing Order of their Levels.
//!
//! # How it works
//! Every Thread keeps track of the Levels it currently holds, the lowest of
//! which is its current Level. Holding nothing counts as [`UNRESTRICTED`]. Acquiring a Lock is only allowed if its
//! Level is strictly lower than that, and releasing a Lock is only allowed if
//! it was the last one acquired. If every Thread follows these rules, no two
//! Threads can ever wait on each other in a cycle, so instead of deadlocking
//! under Load, a wrong Lock-Order fails right where it happens.
//!
//! # Which one to use
//! * [`RawHierarchicalMutex`]: the bare `lock`/`try_lock`/`unlock` contract
//!   with a Level chosen at runtime, reporting violations as Errors
//! * [`HierarchicalMutex`]: owns the Data it protects and hands out RAII
//!   Guards, reporting violations as Errors
//! * [`LevelMutex`]: a [`lock_api::Mutex`] with the Level fixed at compile
//!   time, usable with any code that is generic over [`lock_api::RawMutex`].
//!   As that interface has no way to report Errors, violations panic
//!
//! # Example
//! ```
//! use lockstep::hierarchy::{HierarchicalMutex, HierarchyError};
//!
//! let high = HierarchicalMutex::new(100, "high");
//! let low = HierarchicalMutex::new(10, "low");
//!
//! // Going down the Hierarchy is fine
//! let high_guard = high.lock().unwrap();
//! let low_guard = low.lock().unwrap();
//! drop(low_guard);
//! drop(high_guard);
//!
//! // Going up is not
//! let low_guard = low.lock().unwrap();
//! assert!(matches!(
//!     high.lock(),
//!     Err(HierarchyError::LockOrderViolation { requested: 100, held: 10 })
//! ));
//! drop(low_guard);
//! ```

mod level_mutex;
pub use level_mutex::{LevelMutex, LevelMutexGuard, RawLevelMutex};

mod mutex;
pub use mutex::{HierarchicalMutex, HierarchicalMutexGuard};

use std::{cell::RefCell, fmt};

use lock_api::RawMutex as _;

/// The Level of a Thread that currently does not hold any Hierarchical Lock.
///
/// A Lock with this Level can therefore never be acquired.
pub const UNRESTRICTED: u64 = u64::MAX;

thread_local! {
    /// The Levels held by the Thread in the Order they were acquired, which
    /// is strictly decreasing, so every Level appears at most once
    static HELD_LEVELS: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Returns the lowest Hierarchy-Level currently held by the calling Thread,
/// or [`UNRESTRICTED`] if it holds none
pub fn thread_level() -> u64 {
    HELD_LEVELS.with(|held| held.borrow().last().copied().unwrap_or(UNRESTRICTED))
}

/// The Errors reported when a Thread does not respect the Lock-Hierarchy.
///
/// These indicate a bug in the calling code and not a transient condition,
/// retrying the same Operation will fail again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyError {
    /// The Thread attempted to acquire a Lock whose Level is not strictly
    /// lower than the lowest Level it already holds
    LockOrderViolation {
        /// The Level of the Lock that should have been acquired
        requested: u64,
        /// The lowest Level held by the Thread at that Time
        held: u64,
    },
    /// The Thread attempted to release a Lock that was not the last one it
    /// acquired
    UnlockOrderViolation {
        /// The Level of the Lock that should have been released
        releasing: u64,
        /// The lowest Level held by the Thread at that Time
        held: u64,
    },
}

impl fmt::Display for HierarchyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LockOrderViolation { requested, held } => write!(
                f,
                "lock hierarchy violated: acquiring level {} while holding level {}",
                requested, held
            ),
            Self::UnlockOrderViolation { releasing, held } => write!(
                f,
                "lock hierarchy violated: releasing level {} while level {} was acquired last",
                releasing, held
            ),
        }
    }
}

impl std::error::Error for HierarchyError {}

/// The Error returned by the non-blocking `try_lock` Operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryLockError {
    /// Acquiring the Lock would violate the Lock-Hierarchy
    Hierarchy(HierarchyError),
    /// The Lock is currently held by another Thread
    WouldBlock,
}

impl From<HierarchyError> for TryLockError {
    fn from(err: HierarchyError) -> Self {
        Self::Hierarchy(err)
    }
}

impl fmt::Display for TryLockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hierarchy(err) => err.fmt(f),
            Self::WouldBlock => write!(f, "lock is held by another thread"),
        }
    }
}

impl std::error::Error for TryLockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Hierarchy(err) => Some(err),
            Self::WouldBlock => None,
        }
    }
}

/// A raw Mutex with a Hierarchy-Level, that does not protect any Data by
/// itself.
///
/// This provides the basic `lock`, `try_lock` and `unlock` Operations and is
/// the building Block for [`HierarchicalMutex`] and [`RawLevelMutex`].
pub struct RawHierarchicalMutex {
    inner: parking_lot::RawMutex,
    level: u64,
}

impl fmt::Debug for RawHierarchicalMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawHierarchicalMutex (level: {})", self.level)
    }
}

impl RawHierarchicalMutex {
    /// Creates a new unlocked Mutex with the given Level, lower Levels are
    /// more fundamental and have to be acquired last.
    ///
    /// The Level must be lower than [`UNRESTRICTED`], as a Mutex with that
    /// Level could never be acquired. Debug-Builds panic in that case.
    pub const fn new(level: u64) -> Self {
        debug_assert!(
            level != UNRESTRICTED,
            "a hierarchical mutex can not use the UNRESTRICTED level"
        );

        Self {
            inner: parking_lot::RawMutex::INIT,
            level,
        }
    }

    /// The Hierarchy-Level of this Mutex
    pub fn level(&self) -> u64 {
        self.level
    }

    /// Checks if the Mutex is currently locked by any Thread
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    fn check_acquire(&self) -> Result<(), HierarchyError> {
        let held = thread_level();
        if held <= self.level {
            tracing::warn!(
                requested = self.level,
                held,
                "lock hierarchy violated on acquire"
            );
            return Err(HierarchyError::LockOrderViolation {
                requested: self.level,
                held,
            });
        }

        Ok(())
    }

    fn enter_level(&self) {
        HELD_LEVELS.with(|held| held.borrow_mut().push(self.level));
    }

    /// Acquires the Mutex, blocking the current Thread until it is available.
    ///
    /// The Hierarchy is checked before blocking, so a violation is reported
    /// right away instead of potentially deadlocking
    pub fn lock(&self) -> Result<(), HierarchyError> {
        self.check_acquire()?;

        self.inner.lock();
        self.enter_level();

        Ok(())
    }

    /// Attempts to acquire the Mutex without blocking.
    ///
    /// # Returns
    /// * `Ok(true)` if the Mutex was acquired
    /// * `Ok(false)` if it is held by another Thread, the State of the current
    /// Thread is left untouched in that case
    /// * `Err(_)` if acquiring it would violate the Hierarchy
    pub fn try_lock(&self) -> Result<bool, HierarchyError> {
        self.check_acquire()?;

        if !self.inner.try_lock() {
            return Ok(false);
        }
        self.enter_level();

        Ok(true)
    }

    /// Releases the Mutex and restores the Level the current Thread held
    /// before acquiring it.
    ///
    /// If this is not the Lock acquired last by the current Thread, nothing
    /// is changed and the Mutex stays locked.
    ///
    /// # Safety
    /// The current Thread must hold this Mutex
    pub unsafe fn unlock(&self) -> Result<(), HierarchyError> {
        let held = thread_level();
        if held != self.level {
            tracing::warn!(
                releasing = self.level,
                held,
                "lock hierarchy violated on release"
            );
            return Err(HierarchyError::UnlockOrderViolation {
                releasing: self.level,
                held,
            });
        }

        HELD_LEVELS.with(|held| held.borrow_mut().pop());

        // # Safety:
        // The Caller guarantees that the current Thread holds the Lock
        unsafe { self.inner.unlock() };

        Ok(())
    }

    /// Releases the underlying Mutex even though it was not acquired last.
    /// Only used after an Unlock-Violation was reported from a Drop, so the
    /// Lock itself is not leaked.
    ///
    /// The Level is removed from the held Levels of the current Thread, while
    /// the Locks acquired after it stay in place and can still be released
    /// in Order.
    ///
    /// # Safety
    /// The current Thread must hold this Mutex
    pub(crate) unsafe fn release_unchecked(&self) {
        HELD_LEVELS.with(|held| held.borrow_mut().retain(|level| *level != self.level));

        unsafe { self.inner.unlock() };
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn lock_unlock_restores_level() {
        let mutex = RawHierarchicalMutex::new(10);

        assert_eq!(UNRESTRICTED, thread_level());
        mutex.lock().unwrap();
        assert_eq!(10, thread_level());
        assert_eq!(true, mutex.is_locked());

        unsafe { mutex.unlock() }.unwrap();
        assert_eq!(UNRESTRICTED, thread_level());
        assert_eq!(false, mutex.is_locked());
    }

    #[test]
    fn descending_levels() {
        let high = RawHierarchicalMutex::new(100);
        let low = RawHierarchicalMutex::new(10);

        high.lock().unwrap();
        low.lock().unwrap();
        assert_eq!(10, thread_level());

        unsafe { low.unlock() }.unwrap();
        assert_eq!(100, thread_level());
        unsafe { high.unlock() }.unwrap();
        assert_eq!(UNRESTRICTED, thread_level());
    }

    #[test]
    fn ascending_level_is_rejected() {
        let five = RawHierarchicalMutex::new(5);
        let ten = RawHierarchicalMutex::new(10);

        five.lock().unwrap();
        assert_eq!(
            Err(HierarchyError::LockOrderViolation {
                requested: 10,
                held: 5
            }),
            ten.lock()
        );
        // The failed attempt neither locked the Mutex nor changed the Level
        assert_eq!(false, ten.is_locked());
        assert_eq!(5, thread_level());

        unsafe { five.unlock() }.unwrap();
    }

    #[test]
    fn equal_level_is_rejected() {
        let first = RawHierarchicalMutex::new(10);
        let second = RawHierarchicalMutex::new(10);

        first.lock().unwrap();
        assert_eq!(
            Err(HierarchyError::LockOrderViolation {
                requested: 10,
                held: 10
            }),
            second.lock()
        );

        unsafe { first.unlock() }.unwrap();
    }

    #[test]
    fn relock_same_mutex_is_rejected() {
        let mutex = RawHierarchicalMutex::new(10);

        mutex.lock().unwrap();
        assert!(mutex.lock().is_err());
        assert!(mutex.try_lock().is_err());

        unsafe { mutex.unlock() }.unwrap();
    }

    #[test]
    fn unlock_out_of_order() {
        let high = RawHierarchicalMutex::new(100);
        let low = RawHierarchicalMutex::new(10);

        high.lock().unwrap();
        low.lock().unwrap();

        assert_eq!(
            Err(HierarchyError::UnlockOrderViolation {
                releasing: 100,
                held: 10
            }),
            unsafe { high.unlock() }
        );
        // Nothing changed, so releasing in the right Order still works
        assert_eq!(true, high.is_locked());
        assert_eq!(10, thread_level());

        unsafe { low.unlock() }.unwrap();
        unsafe { high.unlock() }.unwrap();
        assert_eq!(UNRESTRICTED, thread_level());
    }

    #[test]
    fn try_lock_busy_keeps_level() {
        let mutex = std::sync::Arc::new(RawHierarchicalMutex::new(10));

        mutex.lock().unwrap();

        let c_mutex = mutex.clone();
        std::thread::spawn(move || {
            assert_eq!(Ok(false), c_mutex.try_lock());
            assert_eq!(UNRESTRICTED, thread_level());
        })
        .join()
        .unwrap();

        unsafe { mutex.unlock() }.unwrap();
    }

    #[test]
    fn levels_are_per_thread() {
        let mutex = RawHierarchicalMutex::new(10);
        mutex.lock().unwrap();

        std::thread::spawn(|| {
            assert_eq!(UNRESTRICTED, thread_level());
            let other = RawHierarchicalMutex::new(50);
            other.lock().unwrap();
            assert_eq!(50, thread_level());
            unsafe { other.unlock() }.unwrap();
        })
        .join()
        .unwrap();

        assert_eq!(10, thread_level());
        unsafe { mutex.unlock() }.unwrap();
    }

    #[test]
    fn forced_release_repairs_levels() {
        let high = RawHierarchicalMutex::new(100);
        let middle = RawHierarchicalMutex::new(50);
        let low = RawHierarchicalMutex::new(10);

        high.lock().unwrap();
        middle.lock().unwrap();
        low.lock().unwrap();

        unsafe { middle.release_unchecked() };
        assert_eq!(false, middle.is_locked());
        assert_eq!(10, thread_level());

        unsafe { low.unlock() }.unwrap();
        assert_eq!(100, thread_level());
        unsafe { high.unlock() }.unwrap();
        assert_eq!(UNRESTRICTED, thread_level());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "can not use the UNRESTRICTED level")]
    fn unrestricted_level_is_rejected() {
        let _mutex = RawHierarchicalMutex::new(UNRESTRICTED);
    }

    #[test]
    fn error_messages() {
        let err = HierarchyError::LockOrderViolation {
            requested: 10,
            held: 5,
        };
        assert_eq!(
            "lock hierarchy violated: acquiring level 10 while holding level 5",
            err.to_string()
        );

        let try_err = TryLockError::from(err);
        assert_eq!(err.to_string(), try_err.to_string());
        assert!(std::error::Error::source(&try_err).is_some());
        assert!(std::error::Error::source(&TryLockError::WouldBlock).is_none());
    }
}
