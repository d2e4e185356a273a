use super::RawHierarchicalMutex;

/// A raw Hierarchical Mutex with its Level fixed at compile time, which
/// implements [`lock_api::RawMutex`] and can therefore be plugged into any
/// Code that is generic over raw Mutexes.
///
/// # Panics
/// The `lock_api` Interface has no way to report Errors, so every Violation
/// of the Hierarchy panics with the corresponding
/// [`HierarchyError`](super::HierarchyError) message. Releasing out of Order
/// still unlocks the Mutex before panicking.
pub struct RawLevelMutex<const LEVEL: u64> {
    raw: RawHierarchicalMutex,
}

impl<const LEVEL: u64> std::fmt::Debug for RawLevelMutex<LEVEL> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawLevelMutex<{}> ()", LEVEL)
    }
}

unsafe impl<const LEVEL: u64> lock_api::RawMutex for RawLevelMutex<LEVEL> {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self {
        raw: RawHierarchicalMutex::new(LEVEL),
    };

    type GuardMarker = lock_api::GuardNoSend;

    fn lock(&self) {
        if let Err(err) = self.raw.lock() {
            panic!("{}", err);
        }
    }

    fn try_lock(&self) -> bool {
        match self.raw.try_lock() {
            Ok(acquired) => acquired,
            Err(err) => panic!("{}", err),
        }
    }

    unsafe fn unlock(&self) {
        // # Safety:
        // The lock_api contract guarantees that the current Thread holds the
        // Lock when calling unlock
        if let Err(err) = unsafe { self.raw.unlock() } {
            unsafe { self.raw.release_unchecked() };

            if !std::thread::panicking() {
                panic!("{}", err);
            }
        }
    }

    fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }
}

/// A [`lock_api::Mutex`] that enforces the Lock-Hierarchy with the given
/// compile-time Level
///
/// # Example
/// ```
/// use lockstep::hierarchy::LevelMutex;
///
/// let config: LevelMutex<Vec<u8>, 1000> = LevelMutex::new(vec![1, 2, 3]);
/// let cache: LevelMutex<Vec<u8>, 10> = LevelMutex::new(Vec::new());
///
/// let config_guard = config.lock();
/// cache.lock().extend(config_guard.iter());
/// assert_eq!(3, cache.lock().len());
/// ```
pub type LevelMutex<T, const LEVEL: u64> = lock_api::Mutex<RawLevelMutex<LEVEL>, T>;

/// The Guard for a locked [`LevelMutex`]
pub type LevelMutexGuard<'a, T, const LEVEL: u64> =
    lock_api::MutexGuard<'a, RawLevelMutex<LEVEL>, T>;
