//! Switches the synchronization primitives between `std` and `loom`, so the
//! same Datastructures can be model-checked with `RUSTFLAGS="--cfg loom"`

#[cfg(loom)]
pub(crate) use loom::sync::{atomic, Condvar, Mutex, MutexGuard};

#[cfg(not(loom))]
pub(crate) use std::sync::{atomic, Condvar, Mutex, MutexGuard};

use std::sync::PoisonError;

/// Locks the given Mutex, ignoring any poisoning.
///
/// User code (predicates, functions) only ever runs while the Links between
/// the Nodes are in a consistent State, so a panic in it can not leave the
/// Datastructure torn and the Data behind a poisoned Lock is still usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Consumes the given Mutex and returns its Data, ignoring any poisoning
pub(crate) fn into_inner<T>(mutex: Mutex<T>) -> T {
    mutex.into_inner().unwrap_or_else(PoisonError::into_inner)
}

/// Blocks on the Condvar until notified, ignoring any poisoning of the
/// associated Mutex
pub(crate) fn wait<'a, T>(condvar: &Condvar, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
}
