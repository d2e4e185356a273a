#![deny(missing_docs)]
#![warn(rust_2018_idioms, missing_debug_implementations)]
//! This crate provides a set of Lock-Based and Lock-Free concurrent
//! Datastructures, as well as a Mutex that detects wrong Lock-Orders
//!
//! # Feature-Flags
//! * `hierarchy`: Enables the Hierarchical Mutexes
//! * `list`: Enables the Fine-Grained List
//! * `stack`: Enables the Lock-Free Stack
//! * `queues`: Enables the Thread-Safe Queue
//! * `full`: Enables all the Feature-Flags
//!
//! # Testing
//! All the Datastructures, except for the Hierarchical Mutexes, can be
//! model-checked using [loom](https://docs.rs/loom) by building with
//! `RUSTFLAGS="--cfg loom"`

#[allow(dead_code, unused_imports)]
mod sync;

#[cfg(feature = "hierarchy")]
pub mod hierarchy;
#[cfg(feature = "list")]
pub mod list;
#[cfg(feature = "queues")]
pub mod queues;
#[cfg(feature = "stack")]
pub mod stack;
