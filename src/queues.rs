//! # Thread-Safe Queue
//! An unbounded FIFO-Queue with separate Locks for its Head and Tail.
//!
//! # How it works
//! The Queue always contains one empty Dummy-Node at its Tail. Pushing
//! writes the Value into the current Dummy, appends a new Dummy and only
//! needs the Tail-Lock. Popping only needs the Head-Lock and briefly the
//! Tail-Lock to check if the Head has caught up with the Tail. Producers and
//! Consumers therefore only contend with each other when the Queue is empty.
//!
//! # Example
//! ```
//! use std::{sync::Arc, thread};
//! use lockstep::queues::ThreadSafeQueue;
//!
//! let queue = Arc::new(ThreadSafeQueue::new());
//!
//! let consumer = {
//!     let queue = queue.clone();
//!     thread::spawn(move || queue.wait_and_pop())
//! };
//! queue.push(13);
//!
//! assert_eq!(13, consumer.join().unwrap());
//! assert_eq!(None, queue.try_pop());
//! ```

use std::{fmt::Debug, mem::MaybeUninit};

use crate::sync::{self, Condvar, Mutex, MutexGuard};

struct Node<T> {
    /// Only initialized once the Node is no longer the Dummy at the Tail
    data: MaybeUninit<T>,
    next: *mut Node<T>,
}

impl<T> Node<T> {
    fn dummy() -> *mut Self {
        Box::into_raw(Box::new(Self {
            data: MaybeUninit::uninit(),
            next: std::ptr::null_mut(),
        }))
    }
}

/// An unbounded Multi-Producer Multi-Consumer FIFO-Queue
pub struct ThreadSafeQueue<T> {
    head: Mutex<*mut Node<T>>,
    tail: Mutex<*mut Node<T>>,
    /// Signaled after every push, waited on while holding the Head-Lock
    data_cond: Condvar,
}

// # Safety:
// Every Node is only accessed while holding either the Head- or the
// Tail-Lock and every Value is moved out by exactly one Consumer
unsafe impl<T: Send> Send for ThreadSafeQueue<T> {}
unsafe impl<T: Send> Sync for ThreadSafeQueue<T> {}

impl<T> ThreadSafeQueue<T> {
    /// Creates a new empty Queue
    pub fn new() -> Self {
        let dummy = Node::dummy();

        Self {
            head: Mutex::new(dummy),
            tail: Mutex::new(dummy),
            data_cond: Condvar::new(),
        }
    }

    /// Appends the Value at the End of the Queue and wakes up one waiting
    /// Consumer
    pub fn push(&self, value: T) {
        let new_dummy = Node::dummy();

        {
            let mut tail = sync::lock(&self.tail);
            // # Safety:
            // The Dummy at the Tail is only ever touched while holding the
            // Tail-Lock, Consumers never go past the Tail
            let old_tail = unsafe { &mut **tail };
            old_tail.data = MaybeUninit::new(value);
            old_tail.next = new_dummy;

            *tail = new_dummy;
        }

        // A Consumer checks for Data while holding the Head-Lock and only
        // releases it once it waits on the Condvar. Acquiring it here makes
        // sure that no Consumer is in between those two Steps, which would
        // otherwise miss the Notification
        drop(sync::lock(&self.head));
        self.data_cond.notify_one();
    }

    /// Attempts to pop the Value at the Front of the Queue.
    ///
    /// # Returns
    /// The oldest Value in the Queue or `None` if the Queue is empty, this
    /// never waits for new Values to arrive
    pub fn try_pop(&self) -> Option<T> {
        let mut head = sync::lock(&self.head);
        if *head == self.tail() {
            return None;
        }

        // # Safety:
        // The Head is not the Tail
        Some(unsafe { Self::pop_head(&mut head) })
    }

    /// Pops the Value at the Front of the Queue, blocking the current Thread
    /// until a Value is available
    pub fn wait_and_pop(&self) -> T {
        let mut head = sync::lock(&self.head);
        while *head == self.tail() {
            head = sync::wait(&self.data_cond, head);
        }

        // # Safety:
        // The Head is not the Tail
        unsafe { Self::pop_head(&mut head) }
    }

    /// Checks if the Queue is currently empty
    pub fn is_empty(&self) -> bool {
        let head = sync::lock(&self.head);
        *head == self.tail()
    }

    /// Loads the current Tail, only holding the Tail-Lock for the Load itself
    fn tail(&self) -> *mut Node<T> {
        *sync::lock(&self.tail)
    }

    /// Unlinks the Node at the Head and returns its Value
    ///
    /// # Safety
    /// The Head must not be the Tail, which means that the Node was fully
    /// written by a Producer and is only reachable through the Head
    unsafe fn pop_head(head: &mut MutexGuard<'_, *mut Node<T>>) -> T {
        let old_head = unsafe { Box::from_raw(**head) };
        **head = old_head.next;

        unsafe { old_head.data.assume_init_read() }
    }
}

impl<T> Default for ThreadSafeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for ThreadSafeQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ThreadSafeQueue ()")
    }
}

impl<T> Drop for ThreadSafeQueue<T> {
    fn drop(&mut self) {
        let tail = self.tail();
        let mut current = *sync::lock(&self.head);

        while current != tail {
            // # Safety:
            // We have exclusive access and every Node before the Tail holds
            // an initialized Value
            let mut node = unsafe { Box::from_raw(current) };
            unsafe { node.data.assume_init_drop() };

            current = node.next;
        }

        // # Safety:
        // The Dummy at the Tail never holds a Value
        drop(unsafe { Box::from_raw(tail) });
    }
}
