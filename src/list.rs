//! # Fine-Grained List
//! A singly linked List where every Node carries its own Lock.
//!
//! # How it works
//! The List starts with a Head-Sentinel, that does not hold a Value and is
//! never removed. Every Operation starts by locking the Sentinel and then
//! walks the List hand-over-hand: the Lock of the next Node is always
//! acquired before the Lock of the current one is released. This means that
//! Operations working on different Parts of the List can run in parallel and
//! only serialize on the Nodes they actually share, while no Thread can ever
//! overtake another one or observe a Node in the middle of being unlinked.
//!
//! A Thread only ever holds at most two adjacent Locks and always acquires
//! them front to back, so the Operations can not deadlock with each other.
//!
//! # Example
//! ```
//! use lockstep::list::FineGrainedList;
//!
//! let list = FineGrainedList::new();
//! list.push_front(3);
//! list.push_front(2);
//! list.push_front(1);
//!
//! assert_eq!(Some(2), list.find_first_if(|value| value % 2 == 0));
//! assert_eq!(Some(3), list.remove_first_if(|value| *value > 2));
//! assert_eq!(vec![1, 2], list.to_vec());
//! ```

mod node;
use node::{Cursor, Entry, Node};

use std::fmt::Debug;

use crate::sync::{self, Mutex};

/// A concurrent singly linked List with one Lock per Node
pub struct FineGrainedList<T> {
    /// The Head-Sentinel, holding the Link to the first actual Node
    head: Mutex<*mut Node<T>>,
}

// # Safety:
// All the Nodes are owned by the List and every access to them goes through
// their Locks, so the List behaves like a Collection of `Mutex<T>`, which is
// Send and Sync as long as T can be sent between Threads
unsafe impl<T: Send> Send for FineGrainedList<T> {}
unsafe impl<T: Send> Sync for FineGrainedList<T> {}

impl<T> FineGrainedList<T> {
    /// Creates a new empty List
    pub fn new() -> Self {
        Self {
            head: Mutex::new(std::ptr::null_mut()),
        }
    }

    /// Inserts the Value at the Front of the List.
    ///
    /// Only the Lock of the Head-Sentinel is needed for this and the Node is
    /// allocated before acquiring it.
    pub fn push_front(&self, value: T) {
        let node = Entry::alloc(value);

        let mut head = sync::lock(&self.head);
        // # Safety:
        // The Node was just allocated and is not reachable by anyone else yet
        sync::lock(unsafe { &*node }).next = *head;
        *head = node;
    }

    /// Calls the given Function for every Value in the List, front to back
    pub fn for_each<F>(&self, mut func: F)
    where
        F: FnMut(&T),
    {
        let mut cursor = Cursor::head(&self.head);
        while let Some(value) = cursor.advance() {
            func(value);
        }
    }

    /// Returns a Copy of the first Value matching the Predicate
    pub fn find_first_if<P>(&self, mut predicate: P) -> Option<T>
    where
        P: FnMut(&T) -> bool,
        T: Clone,
    {
        let mut cursor = Cursor::head(&self.head);
        while let Some(value) = cursor.advance() {
            if predicate(value) {
                return Some(value.clone());
            }
        }

        None
    }

    /// Updates the first Value matching the Predicate in place, while
    /// holding the Lock of its Node.
    ///
    /// # Returns
    /// Whether or not a matching Value was found
    pub fn update_first_if<P, F>(&self, mut predicate: P, update: F) -> bool
    where
        P: FnMut(&T) -> bool,
        F: FnOnce(&mut T),
    {
        let mut cursor = Cursor::head(&self.head);
        while let Some(value) = cursor.advance() {
            if predicate(value) {
                update(value);
                return true;
            }
        }

        false
    }

    /// Removes the first Value matching the Predicate from the List and
    /// returns it
    pub fn remove_first_if<P>(&self, mut predicate: P) -> Option<T>
    where
        P: FnMut(&T) -> bool,
    {
        let mut previous = Cursor::head(&self.head);
        loop {
            let current = previous.lock_next()?;
            if !predicate(&current.value) {
                previous = Cursor::Node(current);
                continue;
            }

            // Unlink the Node while holding both its Lock and the Lock of
            // its Predecessor
            let removed = std::mem::replace(previous.next_mut(), current.next);
            drop(current);
            drop(previous);

            // # Safety:
            // The Node is no longer reachable from the List and we released
            // its Lock while still holding the Lock of its Predecessor, so no
            // other Thread could have reached it in between
            let entry = unsafe { Entry::free(removed) };
            return Some(entry.value);
        }
    }

    /// Removes every Value matching the Predicate from the List in a single
    /// Pass
    ///
    /// # Returns
    /// The Number of removed Values
    pub fn remove_if<P>(&self, mut predicate: P) -> usize
    where
        P: FnMut(&T) -> bool,
    {
        let mut removed_count = 0;

        let mut previous = Cursor::head(&self.head);
        while let Some(current) = previous.lock_next() {
            if !predicate(&current.value) {
                previous = Cursor::Node(current);
                continue;
            }

            let removed = std::mem::replace(previous.next_mut(), current.next);
            drop(current);

            // # Safety:
            // Same as in `remove_first_if`, we still hold the Lock of the
            // Predecessor so no one else can reach the unlinked Node
            drop(unsafe { Entry::free(removed) });
            removed_count += 1;
        }

        removed_count
    }

    /// Copies every Value in the List into a Vec, front to back
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        let mut result = Vec::new();
        self.for_each(|value| result.push(value.clone()));
        result
    }

    /// Counts the Values in the List.
    ///
    /// The Result is only a Snapshot, as other Threads may modify Parts of
    /// the List that were already counted
    pub fn len(&self) -> usize {
        let mut count = 0;
        self.for_each(|_| count += 1);
        count
    }

    /// Checks if the List is currently empty
    pub fn is_empty(&self) -> bool {
        sync::lock(&self.head).is_null()
    }
}

impl<T> Default for FineGrainedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for FineGrainedList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FineGrainedList ()")
    }
}

impl<T> Drop for FineGrainedList<T> {
    fn drop(&mut self) {
        // Free the Nodes one by one, instead of recursively through the
        // Links, to not overflow the Stack for long Lists
        let mut current = *sync::lock(&self.head);
        while !current.is_null() {
            // # Safety:
            // We have exclusive access to the List, so every Node is only
            // reachable through its Predecessor
            let entry = unsafe { Entry::free(current) };
            current = entry.next;
        }
    }
}
