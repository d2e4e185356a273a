//! # Lock-Free Stack
//! An unbounded Treiber-Stack with counter-based Memory-Reclamation.
//!
//! # Reclamation
//! A popped Node can not be freed right away, as other Threads in `pop` may
//! have loaded it as the Head and still read its `next` Ptr. The Stack
//! therefore counts the Threads currently in `pop`:
//! * If the popping Thread is the only one, it frees its Node immediately
//!   and also claims the List of Nodes pending reclamation. That List is
//!   freed if no other Thread entered `pop` in the meantime and otherwise put
//!   back.
//! * If other Threads are in `pop`, the Node is added to the pending List
//!   instead.
//!
//! Nodes are never freed while a Thread could still reference them, so the
//! CAS on the Head also can not suffer from the ABA-Problem.
//!
//! # Limitations
//! Under sustained contention there may never be a moment with only a single
//! Thread in `pop` and the pending List grows without bound.
//! [`LockFreeStack::pending_reclamation`] exposes its current size.
//!
//! # Example
//! ```
//! use lockstep::stack::LockFreeStack;
//!
//! let stack = LockFreeStack::new();
//! stack.push(1);
//! stack.push(2);
//!
//! assert_eq!(Some(2), stack.pop());
//! assert_eq!(Some(1), stack.pop());
//! assert_eq!(None, stack.pop());
//! ```

mod node;
use node::Node;

use std::fmt::Debug;

use crate::sync::atomic;

/// A Lock-Free, unbounded LIFO-Stack
pub struct LockFreeStack<T> {
    head: atomic::AtomicPtr<Node<T>>,
    /// The Number of Threads currently in `pop`
    threads_in_pop: atomic::AtomicUsize,
    /// The List of popped Nodes waiting to be freed
    to_be_deleted: atomic::AtomicPtr<Node<T>>,
    /// The Number of Nodes in `to_be_deleted`
    pending: atomic::AtomicUsize,
}

// # Safety:
// The Values are only ever moved in and out of the Stack as a whole and
// every Value is handed to exactly one Thread, so the Stack can be shared as
// long as the Values can be sent between Threads
unsafe impl<T: Send> Send for LockFreeStack<T> {}
unsafe impl<T: Send> Sync for LockFreeStack<T> {}

impl<T> LockFreeStack<T> {
    /// Creates a new empty Stack
    pub fn new() -> Self {
        Self {
            head: atomic::AtomicPtr::new(std::ptr::null_mut()),
            threads_in_pop: atomic::AtomicUsize::new(0),
            to_be_deleted: atomic::AtomicPtr::new(std::ptr::null_mut()),
            pending: atomic::AtomicUsize::new(0),
        }
    }

    /// Pushes the Value onto the Top of the Stack
    pub fn push(&self, data: T) {
        let node_ptr = Node::alloc(data);
        // # Safety:
        // The Node was just allocated and is only visible to us until the
        // CAS succeeds
        let node = unsafe { &*node_ptr };

        let mut head = self.head.load(atomic::Ordering::SeqCst);
        loop {
            node.next.store(head, atomic::Ordering::SeqCst);

            match self.head.compare_exchange_weak(
                head,
                node_ptr,
                atomic::Ordering::SeqCst,
                atomic::Ordering::SeqCst,
            ) {
                Ok(_) => return,
                Err(current) => head = current,
            }
        }
    }

    /// Attempts to pop the Value from the Top of the Stack.
    ///
    /// # Returns
    /// The Value that was pushed last or `None` if the Stack is empty, this
    /// never blocks
    pub fn pop(&self) -> Option<T> {
        self.threads_in_pop.fetch_add(1, atomic::Ordering::SeqCst);

        let mut old_head = self.head.load(atomic::Ordering::SeqCst);
        while !old_head.is_null() {
            // # Safety:
            // We are counted in `threads_in_pop`, so no Node that was the
            // Head after we entered can be freed until we leave again
            let next = unsafe { &*old_head }.next.load(atomic::Ordering::SeqCst);

            match self.head.compare_exchange_weak(
                old_head,
                next,
                atomic::Ordering::SeqCst,
                atomic::Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(current) => old_head = current,
            }
        }

        let result = if old_head.is_null() {
            None
        } else {
            // # Safety:
            // We won the CAS, so we are the only Thread that unlinked this
            // Node and therefore the only one taking its Value
            Some(unsafe { Node::take(old_head) })
        };

        self.try_reclaim(old_head);
        result
    }

    /// Checks if the Stack is currently empty
    pub fn is_empty(&self) -> bool {
        self.head.load(atomic::Ordering::SeqCst).is_null()
    }

    /// The Number of popped Nodes that are still waiting to be freed
    pub fn pending_reclamation(&self) -> usize {
        self.pending.load(atomic::Ordering::SeqCst)
    }

    /// Frees or defers the Node popped by the current Thread (if any) and
    /// leaves `pop`
    fn try_reclaim(&self, old_head: *mut Node<T>) {
        if self.threads_in_pop.load(atomic::Ordering::SeqCst) != 1 {
            if !old_head.is_null() {
                self.chain_pending_node(old_head);
            }
            self.threads_in_pop.fetch_sub(1, atomic::Ordering::SeqCst);
            return;
        }

        let nodes_to_delete = self
            .to_be_deleted
            .swap(std::ptr::null_mut(), atomic::Ordering::SeqCst);

        if self.threads_in_pop.fetch_sub(1, atomic::Ordering::SeqCst) == 1 {
            // # Safety:
            // No other Thread was in `pop` when we claimed the List, so none
            // of them can reference a Node in it
            unsafe { self.delete_nodes(nodes_to_delete) };
        } else if !nodes_to_delete.is_null() {
            self.chain_pending_nodes(nodes_to_delete);
        }

        if !old_head.is_null() {
            // # Safety:
            // We were the only Thread in `pop` after unlinking the Node, so no
            // one else could have loaded it
            unsafe { Node::free(old_head) };
        }
    }

    /// Puts a whole claimed List back onto the pending List
    fn chain_pending_nodes(&self, nodes: *mut Node<T>) {
        let mut last = nodes;
        loop {
            // # Safety:
            // The claimed List is only owned by the current Thread
            let next = unsafe { &*last }.next.load(atomic::Ordering::SeqCst);
            if next.is_null() {
                break;
            }
            last = next;
        }

        self.chain_pending_range(nodes, last);
    }

    /// Adds a single Node to the pending List
    fn chain_pending_node(&self, node: *mut Node<T>) {
        let pending = self.pending.fetch_add(1, atomic::Ordering::SeqCst) + 1;
        tracing::trace!(pending, "deferring reclamation of popped node");

        self.chain_pending_range(node, node);
    }

    fn chain_pending_range(&self, first: *mut Node<T>, last: *mut Node<T>) {
        // # Safety:
        // The Nodes between first and last are owned by the current Thread
        // until the CAS publishes them
        let last = unsafe { &*last };

        let mut current = self.to_be_deleted.load(atomic::Ordering::SeqCst);
        loop {
            last.next.store(current, atomic::Ordering::SeqCst);

            match self.to_be_deleted.compare_exchange_weak(
                current,
                first,
                atomic::Ordering::SeqCst,
                atomic::Ordering::SeqCst,
            ) {
                Ok(_) => return,
                Err(n_current) => current = n_current,
            }
        }
    }

    /// Frees every Node in the given List, without dropping their Values
    ///
    /// # Safety
    /// No other Thread may reference any of the Nodes
    unsafe fn delete_nodes(&self, mut nodes: *mut Node<T>) {
        let mut count = 0;
        while !nodes.is_null() {
            let next = unsafe { &*nodes }.next.load(atomic::Ordering::SeqCst);
            unsafe { Node::free(nodes) };

            nodes = next;
            count += 1;
        }

        if count > 0 {
            self.pending.fetch_sub(count, atomic::Ordering::SeqCst);
            tracing::debug!(freed = count, "reclaimed pending nodes");
        }
    }
}

impl<T> Default for LockFreeStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for LockFreeStack<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LockFreeStack (pending: {})",
            self.pending_reclamation()
        )
    }
}

impl<T> Drop for LockFreeStack<T> {
    fn drop(&mut self) {
        let mut current = self.head.load(atomic::Ordering::SeqCst);
        while !current.is_null() {
            // # Safety:
            // We have exclusive access to the Stack and all the Nodes still on
            // it hold a Value that was never taken out
            let next = unsafe { &*current }.next.load(atomic::Ordering::SeqCst);
            unsafe { Node::drop_with_data(current) };

            current = next;
        }

        let pending = self
            .to_be_deleted
            .swap(std::ptr::null_mut(), atomic::Ordering::SeqCst);
        // # Safety:
        // No Thread can be in `pop` anymore
        unsafe { self.delete_nodes(pending) };
    }
}
