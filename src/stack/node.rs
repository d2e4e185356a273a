use std::mem::ManuallyDrop;

use crate::sync::atomic;

/// A single Node in the Stack
pub(super) struct Node<T> {
    /// The Value is only ever moved out by the Thread that unlinked the Node
    /// from the Stack, so freeing a Node never drops it
    pub data: ManuallyDrop<T>,
    /// The following Node, either on the Stack itself or, once the Node has
    /// been popped, in the List of Nodes pending reclamation
    pub next: atomic::AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    /// Allocates a new Node for the given Value
    pub fn alloc(data: T) -> *mut Self {
        Box::into_raw(Box::new(Self {
            data: ManuallyDrop::new(data),
            next: atomic::AtomicPtr::new(std::ptr::null_mut()),
        }))
    }

    /// Moves the Value out of the Node
    ///
    /// # Safety
    /// The Caller must be the only one to ever take the Value out of this
    /// Node and the Node must still be allocated
    pub unsafe fn take(node: *mut Self) -> T {
        unsafe { std::ptr::read(&*(*node).data) }
    }

    /// Frees the Node without dropping its Value
    ///
    /// # Safety
    /// The Node must have been allocated using [`Node::alloc`] and no other
    /// Thread may still hold a Reference to it
    pub unsafe fn free(node: *mut Self) {
        drop(unsafe { Box::from_raw(node) });
    }

    /// Drops the Value stored in the Node and then frees the Node itself
    ///
    /// # Safety
    /// Same as [`Node::free`] and the Value must not have been taken out yet
    pub unsafe fn drop_with_data(node: *mut Self) {
        let mut boxed = unsafe { Box::from_raw(node) };
        unsafe { ManuallyDrop::drop(&mut boxed.data) };
    }
}
