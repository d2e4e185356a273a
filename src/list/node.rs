use crate::sync::{self, Mutex, MutexGuard};

/// A single Node in the List, the Lock protects the Value as well as the
/// Link to the following Node
pub(super) type Node<T> = Mutex<Entry<T>>;

/// The Data of a Node
pub(super) struct Entry<T> {
    pub value: T,
    /// The Ptr to the following Node, owned by this Entry. Null if this is
    /// the last Node in the List
    pub next: *mut Node<T>,
}

impl<T> Entry<T> {
    /// Allocates a new unlinked Node for the given Value
    pub fn alloc(value: T) -> *mut Node<T> {
        Box::into_raw(Box::new(Mutex::new(Self {
            value,
            next: std::ptr::null_mut(),
        })))
    }

    /// Frees the given Node and returns its Entry
    ///
    /// # Safety
    /// The Node must have been allocated using [`Entry::alloc`], must not be
    /// reachable from the List anymore and no one else can hold its Lock
    pub unsafe fn free(node: *mut Node<T>) -> Self {
        let boxed = unsafe { Box::from_raw(node) };
        sync::into_inner(*boxed)
    }
}

/// The Position of a Thread while walking the List, holding the Lock of
/// either the Head-Sentinel or an actual Node
pub(super) enum Cursor<'a, T> {
    Head(MutexGuard<'a, *mut Node<T>>),
    Node(MutexGuard<'a, Entry<T>>),
}

impl<'a, T> Cursor<'a, T> {
    /// Starts a new Walk by locking the Head-Sentinel
    pub fn head(head: &'a Mutex<*mut Node<T>>) -> Self {
        Self::Head(sync::lock(head))
    }

    /// The Link to the Node following the current Position
    pub fn next_mut(&mut self) -> &mut *mut Node<T> {
        match self {
            Self::Head(link) => &mut **link,
            Self::Node(entry) => &mut entry.next,
        }
    }

    /// Locks the Node following the current Position, while still holding
    /// the Lock for the current Position
    pub fn lock_next(&self) -> Option<MutexGuard<'a, Entry<T>>> {
        let next_ptr = match self {
            Self::Head(link) => **link,
            Self::Node(entry) => entry.next,
        };
        if next_ptr.is_null() {
            return None;
        }

        // # Safety:
        // A Node is only unlinked and freed by a Thread that holds the Lock
        // of its Predecessor as well as its own Lock. We hold the Lock of the
        // Predecessor right now, so the Node is still alive while we acquire
        // its Lock and once we hold that, it can not be freed until we
        // release it again. The returned Guard is the only thing borrowing
        // the Node, so the Reference does not outlive the Lock
        let next: &'a Node<T> = unsafe { &*next_ptr };
        Some(sync::lock(next))
    }

    /// Moves the Cursor to the following Node, hand-over-hand.
    ///
    /// The Lock of the following Node is acquired before the Lock of the
    /// current Position is released.
    ///
    /// # Returns
    /// A mutable Reference to the Value of the new Position or `None` if the
    /// end of the List was reached, the Cursor is not moved in that case
    pub fn advance(&mut self) -> Option<&mut T> {
        let next = self.lock_next()?;
        *self = Self::Node(next);

        match self {
            Self::Node(entry) => Some(&mut entry.value),
            Self::Head(_) => None,
        }
    }
}
