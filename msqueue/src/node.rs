use std::mem::MaybeUninit;

use crossbeam_epoch::Atomic;

/// A link of the queue's chain.
///
/// The value is left uninitialized for the sentinel. Dropping a [`Node`] never
/// drops its value, which is moved out exactly once by [`take_value`].
///
/// [`take_value`]: Node::take_value
pub(crate) struct Node<T> {
    value: MaybeUninit<T>,
    pub(crate) next: Atomic<Node<T>>,
}

impl<T> Node<T> {
    pub(crate) fn sentinel() -> Self {
        Self {
            value: MaybeUninit::uninit(),
            next: Atomic::null(),
        }
    }

    pub(crate) fn new(value: T) -> Self {
        Self {
            value: MaybeUninit::new(value),
            next: Atomic::null(),
        }
    }

    /// # Safety
    ///
    /// This node must hold an initialized value, and the caller must be the
    /// only one to ever take it, i.e. the winner of the CAS that turned this
    /// node into the new sentinel.
    pub(crate) unsafe fn take_value(&self) -> T {
        unsafe { self.value.assume_init_read() }
    }
}
