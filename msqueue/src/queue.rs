use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::Ordering;

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use crossbeam_utils::{Backoff, CachePadded};

use crate::node::Node;

/// An unbounded multi-producer multi-consumer FIFO queue.
///
/// Both ends are updated with compare-and-swap only; no operation ever takes
/// a lock. The chain always starts with a sentinel node whose value has been
/// consumed, so the first item in the queue lives in `head.next`.
///
/// `tail` points at the last node or lags one link behind it. Any thread
/// that observes a lagging `tail` moves it forward before going on, so a
/// thread suspended between linking its node and advancing `tail` never
/// holds up anyone else.
///
/// Detached nodes are reclaimed through [`crossbeam_epoch`]: they are freed
/// only after every thread that could still be reading them has unpinned.
pub struct ConcurrentQueue<T> {
    head: CachePadded<Atomic<Node<T>>>,
    tail: CachePadded<Atomic<Node<T>>>,
    marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for ConcurrentQueue<T> {}
unsafe impl<T: Send> Sync for ConcurrentQueue<T> {}

impl<T> ConcurrentQueue<T> {
    pub fn new() -> Self {
        let queue = Self {
            head: CachePadded::new(Atomic::null()),
            tail: CachePadded::new(Atomic::null()),
            marker: PhantomData,
        };
        // SAFETY: The queue is not shared with any other thread yet.
        unsafe {
            let guard = epoch::unprotected();
            let sentinel = Owned::new(Node::sentinel()).into_shared(guard);
            queue.head.store(sentinel, Ordering::Relaxed);
            queue.tail.store(sentinel, Ordering::Relaxed);
        }
        queue
    }

    /// Appends `item` to the back of the queue.
    pub fn enqueue(&self, item: T) {
        self.enqueue_with(item, || {});
    }

    /// Appends `item`, invoking `linked` right after the node is linked and
    /// before `tail` is advanced past it.
    pub(crate) fn enqueue_with(&self, item: T, linked: impl FnOnce()) {
        let guard = &epoch::pin();
        let backoff = Backoff::new();
        let mut new = Owned::new(Node::new(item));
        loop {
            let tail = self.tail.load(Ordering::Acquire, guard);
            // SAFETY: `tail` is never null and cannot be freed while pinned.
            let tail_ref = unsafe { tail.deref() };
            let next = tail_ref.next.load(Ordering::Acquire, guard);

            if tail != self.tail.load(Ordering::Acquire, guard) {
                backoff.spin();
                continue;
            }

            if next.is_null() {
                match tail_ref.next.compare_exchange(
                    Shared::null(),
                    new,
                    Ordering::Release,
                    Ordering::Relaxed,
                    guard,
                ) {
                    Ok(new) => {
                        linked();
                        // Failure means another thread has already helped us.
                        _ = self.tail.compare_exchange(
                            tail,
                            new,
                            Ordering::Release,
                            Ordering::Relaxed,
                            guard,
                        );
                        return;
                    },
                    // Lost the race to another enqueuer, take the node back.
                    Err(e) => new = e.new,
                }
            } else {
                // Another enqueuer has linked its node but not moved `tail`
                // yet, finish that for it.
                _ = self.tail.compare_exchange(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    guard,
                );
            }
            backoff.spin();
        }
    }

    /// Removes the item at the front of the queue, or returns `None` if the
    /// queue is empty.
    pub fn dequeue(&self) -> Option<T> {
        self.dequeue_in(&epoch::pin())
    }

    fn dequeue_in(&self, guard: &Guard) -> Option<T> {
        let backoff = Backoff::new();
        loop {
            let head = self.head.load(Ordering::Acquire, guard);
            // `tail` must be read before `next`, so that `head != tail`
            // guarantees a successor.
            let tail = self.tail.load(Ordering::Acquire, guard);
            // SAFETY: `head` is never null and cannot be freed while pinned.
            let next = unsafe { head.deref() }.next.load(Ordering::Acquire, guard);

            if head != self.head.load(Ordering::Acquire, guard) {
                backoff.spin();
                continue;
            }

            if head == tail {
                if next.is_null() {
                    return None;
                }
                // `tail` is lagging behind.
                _ = self.tail.compare_exchange(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    guard,
                );
            } else if !next.is_null()
                && self
                    .head
                    .compare_exchange(head, next, Ordering::Release, Ordering::Relaxed, guard)
                    .is_ok()
            {
                // SAFETY: We won the CAS, so `next` is now the sentinel and its
                // value is ours alone. The old sentinel is unreachable from
                // both `head` and `tail` (`tail` never falls behind `head`).
                unsafe {
                    guard.defer_destroy(head);
                    return Some(next.deref().take_value());
                }
            }
            backoff.spin();
        }
    }

    /// Returns `true` if the queue was observed empty.
    ///
    /// The answer may be stale by the time it is returned when other threads
    /// are operating on the queue.
    pub fn is_empty(&self) -> bool {
        let guard = &epoch::pin();
        let head = self.head.load(Ordering::Acquire, guard);
        // SAFETY: `head` is never null and cannot be freed while pinned.
        unsafe { head.deref() }
            .next
            .load(Ordering::Acquire, guard)
            .is_null()
    }

    /// Returns an iterator that dequeues items until the queue is observed
    /// empty.
    pub fn try_iter(&self) -> TryIter<'_, T> {
        TryIter { queue: self }
    }
}

impl<T> Default for ConcurrentQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for ConcurrentQueue<T> {
    fn drop(&mut self) {
        // SAFETY: Being dropped, the queue is no longer shared, so detached
        // nodes can be freed right away.
        unsafe {
            let guard = epoch::unprotected();
            while self.dequeue_in(guard).is_some() {}
            let sentinel = self.head.load(Ordering::Relaxed, guard);
            drop(sentinel.into_owned());
        }
    }
}

impl<T> fmt::Debug for ConcurrentQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentQueue").finish_non_exhaustive()
    }
}

impl<T> FromIterator<T> for ConcurrentQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let queue = Self::new();
        for item in iter {
            queue.enqueue(item);
        }
        queue
    }
}

impl<T> Extend<T> for ConcurrentQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        iter.into_iter().for_each(|item| self.enqueue(item));
    }
}

impl<T> Extend<T> for &ConcurrentQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        iter.into_iter().for_each(|item| self.enqueue(item));
    }
}

/// Iterator returned by [`ConcurrentQueue::try_iter`].
#[derive(Debug)]
pub struct TryIter<'a, T> {
    queue: &'a ConcurrentQueue<T>,
}

impl<T> Iterator for TryIter<'_, T> {
    type Item = T;
    fn next(&mut self) -> Option<T> {
        self.queue.dequeue()
    }
}
