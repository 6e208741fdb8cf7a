//! turbo_wsq - Bounded lock-free Chase-Lev work-stealing deque
//!
//! - [`Worker::push`] / [`Worker::pop`] : owner-side operations on the bottom end (LIFO)
//! - [`Worker::try_push`] : non-blocking push that returns Err when full
//! - [`Stealer::steal`] : thief-side removal from the top end (FIFO)
//! - CAP must be > 0 and a power of two
//!
//! The owner end lives on a [`Worker`] handle, which is `Send` but neither
//! `Sync` nor `Clone`: exactly one thread at a time may push and pop, and the
//! handle may migrate between threads only through an ordinary ownership
//! transfer. Thieves hold cloneable [`Stealer`] handles and may steal from any
//! number of threads concurrently.

#![warn(missing_docs)]

use core::fmt;
use core::marker::PhantomData;
use core::mem::MaybeUninit;

#[cfg(loom)]
use loom::{
    cell::UnsafeCell,
    sync::{
        atomic::{fence, AtomicI64, Ordering},
        Arc,
    },
};
#[cfg(not(loom))]
use std::sync::{
    atomic::{fence, AtomicI64, Ordering},
    Arc,
};

#[cfg(not(loom))]
use crate::cell::UnsafeCell;

// loom's UnsafeCell has a slightly different API than the standard library
// UnsafeCell. Since the deque code should be agnostic to whether it runs
// under loom or not, this small wrapper provides the loom-supported API for
// the standard library UnsafeCell, as the loom documentation recommends:
// https://github.com/tokio-rs/loom#handling-loom-api-differences
#[cfg(not(loom))]
mod cell {
    #[derive(Debug)]
    #[repr(transparent)]
    pub(crate) struct UnsafeCell<T>(core::cell::UnsafeCell<T>);

    impl<T> UnsafeCell<T> {
        #[inline]
        pub(crate) fn new(data: T) -> UnsafeCell<T> {
            UnsafeCell(core::cell::UnsafeCell::new(data))
        }

        #[inline]
        pub(crate) fn with<R>(&self, f: impl FnOnce(*const T) -> R) -> R {
            f(self.0.get())
        }

        #[inline]
        pub(crate) fn with_mut<R>(&self, f: impl FnOnce(*mut T) -> R) -> R {
            f(self.0.get())
        }
    }
}

#[cfg(not(loom))]
use std::thread;
#[cfg(not(loom))]
use std::time::Duration;

/// Cache-line padded wrapper
#[repr(align(64))]
struct CachePadded<T> {
    value: T,
}
impl<T> CachePadded<T> {
    fn new(value: T) -> Self {
        CachePadded { value }
    }
}

/// Single slot in the ring buffer; holds a possibly-uninitialised item.
///
/// A slot is live while its logical index `i` satisfies `top <= i < bottom`;
/// all synchronisation is carried by the two counters, so the slot itself
/// needs no per-slot state.
struct Slot<T> {
    value: UnsafeCell<MaybeUninit<T>>,
}
impl<T> Slot<T> {
    fn new() -> Self {
        Slot {
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}
// Safety: slot access is serialised by the top/bottom protocol; T must be
// Send to move across threads.
unsafe impl<T: Send> Send for Slot<T> {}
unsafe impl<T: Send> Sync for Slot<T> {}

/// Error returned by [`Worker::try_push`] when the deque is full.
///
/// Hands the rejected value back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushError<T>(pub T);
impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deque is full")
    }
}
impl<T: fmt::Debug> std::error::Error for PushError<T> {}

/// How long to spin before yielding
#[cfg(not(loom))]
const SPIN_LIMIT: usize = 64;
/// How long to sleep at deep contention
#[cfg(not(loom))]
const YIELD_SLEEP_NS: u64 = 50;

/// Shared state behind both handles.
///
/// `top` and `bottom` are monotonic signed counters; the live items are
/// exactly the logical indices in `top..bottom`. Each counter sits on its own
/// cache line so the owner and the thieves do not false-share, and the
/// read-only buffer stays clear of both.
struct RawDeque<T, const CAP: usize> {
    buffer: Box<[Slot<T>; CAP]>,
    /// first live index; advanced by successful steals and by the owner's
    /// winning CAS in the one-item race
    top: CachePadded<AtomicI64>,
    /// one past the last live index; written only by the owner
    bottom: CachePadded<AtomicI64>,
}

// Safety: the deque can be shared and sent across threads if T is Send; the
// top/bottom protocol serialises every slot access.
unsafe impl<T: Send, const CAP: usize> Send for RawDeque<T, CAP> {}
unsafe impl<T: Send, const CAP: usize> Sync for RawDeque<T, CAP> {}

impl<T, const CAP: usize> RawDeque<T, CAP> {
    const MASK: i64 = CAP as i64 - 1;

    fn new() -> Self {
        assert!(CAP > 0, "capacity must be greater than 0");
        assert!(CAP.is_power_of_two(), "capacity must be a power of 2");

        let mut v = Vec::with_capacity(CAP);
        for _ in 0..CAP {
            v.push(Slot::new());
        }
        let buffer: Box<[Slot<T>; CAP]> = v
            .into_boxed_slice()
            .try_into()
            .unwrap_or_else(|_| panic!("capacity mismatch"));

        RawDeque {
            buffer,
            top: CachePadded::new(AtomicI64::new(0)),
            bottom: CachePadded::new(AtomicI64::new(0)),
        }
    }

    #[inline]
    fn slot(&self, index: i64) -> &Slot<T> {
        &self.buffer[(index & Self::MASK) as usize]
    }

    /// Move the value out of `index`'s slot by bitwise copy.
    ///
    /// # Safety
    ///
    /// The caller must hold a claim on the slot: the owner after fencing
    /// thieves off via the `bottom` decrement, or a thief that won (or is
    /// about to attempt) the CAS on `top`. A thief reads *before* its CAS
    /// and must `mem::forget` the copy if the CAS fails.
    #[inline]
    unsafe fn take(&self, index: i64) -> T {
        unsafe { self.slot(index).value.with(|slot| slot.read().assume_init()) }
    }

    #[inline]
    fn len(&self) -> usize {
        let bottom = self.bottom.value.load(Ordering::Acquire);
        let top = self.top.value.load(Ordering::Acquire);
        (bottom - top).max(0) as usize
    }
}

impl<T, const CAP: usize> Drop for RawDeque<T, CAP> {
    fn drop(&mut self) {
        // Exclusive access: the destructor runs after every handle is gone,
        // so only the live range top..bottom still holds constructed items.
        let top = self.top.value.load(Ordering::Relaxed);
        let bottom = self.bottom.value.load(Ordering::Relaxed);

        let mut index = top;
        while index < bottom {
            self.slot(index)
                .value
                .with_mut(|slot| unsafe { (*slot).assume_init_drop() });
            index += 1;
        }
    }
}

/// Owner handle of a bounded work-stealing deque.
///
/// The owner pushes and pops at the bottom end (LIFO). The handle is `Send`
/// but not `Sync` and not `Clone`, so at most one thread operates the owner
/// end at any time.
pub struct Worker<T, const CAP: usize> {
    inner: Arc<RawDeque<T, CAP>>,
    _marker: PhantomData<*mut ()>, // !Send + !Sync
}

unsafe impl<T: Send, const CAP: usize> Send for Worker<T, CAP> {}

/// Thief handle of a bounded work-stealing deque.
///
/// Any number of clones may call [`steal`](Stealer::steal) concurrently;
/// successful steals remove items from the top end in FIFO order.
pub struct Stealer<T, const CAP: usize> {
    inner: Arc<RawDeque<T, CAP>>,
}

unsafe impl<T: Send, const CAP: usize> Send for Stealer<T, CAP> {}
unsafe impl<T: Send, const CAP: usize> Sync for Stealer<T, CAP> {}

impl<T, const CAP: usize> Worker<T, CAP> {
    /// Create a new deque and return its owner handle.
    ///
    /// All CAP slots are allocated uninitialised up front; the deque never
    /// grows. Panics if CAP == 0 or not a power of two.
    pub fn new() -> Self {
        Worker {
            inner: Arc::new(RawDeque::new()),
            _marker: PhantomData,
        }
    }

    /// Create a thief handle for this deque.
    pub fn stealer(&self) -> Stealer<T, CAP> {
        Stealer {
            inner: self.inner.clone(),
        }
    }

    /// Push a value onto the bottom of the deque, spinning while it is full.
    ///
    /// The deque is fixed-capacity; when consumers cannot drain it fast
    /// enough this spins with staged backoff. Use
    /// [`try_push`](Worker::try_push) for backpressure instead.
    #[inline]
    pub fn push(&self, value: T) {
        let mut value = value;
        let mut spin = 0usize;
        loop {
            match self.try_push(value) {
                Ok(()) => return,
                Err(PushError(v)) => {
                    value = v;
                    spin = backoff(spin);
                }
            }
        }
    }

    /// Try to push a value onto the bottom of the deque.
    ///
    /// Returns `Err(PushError(value))` when the deque holds CAP items,
    /// handing the value back. The release store of `bottom` is what
    /// publishes the new slot to thieves.
    #[inline]
    pub fn try_push(&self, value: T) -> Result<(), PushError<T>> {
        let deque = &*self.inner;
        let bottom = deque.bottom.value.load(Ordering::Relaxed);
        let top = deque.top.value.load(Ordering::Acquire);

        if bottom - top >= CAP as i64 {
            return Err(PushError(value));
        }

        deque
            .slot(bottom)
            .value
            .with_mut(|slot| unsafe { (*slot).write(value) });
        deque.bottom.value.store(bottom + 1, Ordering::Release);
        Ok(())
    }

    /// Pop a value from the bottom of the deque (most recently pushed first).
    ///
    /// Returns `None` when the deque is empty. When exactly one item remains
    /// the owner races any concurrent thief for it via a CAS on `top`; losing
    /// that race also returns `None`.
    #[inline]
    pub fn pop(&self) -> Option<T> {
        let deque = &*self.inner;

        // Decrement bottom first so thieves stop initiating steals on this
        // slot.
        let bottom = deque.bottom.value.load(Ordering::Relaxed) - 1;
        deque.bottom.value.store(bottom, Ordering::Release);
        // The bottom store must be ordered before the top load, or a thief's
        // winning CAS on the last item could go unobserved here.
        fence(Ordering::SeqCst);
        let top = deque.top.value.load(Ordering::Acquire);

        if bottom < top {
            // Deque was empty; revert the decrement.
            deque.bottom.value.store(bottom + 1, Ordering::Relaxed);
            return None;
        }

        if bottom > top {
            // At least two items remain; the decremented bottom already
            // excludes every thief from this slot.
            return Some(unsafe { deque.take(bottom) });
        }

        // bottom == top: exactly one item left. Race any concurrent thief
        // for it; whoever advances top owns the slot.
        let won = deque
            .top
            .value
            .compare_exchange(top, top + 1, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok();
        deque.bottom.value.store(bottom + 1, Ordering::Relaxed);
        if won {
            Some(unsafe { deque.take(bottom) })
        } else {
            None
        }
    }

    /// Approximate number of items in the deque (racy, diagnostics only).
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when the deque appears empty (racy, diagnostics only).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity
    #[inline]
    pub const fn capacity(&self) -> usize {
        CAP
    }
}

impl<T, const CAP: usize> Default for Worker<T, CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const CAP: usize> fmt::Debug for Worker<T, CAP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("Worker { .. }")
    }
}

impl<T, const CAP: usize> Stealer<T, CAP> {
    /// Steal a value from the top of the deque (least recently pushed first).
    ///
    /// Returns `None` when the deque is empty or when the race for the slot
    /// is lost to the owner or another thief; a lost race is observationally
    /// the same as momentary emptiness.
    #[inline]
    pub fn steal(&self) -> Option<T> {
        let deque = &*self.inner;

        // The acquire on top keeps the bottom load from being reordered
        // before it.
        let top = deque.top.value.load(Ordering::Acquire);
        let bottom = deque.bottom.value.load(Ordering::Acquire);

        if top >= bottom {
            return None;
        }

        // Read the slot before committing the CAS; a losing thief never
        // publishes the copy.
        let value = unsafe { deque.take(top) };
        if deque
            .top
            .value
            .compare_exchange(top, top + 1, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
        {
            Some(value)
        } else {
            // Lost to the owner or another thief; whoever advanced top owns
            // the slot, so the copy must not run its destructor here.
            core::mem::forget(value);
            None
        }
    }

    /// Approximate number of items in the deque (racy, diagnostics only).
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when the deque appears empty (racy, diagnostics only).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity
    #[inline]
    pub const fn capacity(&self) -> usize {
        CAP
    }
}

impl<T, const CAP: usize> Clone for Stealer<T, CAP> {
    fn clone(&self) -> Self {
        Stealer {
            inner: self.inner.clone(),
        }
    }
}

impl<T, const CAP: usize> fmt::Debug for Stealer<T, CAP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("Stealer { .. }")
    }
}

/// Simple adaptive backoff: spin-loop a bit, then yield, then nanosleep.
#[inline(always)]
#[cfg(not(loom))]
fn backoff(mut spin: usize) -> usize {
    if spin < SPIN_LIMIT {
        spin += 1;
        core::hint::spin_loop();
    } else if spin < SPIN_LIMIT * 8 {
        spin += 1;
        thread::yield_now();
    } else {
        thread::sleep(Duration::from_nanos(YIELD_SLEEP_NS));
    }
    spin
}

#[cfg(loom)]
fn backoff(spin: usize) -> usize {
    loom::thread::yield_now();
    spin + 1
}
