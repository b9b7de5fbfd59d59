//! Single-producer/single-consumer byte ring for interrupt-shared queues
//!
//! The ring is split once into a [`Producer`] and a [`Consumer`] handle. Each
//! handle owns exactly one cursor: only the producer moves the write cursor and
//! only the consumer moves the read cursor. The two handles may live in
//! different execution contexts (mainline code and an interrupt handler) that
//! preempt each other at arbitrary points.
//!
//! On small targets a cursor is wider than a single store, so a cursor update
//! could be observed half-written by the other context. Every store of a
//! cursor, and every read of the *other* side's cursor, therefore happens
//! inside a [`critical_section`]. These sections touch one word and are kept
//! as short as possible because they delay the USB interrupt.
//!
//! A ring of backing size `N` holds at most `N - 1` bytes: `read == write`
//! means empty and `next(write) == read` means full.

use core::cell::UnsafeCell;

/// One cursor of a ring, written by its owner and observed by the other side
struct Cursor(UnsafeCell<usize>);

impl Cursor {
    const fn new() -> Self {
        Self(UnsafeCell::new(0))
    }

    /// Read by the owning side. Nobody else stores to this cursor, so no
    /// exclusion is needed.
    fn load_owned(&self) -> usize {
        // SAFETY: only the owner stores, and it is the caller.
        unsafe { *self.0.get() }
    }

    /// Publish a new value as one indivisible store.
    fn store(&self, value: usize) {
        critical_section::with(|_| {
            // SAFETY: the other side only reads inside a critical section.
            unsafe { *self.0.get() = value }
        })
    }

    /// Read by the non-owning side.
    fn snapshot(&self) -> usize {
        critical_section::with(|_| {
            // SAFETY: stores happen inside a critical section as well.
            unsafe { *self.0.get() }
        })
    }
}

/// Fixed-capacity byte ring
///
/// Create it in a `static` (e.g. via `static_cell`) and [`split`](Self::split)
/// it once at startup.
pub struct RingBuffer<const N: usize> {
    buf: UnsafeCell<[u8; N]>,
    write: Cursor,
    read: Cursor,
}

// SAFETY: the ring is only reachable through one Producer and one Consumer.
// Slots between read and write belong to the consumer, the rest to the
// producer, and ownership moves only through cursor stores made inside a
// critical section.
unsafe impl<const N: usize> Sync for RingBuffer<N> {}

impl<const N: usize> RingBuffer<N> {
    /// Create an empty ring
    pub const fn new() -> Self {
        assert!(N >= 2, "ring needs at least one usable slot");
        Self {
            buf: UnsafeCell::new([0; N]),
            write: Cursor::new(),
            read: Cursor::new(),
        }
    }

    /// Number of bytes the ring can hold at once
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    /// Split into the producer and consumer halves
    pub fn split(&mut self) -> (Producer<'_, N>, Consumer<'_, N>) {
        let ring: &Self = self;
        (Producer { ring }, Consumer { ring })
    }

    const fn next(index: usize) -> usize {
        if index + 1 == N {
            0
        } else {
            index + 1
        }
    }

    fn slot(&self, index: usize) -> *mut u8 {
        debug_assert!(index < N);
        // SAFETY: index is always reduced modulo N by `next`.
        unsafe { self.buf.get().cast::<u8>().add(index) }
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Writing half of a [`RingBuffer`]
pub struct Producer<'a, const N: usize> {
    ring: &'a RingBuffer<N>,
}

impl<const N: usize> Producer<'_, N> {
    /// True when no further byte can be pushed
    pub fn is_full(&self) -> bool {
        let next = RingBuffer::<N>::next(self.ring.write.load_owned());
        next == self.ring.read.snapshot()
    }

    /// Append a byte
    ///
    /// The caller must check [`is_full`](Self::is_full) first. Pushing into a
    /// full ring makes it look empty and loses its contents.
    pub fn push(&mut self, byte: u8) {
        debug_assert!(!self.is_full(), "push into a full ring");
        let write = self.ring.write.load_owned();
        // SAFETY: the slot at `write` is outside the consumer's range.
        unsafe { self.ring.slot(write).write(byte) };
        self.ring.write.store(RingBuffer::<N>::next(write));
    }

    /// Free slots, `read - write - 1 (mod N)`
    pub fn free_slots(&self) -> usize {
        let write = self.ring.write.load_owned();
        let read = self.ring.read.snapshot();
        (read + N - write - 1) % N
    }

    /// Drop everything not yet consumed by moving the write cursor back onto
    /// the read cursor
    pub fn flush(&mut self) {
        let read = self.ring.read.snapshot();
        self.ring.write.store(read);
    }
}

/// Reading half of a [`RingBuffer`]
pub struct Consumer<'a, const N: usize> {
    ring: &'a RingBuffer<N>,
}

impl<const N: usize> Consumer<'_, N> {
    /// True when there is nothing to pop
    pub fn is_empty(&self) -> bool {
        self.ring.read.load_owned() == self.ring.write.snapshot()
    }

    /// Remove the oldest byte
    ///
    /// The caller must check [`is_empty`](Self::is_empty) first; popping an
    /// empty ring returns a stale byte and corrupts the queue.
    pub fn pop(&mut self) -> u8 {
        debug_assert!(!self.is_empty(), "pop from an empty ring");
        let read = self.ring.read.load_owned();
        // SAFETY: the slot at `read` was published by the producer.
        let byte = unsafe { self.ring.slot(read).read() };
        self.ring.read.store(RingBuffer::<N>::next(read));
        byte
    }

    /// Number of queued bytes
    pub fn len(&self) -> usize {
        let read = self.ring.read.load_owned();
        let write = self.ring.write.snapshot();
        (write + N - read) % N
    }

    /// Drop everything queued by moving the read cursor up to the write cursor
    pub fn flush(&mut self) {
        let write = self.ring.write.snapshot();
        self.ring.read.store(write);
    }
}
