//! Bounded wait-free SPSC ring used for both pipeline hops.
//!
//! Each ring has exactly one producer endpoint and one consumer endpoint,
//! handed out as separate capability handles. The index protocol is the
//! classic two-counter scheme: `head` is written only by the producer,
//! `tail` only by the consumer, and one slot is always left empty so
//! `(head + 1) & mask == tail` means full and `head == tail` means empty
//! without a separate size counter on the hot path.
//!
//! Ordering contract:
//! - producer: `head` relaxed load (own index), `tail` acquire load,
//!   `head` release store after writing the slot;
//! - consumer: `tail` relaxed load (own index), `head` acquire load,
//!   `tail` release store after reading the slot.
//!
//! The release/acquire pair on `head` makes every slot write visible before
//! the matching pop, so the payload transfer is race-free without fences.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Bounded single-producer/single-consumer ring of `Copy` items.
///
/// Capacity must be a power of two so index arithmetic is a mask; the ring
/// holds up to `capacity - 1` items (one slot reserved for the full/empty
/// distinction).
pub struct SpscRing<T> {
    buf: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,

    /// Written only by the producer endpoint.
    head: AtomicUsize,
    _pad1: [u8; 56],

    /// Written only by the consumer endpoint.
    tail: AtomicUsize,
    _pad2: [u8; 56],
}

// Safety: the slot array is only touched under the head/tail protocol above;
// a slot is written before the release store of `head` and read after the
// acquire load of it, so no slot is accessed from two threads at once.
unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T: Copy> SpscRing<T> {
    /// Allocate a ring with `capacity` slots (`capacity - 1` usable).
    ///
    /// Panics if `capacity` is not a power of two or is below 2; the
    /// configuration layer validates this before construction.
    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        assert!(
            capacity.is_power_of_two() && capacity >= 2,
            "ring capacity must be a power of two >= 2, got {capacity}",
        );

        let buf: Box<[UnsafeCell<MaybeUninit<T>>]> = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();

        Arc::new(Self {
            buf,
            mask: capacity - 1,
            head: AtomicUsize::new(0),
            _pad1: [0; 56],
            tail: AtomicUsize::new(0),
            _pad2: [0; 56],
        })
    }

    /// Producer endpoint handle.
    ///
    /// The handle is cloneable so a fan-in of producer threads can share a
    /// shard the way the fixed topology wires it, but the ring's contract
    /// is single-writer: with concurrent pushers a racing write can
    /// overwrite a slot, which surfaces as lost throughput, never as
    /// corruption of the index protocol.
    pub fn producer(self: &Arc<Self>) -> RingProducer<T> {
        RingProducer {
            ring: Arc::clone(self),
        }
    }

    /// Consumer endpoint handle. Exactly one consumer per ring.
    pub fn consumer(self: &Arc<Self>) -> RingConsumer<T> {
        RingConsumer {
            ring: Arc::clone(self),
        }
    }

    /// Total slot count (one more than the usable capacity).
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Approximate live size, readable from any thread.
    ///
    /// Telemetry only: both indices are loaded relaxed, so the value may be
    /// stale, but it never exceeds `capacity - 1`.
    #[inline(always)]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        head.wrapping_sub(tail) & self.mask
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline(always)]
    fn try_push(&self, item: T) -> Result<(), T> {
        let head = self.head.load(Ordering::Relaxed);
        let next = (head + 1) & self.mask;

        if next == self.tail.load(Ordering::Acquire) {
            return Err(item); // full
        }

        // Safety: `head` is owned by this endpoint and the slot at `head`
        // was released by the consumer (tail has moved past it).
        unsafe {
            (*self.buf[head].get()).write(item);
        }
        self.head.store(next, Ordering::Release);
        Ok(())
    }

    #[inline(always)]
    fn try_pop(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Relaxed);

        if tail == self.head.load(Ordering::Acquire) {
            return None; // empty
        }

        // Safety: the acquire load of `head` above proves the producer
        // finished writing this slot before publishing it.
        let item = unsafe { (*self.buf[tail].get()).assume_init() };
        self.tail.store((tail + 1) & self.mask, Ordering::Release);
        Some(item)
    }
}

/// Push-side capability for one ring.
#[derive(Clone)]
pub struct RingProducer<T> {
    ring: Arc<SpscRing<T>>,
}

impl<T: Copy> RingProducer<T> {
    /// Non-blocking push. Returns the item back when the ring is full; the
    /// caller decides whether to yield, retry, or drop. Never blocks,
    /// never spins, never allocates.
    #[inline(always)]
    pub fn try_push(&self, item: T) -> Result<(), T> {
        self.ring.try_push(item)
    }
}

/// Pop-side capability for one ring.
pub struct RingConsumer<T> {
    ring: Arc<SpscRing<T>>,
}

impl<T: Copy> RingConsumer<T> {
    /// Non-blocking pop. `None` when the ring is empty.
    #[inline(always)]
    pub fn try_pop(&self) -> Option<T> {
        self.ring.try_pop()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_capacity_reserves_one_slot() {
        let ring = SpscRing::<u64>::with_capacity(8);
        let producer = ring.producer();
        let consumer = ring.consumer();

        // Seven pushes succeed, the eighth hits the reserved slot.
        for i in 0..7 {
            assert!(producer.try_push(i).is_ok(), "push {i} should fit");
            assert_eq!(ring.len(), i as usize + 1);
        }
        assert_eq!(producer.try_push(7), Err(7));
        assert_eq!(ring.len(), 7);

        // Seven pops drain it, the eighth sees empty.
        for i in 0..7 {
            assert_eq!(consumer.try_pop(), Some(i));
            assert_eq!(ring.len(), 6 - i as usize);
        }
        assert_eq!(consumer.try_pop(), None);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_fifo_across_wraparound() {
        let ring = SpscRing::<u64>::with_capacity(4);
        let producer = ring.producer();
        let consumer = ring.consumer();

        // Push/pop far past the capacity so the indices wrap many times.
        for i in 0..1_000u64 {
            assert!(producer.try_push(i).is_ok());
            assert_eq!(consumer.try_pop(), Some(i));
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn test_pop_empty_returns_none() {
        let ring = SpscRing::<u64>::with_capacity(16);
        let consumer = ring.consumer();
        assert_eq!(consumer.try_pop(), None);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn test_non_power_of_two_capacity_panics() {
        let _ = SpscRing::<u64>::with_capacity(100);
    }

    #[test]
    fn test_concurrent_fifo_and_size_bound() {
        const COUNT: u64 = 200_000;
        const CAP: usize = 64;

        let ring = SpscRing::<u64>::with_capacity(CAP);
        let producer = ring.producer();
        let consumer = ring.consumer();
        let observer = Arc::clone(&ring);

        let producer_handle = thread::spawn(move || {
            for i in 0..COUNT {
                loop {
                    match producer.try_push(i) {
                        Ok(()) => break,
                        Err(_) => thread::yield_now(),
                    }
                }
            }
        });

        let consumer_handle = thread::spawn(move || {
            let mut expected = 0u64;
            while expected < COUNT {
                match consumer.try_pop() {
                    // Popped items must be exactly the pushed sequence.
                    Some(v) => {
                        assert_eq!(v, expected);
                        expected += 1;
                    }
                    None => thread::yield_now(),
                }
            }
        });

        // Telemetry reads from a third thread never exceed the bound.
        let observer_handle = thread::spawn(move || {
            let mut max_seen = 0;
            for _ in 0..10_000 {
                max_seen = max_seen.max(observer.len());
            }
            max_seen
        });

        producer_handle.join().expect("producer thread panicked");
        consumer_handle.join().expect("consumer thread panicked");
        let max_seen = observer_handle.join().expect("observer thread panicked");
        assert!(max_seen <= CAP - 1, "observed size {max_seen} over bound");
    }
}
