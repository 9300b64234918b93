//! C2 — wait-free SPSC quote ring.
//!
//! Fixed capacity `N`, head (producer) and tail (consumer) on separate cache
//! lines so the two hot threads never false-share. `push`/`pop` never block;
//! they return `false` on a full/empty ring. Grounded on the teacher's
//! seqlock cache-line padding convention in
//! `scrapers/binance_hft_ingest.rs` and its release/acquire protocol, applied
//! here to a ring's head/tail indices instead of a sequence counter.

use crate::quote::Quote;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default capacity, a power of two as recommended by the contract.
pub const DEFAULT_CAPACITY: usize = 4096;

#[repr(align(64))]
struct CachePadded<T>(T);

/// Single-producer/single-consumer bounded queue of [`Quote`] records.
pub struct SpscRing {
    capacity: usize,
    mask: usize,
    storage: Box<[UnsafeCell<Quote>]>,
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
}

// SAFETY: `storage` is only ever written by the single producer (in `push`)
// and only ever read by the single consumer (in `pop`); the head/tail atomics
// establish happens-before edges between the two sides.
unsafe impl Sync for SpscRing {}
unsafe impl Send for SpscRing {}

impl SpscRing {
    /// `capacity` must be a power of two.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "ring capacity must be a power of two");
        let mut storage = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            storage.push(UnsafeCell::new(Quote::default()));
        }
        Self {
            capacity,
            mask: capacity - 1,
            storage: storage.into_boxed_slice(),
            head: CachePadded(AtomicUsize::new(0)),
            tail: CachePadded(AtomicUsize::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Non-blocking push. Returns `false` (and drops `q`) when the ring is
    /// full: `(head+1) mod N == tail`.
    #[inline]
    pub fn push(&self, q: Quote) -> bool {
        let head = self.head.0.load(Ordering::Relaxed);
        let next = (head + 1) & self.mask;
        let tail = self.tail.0.load(Ordering::Acquire);
        if next == tail {
            return false;
        }
        // SAFETY: single producer owns slot `head` exclusively until it
        // releases the new head value below.
        unsafe {
            *self.storage[head].get() = q;
        }
        self.head.0.store(next, Ordering::Release);
        true
    }

    /// Non-blocking pop. Returns `false` when the ring is empty: `tail == head`.
    #[inline]
    pub fn pop(&self, out: &mut Quote) -> bool {
        let tail = self.tail.0.load(Ordering::Relaxed);
        let head = self.head.0.load(Ordering::Acquire);
        if tail == head {
            return false;
        }
        // SAFETY: single consumer owns slot `tail` exclusively; the producer
        // will not reuse it until `tail` is released below.
        unsafe {
            *out = *self.storage[tail].get();
        }
        let next = (tail + 1) & self.mask;
        self.tail.0.store(next, Ordering::Release);
        true
    }

    /// Approximate occupancy; racy against a concurrently running
    /// producer/consumer, intended for metrics only.
    pub fn len(&self) -> usize {
        let head = self.head.0.load(Ordering::Relaxed);
        let tail = self.tail.0.load(Ordering::Relaxed);
        (head.wrapping_sub(tail)) & self.mask
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(seq: u64) -> Quote {
        Quote::new("BTCUSD", "binance", 50000.0 + seq as f64, 1.0, seq, seq)
    }

    #[test]
    fn push_pop_preserve_order() {
        let ring = SpscRing::new(8);
        for i in 0..7 {
            assert!(ring.push(q(i)));
        }
        let mut out = Quote::default();
        for i in 0..7 {
            assert!(ring.pop(&mut out));
            assert_eq!(out.sequence, i);
        }
    }

    #[test]
    fn push_fails_when_full() {
        let ring = SpscRing::new(4);
        assert!(ring.push(q(0)));
        assert!(ring.push(q(1)));
        assert!(ring.push(q(2)));
        // capacity-1 slots usable, the Nth push must fail
        assert!(!ring.push(q(3)));
    }

    #[test]
    fn pop_fails_when_empty() {
        let ring = SpscRing::new(4);
        let mut out = Quote::default();
        assert!(!ring.pop(&mut out));
    }

    #[test]
    fn occupancy_invariant_holds_through_wraparound() {
        let ring = SpscRing::new(4);
        let mut out = Quote::default();
        for round in 0..10u64 {
            assert!(ring.push(q(round)));
            assert!(ring.len() <= ring.capacity());
            assert!(ring.pop(&mut out));
            assert_eq!(out.sequence, round);
        }
    }
}
