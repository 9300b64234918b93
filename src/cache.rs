//! C3 — top-of-book cache.
//!
//! A fixed-capacity table keyed by `(symbol, venue)`, each slot protected by
//! its own seqlock. Only the matcher calls `find_or_insert`/`update`; any
//! thread may `read`. The write/read protocol is the same acquire/release
//! sequence-counter dance as `scrapers/binance_hft_ingest.rs`'s
//! `SeqLockSnapshot`, encapsulated here so callers cannot observe an
//! intermediate (odd-sequence) state — per the redesign note on manual
//! atomic sequence numbers.

use std::cell::UnsafeCell;
use std::sync::atomic::{fence, AtomicU64, Ordering};

/// Table capacity, matching the original's `MAX_SYMBOLS = 1000`.
pub const MAX_ENTRIES: usize = 1000;

/// Synthetic half-spread applied when a venue reports only a mid-price:
/// 0.5 bps per side, 1 bps total.
const SYNTHETIC_HALF_SPREAD: f64 = 0.00005;

/// Entries older than this are rejected by readers needing freshness
/// (the detector, per spec's 1s staleness policy).
pub const STALE_AFTER_NS: u64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct CachedQuotePayload {
    pub symbol: [u8; 12],
    pub venue: [u8; 8],
    pub bid: f64,
    pub ask: f64,
    pub ingest_cycles: u64,
}

#[repr(align(64))]
struct Slot {
    sequence: AtomicU64,
    payload: UnsafeCell<CachedQuotePayload>,
}

impl Slot {
    const fn new() -> Self {
        Self {
            sequence: AtomicU64::new(0),
            payload: UnsafeCell::new(CachedQuotePayload {
                symbol: [0; 12],
                venue: [0; 8],
                bid: 0.0,
                ask: 0.0,
                ingest_cycles: 0,
            }),
        }
    }

    /// Writer side: only the matcher calls this, and only through
    /// `TopOfBookCache::update`.
    fn write(&self, payload: CachedQuotePayload) {
        let seq = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(seq + 1, Ordering::Release);
        fence(Ordering::Release);
        // SAFETY: single writer (the matcher) per the cache's contract.
        unsafe {
            *self.payload.get() = payload;
        }
        fence(Ordering::Release);
        self.sequence.store(seq + 2, Ordering::Release);
    }

    /// Reader side: spins until an even sequence brackets the copy.
    fn read(&self) -> Option<CachedQuotePayload> {
        loop {
            let seq1 = self.sequence.load(Ordering::Acquire);
            if seq1 & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            if seq1 == 0 {
                return None;
            }
            // SAFETY: seqlock protocol, verified by the sequence re-check below.
            let payload = unsafe { *self.payload.get() };
            fence(Ordering::Acquire);
            let seq2 = self.sequence.load(Ordering::Acquire);
            if seq1 == seq2 {
                return Some(payload);
            }
            std::hint::spin_loop();
        }
    }
}

// SAFETY: payload is only mutated through the seqlock write protocol above,
// which only the matcher invokes; readers only ever take a bytewise copy.
unsafe impl Sync for Slot {}

/// Fixed-capacity `(symbol, venue) -> CachedQuotePayload` table.
pub struct TopOfBookCache {
    keys: Vec<([u8; 12], [u8; 8])>,
    slots: Vec<Slot>,
}

impl TopOfBookCache {
    pub fn new() -> Self {
        Self {
            keys: Vec::with_capacity(MAX_ENTRIES),
            slots: (0..MAX_ENTRIES).map(|_| Slot::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Matcher-only. Linear scan by key; appends on miss if capacity allows.
    /// Returns `None` ("full" sentinel) when at capacity and the key is new.
    pub fn find_or_insert(&mut self, symbol: &str, venue: &str) -> Option<usize> {
        let sym = crate::quote::pack_bytes::<12>(symbol);
        let ven = crate::quote::pack_bytes::<8>(venue);
        if let Some(idx) = self.keys.iter().position(|(s, v)| *s == sym && *v == ven) {
            return Some(idx);
        }
        if self.keys.len() >= MAX_ENTRIES {
            return None;
        }
        self.keys.push((sym, ven));
        Some(self.keys.len() - 1)
    }

    /// Matcher-only write. `bid`/`ask` are the venue's true top-of-book when
    /// available; otherwise pass `mid` through [`synthesize_spread`] first.
    pub fn update(&self, index: usize, symbol: [u8; 12], venue: [u8; 8], bid: f64, ask: f64, ingest_cycles: u64) {
        self.slots[index].write(CachedQuotePayload {
            symbol,
            venue,
            bid,
            ask,
            ingest_cycles,
        });
    }

    /// Reader side, usable from any thread. Returns `None` if never written
    /// or if the retry budget is exhausted by sustained writer contention.
    pub fn read(&self, index: usize) -> Option<CachedQuotePayload> {
        self.slots.get(index)?.read()
    }

    /// As [`Self::read`] but additionally rejects entries older than
    /// [`STALE_AFTER_NS`], per the detector's staleness policy.
    pub fn read_fresh(&self, index: usize, now_cycles: u64, cycles_to_ns: impl Fn(u64) -> u64) -> Option<CachedQuotePayload> {
        let payload = self.read(index)?;
        let age_cycles = now_cycles.saturating_sub(payload.ingest_cycles);
        if cycles_to_ns(age_cycles) > STALE_AFTER_NS {
            return None;
        }
        Some(payload)
    }
}

impl Default for TopOfBookCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive synthetic bid/ask from a mid-only quote: 0.5bps each side.
pub fn synthesize_spread(mid: f64) -> (f64, f64) {
    let half = mid * SYNTHETIC_HALF_SPREAD;
    (mid - half, mid + half)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_roundtrips() {
        let cache = TopOfBookCache::new();
        let sym = crate::quote::pack_bytes::<12>("BTCUSD");
        let ven = crate::quote::pack_bytes::<8>("binance");
        cache.update(0, sym, ven, 49990.0, 50010.0, 42);
        let got = cache.read(0).unwrap();
        assert_eq!(got.bid, 49990.0);
        assert_eq!(got.ask, 50010.0);
        assert_eq!(got.ingest_cycles, 42);
    }

    #[test]
    fn repeated_reads_without_write_are_idempotent() {
        let cache = TopOfBookCache::new();
        cache.update(0, [0; 12], [0; 8], 1.0, 2.0, 1);
        let a = cache.read(0).unwrap();
        let b = cache.read(0).unwrap();
        assert_eq!(a.bid, b.bid);
        assert_eq!(a.ask, b.ask);
    }

    #[test]
    fn unwritten_slot_reads_as_none() {
        let cache = TopOfBookCache::new();
        assert!(cache.read(5).is_none());
    }

    #[test]
    fn find_or_insert_reuses_existing_key() {
        let mut cache = TopOfBookCache::new();
        let a = cache.find_or_insert("ETHUSD", "deribit").unwrap();
        let b = cache.find_or_insert("ETHUSD", "deribit").unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn find_or_insert_returns_none_when_full() {
        let mut cache = TopOfBookCache::new();
        for i in 0..MAX_ENTRIES {
            let sym = format!("SYM{i}");
            assert!(cache.find_or_insert(&sym, "v").is_some());
        }
        assert!(cache.find_or_insert("OVERFLOW", "v").is_none());
    }

    #[test]
    fn synthetic_spread_is_one_bps_total() {
        let (bid, ask) = synthesize_spread(50000.0);
        let spread_bps = (ask - bid) / 50000.0 * 10_000.0;
        assert!((spread_bps - 1.0).abs() < 1e-9);
    }
}
