//! C5 — funding-rate registry.
//!
//! Per-symbol `(bps_rate, updated_cycles)` pair, each stored word-wide as an
//! `AtomicU64` (`f64::to_bits`) plus a paired cycle-stamp atomic, following
//! the registry's own "word-wide stores/loads are sufficient" contract. A
//! missing symbol reads as 0 bps, matching `g_funding_rates[10] = {0.0}`
//! in the original engine.

use std::sync::atomic::{AtomicU64, Ordering};

const MAX_SYMBOLS: usize = 64;

struct Slot {
    bits: AtomicU64,
    updated_cycles: AtomicU64,
}

/// Writer: the perpetual venue session. Readers: the detector (C6).
pub struct FundingRegistry {
    slots: Vec<Slot>,
    keys: parking_lot::RwLock<Vec<[u8; 12]>>,
}

impl FundingRegistry {
    pub fn new() -> Self {
        let slots = (0..MAX_SYMBOLS)
            .map(|_| Slot {
                bits: AtomicU64::new(0.0f64.to_bits()),
                updated_cycles: AtomicU64::new(0),
            })
            .collect();
        Self {
            slots,
            keys: parking_lot::RwLock::new(Vec::with_capacity(MAX_SYMBOLS)),
        }
    }

    fn index_of(&self, symbol: &str) -> Option<usize> {
        let key = crate::quote::pack_bytes::<12>(symbol);
        self.keys.read().iter().position(|k| *k == key)
    }

    /// Registers the symbol if unseen and writes its funding rate in bps.
    /// Word-wide atomic stores; no cross-field consistency is implied.
    pub fn update(&self, symbol: &str, bps_rate: f64, now_cycles: u64) {
        let key = crate::quote::pack_bytes::<12>(symbol);
        let idx = {
            let mut keys = self.keys.write();
            if let Some(i) = keys.iter().position(|k| *k == key) {
                i
            } else if keys.len() < MAX_SYMBOLS {
                keys.push(key);
                keys.len() - 1
            } else {
                return; // registry full, drop silently (non-hot writer path)
            }
        };
        self.slots[idx].bits.store(bps_rate.to_bits(), Ordering::Release);
        self.slots[idx].updated_cycles.store(now_cycles, Ordering::Release);
    }

    /// A missing symbol reads as `(0.0, 0)`.
    pub fn read(&self, symbol: &str) -> (f64, u64) {
        match self.index_of(symbol) {
            Some(idx) => (
                f64::from_bits(self.slots[idx].bits.load(Ordering::Acquire)),
                self.slots[idx].updated_cycles.load(Ordering::Acquire),
            ),
            None => (0.0, 0),
        }
    }
}

impl Default for FundingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_symbol_reads_zero() {
        let reg = FundingRegistry::new();
        assert_eq!(reg.read("NOPE"), (0.0, 0));
    }

    #[test]
    fn update_then_read_roundtrips() {
        let reg = FundingRegistry::new();
        reg.update("BTCUSD", 3.5, 100);
        let (bps, cycles) = reg.read("BTCUSD");
        assert_eq!(bps, 3.5);
        assert_eq!(cycles, 100);
    }

    #[test]
    fn second_update_overwrites() {
        let reg = FundingRegistry::new();
        reg.update("BTCUSD", 3.5, 100);
        reg.update("BTCUSD", -1.2, 200);
        assert_eq!(reg.read("BTCUSD"), (-1.2, 200));
    }
}
