//! Shared data model: the `Quote` record carried by C2 and the `Opportunity`
//! produced by C6. Kept in one module since both are small, immutable,
//! cache-line-sized value types with no behavior beyond construction.

/// C2 element. Immutable once published. Aligned to a cache line (64 bytes).
///
/// Invariant: `valid ⇒ mid_price > 0 ∧ aggregate_size ≥ 0`.
#[derive(Debug, Clone, Copy)]
#[repr(C, align(64))]
pub struct Quote {
    pub symbol: [u8; 12],
    pub venue: [u8; 8],
    pub mid_price: f64,
    pub aggregate_size: f64,
    pub ingest_cycles: u64,
    pub sequence: u64,
    pub valid: bool,
    _pad: [u8; 7],
}

const _: () = assert!(std::mem::size_of::<Quote>() == 64);

impl Quote {
    pub fn new(
        symbol: &str,
        venue: &str,
        mid_price: f64,
        aggregate_size: f64,
        ingest_cycles: u64,
        sequence: u64,
    ) -> Self {
        let valid = mid_price > 0.0 && aggregate_size >= 0.0;
        Self {
            symbol: pack_bytes::<12>(symbol),
            venue: pack_bytes::<8>(venue),
            mid_price,
            aggregate_size,
            ingest_cycles,
            sequence,
            valid,
            _pad: [0; 7],
        }
    }

    pub fn symbol_str(&self) -> &str {
        unpack_bytes(&self.symbol)
    }

    pub fn venue_str(&self) -> &str {
        unpack_bytes(&self.venue)
    }
}

impl Default for Quote {
    fn default() -> Self {
        Self {
            symbol: [0; 12],
            venue: [0; 8],
            mid_price: 0.0,
            aggregate_size: 0.0,
            ingest_cycles: 0,
            sequence: 0,
            valid: false,
            _pad: [0; 7],
        }
    }
}

/// Venue/strategy classification of a detected arbitrage candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpportunityClass {
    Min,
    Target,
    Fat,
}

/// C6 output. Transient: consumed immediately by the risk gate, never stored.
#[derive(Debug, Clone, Copy)]
pub struct Opportunity {
    pub symbol: [u8; 12],
    pub buy_venue_idx: usize,
    pub sell_venue_idx: usize,
    pub buy_price: f64,
    pub sell_price: f64,
    pub gross_bps: f64,
    pub net_bps: f64,
    pub class: OpportunityClass,
    pub detected_cycles: u64,
}

impl Opportunity {
    pub fn symbol_str(&self) -> &str {
        unpack_bytes(&self.symbol)
    }
}

/// Pack a `&str` into a fixed-size, null-padded byte array, truncating if the
/// string is longer than the array (callers are expected to pass canonical
/// short symbol/venue names that fit).
pub fn pack_bytes<const N: usize>(s: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let bytes = s.as_bytes();
    let n = bytes.len().min(N);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// Inverse of [`pack_bytes`]: trims trailing NUL bytes and returns the valid
/// UTF-8 prefix (non-UTF-8 input, which should not occur for canonical
/// symbol/venue names, is treated as empty).
pub fn unpack_bytes(buf: &[u8]) -> &str {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    std::str::from_utf8(&buf[..end]).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_is_cache_line_sized() {
        assert_eq!(std::mem::size_of::<Quote>(), 64);
    }

    #[test]
    fn quote_validity_invariant() {
        let q = Quote::new("BTCUSD", "binance", 50000.0, 1.5, 100, 1);
        assert!(q.valid);
        let bad = Quote::new("BTCUSD", "binance", -1.0, 1.5, 100, 1);
        assert!(!bad.valid);
    }

    #[test]
    fn symbol_roundtrips_through_fixed_bytes() {
        let q = Quote::new("ETHUSD", "deribit", 3000.0, 2.0, 1, 1);
        assert_eq!(q.symbol_str(), "ETHUSD");
        assert_eq!(q.venue_str(), "deribit");
    }
}
