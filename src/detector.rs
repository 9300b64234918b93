//! C6 — spot/perp arbitrage detector.
//!
//! Computes basis between a spot and a perpetual-futures top-of-book,
//! adjusts for funding, and classifies candidates. Constants are grouped
//! into [`DetectorCosts`] rather than left as bare literals so they are
//! centrally overridable, matching the contract's closing sentence; the
//! defaults are confirmed against
//! `strategies/spot_futures_arbitrage.h` (`EFFECTIVE_FEES_BPS = 10.75`,
//! `SLIPPAGE_BPS = 2.0`, `EXPECTED_HOLD_PERIODS = 3`).

use crate::cache::TopOfBookCache;
use crate::funding::FundingRegistry;
use crate::quote::{Opportunity, OpportunityClass};

/// Overridable cost constants for net-bps computation, all in basis points.
#[derive(Debug, Clone, Copy)]
pub struct DetectorCosts {
    pub effective_fees_bps: f64,
    pub slippage_bps: f64,
    pub expected_hold_periods: f64,
    pub max_funding_bps: f64,
    pub min_net_bps: f64,
    pub target_bps: f64,
    pub fat_bps: f64,
}

impl DetectorCosts {
    pub fn total_cost_bps(&self) -> f64 {
        self.effective_fees_bps + self.slippage_bps
    }
}

impl Default for DetectorCosts {
    fn default() -> Self {
        Self {
            effective_fees_bps: 10.75,
            slippage_bps: 2.0,
            expected_hold_periods: 3.0,
            max_funding_bps: 10.0,
            min_net_bps: 10.0,
            target_bps: 15.0,
            fat_bps: 25.0,
        }
    }
}

/// A (spot_idx, futures_idx) pair of cache slots plus the symbol to scan.
pub struct SymbolPair<'a> {
    pub symbol: &'a str,
    pub spot_idx: usize,
    pub futures_idx: usize,
}

/// Per-call counters for callers that want to surface skip reasons.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetectorStats {
    pub stale_skips: u64,
    pub funding_skips: u64,
    pub crossed_skips: u64,
    pub missing_skips: u64,
    pub zero_basis_skips: u64,
}

pub struct Detector {
    costs: DetectorCosts,
}

impl Detector {
    pub fn new(costs: DetectorCosts) -> Self {
        Self { costs }
    }

    /// Scans the given symbols and emits opportunities meeting the net-bps
    /// floor. `now_cycles`/`cycles_to_ns` thread C1 through for staleness.
    pub fn scan(
        &self,
        symbols: &[SymbolPair<'_>],
        cache: &TopOfBookCache,
        funding: &FundingRegistry,
        now_cycles: u64,
        cycles_to_ns: impl Fn(u64) -> u64 + Copy,
        stats: &mut DetectorStats,
    ) -> Vec<Opportunity> {
        let mut out = Vec::new();
        for pair in symbols {
            if let Some(opp) = self.evaluate(pair, cache, funding, now_cycles, cycles_to_ns, stats) {
                out.push(opp);
            }
        }
        out
    }

    fn evaluate(
        &self,
        pair: &SymbolPair<'_>,
        cache: &TopOfBookCache,
        funding: &FundingRegistry,
        now_cycles: u64,
        cycles_to_ns: impl Fn(u64) -> u64,
        stats: &mut DetectorStats,
    ) -> Option<Opportunity> {
        let (funding_bps, _) = funding.read(pair.symbol);
        if funding_bps.abs() > self.costs.max_funding_bps {
            stats.funding_skips += 1;
            return None;
        }

        let spot = cache.read_fresh(pair.spot_idx, now_cycles, &cycles_to_ns);
        let fut = cache.read_fresh(pair.futures_idx, now_cycles, &cycles_to_ns);
        let (spot, fut) = match (spot, fut) {
            (Some(s), Some(f)) => (s, f),
            _ => {
                if cache.read(pair.spot_idx).is_none() || cache.read(pair.futures_idx).is_none() {
                    stats.missing_skips += 1;
                } else {
                    stats.stale_skips += 1;
                }
                return None;
            }
        };
        if spot.ask <= spot.bid || fut.ask <= fut.bid {
            stats.crossed_skips += 1;
            return None;
        }

        let spot_mid = (spot.bid + spot.ask) / 2.0;
        let fut_mid = (fut.bid + fut.ask) / 2.0;
        if spot_mid <= 0.0 || fut_mid <= 0.0 {
            stats.missing_skips += 1;
            return None;
        }
        let basis_bps = (fut_mid - spot_mid) / spot_mid * 10_000.0;

        if basis_bps == 0.0 {
            stats.zero_basis_skips += 1;
            return None;
        }

        let (buy, sell, actual_bps, funding_adj_bps) = if basis_bps > 0.0 {
            let buy = spot.ask;
            let sell = fut.bid;
            if buy <= 0.0 || sell <= 0.0 {
                stats.missing_skips += 1;
                return None;
            }
            let actual_bps = (sell - buy) / buy * 10_000.0;
            (buy, sell, actual_bps, funding_bps)
        } else {
            let sell = spot.bid;
            let buy = fut.ask;
            if buy <= 0.0 || sell <= 0.0 {
                stats.missing_skips += 1;
                return None;
            }
            let actual_bps = (sell - buy) / sell * 10_000.0;
            (buy, sell, actual_bps, -funding_bps)
        };

        let net_bps = actual_bps - self.costs.total_cost_bps() - self.costs.expected_hold_periods * funding_adj_bps;
        if net_bps < self.costs.min_net_bps {
            return None;
        }

        let class = if net_bps >= self.costs.fat_bps {
            OpportunityClass::Fat
        } else if net_bps >= self.costs.target_bps {
            OpportunityClass::Target
        } else {
            OpportunityClass::Min
        };

        let (buy_venue_idx, sell_venue_idx) = if basis_bps > 0.0 {
            (pair.spot_idx, pair.futures_idx)
        } else {
            (pair.futures_idx, pair.spot_idx)
        };

        Some(Opportunity {
            symbol: crate::quote::pack_bytes::<12>(pair.symbol),
            buy_venue_idx,
            sell_venue_idx,
            buy_price: buy,
            sell_price: sell,
            gross_bps: basis_bps,
            net_bps,
            class,
            detected_cycles: now_cycles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TopOfBookCache;
    use crate::funding::FundingRegistry;
    use crate::quote::pack_bytes;

    fn setup(spot_bid: f64, spot_ask: f64, fut_bid: f64, fut_ask: f64, funding_bps: f64) -> (TopOfBookCache, FundingRegistry) {
        let mut cache = TopOfBookCache::new();
        let funding = FundingRegistry::new();
        let spot_idx = cache.find_or_insert("BTCUSD", "spot").unwrap();
        let fut_idx = cache.find_or_insert("BTCUSD", "perp").unwrap();
        cache.update(spot_idx, pack_bytes("BTCUSD"), pack_bytes("spot"), spot_bid, spot_ask, 1000);
        cache.update(fut_idx, pack_bytes("BTCUSD"), pack_bytes("perp"), fut_bid, fut_ask, 1000);
        if funding_bps != 0.0 {
            funding.update("BTCUSD", funding_bps, 1000);
        }
        (cache, funding)
    }

    fn no_age(_c: u64) -> u64 {
        0
    }

    #[test]
    fn scenario_1_positive_basis_cash_and_carry() {
        let (mut cache, funding) = setup(50000.0, 50010.0, 50250.0, 50260.0, 0.0);
        let spot_idx = cache.find_or_insert("BTCUSD", "spot").unwrap();
        let fut_idx = cache.find_or_insert("BTCUSD", "perp").unwrap();
        let detector = Detector::new(DetectorCosts::default());
        let pair = SymbolPair { symbol: "BTCUSD", spot_idx, futures_idx: fut_idx };
        let mut stats = DetectorStats::default();
        let opp = detector
            .evaluate(&pair, &cache, &funding, 1000, no_age, &mut stats)
            .expect("expected an opportunity");
        assert!((opp.gross_bps - 49.995).abs() < 0.01);
        assert_eq!(opp.buy_price, 50010.0);
        assert_eq!(opp.sell_price, 50250.0);
        assert!((opp.net_bps - 35.24).abs() < 0.01);
        assert_eq!(opp.class, OpportunityClass::Fat);
    }

    #[test]
    fn scenario_2_sub_threshold_skip() {
        let mut cache_db = TopOfBookCache::new();
        let funding = FundingRegistry::new();
        let spot_idx = cache_db.find_or_insert("BTCUSD", "spot").unwrap();
        let fut_idx = cache_db.find_or_insert("BTCUSD", "perp").unwrap();
        cache_db.update(spot_idx, pack_bytes("BTCUSD"), pack_bytes("spot"), 50000.0, 50010.0, 1000);
        cache_db.update(fut_idx, pack_bytes("BTCUSD"), pack_bytes("perp"), 50134.0, 50144.0, 1000);
        let detector = Detector::new(DetectorCosts::default());
        let pair = SymbolPair { symbol: "BTCUSD", spot_idx, futures_idx: fut_idx };
        let mut stats = DetectorStats::default();
        let opp = detector.evaluate(&pair, &cache_db, &funding, 1000, no_age, &mut stats).unwrap();
        assert!((opp.net_bps - 12.05).abs() < 0.01);
        assert_eq!(opp.class, OpportunityClass::Min);

        cache_db.update(fut_idx, pack_bytes("BTCUSD"), pack_bytes("perp"), 50120.0, 50130.0, 1000);
        let rejected = detector.evaluate(&pair, &cache_db, &funding, 1000, no_age, &mut stats);
        assert!(rejected.is_none());
    }

    #[test]
    fn scenario_3_funding_rejection() {
        let (mut cache, funding) = setup(50000.0, 50010.0, 50100.0, 50110.0, 11.0);
        let spot_idx = cache.find_or_insert("BTCUSD", "spot").unwrap();
        let fut_idx = cache.find_or_insert("BTCUSD", "perp").unwrap();
        let detector = Detector::new(DetectorCosts::default());
        let pair = SymbolPair { symbol: "BTCUSD", spot_idx, futures_idx: fut_idx };
        let mut stats = DetectorStats::default();
        assert!(detector.evaluate(&pair, &cache, &funding, 1000, no_age, &mut stats).is_none());
        assert_eq!(stats.funding_skips, 1);
    }

    #[test]
    fn crossed_book_is_rejected() {
        let (mut cache, funding) = setup(50010.0, 50000.0, 50100.0, 50110.0, 0.0);
        let spot_idx = cache.find_or_insert("BTCUSD", "spot").unwrap();
        let fut_idx = cache.find_or_insert("BTCUSD", "perp").unwrap();
        let detector = Detector::new(DetectorCosts::default());
        let pair = SymbolPair { symbol: "BTCUSD", spot_idx, futures_idx: fut_idx };
        let mut stats = DetectorStats::default();
        assert!(detector.evaluate(&pair, &cache, &funding, 1000, no_age, &mut stats).is_none());
        assert_eq!(stats.crossed_skips, 1);
    }

    #[test]
    fn stale_quote_is_rejected() {
        let mut cache = TopOfBookCache::new();
        let funding = FundingRegistry::new();
        let spot_idx = cache.find_or_insert("BTCUSD", "spot").unwrap();
        let fut_idx = cache.find_or_insert("BTCUSD", "perp").unwrap();
        cache.update(spot_idx, pack_bytes("BTCUSD"), pack_bytes("spot"), 50000.0, 50010.0, 0);
        cache.update(fut_idx, pack_bytes("BTCUSD"), pack_bytes("perp"), 50100.0, 50110.0, 0);
        let detector = Detector::new(DetectorCosts::default());
        let pair = SymbolPair { symbol: "BTCUSD", spot_idx, futures_idx: fut_idx };
        let mut stats = DetectorStats::default();
        // 2 seconds of cycles have elapsed at a 1 cycle == 1 ns identity mapping.
        let rejected = detector.evaluate(&pair, &cache, &funding, 2_000_000_000, |c| c, &mut stats);
        assert!(rejected.is_none());
        assert_eq!(stats.stale_skips, 1);
    }
}
