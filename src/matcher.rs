//! C9 — matcher loop.
//!
//! Drains C2 into C3, scans for arbitrage candidates via C6, gates them
//! through C7, and publishes admitted (paper) executions to C8. Runs on its
//! own pinned thread with no suspension points — termination is the only
//! cooperative check per iteration (per the redesign note against global
//! singletons: this loop owns the handles it's given rather than reaching
//! for statics).

use crate::cache::TopOfBookCache;
use crate::detector::{Detector, DetectorStats, SymbolPair};
use crate::funding::FundingRegistry;
use crate::ipc::{ShmOperation, SharedRegion};
use crate::legacy_risk::{RiskManager, TradeTelemetry};
use crate::quote::{pack_bytes, Quote};
use crate::ring::SpscRing;
use crate::risk_gate::{CandidateOrder, CheckOutcome, RiskGate, RiskState};
use crate::timestamp::Timestamp;
use std::sync::atomic::{AtomicBool, Ordering};

const DRAIN_CAP_PER_ITERATION: usize = 100;
const MAX_CANDIDATES_PER_ITERATION: usize = 10;
const NOTIONAL_USD: f64 = 100.0;
const HEARTBEAT_EVERY_ITERATIONS: u64 = 1_000_000;

pub struct SymbolSlots {
    pub symbol: String,
    pub spot_idx: usize,
    pub futures_idx: usize,
}

pub struct MatcherLoop {
    cache: TopOfBookCache,
    detector: Detector,
    symbols: Vec<SymbolSlots>,
}

impl MatcherLoop {
    pub fn new(cache: TopOfBookCache, detector: Detector, symbols: Vec<SymbolSlots>) -> Self {
        Self { cache, detector, symbols }
    }

    pub fn cache_mut(&mut self) -> &mut TopOfBookCache {
        &mut self.cache
    }

    fn symbol_pairs(&self) -> Vec<SymbolPair<'_>> {
        self.symbols
            .iter()
            .map(|s| SymbolPair { symbol: &s.symbol, spot_idx: s.spot_idx, futures_idx: s.futures_idx })
            .collect()
    }

    /// Drains up to [`DRAIN_CAP_PER_ITERATION`] quotes into C3.
    fn drain_ring(&mut self, ring: &SpscRing) -> usize {
        let mut out = Quote::default();
        let mut drained = 0;
        while drained < DRAIN_CAP_PER_ITERATION && ring.pop(&mut out) {
            let symbol = out.symbol_str().to_string();
            let venue = out.venue_str().to_string();
            if let Some(idx) = self.cache.find_or_insert(&symbol, &venue) {
                let (bid, ask) = crate::cache::synthesize_spread(out.mid_price);
                self.cache.update(idx, pack_bytes::<12>(&symbol), pack_bytes::<8>(&venue), bid, ask, out.ingest_cycles);
            }
            drained += 1;
        }
        drained
    }

    /// Runs until `running` clears.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &mut self,
        ring: &SpscRing,
        funding: &FundingRegistry,
        risk: &mut RiskState,
        shared: &SharedRegion,
        timestamp: &Timestamp,
        running: &AtomicBool,
        legacy_risk: &mut RiskManager,
    ) {
        let mut iteration: u64 = 0;
        let mut next_op_id: u64 = 0;

        while running.load(Ordering::Relaxed) {
            self.drain_ring(ring);

            let now_cycles = timestamp.now_cycles();
            let cycles_to_ns = |c: u64| timestamp.cycles_to_ns(c);
            let mut detector_stats = DetectorStats::default();
            let pairs = self.symbol_pairs();
            let mut opportunities = self.detector.scan(&pairs, &self.cache, funding, now_cycles, cycles_to_ns, &mut detector_stats);
            opportunities.truncate(MAX_CANDIDATES_PER_ITERATION);

            let header = shared.header_mut();
            for opp in opportunities {
                let quantity = NOTIONAL_USD / opp.buy_price;
                let now_cycles_check = timestamp.now_cycles();
                let latency_us = timestamp.cycles_to_ns(now_cycles_check.saturating_sub(opp.detected_cycles)) as f64 / 1000.0;
                let now_ns = timestamp.cycles_to_ns(now_cycles_check);

                header.opps_detected.fetch_add(1, Ordering::Relaxed);

                // Reverse cash-and-carry opportunities swap which leg buys
                // and which sells (detector.rs), so the venue labels must be
                // read back from the cache slot the detector actually used
                // rather than assumed to always be spot-buy/perp-sell.
                let buy_venue = self
                    .cache
                    .read(opp.buy_venue_idx)
                    .map(|q| crate::quote::unpack_bytes(&q.venue).to_string())
                    .unwrap_or_default();
                let sell_venue = self
                    .cache
                    .read(opp.sell_venue_idx)
                    .map(|q| crate::quote::unpack_bytes(&q.venue).to_string())
                    .unwrap_or_default();

                let order = CandidateOrder {
                    strategy_id: 1, // cross_exchange strategy slot
                    symbol: opp.symbol_str(),
                    buy_venue: &buy_venue,
                    sell_venue: &sell_venue,
                    qty: quantity,
                    buy_px: opp.buy_price,
                    sell_px: opp.sell_price,
                    detected_cycles: opp.detected_cycles,
                    latency_us,
                    now_ns,
                };

                if RiskGate::check(risk, &order) != CheckOutcome::Admit {
                    continue;
                }

                let profit = opp.net_bps / 10_000.0 * NOTIONAL_USD;
                risk.record_trade(order.strategy_id, profit, latency_us);
                risk.update_net_exposure(order.symbol, quantity, true);
                legacy_risk.update_trade_outcome(TradeTelemetry {
                    pnl: profit,
                    won: profit > 0.0,
                    position_size: quantity * order.buy_px,
                    signal_family: "spot_perp_arb",
                    raw_confidence: (opp.net_bps / 100.0).clamp(0.0, 1.0),
                });

                header.opps_executed.fetch_add(1, Ordering::Relaxed);
                header.orders_placed.fetch_add(1, Ordering::Relaxed);
                header.orders_filled.fetch_add(1, Ordering::Relaxed);
                header.balance_usd = risk.balance_usd;
                header.total_profit_usd += profit;

                let mut op = ShmOperation {
                    id: next_op_id,
                    timestamp_ns: now_ns,
                    quantity,
                    entry_price: order.buy_px,
                    exit_price: order.sell_px,
                    pnl: profit,
                    pnl_percent: opp.net_bps / 100.0,
                    spread_bps: opp.gross_bps,
                    fees_paid: quantity * order.buy_px * 0.001275,
                    is_open: 0,
                    ..ShmOperation::default()
                };
                op.op_type = pack_bytes::<20>("spot_perp_arb");
                op.strategy = pack_bytes::<20>("cross_exchange");
                op.symbol = pack_bytes::<12>(order.symbol);
                op.buy_venue = pack_bytes::<20>(order.buy_venue);
                op.sell_venue = pack_bytes::<20>(order.sell_venue);
                header.push_operation(op);
                header.update_stats(latency_us as u32, now_ns);
                next_op_id += 1;
            }

            iteration += 1;
            if iteration.is_multiple_of(HEARTBEAT_EVERY_ITERATIONS) {
                tracing::debug!(iteration, stale = detector_stats.stale_skips, funding = detector_stats.funding_skips, "matcher heartbeat");
                let guardrails = legacy_risk.guardrail_state();
                tracing::info!(
                    bankroll = guardrails.bankroll,
                    drawdown_pct = guardrails.drawdown_pct,
                    drawdown_throttle_active = guardrails.drawdown_throttle_active,
                    "legacy risk manager report"
                );
            }
        }
    }
}
