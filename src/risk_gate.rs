//! C7 — HFT risk gate.
//!
//! The core under specification: a constant-time, nine-step order
//! validator. Built directly from the component contract — the original
//! engine's `risk/hft_risk_manager.h` is an unfinished stub at this
//! fidelity, so there is no original-source text to check this module
//! against beyond confirming that absence.
//!
//! The legacy portfolio-level risk manager ([`crate::legacy_risk`]) is kept
//! as a separate, off-hot-path component wired only into supervisor
//! reporting; see that module's doc comment and `DESIGN.md` for why it is
//! not consulted here.

pub const NUM_STRATEGIES: usize = 3;
const MAX_EXPOSURE_ENTRIES: usize = 50;
const MAX_LIQUIDITY_ENTRIES: usize = 100;

const MICRO_BURST_NS: u64 = 50_000_000;
const ONE_SECOND_NS: u64 = 1_000_000_000;
const ONE_MINUTE_NS: u64 = 60 * ONE_SECOND_NS;
const ONE_DAY_NS: u64 = 86_400_000_000_000; // 86.4e12, per the contract.

const MICRO_BURST_LIMIT: u64 = 20;
const PER_SECOND_LIMIT: u64 = 500;
const PER_MINUTE_LIMIT: u64 = 20_000;
const PER_DAY_LIMIT: u64 = 1_000_000;

const CIRCUIT_BREAKER_OVERRIDE_POOL: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketRegime {
    LowVol,
    Normal,
    HighVol,
    Extreme,
}

impl MarketRegime {
    fn from_signals(volatility_1m: f64, avg_spread_bps: f64) -> Self {
        if volatility_1m < 5.0 && avg_spread_bps < 5.0 {
            Self::LowVol
        } else if volatility_1m < 20.0 && avg_spread_bps < 20.0 {
            Self::Normal
        } else if volatility_1m < 50.0 && avg_spread_bps < 50.0 {
            Self::HighVol
        } else {
            Self::Extreme
        }
    }

    fn position_multiplier(self) -> f64 {
        match self {
            Self::LowVol => 1.3,
            Self::Normal => 1.0,
            Self::HighVol => 0.7,
            Self::Extreme => 0.3,
        }
    }

    fn spread_floor_multiplier(self) -> f64 {
        match self {
            Self::HighVol => 1.3,
            Self::LowVol => 0.9,
            Self::Normal | Self::Extreme => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StrategySlot {
    pub enabled: bool,
    pub priority: u8,
    pub max_position_usd: f64,
    pub min_profit_usd: f64,
    pub current_multiplier: f64,
    pub total_trades: u64,
    pub winning_trades: u64,
    pub cumulative_pnl: f64,
}

impl Default for StrategySlot {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 1,
            max_position_usd: 10_000.0,
            min_profit_usd: 1.0,
            current_multiplier: 1.0,
            total_trades: 0,
            winning_trades: 0,
            cumulative_pnl: 0.0,
        }
    }
}

impl StrategySlot {
    fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            self.winning_trades as f64 / self.total_trades as f64
        }
    }
}

struct TimeWindow {
    count: u64,
    window_start_ns: u64,
}

impl TimeWindow {
    fn new() -> Self {
        Self { count: 0, window_start_ns: 0 }
    }

    /// Advances the window anchor if elapsed, then returns the (possibly
    /// reset) current count without incrementing it.
    fn advance(&mut self, now_ns: u64, duration_ns: u64) -> u64 {
        if now_ns.saturating_sub(self.window_start_ns) >= duration_ns {
            self.count = 0;
            self.window_start_ns = now_ns;
        }
        self.count
    }

    fn increment(&mut self) {
        self.count += 1;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ExposureEntry {
    symbol: [u8; 12],
    net: f64,
    long: f64,
    short: f64,
    hedged: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct LiquidityEntry {
    symbol: [u8; 12],
    venue: [u8; 8],
    max_safe_size_usd: f64,
}

struct CircuitBreaker {
    active: bool,
    overrides_left: u32,
    triggered_at_cycles: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    StrategyDisabled,
    PerSecondLimit,
    PerMinuteLimit,
    PerDayLimit,
    PositionCap,
    SpreadFloor,
    LowPriority,
    ProfitFloor,
    NetExposure,
    CircuitBreaker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Admit,
    Reject(RejectReason),
}

/// Per-engine aggregate risk state.
pub struct RiskState {
    pub balance_usd: f64,
    pub initial_balance_usd: f64,
    today_pnl: f64,
    orders_today: u64,
    day_bucket: u64,
    strategies: [StrategySlot; NUM_STRATEGIES],
    micro_burst: TimeWindow,
    per_second: TimeWindow,
    per_minute: TimeWindow,
    regime: MarketRegime,
    regime_since_cycles: u64,
    exposures: Vec<ExposureEntry>,
    liquidity: Vec<LiquidityEntry>,
    breaker: CircuitBreaker,
    win_streak: u32,
    loss_streak: u32,
    latency_ema_us: f64,
    sub_10us_trades: u64,
}

impl RiskState {
    pub fn new(initial_balance_usd: f64, strategies: [StrategySlot; NUM_STRATEGIES]) -> Self {
        Self {
            balance_usd: initial_balance_usd,
            initial_balance_usd,
            today_pnl: 0.0,
            orders_today: 0,
            day_bucket: 0,
            strategies,
            micro_burst: TimeWindow::new(),
            per_second: TimeWindow::new(),
            per_minute: TimeWindow::new(),
            regime: MarketRegime::Normal,
            regime_since_cycles: 0,
            exposures: Vec::with_capacity(MAX_EXPOSURE_ENTRIES),
            liquidity: Vec::with_capacity(MAX_LIQUIDITY_ENTRIES),
            breaker: CircuitBreaker {
                active: false,
                overrides_left: CIRCUIT_BREAKER_OVERRIDE_POOL,
                triggered_at_cycles: 0,
            },
            win_streak: 0,
            loss_streak: 0,
            latency_ema_us: 0.0,
            sub_10us_trades: 0,
        }
    }

    pub fn strategy(&self, id: usize) -> &StrategySlot {
        &self.strategies[id]
    }

    pub fn set_breaker_active(&mut self, active: bool, now_cycles: u64) {
        self.breaker.active = active;
        if active {
            self.breaker.triggered_at_cycles = now_cycles;
        }
    }

    pub fn orders_today(&self) -> u64 {
        self.orders_today
    }

    pub fn overrides_left(&self) -> u32 {
        self.breaker.overrides_left
    }

    /// Resets per-day counters, today's PnL, override pool, and every
    /// strategy multiplier. Triggered automatically inside `check` when the
    /// day bucket changes.
    pub fn reset_daily(&mut self) {
        self.orders_today = 0;
        self.today_pnl = 0.0;
        self.breaker.overrides_left = CIRCUIT_BREAKER_OVERRIDE_POOL;
        for s in &mut self.strategies {
            s.current_multiplier = 1.0;
        }
    }

    fn maybe_reset_daily(&mut self, now_ns: u64) {
        let bucket = now_ns / ONE_DAY_NS;
        if bucket != self.day_bucket {
            self.reset_daily();
            self.day_bucket = bucket;
        }
    }

    /// Folds a closed trade's outcome into the aggregate state.
    pub fn record_trade(&mut self, strategy_id: usize, pnl: f64, latency_us: f64) {
        let s = &mut self.strategies[strategy_id];
        s.total_trades += 1;
        if pnl > 0.0 {
            s.winning_trades += 1;
            self.win_streak += 1;
            self.loss_streak = 0;
        } else {
            self.loss_streak += 1;
            self.win_streak = 0;
        }
        s.cumulative_pnl += pnl;
        self.balance_usd += pnl;
        self.today_pnl += pnl;
        self.latency_ema_us = 0.95 * self.latency_ema_us + 0.05 * latency_us;
        if latency_us < 10.0 {
            self.sub_10us_trades += 1;
        }
    }

    pub fn update_regime(&mut self, volatility_1m: f64, avg_spread_bps: f64, now_cycles: u64) {
        let new_regime = MarketRegime::from_signals(volatility_1m, avg_spread_bps);
        if new_regime != self.regime {
            self.regime = new_regime;
            self.regime_since_cycles = now_cycles;
        }
    }

    pub fn update_net_exposure(&mut self, symbol: &str, qty: f64, is_buy: bool) {
        let key = crate::quote::pack_bytes::<12>(symbol);
        let entry = match self.exposures.iter_mut().find(|e| e.symbol == key) {
            Some(e) => e,
            None => {
                if self.exposures.len() >= MAX_EXPOSURE_ENTRIES {
                    self.exposures.remove(0);
                }
                self.exposures.push(ExposureEntry { symbol: key, ..Default::default() });
                self.exposures.last_mut().unwrap()
            }
        };
        if is_buy {
            entry.long += qty;
            entry.net += qty;
        } else {
            entry.short += qty;
            entry.net -= qty;
        }
        let scale = entry.long.max(entry.short);
        entry.hedged = scale > 0.0 && entry.net.abs() < 0.01 * scale;
    }

    fn current_net_exposure(&self, symbol: &str) -> f64 {
        let key = crate::quote::pack_bytes::<12>(symbol);
        self.exposures.iter().find(|e| e.symbol == key).map(|e| e.net).unwrap_or(0.0)
    }

    pub fn update_liquidity(&mut self, symbol: &str, venue: &str, bid_vol: f64, ask_vol: f64) {
        let sym_key = crate::quote::pack_bytes::<12>(symbol);
        let venue_key = crate::quote::pack_bytes::<8>(venue);
        let max_safe_size_usd = 0.1 * bid_vol.min(ask_vol);
        if let Some(e) = self.liquidity.iter_mut().find(|e| e.symbol == sym_key && e.venue == venue_key) {
            e.max_safe_size_usd = max_safe_size_usd;
        } else {
            if self.liquidity.len() >= MAX_LIQUIDITY_ENTRIES {
                self.liquidity.remove(0);
            }
            self.liquidity.push(LiquidityEntry { symbol: sym_key, venue: venue_key, max_safe_size_usd });
        }
    }

    /// Liquidity headroom relative to an order's notional, `1.0` meaning
    /// exactly enough safe depth, capped at `2.0`; unseen (symbol, venue)
    /// pairs default to a neutral `1.0`.
    fn liquidity_ratio(&self, symbol: &str, venue: &str, order_value: f64) -> f64 {
        if order_value <= 0.0 {
            return 1.0;
        }
        let sym_key = crate::quote::pack_bytes::<12>(symbol);
        let venue_key = crate::quote::pack_bytes::<8>(venue);
        match self.liquidity.iter().find(|e| e.symbol == sym_key && e.venue == venue_key) {
            Some(e) => (e.max_safe_size_usd / order_value).min(2.0),
            None => 1.0,
        }
    }
}

/// Arguments to [`RiskGate::check`], grouped since the contract has nine.
pub struct CandidateOrder<'a> {
    pub strategy_id: usize,
    pub symbol: &'a str,
    pub buy_venue: &'a str,
    pub sell_venue: &'a str,
    pub qty: f64,
    pub buy_px: f64,
    pub sell_px: f64,
    pub detected_cycles: u64,
    pub latency_us: f64,
    pub now_ns: u64,
}

/// The nine-step validator. Holds no state of its own beyond what it
/// mutates in the [`RiskState`] it's given.
pub struct RiskGate;

impl RiskGate {
    /// Runs the nine-step evaluation against `state`, in order, short-
    /// circuiting at the first rejection. On admission, every time-window
    /// counter is advanced and the adaptive multiplier is applied.
    pub fn check(state: &mut RiskState, order: &CandidateOrder<'_>) -> CheckOutcome {
        state.maybe_reset_daily(order.now_ns);

        // 1. Strategy live.
        if order.strategy_id >= NUM_STRATEGIES || !state.strategies[order.strategy_id].enabled {
            return CheckOutcome::Reject(RejectReason::StrategyDisabled);
        }

        // 2. Time windows.
        let micro_count = state.micro_burst.advance(order.now_ns, MICRO_BURST_NS);
        if micro_count >= MICRO_BURST_LIMIT {
            tracing::warn!(strategy = order.strategy_id, "micro-burst rate soft limit exceeded");
        }
        let per_second_count = state.per_second.advance(order.now_ns, ONE_SECOND_NS);
        if per_second_count >= PER_SECOND_LIMIT {
            return CheckOutcome::Reject(RejectReason::PerSecondLimit);
        }
        let per_minute_count = state.per_minute.advance(order.now_ns, ONE_MINUTE_NS);
        if per_minute_count >= PER_MINUTE_LIMIT {
            return CheckOutcome::Reject(RejectReason::PerMinuteLimit);
        }
        if state.orders_today >= PER_DAY_LIMIT {
            return CheckOutcome::Reject(RejectReason::PerDayLimit);
        }

        let cross_venue = order.buy_venue != order.sell_venue;
        let order_value = order.qty * order.buy_px;

        // 3. Position cap.
        let strategy = state.strategies[order.strategy_id];
        let latency_bonus = if order.latency_us < 10.0 {
            1.5
        } else if order.latency_us < 50.0 {
            1.2
        } else {
            1.0
        };
        let adjusted_cap = strategy.max_position_usd
            * strategy.current_multiplier
            * latency_bonus
            * state.regime.position_multiplier();
        if order_value > adjusted_cap {
            return CheckOutcome::Reject(RejectReason::PositionCap);
        }

        // 4. Spread floor.
        let spread_bps = (order.sell_px - order.buy_px) / order.buy_px * 10_000.0;
        let base_floor = if order.symbol.contains("BTC") {
            4.0
        } else if cross_venue {
            8.0
        } else {
            6.0
        };
        let liquidity_ratio = state.liquidity_ratio(order.symbol, order.buy_venue, order_value);
        let mut floor = base_floor;
        if liquidity_ratio > 0.8 {
            floor *= 0.75;
        }
        floor *= state.regime.spread_floor_multiplier();
        let net_spread_bps = spread_bps - 2.0 * 10.0 - 2.0;
        if net_spread_bps < floor {
            return CheckOutcome::Reject(RejectReason::SpreadFloor);
        }

        // 5. Priority triage.
        let priority = if spread_bps >= 25.0 {
            0
        } else if spread_bps >= 20.0 {
            1
        } else if spread_bps >= 15.0 {
            2
        } else {
            3
        };
        if priority == 3 && liquidity_ratio < 0.7 {
            return CheckOutcome::Reject(RejectReason::LowPriority);
        }

        // 6. Profit floor.
        let expected_profit = net_spread_bps / 10_000.0 * order_value;
        if expected_profit < strategy.min_profit_usd {
            return CheckOutcome::Reject(RejectReason::ProfitFloor);
        }

        // 7. Net exposure.
        if !cross_venue {
            let hypothetical = (state.current_net_exposure(order.symbol) + order.qty).abs();
            if hypothetical > 5.0 * state.balance_usd {
                return CheckOutcome::Reject(RejectReason::NetExposure);
            }
        }

        // 8. Circuit breaker.
        if state.breaker.active {
            if cross_venue && expected_profit >= 2.0 * strategy.min_profit_usd {
                if state.breaker.overrides_left == 0 {
                    return CheckOutcome::Reject(RejectReason::CircuitBreaker);
                }
                state.breaker.overrides_left -= 1;
            } else {
                return CheckOutcome::Reject(RejectReason::CircuitBreaker);
            }
        }

        // 9. Adaptive multiplier, applied on admission.
        let s = &mut state.strategies[order.strategy_id];
        if s.total_trades >= 100 {
            let win_rate = s.win_rate();
            if win_rate > 0.75 && s.cumulative_pnl > 0.0 {
                s.current_multiplier = (s.current_multiplier * 1.01).min(2.0);
            } else if win_rate < 0.50 || s.cumulative_pnl < -100.0 {
                s.current_multiplier = (s.current_multiplier * 0.99).max(0.5);
            }
        }

        state.micro_burst.increment();
        state.per_second.increment();
        state.per_minute.increment();
        state.orders_today += 1;

        CheckOutcome::Admit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategies() -> [StrategySlot; NUM_STRATEGIES] {
        [StrategySlot::default(), StrategySlot::default(), StrategySlot::default()]
    }

    fn order(now_ns: u64) -> CandidateOrder<'static> {
        CandidateOrder {
            strategy_id: 0,
            symbol: "BTCUSD",
            buy_venue: "spot",
            sell_venue: "perp",
            qty: 0.2,
            buy_px: 50000.0,
            sell_px: 50200.0, // 40 bps spread
            detected_cycles: 0,
            latency_us: 5.0,
            now_ns,
        }
    }

    #[test]
    fn admits_a_clean_candidate() {
        let mut state = RiskState::new(100_000.0, strategies());
        let outcome = RiskGate::check(&mut state, &order(1_000_000_000));
        assert_eq!(outcome, CheckOutcome::Admit);
    }

    #[test]
    fn rejects_disabled_strategy() {
        let mut strats = strategies();
        strats[0].enabled = false;
        let mut state = RiskState::new(100_000.0, strats);
        let outcome = RiskGate::check(&mut state, &order(1));
        assert_eq!(outcome, CheckOutcome::Reject(RejectReason::StrategyDisabled));
    }

    #[test]
    fn scenario_4_per_second_limit() {
        let mut state = RiskState::new(1_000_000.0, strategies());
        for _ in 0..PER_SECOND_LIMIT {
            let outcome = RiskGate::check(&mut state, &order(1_000_000_000));
            assert_eq!(outcome, CheckOutcome::Admit);
        }
        let rejected = RiskGate::check(&mut state, &order(1_000_000_000));
        assert_eq!(rejected, CheckOutcome::Reject(RejectReason::PerSecondLimit));
        let next_second = RiskGate::check(&mut state, &order(2_000_000_000));
        assert_eq!(next_second, CheckOutcome::Admit);
    }

    #[test]
    fn scenario_5_circuit_breaker_override() {
        let mut state = RiskState::new(1_000_000.0, strategies());
        state.set_breaker_active(true, 0);
        state.breaker.overrides_left = 1;
        let mut candidate = order(1_000_000_000);
        candidate.buy_venue = "spot";
        candidate.sell_venue = "perp";
        // expected_profit = net_spread_bps/10000 * order_value must be >= 2*min_profit_usd.
        let outcome = RiskGate::check(&mut state, &candidate);
        assert_eq!(outcome, CheckOutcome::Admit);
        assert_eq!(state.overrides_left(), 0);
        let rejected = RiskGate::check(&mut state, &candidate);
        assert_eq!(rejected, CheckOutcome::Reject(RejectReason::CircuitBreaker));
    }

    #[test]
    fn scenario_6_daily_reset() {
        let mut state = RiskState::new(1_000_000.0, strategies());
        state.orders_today = PER_DAY_LIMIT;
        state.strategies[0].current_multiplier = 1.77;
        state.breaker.overrides_left = 3;
        let next_day_ns = ONE_DAY_NS + 1;
        let outcome = RiskGate::check(&mut state, &order(next_day_ns));
        assert_eq!(outcome, CheckOutcome::Admit);
        assert_eq!(state.orders_today(), 1);
        assert_eq!(state.strategies[0].current_multiplier, 1.0);
        assert_eq!(state.overrides_left(), CIRCUIT_BREAKER_OVERRIDE_POOL);
    }

    #[test]
    fn multiplier_always_stays_in_bounds() {
        let mut strats = strategies();
        strats[0].total_trades = 200;
        strats[0].winning_trades = 190;
        strats[0].cumulative_pnl = 500.0;
        strats[0].current_multiplier = 1.999;
        let mut state = RiskState::new(1_000_000.0, strats);
        for i in 0..50 {
            RiskGate::check(&mut state, &order(1_000_000_000 + i));
            assert!(state.strategy(0).current_multiplier >= 0.5);
            assert!(state.strategy(0).current_multiplier <= 2.0);
        }
    }

    #[test]
    fn record_trade_keeps_winning_le_total_and_balance_matches_pnl_sum() {
        let mut state = RiskState::new(1_000_000.0, strategies());
        let pnls = [10.0, -5.0, 20.0, -3.0];
        for &pnl in &pnls {
            state.record_trade(0, pnl, 8.0);
        }
        assert!(state.strategy(0).winning_trades <= state.strategy(0).total_trades);
        let sum: f64 = pnls.iter().sum();
        assert!((state.balance_usd - state.initial_balance_usd - sum).abs() < 1e-9);
    }
}
