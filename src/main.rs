//! C11 — supervisor / lifecycle.
//!
//! Parses the CLI and config, brings up C1/C2/C3/C5/C6/C7/C8 and the venue
//! sessions, spawns the reader loop pinned to one core with real-time
//! scheduling and the matcher loop pinned to another at slightly lower
//! priority, installs a signal handler that flips a `running` flag, and
//! joins both threads on shutdown. Composition root per the redesign note
//! against global singletons: every handle below is constructed here and
//! handed to exactly the loop that owns it — the matcher takes outright
//! ownership of C3/C7/C8, the reader takes `Arc`-shared C1/C2/C5.

use clap::Parser;
use draizer_engine::cache::TopOfBookCache;
use draizer_engine::config::{Cli, EngineConfig, StrategyConfig};
use draizer_engine::detector::{Detector, DetectorCosts};
use draizer_engine::funding::FundingRegistry;
use draizer_engine::ipc::SharedRegion;
use draizer_engine::legacy_risk::RiskManager;
use draizer_engine::matcher::{MatcherLoop, SymbolSlots};
use draizer_engine::reader::ReaderLoop;
use draizer_engine::ring::{SpscRing, DEFAULT_CAPACITY};
use draizer_engine::risk_gate::{RiskState, StrategySlot, NUM_STRATEGIES};
use draizer_engine::timestamp::Timestamp;
use draizer_engine::venue::VenueConfig;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Symbols this engine instance tracks. A production deployment would read
/// this from the config document; kept fixed here since the configuration
/// object does not carry a symbol list.
const TRACKED_SYMBOLS: &[&str] = &["BTCUSD", "ETHUSD"];

/// FIFO real-time priority for the reader thread; the matcher runs one
/// point lower, reflecting that book-ticker ingestion must preempt scanning.
const HIGH_RT_PRIORITY: i32 = 50;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    install_tracing();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path).map_err(|e| {
            tracing::error!(error = %e, "failed to load configuration");
            anyhow::Error::from(e)
        })?,
        None => EngineConfig::default(),
    };
    let paper_mode = cli.paper.map(|p| p != 0).unwrap_or(config.paper_mode);

    tracing::info!(capital_usd = config.capital_usd, paper_mode, "draizer engine starting");

    let timestamp = Arc::new(Timestamp::calibrate());
    let ring = Arc::new(SpscRing::new(DEFAULT_CAPACITY));
    let funding = Arc::new(FundingRegistry::new());

    let mut cache = TopOfBookCache::new();
    let mut symbols = Vec::with_capacity(TRACKED_SYMBOLS.len());
    for &symbol in TRACKED_SYMBOLS {
        let spot_idx = cache
            .find_or_insert(symbol, "spot")
            .ok_or_else(|| anyhow::anyhow!("top-of-book cache full during startup"))?;
        let futures_idx = cache
            .find_or_insert(symbol, "perp")
            .ok_or_else(|| anyhow::anyhow!("top-of-book cache full during startup"))?;
        symbols.push(SymbolSlots { symbol: symbol.to_string(), spot_idx, futures_idx });
    }

    let detector = Detector::new(DetectorCosts::default());

    let strategies: [StrategySlot; NUM_STRATEGIES] = [
        strategy_from_config(&config.strategies.statistical, config.capital_usd),
        strategy_from_config(&config.strategies.cross_exchange, config.capital_usd),
        strategy_from_config(&config.strategies.triangular, config.capital_usd),
    ];
    let risk = RiskState::new(config.capital_usd, strategies);

    let shm_path = PathBuf::from(format!("/dev/shm{}", draizer_engine::ipc::SHM_NAME));
    let shared = SharedRegion::create(&shm_path).map_err(|e| {
        anyhow::anyhow!("failed to create shared-memory region at {}: {e}", shm_path.display())
    })?;
    shared.header_mut().engine_running = 1;

    let running = Arc::new(AtomicBool::new(true));
    install_signal_watcher(Arc::clone(&running));

    let spot_cfg = VenueConfig {
        venue_name: "spot",
        ws_url: "wss://stream.binance.com:9443/ws".to_string(),
        symbols: TRACKED_SYMBOLS.iter().map(|s| s.to_string()).collect(),
    };
    let perp_cfg = VenueConfig {
        venue_name: "perp",
        ws_url: "wss://fstream.binance.com/ws".to_string(),
        symbols: TRACKED_SYMBOLS.iter().map(|s| s.to_string()).collect(),
    };

    let reader_handle = {
        let ring = Arc::clone(&ring);
        let funding = Arc::clone(&funding);
        let timestamp = Arc::clone(&timestamp);
        let running = Arc::clone(&running);
        std::thread::Builder::new()
            .name("draizer-reader".into())
            .spawn(move || {
                pin_and_prioritize(core_affinity::CoreId { id: 0 }, HIGH_RT_PRIORITY);
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build reader-thread tokio runtime");
                rt.block_on(async move {
                    let mut reader = ReaderLoop::new(spot_cfg, perp_cfg);
                    reader.start().await;
                    reader.run(ring, funding, timestamp, running).await;
                });
            })
            .expect("failed to spawn reader thread")
    };

    let matcher_handle = std::thread::Builder::new()
        .name("draizer-matcher".into())
        .spawn(move || {
            pin_and_prioritize(core_affinity::CoreId { id: 1 }, HIGH_RT_PRIORITY - 1);
            let mut matcher = MatcherLoop::new(cache, detector, symbols);
            let mut risk = risk;
            let mut legacy_risk = RiskManager::new(config.capital_usd, 0.5);
            matcher.run(
                ring.as_ref(),
                funding.as_ref(),
                &mut risk,
                &shared,
                timestamp.as_ref(),
                running.as_ref(),
                &mut legacy_risk,
            );
        })
        .expect("failed to spawn matcher thread");

    reader_handle.join().expect("reader thread panicked");
    matcher_handle.join().expect("matcher thread panicked");

    tracing::info!("draizer engine shut down cleanly");
    Ok(())
}

fn strategy_from_config(cfg: &StrategyConfig, capital_usd: f64) -> StrategySlot {
    StrategySlot {
        enabled: cfg.enabled,
        priority: cfg.priority,
        max_position_usd: capital_usd * 0.1,
        min_profit_usd: 1.0,
        current_multiplier: 1.0,
        total_trades: 0,
        winning_trades: 0,
        cumulative_pnl: 0.0,
    }
}

fn install_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Spawns a dedicated thread running a `tokio::signal` watcher that flips
/// `running` to false on SIGINT or SIGTERM, triggering orderly teardown.
fn install_signal_watcher(running: Arc<AtomicBool>) {
    std::thread::Builder::new()
        .name("draizer-signals".into())
        .spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build signal-watcher tokio runtime");
            rt.block_on(async move {
                let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to install SIGTERM handler");
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                tracing::info!("signal received, initiating orderly shutdown");
                running.store(false, Ordering::Relaxed);
            });
        })
        .expect("failed to spawn signal-watcher thread");
}

/// Best-effort CPU pinning and FIFO real-time scheduling. Both are
/// optional per the error taxonomy: failure is logged, never fatal.
fn pin_and_prioritize(core: core_affinity::CoreId, priority: i32) {
    if core_affinity::set_for_current(core) {
        tracing::info!(core = core.id, "pinned thread to core");
    } else {
        tracing::warn!(core = core.id, "failed to pin thread to core");
    }

    #[cfg(target_os = "linux")]
    unsafe {
        let param = libc::sched_param { sched_priority: priority };
        let result = libc::sched_setscheduler(0, libc::SCHED_FIFO, &param);
        if result == 0 {
            tracing::info!(priority, "applied SCHED_FIFO real-time priority");
        } else {
            tracing::warn!(priority, error = %std::io::Error::last_os_error(), "failed to apply real-time scheduling");
        }
    }
}
