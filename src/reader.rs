//! C10 — reader loop.
//!
//! Round-robins `poll` across every venue session. On a transient error the
//! session is destroyed, the loop sleeps 100ms, and a replacement is
//! spawned in its place; no sleep in the steady state. Runs entirely on one
//! pinned thread (see `supervisor` in `main.rs`).

use crate::error::EngineError;
use crate::funding::FundingRegistry;
use crate::ring::SpscRing;
use crate::timestamp::Timestamp;
use crate::venue::{VenueConfig, VenueSession};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const RECONNECT_BACKOFF: Duration = Duration::from_millis(100);

/// A venue session plus the config needed to recreate it after a transient
/// failure (the session type can't be cloned — it owns a live connection).
enum SessionSlot {
    Spot(VenueConfig),
    Perp(VenueConfig),
}

impl SessionSlot {
    fn spawn(&self) -> VenueSession {
        match self {
            Self::Spot(cfg) => VenueSession::spot(clone_config(cfg)),
            Self::Perp(cfg) => VenueSession::perp(clone_config(cfg)),
        }
    }
}

fn clone_config(cfg: &VenueConfig) -> VenueConfig {
    VenueConfig {
        venue_name: cfg.venue_name,
        ws_url: cfg.ws_url.clone(),
        symbols: cfg.symbols.clone(),
    }
}

pub struct ReaderLoop {
    slots: Vec<SessionSlot>,
    sessions: Vec<Option<VenueSession>>,
}

impl ReaderLoop {
    pub fn new(spot: VenueConfig, perp: VenueConfig) -> Self {
        Self {
            slots: vec![SessionSlot::Spot(spot), SessionSlot::Perp(perp)],
            sessions: vec![None, None],
        }
    }

    /// Brings up every session once before entering the polling rotation.
    pub async fn start(&mut self) {
        for (i, slot) in self.slots.iter().enumerate() {
            let mut session = slot.spawn();
            if let Err(e) = session.start().await {
                tracing::warn!(error = %e, "venue session failed to start");
            }
            self.sessions[i] = Some(session);
        }
    }

    /// Runs until `running` clears. Cooperative cancellation, checked once
    /// per rotation, matching the matcher's own termination check.
    pub async fn run(
        &mut self,
        out_ring: Arc<SpscRing>,
        funding: Arc<FundingRegistry>,
        timestamp: Arc<Timestamp>,
        running: Arc<AtomicBool>,
    ) {
        while running.load(Ordering::Relaxed) {
            for i in 0..self.sessions.len() {
                let outcome = {
                    let session = match self.sessions[i].as_mut() {
                        Some(s) => s,
                        None => continue,
                    };
                    session.poll(&out_ring, &funding, &timestamp).await
                };

                if let Err(e) = outcome {
                    match e {
                        EngineError::CapacityFull => {
                            // counted upstream via header stats, no per-event log line.
                        }
                        EngineError::Transient(_) => {
                            tracing::warn!(slot = i, error = %e, "venue session transient failure, recreating");
                            if let Some(mut session) = self.sessions[i].take() {
                                session.shutdown().await;
                            }
                            tokio::time::sleep(RECONNECT_BACKOFF).await;
                            let mut fresh = self.slots[i].spawn();
                            if let Err(e) = fresh.start().await {
                                tracing::warn!(slot = i, error = %e, "venue session restart failed");
                            }
                            self.sessions[i] = Some(fresh);
                        }
                        EngineError::Fatal(_) | EngineError::Configuration(_) => {
                            tracing::warn!(slot = i, error = %e, "venue session fatal error, disabling slot");
                            self.sessions[i] = None;
                        }
                    }
                }
            }
        }
        for session in self.sessions.iter_mut().flatten() {
            session.shutdown().await;
        }
    }
}
