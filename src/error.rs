//! Error taxonomy for the engine.
//!
//! Mirrors `edge/wire.rs::EdgeWireError` in shape: a small `Display` +
//! `std::error::Error` enum used wherever a caller needs to branch on the
//! cause (retry vs. drop vs. abort). `anyhow::Error` is used at the outer
//! CLI boundary in `main.rs`.

use std::fmt;

/// Error taxonomy per the error-handling design: transient I/O, capacity-full,
/// configuration, and fatal. Nothing crosses a thread boundary — every
/// fallible operation is inspected locally by its caller.
#[derive(Debug, Clone)]
pub enum EngineError {
    /// Venue disconnect, parse error on a single frame, back-pressure. Retried.
    Transient(String),
    /// A bounded structure (ring, cache) is full. Counted and dropped.
    CapacityFull,
    /// Missing or invalid configuration. Fails startup with a non-zero exit.
    Configuration(String),
    /// Shared-memory creation, optional CPU affinity / RT scheduling failure.
    Fatal(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(msg) => write!(f, "transient error: {msg}"),
            Self::CapacityFull => write!(f, "capacity full"),
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Self::Fatal(msg) => write!(f, "fatal error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl EngineError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
