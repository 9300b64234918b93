//! Configuration document (§6) and CLI surface.
//!
//! Grounded on the original `EngineConfig`/`StrategyConfig`
//! (`main.c` lines 35-49) for the shape, and on the teacher's
//! serde-backed config-with-defaults pattern. Unknown JSON keys are
//! ignored; missing keys default per field.

use crate::error::EngineError;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub min_spread_bps: Option<f64>,
    #[serde(default)]
    pub best_pairs_only: Option<bool>,
    #[serde(default)]
    pub realistic_only: Option<bool>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 1,
            min_spread_bps: None,
            best_pairs_only: None,
            realistic_only: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_priority() -> u8 {
    1
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StrategyConfigSet {
    #[serde(default)]
    pub statistical: StrategyConfig,
    #[serde(default)]
    pub cross_exchange: StrategyConfig,
    #[serde(default)]
    pub triangular: StrategyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_capital")]
    pub capital_usd: f64,
    #[serde(default = "default_true")]
    pub paper_mode: bool,
    #[serde(default)]
    pub strategies: StrategyConfigSet,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capital_usd: default_capital(),
            paper_mode: true,
            strategies: StrategyConfigSet::default(),
        }
    }
}

fn default_capital() -> f64 {
    1000.0
}

impl EngineConfig {
    /// Loads and validates the JSON configuration document at `path`.
    /// Fails fast on malformed JSON, matching `main.c`'s getopt-driven
    /// startup-or-abort behavior for a bad config file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Configuration(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&text).map_err(|e| EngineError::Configuration(format!("invalid config: {e}")))
    }
}

/// CLI surface: `-c <path>`, `-p 0|1`, `-h`.
#[derive(Debug, clap::Parser)]
#[command(name = "draizer", about = "Ultra-low-latency market-data ingestion and arbitrage engine")]
pub struct Cli {
    /// Configuration file path (JSON document).
    #[arg(short = 'c', long = "config")]
    pub config: Option<std::path::PathBuf>,

    /// Paper/live toggle: 0 = live, 1 = paper (default paper).
    #[arg(short = 'p', long = "paper")]
    pub paper: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_object_is_empty() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.capital_usd, 1000.0);
        assert!(cfg.paper_mode);
        assert!(cfg.strategies.statistical.enabled);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"capital_usd": 5000, "bogus_field": 42}"#).unwrap();
        assert_eq!(cfg.capital_usd, 5000.0);
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let err = EngineConfig::load(Path::new("/nonexistent/path.json")).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }
}
