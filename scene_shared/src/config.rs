//! Configuration system.
//!
//! Loads server configuration from JSON strings/files. Every field has a
//! default, so a partial file is valid.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::protocol::Dialect;

/// Root server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, e.g. `0.0.0.0:8765`.
    pub server_addr: String,
    /// Scheduler rate.
    pub tick_hz: u32,
    /// Push a `world_state` every tick, or fan out command events.
    pub sync_mode: Dialect,
    /// Start with the default red cube `cube_0`.
    pub seed_default_entity: bool,
    /// Reply to protocol/command errors on the offending session.
    pub reply_errors: bool,
    /// Text of the `hello` greeting.
    pub greeting: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: "0.0.0.0:8765".to_string(),
            tick_hz: 30,
            sync_mode: Dialect::Push,
            seed_default_entity: true,
            reply_errors: true,
            greeting: "Welcome to T-R-A-V-I core".to_string(),
        }
    }
}

impl ServerConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    /// Tick period; a zero rate is treated as 1 Hz.
    pub fn tick_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / f64::from(self.tick_hz.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = ServerConfig::from_json_str(r#"{"tick_hz": 60, "sync_mode": "command"}"#).unwrap();
        assert_eq!(cfg.tick_hz, 60);
        assert_eq!(cfg.sync_mode, Dialect::Command);
        assert_eq!(cfg.server_addr, "0.0.0.0:8765");
        assert!(cfg.seed_default_entity);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(ServerConfig::from_json_str(r#"{"sync_mode": "gossip"}"#).is_err());
    }

    #[test]
    fn tick_period_matches_rate() {
        let cfg = ServerConfig::default();
        assert!((cfg.tick_period().as_secs_f64() - 1.0 / 30.0).abs() < 1e-9);
        let cfg = ServerConfig {
            tick_hz: 0,
            ..Default::default()
        };
        assert_eq!(cfg.tick_period().as_secs(), 1);
    }
}
