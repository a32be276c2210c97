//! Consilium configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use crate::consensus::ConsensusConfig;
use consilium_agents::{InstructionConfig, ScoringConfig, SelectionConfig};
use consilium_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsiliumConfig {
    /// Complexity dimension weights, urgency multipliers and worker-count steps.
    pub scoring: ScoringConfig,
    /// Agent selection bounds and escalation thresholds.
    pub selection: SelectionConfig,
    /// Submission timeout computation.
    pub instructions: InstructionConfig,
    /// Aggregation thresholds and failed-worker policy.
    pub consensus: ConsensusConfig,
    /// Task retention and polling defaults.
    pub tracker: TrackerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Terminal tasks older than this are eligible for removal.
    pub retention_secs: u64,
    /// How often the background sweeper runs `gc`. 0 disables the sweeper.
    pub sweep_interval_secs: u64,
    /// Prefix of the poll URL handed back to callers; the task id is appended.
    pub poll_url_base: String,
    pub default_poll_interval_ms: u64,
    pub default_max_attempts: u32,
    /// Interval at which the deadline watcher refreshes in-flight tasks.
    pub watch_interval_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            retention_secs: 3_600,
            sweep_interval_secs: 300,
            poll_url_base: "/api/consultations".into(),
            default_poll_interval_ms: 2_000,
            default_max_attempts: 60,
            watch_interval_ms: 1_000,
        }
    }
}

impl TrackerConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn poll_url(&self, task_id: &str) -> String {
        format!("{}/{}", self.poll_url_base.trim_end_matches('/'), task_id)
    }
}

impl ConsiliumConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load {}: {} - using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {} - using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Parse and validate, surfacing errors instead of falling back.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        self.scoring.validate()?;
        self.selection.validate()?;
        self.instructions.validate()?;
        self.consensus.validate()?;
        if self.tracker.watch_interval_ms == 0 {
            return Err(Error::Config("tracker.watch_interval_ms must be positive".into()));
        }
        Ok(())
    }
}
