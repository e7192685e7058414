//! Consensus Configuration
//!
//! Witness list, slot timing and confirmation policy. Loaded once at
//! startup from TOML and validated before any block is processed.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("witness list is empty")]
    NoWitnesses,
    #[error("witness {0} is listed more than once")]
    DuplicateWitness(String),
    #[error("slot duration must be positive")]
    ZeroSlotDuration,
    #[error("tx_per_block must be positive")]
    ZeroTxPerBlock,
    #[error("notify_capacity must be positive")]
    ZeroNotifyCapacity,
    #[error("confirm threshold {threshold} must be in 1..={witnesses}")]
    ThresholdOutOfRange { threshold: usize, witnesses: usize },
    #[error("failed to read consensus config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse consensus config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize consensus config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Ordered witness account ids. Order defines the round-robin schedule.
    pub witnesses: Vec<String>,

    /// Slot length in milliseconds
    #[serde(default = "default_slot_duration_ms")]
    pub slot_duration_ms: u64,

    /// Distinct-witness run length needed to confirm a block.
    /// None means ceil(2N/3).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_threshold: Option<usize>,

    /// Maximum transactions per produced block
    #[serde(default = "default_tx_per_block")]
    pub tx_per_block: usize,

    /// Capacity of the confirmed-block notification queue
    #[serde(default = "default_notify_capacity")]
    pub notify_capacity: usize,

    /// How long promotion waits on a full notification queue before dropping the event (ms)
    #[serde(default = "default_notify_timeout_ms")]
    pub notify_timeout_ms: u64,

    /// Detached blocks held while waiting for their parent
    #[serde(default = "default_orphan_capacity")]
    pub orphan_capacity: usize,

    /// Side branches whose tip trails the longest tip by more than this are dropped
    #[serde(default = "default_stale_fork_depth")]
    pub stale_fork_depth: u64,
}

fn default_slot_duration_ms() -> u64 {
    3_000
}
fn default_tx_per_block() -> usize {
    100
}
fn default_notify_capacity() -> usize {
    1_024
}
fn default_notify_timeout_ms() -> u64 {
    2_000
}
fn default_orphan_capacity() -> usize {
    512
}
fn default_stale_fork_depth() -> u64 {
    64
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            witnesses: Vec::new(),
            slot_duration_ms: default_slot_duration_ms(),
            confirm_threshold: None,
            tx_per_block: default_tx_per_block(),
            notify_capacity: default_notify_capacity(),
            notify_timeout_ms: default_notify_timeout_ms(),
            orphan_capacity: default_orphan_capacity(),
            stale_fork_depth: default_stale_fork_depth(),
        }
    }
}

impl ConsensusConfig {
    pub fn with_witnesses<I, S>(witnesses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            witnesses: witnesses.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ConsensusConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.witnesses.is_empty() {
            return Err(ConfigError::NoWitnesses);
        }
        let mut seen = HashSet::with_capacity(self.witnesses.len());
        for w in &self.witnesses {
            if !seen.insert(w.as_str()) {
                return Err(ConfigError::DuplicateWitness(w.clone()));
            }
        }
        if self.slot_duration_ms == 0 {
            return Err(ConfigError::ZeroSlotDuration);
        }
        if self.tx_per_block == 0 {
            return Err(ConfigError::ZeroTxPerBlock);
        }
        if self.notify_capacity == 0 {
            return Err(ConfigError::ZeroNotifyCapacity);
        }
        if let Some(threshold) = self.confirm_threshold {
            if threshold == 0 || threshold > self.witnesses.len() {
                return Err(ConfigError::ThresholdOutOfRange {
                    threshold,
                    witnesses: self.witnesses.len(),
                });
            }
        }
        Ok(())
    }

    /// Effective confirmation threshold: the override, or ceil(2N/3).
    pub fn confirm_threshold(&self) -> usize {
        self.confirm_threshold
            .unwrap_or_else(|| default_confirm_threshold(self.witnesses.len()))
    }

    pub fn slot_duration(&self) -> Duration {
        Duration::from_millis(self.slot_duration_ms)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }
}

/// ceil(2N/3), never below 1.
pub fn default_confirm_threshold(witnesses: usize) -> usize {
    (2 * witnesses).div_ceil(3).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_two_thirds_rounded_up() {
        assert_eq!(default_confirm_threshold(1), 1);
        assert_eq!(default_confirm_threshold(2), 2);
        assert_eq!(default_confirm_threshold(3), 2);
        assert_eq!(default_confirm_threshold(4), 3);
        assert_eq!(default_confirm_threshold(21), 14);
    }

    #[test]
    fn toml_defaults_fill_missing_fields() {
        let cfg = ConsensusConfig::from_toml_str(r#"witnesses = ["a", "b", "c"]"#).unwrap();
        assert_eq!(cfg.slot_duration_ms, 3_000);
        assert_eq!(cfg.tx_per_block, 100);
        assert_eq!(cfg.confirm_threshold(), 2);
        assert_eq!(cfg.slot_duration(), Duration::from_secs(3));
    }

    #[test]
    fn override_threshold() {
        let cfg = ConsensusConfig::from_toml_str(
            r#"
            witnesses = ["a", "b", "c"]
            confirm_threshold = 3
            slot_duration_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(cfg.confirm_threshold(), 3);
        assert_eq!(cfg.slot_duration_ms, 500);
    }

    #[test]
    fn invalid_configs_fail_fast() {
        assert!(matches!(
            ConsensusConfig::from_toml_str("witnesses = []"),
            Err(ConfigError::NoWitnesses)
        ));
        assert!(matches!(
            ConsensusConfig::from_toml_str(r#"witnesses = ["a", "a"]"#),
            Err(ConfigError::DuplicateWitness(w)) if w == "a"
        ));
        assert!(matches!(
            ConsensusConfig::from_toml_str("witnesses = [\"a\"]\nslot_duration_ms = 0"),
            Err(ConfigError::ZeroSlotDuration)
        ));
        assert!(matches!(
            ConsensusConfig::from_toml_str("witnesses = [\"a\"]\nconfirm_threshold = 2"),
            Err(ConfigError::ThresholdOutOfRange { threshold: 2, witnesses: 1 })
        ));
        assert!(matches!(
            ConsensusConfig::from_toml_str("witnesses = 5"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("consensus.toml");
        let cfg = ConsensusConfig::with_witnesses(["x", "y"]);
        cfg.save(&path).unwrap();
        assert_eq!(ConsensusConfig::load(&path).unwrap(), cfg);
    }
}
