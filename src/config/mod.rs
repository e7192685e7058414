//! Node configuration

pub mod consensus;

pub use consensus::{default_confirm_threshold, ConfigError, ConsensusConfig};
