//! Witness schedule: slot arithmetic and round-robin turn-taking
//!
//! Every node holding the same witness list and slot duration maps a given
//! time to the same witness. Nothing here reads the clock except
//! [`Timestamp::now`].

use crate::block::BlockHeader;
use crate::config::{ConfigError, ConsensusConfig};
use crate::identity::AccountId;
use std::collections::HashSet;
use std::time::Duration;

/// A slot index: floor(unix_millis / slot_duration).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub slot: i64,
}

impl Timestamp {
    pub fn new(slot: i64) -> Self {
        Self { slot }
    }

    pub fn from_unix_millis(ms: i64, slot_ms: u64) -> Self {
        Self {
            slot: ms.div_euclid(slot_ms.max(1) as i64),
        }
    }

    pub fn now(slot_ms: u64) -> Self {
        Self::from_unix_millis(now_unix_millis(), slot_ms)
    }

    /// Wall-clock start of this slot.
    pub fn start_millis(&self, slot_ms: u64) -> i64 {
        self.slot.saturating_mul(slot_ms as i64)
    }
}

pub fn now_unix_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Time left until the next slot boundary after `now_ms`.
pub fn time_until_next_slot(now_ms: i64, slot_ms: u64) -> Duration {
    let slot_ms = slot_ms.max(1) as i64;
    let into_slot = now_ms.rem_euclid(slot_ms);
    Duration::from_millis((slot_ms - into_slot) as u64)
}

/// Immutable per-node scheduling configuration.
#[derive(Debug, Clone)]
pub struct StaticProperty {
    witness_list: Vec<AccountId>,
    slot_ms: u64,
}

impl StaticProperty {
    pub fn new(witness_list: Vec<AccountId>, slot_duration: Duration) -> Result<Self, ConfigError> {
        if witness_list.is_empty() {
            return Err(ConfigError::NoWitnesses);
        }
        let mut seen = HashSet::with_capacity(witness_list.len());
        for w in &witness_list {
            if !seen.insert(w) {
                return Err(ConfigError::DuplicateWitness(w.to_string()));
            }
        }
        let slot_ms = slot_duration.as_millis() as u64;
        if slot_ms == 0 {
            return Err(ConfigError::ZeroSlotDuration);
        }
        Ok(Self {
            witness_list,
            slot_ms,
        })
    }

    pub fn from_config(cfg: &ConsensusConfig) -> Result<Self, ConfigError> {
        let list = cfg.witnesses.iter().map(|w| AccountId::new(w.as_str())).collect();
        Self::new(list, cfg.slot_duration())
    }

    pub fn witness_list(&self) -> &[AccountId] {
        &self.witness_list
    }

    pub fn number_of_witnesses(&self) -> usize {
        self.witness_list.len()
    }

    pub fn slot_ms(&self) -> u64 {
        self.slot_ms
    }

    pub fn is_witness(&self, id: &AccountId) -> bool {
        self.witness_list.contains(id)
    }

    /// Round-robin owner of `slot`.
    pub fn witness_of_slot(&self, slot: i64) -> &AccountId {
        let index = slot.rem_euclid(self.witness_list.len() as i64) as usize;
        &self.witness_list[index]
    }
}

/// Mutable slot bookkeeping, owned by the driver and advanced once per
/// admitted block. The fork tree stays authoritative for chain state.
#[derive(Debug, Clone, Default)]
pub struct DynamicProperty {
    pub last_block_number: u64,
    pub last_block_time: Timestamp,
    pub last_block_witness: AccountId,
    /// Slot following the last admitted block.
    pub current_slot: Timestamp,
    /// Owner of `current_slot`.
    pub current_witness: AccountId,
}

impl DynamicProperty {
    /// Record an admitted block. Returns false and leaves the state untouched
    /// if the block's slot is not after the last recorded one.
    pub fn update(&mut self, header: &BlockHeader, sp: &StaticProperty) -> bool {
        if self.last_block_number > 0 && header.time <= self.last_block_time.slot {
            return false;
        }
        self.last_block_number = header.number;
        self.last_block_time = Timestamp::new(header.time);
        self.last_block_witness = header.witness.clone();
        self.current_slot = Timestamp::new(header.time.saturating_add(1));
        self.current_witness = sp.witness_of_slot(self.current_slot.slot).clone();
        true
    }
}

/// Witness expected to produce at `ts`. The mapping depends only on the
/// static property; `_dp` does not affect the result.
pub fn witness_of_time<'a>(
    sp: &'a StaticProperty,
    _dp: &DynamicProperty,
    ts: Timestamp,
) -> &'a AccountId {
    sp.witness_of_slot(ts.slot)
}
