//! Block acceptance - the verification boundary for every block
//!
//! All blocks (from the network, local production and sync) are checked by a
//! [`Verifier`] before the fork tree attaches them. The cache only knows the
//! trait; production code plugs in [`BlockVerifier`], tests can plug in any
//! closure `(block, parent, parent_state) -> Result<StatePool, VerifyError>`.

use crate::block::Block;
use crate::consensus::StaticProperty;
use crate::identity::{AccountId, KeyError};
use crate::state::{ExecError, StatePool};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("block {number} does not follow parent height {parent}")]
    HeightMismatch { number: u64, parent: u64 },
    #[error("block {number} does not reference its parent's hash")]
    ParentMismatch { number: u64 },
    #[error("block {number}: slot {slot} is not after parent slot {parent_slot}")]
    SlotNotAfterParent {
        number: u64,
        slot: i64,
        parent_slot: i64,
    },
    #[error("block {number}: {witness} is not scheduled for slot {slot} (expected {expected})")]
    WrongWitness {
        number: u64,
        slot: i64,
        witness: AccountId,
        expected: AccountId,
    },
    #[error("block {number}: tree hash does not match content")]
    TreeHash { number: u64 },
    #[error("block {number}: witness signature: {source}")]
    Signature {
        number: u64,
        #[source]
        source: KeyError,
    },
    #[error("block {number}: {source}")]
    Execution {
        number: u64,
        #[source]
        source: ExecError,
    },
    #[error("block rejected: {0}")]
    Rejected(String),
}

/// Validates a candidate block against its parent and produces the child state.
/// Implementations must be deterministic and must not retain `parent_state` mutably.
pub trait Verifier: Send + Sync {
    fn verify(
        &self,
        block: &Block,
        parent: &Block,
        parent_state: &StatePool,
    ) -> Result<StatePool, VerifyError>;
}

impl<F> Verifier for F
where
    F: Fn(&Block, &Block, &StatePool) -> Result<StatePool, VerifyError> + Send + Sync,
{
    fn verify(
        &self,
        block: &Block,
        parent: &Block,
        parent_state: &StatePool,
    ) -> Result<StatePool, VerifyError> {
        self(block, parent, parent_state)
    }
}

/// Accepts anything that is structurally attached; the state is carried over unchanged.
pub fn pass_through(
    _block: &Block,
    _parent: &Block,
    parent_state: &StatePool,
) -> Result<StatePool, VerifyError> {
    Ok(parent_state.clone())
}

/// Height and hash linkage. The cache runs this before any verifier, so a
/// structural violation is reported exactly like a verification failure.
pub fn check_structure(block: &Block, parent: &Block) -> Result<(), VerifyError> {
    if block.number() != parent.number() + 1 {
        return Err(VerifyError::HeightMismatch {
            number: block.number(),
            parent: parent.number(),
        });
    }
    if block.header.parent_hash != parent.hash() {
        return Err(VerifyError::ParentMismatch {
            number: block.number(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    /// Blocks from the network: witness signature and every tx signature are checked.
    Full,
    /// Blocks this node just built and signed; signature checks are skipped.
    Local,
}

/// Production verifier: slot legitimacy, scheduled witness, tree hash,
/// signatures (in `Full` mode) and transaction execution.
#[derive(Debug, Clone)]
pub struct BlockVerifier {
    schedule: Arc<StaticProperty>,
    mode: VerifyMode,
}

impl BlockVerifier {
    pub fn full(schedule: Arc<StaticProperty>) -> Self {
        Self {
            schedule,
            mode: VerifyMode::Full,
        }
    }

    pub fn local(schedule: Arc<StaticProperty>) -> Self {
        Self {
            schedule,
            mode: VerifyMode::Local,
        }
    }

    pub fn mode(&self) -> VerifyMode {
        self.mode
    }
}

impl Verifier for BlockVerifier {
    fn verify(
        &self,
        block: &Block,
        parent: &Block,
        parent_state: &StatePool,
    ) -> Result<StatePool, VerifyError> {
        let h = &block.header;
        check_structure(block, parent)?;

        if h.time <= parent.header.time {
            return Err(VerifyError::SlotNotAfterParent {
                number: h.number,
                slot: h.time,
                parent_slot: parent.header.time,
            });
        }

        let expected = self.schedule.witness_of_slot(h.time);
        if &h.witness != expected {
            return Err(VerifyError::WrongWitness {
                number: h.number,
                slot: h.time,
                witness: h.witness.clone(),
                expected: expected.clone(),
            });
        }

        if block.calculate_tree_hash() != h.tree_hash {
            return Err(VerifyError::TreeHash { number: h.number });
        }

        let full = self.mode == VerifyMode::Full;
        if full {
            h.verify_signature().map_err(|source| VerifyError::Signature {
                number: h.number,
                source,
            })?;
        }

        parent_state
            .execute(&block.content, full)
            .map_err(|source| VerifyError::Execution {
                number: h.number,
                source,
            })
    }
}
