//! Persistent chain of confirmed blocks
//!
//! The fork tree drains confirmed blocks into a [`ChainStore`]. A store is
//! strictly append-only and gap-free: `push` fails on any height or parent
//! mismatch rather than recording a divergent history.

pub mod accept;
pub mod memory;
pub mod sled_store;

use crate::block::encoding::CodecError;
use crate::block::Block;
use std::sync::Arc;
use thiserror::Error;

pub use accept::{check_structure, pass_through, BlockVerifier, Verifier, VerifyError, VerifyMode};
pub use memory::MemoryChain;
pub use sled_store::SledChain;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("push of block {got} but chain length is {expected}")]
    HeightMismatch { expected: u64, got: u64 },
    #[error("block {number} does not extend the stored tip")]
    ParentMismatch { number: u64 },
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    #[error("stored chain is corrupt: {0}")]
    Corrupt(String),
}

pub trait ChainStore: Send + Sync {
    /// Append one confirmed block. Must be `top().number + 1` and extend `top()`.
    fn push(&self, block: Arc<Block>) -> Result<(), StoreError>;

    /// Current finalized tip, `None` only before genesis is pushed.
    fn top(&self) -> Result<Option<Arc<Block>>, StoreError>;

    fn get_block_by_number(&self, number: u64) -> Result<Option<Arc<Block>>, StoreError>;

    /// Number of stored blocks, genesis included.
    fn length(&self) -> u64;
}

/// Shared append check for store implementations.
pub(crate) fn check_append(
    length: u64,
    top: Option<&Block>,
    block: &Block,
) -> Result<(), StoreError> {
    if block.number() != length {
        return Err(StoreError::HeightMismatch {
            expected: length,
            got: block.number(),
        });
    }
    if let Some(top) = top {
        if block.header.parent_hash != top.hash() {
            return Err(StoreError::ParentMismatch {
                number: block.number(),
            });
        }
    }
    Ok(())
}
