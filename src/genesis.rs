//! Genesis block
//!
//! Every node derives the same genesis locally; it is never fetched from peers.
//!
//! Genesis block parameters:
//! - version: 0
//! - number: 0
//! - parent_hash: [0; 32]
//! - tree_hash: [0; 32] (empty body)
//! - info: b"genesis"
//! - witness: empty
//! - time: 0
//! - signature: empty

use crate::block::{Block, BlockHeader, BLOCK_VERSION};
use crate::identity::AccountId;
use crate::types::{Hash, ZERO_HASH};

pub const GENESIS_INFO: &[u8] = b"genesis";

pub fn genesis_block() -> Block {
    Block {
        header: BlockHeader {
            version: BLOCK_VERSION,
            parent_hash: ZERO_HASH,
            tree_hash: ZERO_HASH,
            info: GENESIS_INFO.to_vec(),
            number: 0,
            witness: AccountId::default(),
            time: 0,
            signature: Vec::new(),
        },
        content: Vec::new(),
    }
}

pub fn genesis_hash() -> Hash {
    genesis_block().hash()
}

/// True if `block` is exactly the canonical genesis.
pub fn is_genesis(block: &Block) -> bool {
    block.header.number == 0 && block.hash() == genesis_hash()
}
