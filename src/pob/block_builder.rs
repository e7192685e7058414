//! Assembles and signs a block on top of a chosen chain tip

use crate::block::{Block, BlockHeader, BLOCK_VERSION};
use crate::consensus::Timestamp;
use crate::identity::Account;
use crate::state::StatePool;
use crate::tx::Transaction;
use crate::types::{Hash, ZERO_HASH};

/// A signed block plus the candidate txs left out of it.
#[derive(Debug)]
pub struct BuiltBlock {
    pub block: Block,
    /// Bad signature: can never be included.
    pub rejected: Vec<Hash>,
    /// Failed against `pool` only (e.g. already in an unconfirmed block on
    /// this branch). May still be valid on another branch.
    pub skipped: Vec<Hash>,
}

/// Build a block extending `parent` at `slot`.
///
/// Candidates are executed in order against `pool`. Those with a bad
/// signature land in `rejected`, those the state refuses in `skipped`.
pub fn build_block(
    account: &Account,
    parent: &Block,
    pool: &StatePool,
    candidates: Vec<Transaction>,
    slot: Timestamp,
) -> BuiltBlock {
    let mut state = pool.clone();
    let mut content = Vec::with_capacity(candidates.len());
    let mut rejected = Vec::new();
    let mut skipped = Vec::new();
    for tx in candidates {
        if tx.verify_signature().is_err() {
            rejected.push(tx.hash());
        } else if state.apply(&tx).is_err() {
            skipped.push(tx.hash());
        } else {
            content.push(tx);
        }
    }

    let mut block = Block {
        header: BlockHeader {
            version: BLOCK_VERSION,
            parent_hash: parent.hash(),
            tree_hash: ZERO_HASH,
            info: Vec::new(),
            number: parent.number() + 1,
            witness: account.id().clone(),
            time: slot.slot,
            signature: Vec::new(),
        },
        content,
    };
    block.header.tree_hash = block.calculate_tree_hash();
    block.sign(account);
    BuiltBlock {
        block,
        rejected,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::check_structure;
    use crate::genesis::genesis_block;

    #[test]
    fn builds_a_signed_child_and_skips_replays() {
        let producer = Account::from_seed("producer");
        let user = Account::from_seed("user");
        let mut pool = StatePool::new();
        let old = Transaction::new(5, vec![], 0).sign(&user);
        pool.apply(&old).unwrap();

        let fresh = Transaction::new(6, vec![], 0).sign(&user);
        let g = genesis_block();
        let mut forged = Transaction::new(7, vec![], 0).sign(&user);
        forged.payload = b"changed".to_vec();
        let candidates = vec![old.clone(), fresh.clone(), forged.clone()];
        let built = build_block(&producer, &g, &pool, candidates, Timestamp::new(9));

        assert_eq!(built.block.content, vec![fresh]);
        assert_eq!(built.skipped, vec![old.hash()]);
        assert_eq!(built.rejected, vec![forged.hash()]);
        assert_eq!(built.block.header.time, 9);
        assert_eq!(built.block.header.tree_hash, built.block.calculate_tree_hash());
        check_structure(&built.block, &g).unwrap();
        built.block.header.verify_signature().unwrap();
    }
}
