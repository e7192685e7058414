//! Block cache driven with signed blocks, the production verifier and a sled store.


use harness::{gen_blocks, init_tracing, schedule, witnesses};
use pob_core::chain::{BlockVerifier, ChainStore, SledChain};
use pob_core::genesis::genesis_block;
use pob_core::pob::build_block;
use pob_core::{
    BlockCache, CacheError, CacheOptions, StatePool, Timestamp, Transaction, VerifyError,
};
use std::sync::Arc;

fn sled_cache(dir: &tempfile::TempDir) -> BlockCache {
    let store = Arc::new(SledChain::open(dir.path().join("chain")).unwrap());
    store.push(Arc::new(genesis_block())).unwrap();
    BlockCache::new(store, StatePool::new(), CacheOptions::with_threshold(2)).unwrap()
}

#[test]
fn missing_block_holds_back_confirmation_until_it_arrives() {
    init_tracing();
    let accounts = witnesses(3);
    let verifier = BlockVerifier::full(schedule(&accounts));
    let blocks = gen_blocks(&accounts, 10);
    let dir = tempfile::tempdir().unwrap();
    let cache = sled_cache(&dir);

    for (i, blk) in blocks.iter().enumerate().skip(1) {
        if i == 4 {
            continue;
        }
        let res = cache.add(blk.clone(), &verifier);
        assert_eq!(res.is_ok(), i < 4, "block {i}: {res:?}");
    }
    assert_eq!(cache.confirmed_length(), 2);

    cache.add(blocks[4].clone(), &verifier).unwrap();
    assert_eq!(cache.confirmed_length(), 9);

    // confirmed history is on disk in order
    let store = cache.block_chain();
    for (n, blk) in blocks.iter().enumerate().take(9) {
        let stored = store.get_block_by_number(n as u64).unwrap().unwrap();
        assert_eq!(stored.hash(), blk.hash());
    }
    assert_eq!(cache.longest_chain().top().hash(), blocks[10].hash());
}

#[test]
fn confirmed_chain_survives_reopen() {
    let accounts = witnesses(3);
    let verifier = BlockVerifier::full(schedule(&accounts));
    let blocks = gen_blocks(&accounts, 5);
    let dir = tempfile::tempdir().unwrap();
    {
        let cache = sled_cache(&dir);
        for blk in blocks.iter().skip(1) {
            cache.add(blk.clone(), &verifier).unwrap();
        }
        assert_eq!(cache.confirmed_length(), 4);
    }

    let store = Arc::new(SledChain::open(dir.path().join("chain")).unwrap());
    assert_eq!(store.length(), 4);
    let cache = BlockCache::new(store, StatePool::new(), CacheOptions::with_threshold(2)).unwrap();
    // the unconfirmed tail re-attaches above the persisted root
    cache.add(blocks[4].clone(), &verifier).unwrap();
    cache.add(blocks[5].clone(), &verifier).unwrap();
    assert_eq!(cache.longest_chain().length(), 6);
}

#[test]
fn wrong_witness_and_forged_signature_are_rejected_without_mutation() {
    let accounts = witnesses(3);
    let verifier = BlockVerifier::full(schedule(&accounts));
    let dir = tempfile::tempdir().unwrap();
    let cache = sled_cache(&dir);
    let g = genesis_block();

    // slot 1 belongs to accounts[1]
    let empty = StatePool::new();
    let intruder = build_block(&accounts[2], &g, &empty, Vec::new(), Timestamp::new(1)).block;
    let err = cache.add(intruder, &verifier).unwrap_err();
    assert!(matches!(err, CacheError::Verification(VerifyError::WrongWitness { .. })));

    let mut forged = build_block(&accounts[1], &g, &empty, Vec::new(), Timestamp::new(1)).block;
    forged.header.info = b"tampered".to_vec();
    let err = cache.add(forged, &verifier).unwrap_err();
    assert!(matches!(err, CacheError::Verification(VerifyError::Signature { .. })));

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.leaves(), vec![g.hash()]);
    assert_eq!(cache.confirmed_length(), 1);
}

#[test]
fn replayed_transaction_on_the_same_branch_is_rejected() {
    let accounts = witnesses(3);
    let verifier = BlockVerifier::full(schedule(&accounts));
    let dir = tempfile::tempdir().unwrap();
    let cache = sled_cache(&dir);
    let user = pob_core::Account::from_seed("user");
    let tx = Transaction::new(998, vec![], 0).sign(&user);

    let g = genesis_block();
    let empty = StatePool::new();
    let b1 = build_block(&accounts[1], &g, &empty, vec![tx.clone()], Timestamp::new(1)).block;
    cache.add(b1.clone(), &verifier).unwrap();
    assert_eq!(cache.longest_pool().last_nonce(user.id()), Some(998));

    // build against a stale pool so the replay slips into the block body
    let b2 = build_block(&accounts[2], &b1, &StatePool::new(), vec![tx], Timestamp::new(2)).block;
    assert_eq!(b2.content.len(), 1);
    let err = cache.add(b2, &verifier).unwrap_err();
    assert!(matches!(err, CacheError::Verification(VerifyError::Execution { .. })));
}
