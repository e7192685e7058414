//! Blocks: header, body, hashing and wire encoding
//!
//! The block hash is blake3 over the head info plus the signature, the tree
//! hash is the merkle root of the body's transaction hashes, and the witness
//! signs the head info (see [`encoding::head_info_bytes`]).

pub mod encoding;

use crate::identity::{Account, AccountId, KeyError};
use crate::tx::Transaction;
use crate::types::{blake3_hash, merkle_root, Hash};
use encoding::CodecError;
use serde::{Deserialize, Serialize};

pub const BLOCK_VERSION: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub parent_hash: Hash,
    /// Merkle root of the transaction hashes.
    pub tree_hash: Hash,
    /// Free-form producer data.
    pub info: Vec<u8>,
    /// Height; genesis is 0.
    pub number: u64,
    pub witness: AccountId,
    /// Slot index the block was produced in.
    pub time: i64,
    pub signature: Vec<u8>,
}

impl BlockHeader {
    pub fn head_info(&self) -> Vec<u8> {
        encoding::head_info_bytes(self)
    }

    pub fn hash(&self) -> Hash {
        let mut data = self.head_info();
        data.extend_from_slice(&(self.signature.len() as u64).to_le_bytes());
        data.extend_from_slice(&self.signature);
        blake3_hash(&data)
    }

    pub fn verify_signature(&self) -> Result<(), KeyError> {
        self.witness.verify(&self.head_info(), &self.signature)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub content: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn calculate_tree_hash(&self) -> Hash {
        let leaves: Vec<Hash> = self.content.iter().map(Transaction::hash).collect();
        merkle_root(&leaves)
    }

    /// Stamp the producer and sign the head info. The tree hash must already be set.
    pub fn sign(&mut self, account: &Account) {
        self.header.witness = account.id().clone();
        self.header.signature = account.sign(&self.header.head_info());
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        encoding::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        encoding::decode(bytes)
    }
}
