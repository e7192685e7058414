//! Transactions carried in block bodies

use crate::block::encoding::{self, CodecError};
use crate::identity::{Account, AccountId, KeyError};
use crate::types::{blake3_hash, Hash};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Publisher-chosen creation time (unix millis). Not consensus-checked.
    pub time: i64,
    /// Must be strictly greater than the publisher's last applied nonce.
    pub nonce: u64,
    pub publisher: AccountId,
    /// Opaque call data for the executor.
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Transaction {
    pub fn new(nonce: u64, payload: Vec<u8>, time: i64) -> Self {
        Self {
            time,
            nonce,
            publisher: AccountId::default(),
            payload,
            signature: Vec::new(),
        }
    }

    /// Bytes covered by the publisher's signature (everything but the signature).
    pub fn signing_bytes(&self) -> Vec<u8> {
        let id = self.publisher.as_str().as_bytes();
        let mut out = Vec::with_capacity(8 + 8 + 8 + id.len() + 8 + self.payload.len());
        out.extend_from_slice(&self.time.to_le_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());
        out.extend_from_slice(&(id.len() as u64).to_le_bytes());
        out.extend_from_slice(id);
        out.extend_from_slice(&(self.payload.len() as u64).to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Set the publisher to `account` and sign.
    pub fn sign(mut self, account: &Account) -> Self {
        self.publisher = account.id().clone();
        self.signature = account.sign(&self.signing_bytes());
        self
    }

    pub fn verify_signature(&self) -> Result<(), KeyError> {
        self.publisher.verify(&self.signing_bytes(), &self.signature)
    }

    /// Identity hash: covers the signature so re-signed copies are distinct.
    pub fn hash(&self) -> Hash {
        let mut data = self.signing_bytes();
        data.extend_from_slice(&self.signature);
        blake3_hash(&data)
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        encoding::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        encoding::decode(bytes)
    }
}
