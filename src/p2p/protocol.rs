//! Message envelope exchanged between consensus nodes

use crate::block::encoding::{self, CodecError};
use crate::consensus::now_unix_millis;
use crate::identity::AccountId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReqType {
    /// Body: an encoded block, freshly produced.
    NewBlock,
    /// Body: encoded `u64` height the sender is missing.
    ReqBlockHeight,
    /// Body: an encoded block, answering `ReqBlockHeight`.
    RecvBlockHeight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unix millis at send time.
    pub time: i64,
    pub from: AccountId,
    /// Empty for broadcasts.
    pub to: AccountId,
    pub req_type: ReqType,
    pub body: Vec<u8>,
}

impl Message {
    pub fn new(from: AccountId, to: AccountId, req_type: ReqType, body: Vec<u8>) -> Self {
        Self {
            time: now_unix_millis(),
            from,
            to,
            req_type,
            body,
        }
    }

    pub fn broadcast(from: AccountId, req_type: ReqType, body: Vec<u8>) -> Self {
        Self::new(from, AccountId::default(), req_type, body)
    }

    pub fn request_height(from: AccountId, to: AccountId, height: u64) -> Result<Self, CodecError> {
        Ok(Self::new(from, to, ReqType::ReqBlockHeight, encoding::encode(&height)?))
    }

    /// Height carried by a `ReqBlockHeight` body.
    pub fn requested_height(&self) -> Result<u64, CodecError> {
        encoding::decode(&self.body)
    }

    pub fn is_broadcast(&self) -> bool {
        self.to.is_empty()
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        encoding::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        encoding::decode(bytes)
    }
}
