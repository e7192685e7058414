//! State snapshots attached to fork-tree nodes
//!
//! The executor here is deliberately small: it tracks the last applied nonce
//! per publisher and rejects replays. Snapshots share their map through an
//! `Arc` and copy on first write, so one snapshot per branch tip stays cheap.

use crate::identity::{AccountId, KeyError};
use crate::tx::Transaction;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("tx from {publisher}: {source}")]
    Signature {
        publisher: AccountId,
        #[source]
        source: KeyError,
    },
    #[error("tx from {publisher}: nonce {nonce} is not above last applied nonce {last}")]
    NonceReplay {
        publisher: AccountId,
        nonce: u64,
        last: u64,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatePool {
    nonces: Arc<BTreeMap<AccountId, u64>>,
    applied: u64,
}

impl StatePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_nonce(&self, publisher: &AccountId) -> Option<u64> {
        self.nonces.get(publisher).copied()
    }

    /// Total transactions applied along this branch.
    pub fn applied_count(&self) -> u64 {
        self.applied
    }

    pub fn check(&self, tx: &Transaction) -> Result<(), ExecError> {
        match self.last_nonce(&tx.publisher) {
            Some(last) if tx.nonce <= last => Err(ExecError::NonceReplay {
                publisher: tx.publisher.clone(),
                nonce: tx.nonce,
                last,
            }),
            _ => Ok(()),
        }
    }

    pub fn apply(&mut self, tx: &Transaction) -> Result<(), ExecError> {
        self.check(tx)?;
        Arc::make_mut(&mut self.nonces).insert(tx.publisher.clone(), tx.nonce);
        self.applied += 1;
        Ok(())
    }

    /// Execute a block body on a copy of this snapshot. `self` is never modified.
    pub fn execute(
        &self,
        txs: &[Transaction],
        check_signatures: bool,
    ) -> Result<StatePool, ExecError> {
        let mut next = self.clone();
        for tx in txs {
            if check_signatures {
                tx.verify_signature().map_err(|source| ExecError::Signature {
                    publisher: tx.publisher.clone(),
                    source,
                })?;
            }
            next.apply(tx)?;
        }
        Ok(next)
    }
}
