//! Pending transaction pool
//!
//! Arrival-ordered, deduplicated by tx hash. The producer drains it through
//! [`TxSource`]; confirmed blocks flow back in through [`TxPool::spawn_eviction`]
//! so included transactions leave the pool.

use crate::block::Block;
use crate::identity::KeyError;
use crate::metrics::PROM_POB_TXPOOL_SIZE;
use crate::tx::Transaction;
use crate::types::{short_hex, Hash};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_TXPOOL_CAPACITY: usize = 10_000;

#[derive(Debug, Error)]
pub enum TxPoolError {
    #[error("tx {} is already pending", hex::encode(.0))]
    Duplicate(Hash),
    #[error("tx signature: {0}")]
    Signature(#[from] KeyError),
    #[error("tx pool is full ({0} pending)")]
    Full(usize),
}

/// Where the producer gets block content from.
pub trait TxSource: Send + Sync {
    /// Up to `max` pending transactions, oldest first. Does not remove them.
    fn pending_transactions(&self, max: usize) -> Vec<Transaction>;

    /// Drop transactions the producer found unusable.
    fn discard(&self, _hashes: &[Hash]) {}

    /// A block was confirmed; its transactions will not be needed again.
    fn on_confirmed(&self, _block: &Block) {}
}

#[derive(Default)]
struct PoolInner {
    seq: u64,
    order: BTreeMap<u64, Hash>,
    txs: HashMap<Hash, (u64, Transaction)>,
}

impl PoolInner {
    fn remove(&mut self, hash: &Hash) -> bool {
        match self.txs.remove(hash) {
            Some((seq, _)) => {
                self.order.remove(&seq);
                true
            }
            None => false,
        }
    }
}

pub struct TxPool {
    inner: Mutex<PoolInner>,
    capacity: usize,
}

impl TxPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Admit a signed transaction. Returns its hash.
    pub fn add_transaction(&self, tx: Transaction) -> Result<Hash, TxPoolError> {
        tx.verify_signature()?;
        let hash = tx.hash();

        let mut inner = self.inner.lock();
        if inner.txs.contains_key(&hash) {
            return Err(TxPoolError::Duplicate(hash));
        }
        if inner.txs.len() >= self.capacity {
            return Err(TxPoolError::Full(inner.txs.len()));
        }
        let seq = inner.seq;
        inner.seq += 1;
        inner.order.insert(seq, hash);
        inner.txs.insert(hash, (seq, tx));
        PROM_POB_TXPOOL_SIZE.set(inner.txs.len() as i64);

        tracing::debug!(target = "pob::txpool", tx = %short_hex(&hash), "tx admitted");
        Ok(hash)
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.inner.lock().txs.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every transaction included in `block`. Returns how many were pending.
    pub fn evict_block(&self, block: &Block) -> usize {
        let mut inner = self.inner.lock();
        let removed = block
            .content
            .iter()
            .filter(|tx| inner.remove(&tx.hash()))
            .count();
        PROM_POB_TXPOOL_SIZE.set(inner.txs.len() as i64);
        removed
    }

    /// Consume the confirmed-block stream until it closes.
    pub fn spawn_eviction(self: Arc<Self>, mut rx: mpsc::Receiver<Arc<Block>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(block) = rx.recv().await {
                let removed = self.evict_block(&block);
                if removed > 0 {
                    tracing::debug!(
                        target = "pob::txpool",
                        height = block.number(),
                        removed,
                        "evicted confirmed txs"
                    );
                }
            }
            tracing::debug!(target = "pob::txpool", "confirmed-block stream closed");
        })
    }
}

impl Default for TxPool {
    fn default() -> Self {
        Self::new(DEFAULT_TXPOOL_CAPACITY)
    }
}

impl TxSource for TxPool {
    fn pending_transactions(&self, max: usize) -> Vec<Transaction> {
        let inner = self.inner.lock();
        inner
            .order
            .values()
            .take(max)
            .filter_map(|h| inner.txs.get(h).map(|(_, tx)| tx.clone()))
            .collect()
    }

    fn on_confirmed(&self, block: &Block) {
        self.evict_block(block);
    }

    fn discard(&self, hashes: &[Hash]) {
        let mut inner = self.inner.lock();
        for h in hashes {
            inner.remove(h);
        }
        PROM_POB_TXPOOL_SIZE.set(inner.txs.len() as i64);
    }
}
