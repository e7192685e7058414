//! sled-backed chain store
//!
//! Blocks live in the `blocks` tree keyed by big-endian height, so sled's
//! key order is chain order and `last()` is the tip.

use super::{check_append, ChainStore, StoreError};
use crate::block::Block;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

const BLOCKS_TREE: &str = "blocks";

pub struct SledChain {
    db: sled::Db,
    blocks: sled::Tree,
    /// Cached (length, tip); sled's `len()` is a full scan.
    head: Mutex<(u64, Option<Arc<Block>>)>,
}

impl SledChain {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::from_db(sled::open(path)?)
    }

    pub fn temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        let blocks = db.open_tree(BLOCKS_TREE)?;
        let head = match blocks.last()? {
            Some((key, value)) => {
                let number = decode_key(&key)?;
                let block = Block::decode(&value)?;
                if block.number() != number {
                    return Err(StoreError::Corrupt(format!(
                        "tip key {} holds block {}",
                        number,
                        block.number()
                    )));
                }
                (number + 1, Some(Arc::new(block)))
            }
            None => (0, None),
        };
        tracing::debug!(target = "pob::store", length = head.0, "opened sled chain");
        Ok(Self {
            db,
            blocks,
            head: Mutex::new(head),
        })
    }
}

fn decode_key(key: &[u8]) -> Result<u64, StoreError> {
    let arr: [u8; 8] = key
        .try_into()
        .map_err(|_| StoreError::Corrupt(format!("block key has {} bytes", key.len())))?;
    Ok(u64::from_be_bytes(arr))
}

impl ChainStore for SledChain {
    fn push(&self, block: Arc<Block>) -> Result<(), StoreError> {
        let mut head = self.head.lock();
        check_append(head.0, head.1.as_deref(), &block)?;

        let value = block.encode()?;
        self.blocks.insert(block.number().to_be_bytes(), value)?;
        self.db.flush()?;

        *head = (head.0 + 1, Some(block));
        Ok(())
    }

    fn top(&self) -> Result<Option<Arc<Block>>, StoreError> {
        Ok(self.head.lock().1.clone())
    }

    fn get_block_by_number(&self, number: u64) -> Result<Option<Arc<Block>>, StoreError> {
        match self.blocks.get(number.to_be_bytes())? {
            Some(value) => Ok(Some(Arc::new(Block::decode(&value)?))),
            None => Ok(None),
        }
    }

    fn length(&self) -> u64 {
        self.head.lock().0
    }
}
