use super::{check_append, ChainStore, StoreError};
use crate::block::Block;
use parking_lot::RwLock;
use std::sync::Arc;

/// In-memory chain store; used by tests and ephemeral nodes.
#[derive(Debug, Default)]
pub struct MemoryChain {
    blocks: RwLock<Vec<Arc<Block>>>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChainStore for MemoryChain {
    fn push(&self, block: Arc<Block>) -> Result<(), StoreError> {
        let mut blocks = self.blocks.write();
        check_append(blocks.len() as u64, blocks.last().map(|b| b.as_ref()), &block)?;
        blocks.push(block);
        Ok(())
    }

    fn top(&self) -> Result<Option<Arc<Block>>, StoreError> {
        Ok(self.blocks.read().last().cloned())
    }

    fn get_block_by_number(&self, number: u64) -> Result<Option<Arc<Block>>, StoreError> {
        Ok(self.blocks.read().get(number as usize).cloned())
    }

    fn length(&self) -> u64 {
        self.blocks.read().len() as u64
    }
}
