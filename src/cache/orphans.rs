//! Detached ("single") blocks waiting for their parent
//!
//! Bounded FIFO: when full, the oldest detached block is evicted. Nothing in
//! here is verified; blocks are verified when they finally attach.

use crate::block::Block;
use crate::types::Hash;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

#[derive(Debug)]
pub(crate) struct OrphanPool {
    blocks: HashMap<Hash, Arc<Block>>,
    by_parent: HashMap<Hash, Vec<Hash>>,
    order: VecDeque<Hash>,
    capacity: usize,
}

impl OrphanPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            blocks: HashMap::new(),
            by_parent: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.blocks.contains_key(hash)
    }

    /// Returns false if the block was already pooled or the pool is disabled.
    pub fn insert(&mut self, hash: Hash, block: Arc<Block>) -> bool {
        if self.capacity == 0 || self.blocks.contains_key(&hash) {
            return false;
        }
        while self.blocks.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.remove(&oldest);
                }
                None => break,
            }
        }
        self.by_parent
            .entry(block.header.parent_hash)
            .or_default()
            .push(hash);
        self.blocks.insert(hash, block);
        self.order.push_back(hash);
        true
    }

    /// Remove and return every pooled block whose parent is `parent`.
    pub fn take_children(&mut self, parent: &Hash) -> Vec<Arc<Block>> {
        let Some(hashes) = self.by_parent.remove(parent) else {
            return Vec::new();
        };
        let out: Vec<Arc<Block>> = hashes
            .iter()
            .filter_map(|h| self.blocks.remove(h))
            .collect();
        self.order.retain(|h| self.blocks.contains_key(h));
        out
    }

    /// Drop blocks that can no longer attach above the confirmed height.
    pub fn prune_at_or_below(&mut self, height: u64) -> usize {
        let dead: Vec<Hash> = self
            .blocks
            .iter()
            .filter(|(_, b)| b.number() <= height)
            .map(|(h, _)| *h)
            .collect();
        for h in &dead {
            self.remove(h);
        }
        dead.len()
    }

    fn remove(&mut self, hash: &Hash) -> Option<Arc<Block>> {
        let block = self.blocks.remove(hash)?;
        let parent = block.header.parent_hash;
        if let Some(siblings) = self.by_parent.get_mut(&parent) {
            siblings.retain(|h| h != hash);
            if siblings.is_empty() {
                self.by_parent.remove(&parent);
            }
        }
        self.order.retain(|h| h != hash);
        Some(block)
    }
}
