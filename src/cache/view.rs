use crate::block::Block;
use crate::chain::{ChainStore, StoreError};
use std::sync::Arc;

/// Read-only snapshot of the longest chain: the confirmed history in the
/// store followed by the cached blocks from the root to the tip.
///
/// The cached part is copied at creation, so a view stays consistent while
/// the cache keeps changing.
#[derive(Clone)]
pub struct ChainView {
    /// Root (last confirmed block) first, tip last. Never empty.
    cached: Vec<Arc<Block>>,
    store: Arc<dyn ChainStore>,
}

impl ChainView {
    pub(crate) fn new(
        root: Arc<Block>,
        above_root: Vec<Arc<Block>>,
        store: Arc<dyn ChainStore>,
    ) -> Self {
        let mut cached = Vec::with_capacity(above_root.len() + 1);
        cached.push(root);
        cached.extend(above_root);
        Self { cached, store }
    }

    pub fn top(&self) -> &Arc<Block> {
        &self.cached[self.cached.len() - 1]
    }

    pub fn root(&self) -> &Arc<Block> {
        &self.cached[0]
    }

    /// Blocks on this chain, genesis included.
    pub fn length(&self) -> u64 {
        self.top().number() + 1
    }

    /// Blocks above the confirmed root, in chain order.
    pub fn unconfirmed(&self) -> &[Arc<Block>] {
        &self.cached[1..]
    }

    pub fn get_block_by_number(&self, number: u64) -> Result<Option<Arc<Block>>, StoreError> {
        let root_number = self.root().number();
        if number < root_number {
            return self.store.get_block_by_number(number);
        }
        Ok(self.cached.get((number - root_number) as usize).cloned())
    }

    pub fn iter_cached(&self) -> impl Iterator<Item = &Arc<Block>> {
        self.cached.iter()
    }
}

impl std::fmt::Debug for ChainView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainView")
            .field("root", &self.root().number())
            .field("length", &self.length())
            .finish()
    }
}
