//! Block cache: the fork tree of not-yet-confirmed blocks
//!
//! Every block, local or remote, enters through [`BlockCache::add`]. After
//! each successful insert the cache recomputes the longest chain and runs the
//! confirmation sweep:
//!
//! - With N witnesses and threshold T (default ceil(2N/3)), a block X on the
//!   longest chain is confirmed once the T blocks directly above X on that
//!   chain come from T pairwise-distinct witnesses.
//! - Everything from the root up to the deepest confirmed block is pushed to
//!   the chain store in order; each promotion prunes the sibling subtrees of
//!   the promoted block.
//!
//! Mutations hold the write lock for the whole insert + sweep; readers take
//! the read lock and get copies.

mod orphans;
mod tree;
mod view;

pub use view::ChainView;

use crate::block::Block;
use crate::chain::{check_structure, ChainStore, StoreError, Verifier, VerifyError};
use crate::config::ConsensusConfig;
use crate::identity::AccountId;
use crate::metrics::{
    PROM_POB_BLOCKS_ADDED, PROM_POB_BLOCKS_PROMOTED, PROM_POB_CACHE_NODES,
    PROM_POB_CONFIRMED_LENGTH, PROM_POB_NOTIFY_DROPPED, PROM_POB_ORPHANS,
    PROM_POB_VERIFY_FAILURES,
};
use crate::state::StatePool;
use crate::types::{short_hex, Hash};
use orphans::OrphanPool;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashSet, VecDeque};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tree::{ForkTree, NodeId};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("block {number} is detached: parent {} is unknown", hex::encode(.parent))]
    Orphan { number: u64, parent: Hash },
    #[error("block {number} ({}) is already known", hex::encode(.hash))]
    Duplicate { number: u64, hash: Hash },
    #[error("verification failed: {0}")]
    Verification(#[from] VerifyError),
    #[error("chain store failure: {0}")]
    Store(#[from] StoreError),
    #[error("block {number} is at or below the confirmed root {root}")]
    Stale { number: u64, root: u64 },
    #[error("block cache halted after a chain store failure")]
    Halted,
    #[error("chain store has no blocks; genesis must be pushed first")]
    EmptyStore,
}

impl CacheError {
    /// Errors after which the node must stop accepting blocks.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CacheError::Store(_) | CacheError::Halted)
    }
}

#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub confirm_threshold: usize,
    pub orphan_capacity: usize,
    pub stale_fork_depth: u64,
    pub notify_capacity: usize,
    pub notify_timeout: Duration,
}

impl CacheOptions {
    pub fn from_config(cfg: &ConsensusConfig) -> Self {
        Self {
            confirm_threshold: cfg.confirm_threshold(),
            orphan_capacity: cfg.orphan_capacity,
            stale_fork_depth: cfg.stale_fork_depth,
            notify_capacity: cfg.notify_capacity,
            notify_timeout: cfg.notify_timeout(),
        }
    }

    pub fn with_threshold(confirm_threshold: usize) -> Self {
        Self {
            confirm_threshold,
            ..Self::from_config(&ConsensusConfig::default())
        }
    }
}

/// Bounded confirmed-block queue.
///
/// Promotions are staged while the cache write lock is held and delivered by
/// [`Notifier::flush`] after it is released. A full queue is retried for at most `timeout`
/// per event, then the event is dropped. Delivery order is promotion order.
struct Notifier {
    tx: mpsc::Sender<Arc<Block>>,
    rx: Mutex<Option<mpsc::Receiver<Arc<Block>>>>,
    timeout: Duration,
    staged: Mutex<VecDeque<Arc<Block>>>,
    drain: Mutex<()>,
}

impl Notifier {
    fn new(capacity: usize, timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            timeout,
            staged: Mutex::new(VecDeque::new()),
            drain: Mutex::new(()),
        }
    }

    fn stage(&self, block: Arc<Block>) {
        self.staged.lock().push_back(block);
    }

    /// Deliver staged events. Only one thread drains at a time; a thread that
    /// finds the drain busy leaves its events to the current drainer.
    fn flush(&self) {
        loop {
            let Some(guard) = self.drain.try_lock() else {
                return;
            };
            loop {
                let next = self.staged.lock().pop_front();
                match next {
                    Some(block) => self.send(block),
                    None => break,
                }
            }
            drop(guard);
            if self.staged.lock().is_empty() {
                return;
            }
        }
    }

    fn send(&self, block: Arc<Block>) {
        let deadline = Instant::now() + self.timeout;
        let mut pending = block;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return,
                Err(mpsc::error::TrySendError::Closed(_)) => return,
                Err(mpsc::error::TrySendError::Full(b)) => {
                    if Instant::now() >= deadline {
                        PROM_POB_NOTIFY_DROPPED.inc();
                        tracing::warn!(
                            target = "pob::cache",
                            height = b.number(),
                            "confirmed-block queue full; event dropped"
                        );
                        return;
                    }
                    pending = b;
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
        }
    }
}

struct CacheInner {
    tree: ForkTree,
    singles: OrphanPool,
    longest: NodeId,
    halted: bool,
}

pub struct BlockCache {
    inner: RwLock<CacheInner>,
    store: Arc<dyn ChainStore>,
    confirm_threshold: usize,
    stale_fork_depth: u64,
    notify: Notifier,
    parked_verifier: Option<Arc<dyn Verifier>>,
}

impl BlockCache {
    /// Root the cache at the store's tip with `root_state` as its snapshot.
    pub fn new(
        store: Arc<dyn ChainStore>,
        root_state: StatePool,
        opts: CacheOptions,
    ) -> Result<Self, CacheError> {
        let root = store.top()?.ok_or(CacheError::EmptyStore)?;
        let tree = ForkTree::new(root, root_state);
        let longest = tree.root();
        PROM_POB_CONFIRMED_LENGTH.set(store.length() as i64);
        Ok(Self {
            inner: RwLock::new(CacheInner {
                tree,
                singles: OrphanPool::new(opts.orphan_capacity),
                longest,
                halted: false,
            }),
            store,
            confirm_threshold: opts.confirm_threshold.max(1),
            stale_fork_depth: opts.stale_fork_depth,
            notify: Notifier::new(opts.notify_capacity, opts.notify_timeout),
            parked_verifier: None,
        })
    }

    /// Verify parked blocks with `verifier` when their parent attaches,
    /// whatever verifier the attaching `add` was given.
    pub fn with_parked_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.parked_verifier = Some(verifier);
        self
    }

    /// Verify `block` against its parent and attach it.
    ///
    /// On any error other than a store failure the tree, the leaf set and the
    /// confirmed chain are left exactly as they were. A block whose parent is
    /// unknown is reported as `Orphan` and parked until the parent attaches.
    /// A block at or below the confirmed root is reported as `Stale`.
    ///
    /// Confirmed-block events are delivered after the write lock is released.
    pub fn add(&self, block: Block, verifier: &dyn Verifier) -> Result<(), CacheError> {
        let res = {
            let mut inner = self.inner.write();
            self.add_locked(&mut inner, block, verifier)
        };
        self.notify.flush();
        res
    }

    fn add_locked(
        &self,
        inner: &mut CacheInner,
        block: Block,
        verifier: &dyn Verifier,
    ) -> Result<(), CacheError> {
        if inner.halted {
            return Err(CacheError::Halted);
        }

        let hash = block.hash();
        if inner.tree.contains(&hash) || inner.singles.contains(&hash) {
            return Err(CacheError::Duplicate {
                number: block.number(),
                hash,
            });
        }

        let number = block.number();
        let root_number = inner.tree.root_node().block.number();
        if number <= root_number {
            tracing::debug!(
                target = "pob::cache",
                height = number,
                root = root_number,
                "block at or below the confirmed root"
            );
            return Err(CacheError::Stale {
                number,
                root: root_number,
            });
        }

        let parent_hash = block.header.parent_hash;
        let Some(parent_id) = inner.tree.find(&parent_hash) else {
            PROM_POB_ORPHANS.inc();
            if number > root_number + 1 {
                inner.singles.insert(hash, Arc::new(block));
            }
            tracing::debug!(
                target = "pob::cache",
                height = number,
                hash = %short_hex(&hash),
                parent = %short_hex(&parent_hash),
                "orphan block"
            );
            return Err(CacheError::Orphan {
                number,
                parent: parent_hash,
            });
        };

        attach(&mut inner.tree, parent_id, Arc::new(block), verifier)?;

        // release parked descendants, breadth-first
        let release: &dyn Verifier = match &self.parked_verifier {
            Some(v) => v.as_ref(),
            None => verifier,
        };
        let mut queue = VecDeque::from([hash]);
        while let Some(parent) = queue.pop_front() {
            let children = inner.singles.take_children(&parent);
            let Some(pid) = inner.tree.find(&parent) else {
                continue;
            };
            for child in children {
                let child_hash = child.hash();
                match attach(&mut inner.tree, pid, child, release) {
                    Ok(_) => queue.push_back(child_hash),
                    Err(e) => tracing::warn!(
                        target = "pob::cache",
                        hash = %short_hex(&child_hash),
                        error = %e,
                        "parked block failed on attach; dropped"
                    ),
                }
            }
        }

        self.refresh(inner)
    }

    /// Recompute the longest chain, run the confirmation sweep and collect
    /// stale branches.
    fn refresh(&self, inner: &mut CacheInner) -> Result<(), CacheError> {
        inner.longest = inner.tree.longest_leaf();
        let path = inner.tree.path_to(inner.longest);
        let witnesses: Vec<&AccountId> = path
            .iter()
            .map(|id| &inner.tree.node(*id).block.header.witness)
            .collect();
        let target = deepest_confirmed(&witnesses, self.confirm_threshold);

        for &id in &path[1..=target] {
            let block = inner.tree.node(id).block.clone();
            if let Err(e) = self.store.push(block.clone()) {
                inner.halted = true;
                tracing::error!(
                    target = "pob::cache",
                    height = block.number(),
                    error = %e,
                    "chain store push failed; cache halted"
                );
                return Err(CacheError::Store(e));
            }
            let pruned = inner.tree.promote(id);
            PROM_POB_BLOCKS_PROMOTED.inc();
            tracing::info!(
                target = "pob::cache",
                height = block.number(),
                hash = %short_hex(&block.hash()),
                witness = %block.header.witness,
                pruned,
                "block confirmed"
            );
            self.notify.stage(block);
        }

        let root_number = inner.tree.root_node().block.number();
        if target > 0 {
            inner.singles.prune_at_or_below(root_number);
        }

        let tip_height = inner.tree.node(inner.longest).block.number();
        let keep: HashSet<NodeId> = path[target..].iter().copied().collect();
        let stale = inner.tree.prune_stale(&keep, tip_height, self.stale_fork_depth);
        if stale > 0 {
            tracing::debug!(target = "pob::cache", removed = stale, "stale branches collected");
        }

        PROM_POB_CONFIRMED_LENGTH.set(self.store.length() as i64);
        PROM_POB_CACHE_NODES.set(inner.tree.len() as i64);
        Ok(())
    }

    pub fn longest_chain(&self) -> ChainView {
        let inner = self.inner.read();
        let path = inner.tree.path_to(inner.longest);
        let root = inner.tree.root_node().block.clone();
        let above: Vec<Arc<Block>> = path[1..]
            .iter()
            .map(|id| inner.tree.node(*id).block.clone())
            .collect();
        ChainView::new(root, above, self.store.clone())
    }

    /// State snapshot at the tip of the longest chain.
    pub fn longest_pool(&self) -> StatePool {
        let inner = self.inner.read();
        inner.tree.node(inner.longest).state.clone()
    }

    pub fn confirmed_length(&self) -> u64 {
        self.store.length()
    }

    pub fn block_chain(&self) -> Arc<dyn ChainStore> {
        self.store.clone()
    }

    /// The confirmed-block stream. Single consumer: the first call takes it,
    /// later calls get `None`. The stream stays open as long as the cache lives.
    pub fn on_block_chan(&self) -> Option<mpsc::Receiver<Arc<Block>>> {
        self.notify.rx.lock().take()
    }

    /// Hashes of every branch tip, sorted.
    pub fn leaves(&self) -> Vec<Hash> {
        let inner = self.inner.read();
        let mut out: Vec<Hash> = inner
            .tree
            .leaves()
            .into_iter()
            .map(|id| inner.tree.node(id).hash)
            .collect();
        out.sort_unstable();
        out
    }

    /// Cached block (root included) by hash.
    pub fn find_block(&self, hash: &Hash) -> Option<Arc<Block>> {
        let inner = self.inner.read();
        inner.tree.find(hash).map(|id| inner.tree.node(id).block.clone())
    }

    /// Nodes in the fork tree, root included.
    pub fn len(&self) -> usize {
        self.inner.read().tree.len()
    }

    pub fn orphan_count(&self) -> usize {
        self.inner.read().singles.len()
    }

    pub fn confirm_threshold(&self) -> usize {
        self.confirm_threshold
    }

    pub fn is_halted(&self) -> bool {
        self.inner.read().halted
    }

    /// Diagnostic dump of the fork tree. The longest tip is marked with `*`.
    pub fn draw(&self) -> String {
        let inner = self.inner.read();
        let mut out = String::new();
        let mut stack: Vec<(NodeId, String, bool, bool)> =
            vec![(inner.tree.root(), String::new(), true, true)];
        while let Some((id, prefix, last, is_root)) = stack.pop() {
            let node = inner.tree.node(id);
            let h = &node.block.header;
            let branch = if is_root {
                ""
            } else if last {
                "└── "
            } else {
                "├── "
            };
            let witness: String = h.witness.as_str().chars().take(8).collect();
            let _ = writeln!(
                out,
                "{prefix}{branch}#{} {} w={}{}",
                h.number,
                short_hex(&node.hash),
                if witness.is_empty() { "-" } else { &witness },
                if id == inner.longest { " *" } else { "" }
            );

            let child_prefix = if is_root {
                String::new()
            } else if last {
                format!("{prefix}    ")
            } else {
                format!("{prefix}│   ")
            };
            let children = inner.tree.children(id);
            for (i, child) in children.iter().enumerate().rev() {
                stack.push((*child, child_prefix.clone(), i + 1 == children.len(), false));
            }
        }
        tracing::debug!(target = "pob::cache", "fork tree:\n{}", out);
        out
    }
}

fn attach(
    tree: &mut ForkTree,
    parent_id: NodeId,
    block: Arc<Block>,
    verifier: &dyn Verifier,
) -> Result<NodeId, CacheError> {
    let parent = tree.node(parent_id);
    let verified = check_structure(&block, &parent.block)
        .and_then(|_| verifier.verify(&block, &parent.block, &parent.state));
    let state = match verified {
        Ok(state) => state,
        Err(e) => {
            PROM_POB_VERIFY_FAILURES.inc();
            return Err(e.into());
        }
    };
    tracing::debug!(
        target = "pob::cache",
        height = block.number(),
        hash = %short_hex(&block.hash()),
        witness = %block.header.witness,
        "block attached"
    );
    PROM_POB_BLOCKS_ADDED.inc();
    Ok(tree.insert(parent_id, block, state))
}

/// Index (into the root-first `witnesses` path) of the deepest confirmed node,
/// or 0 if nothing above the root is confirmed. Node `i` is confirmed when
/// `witnesses[i+1..=i+threshold]` exist and are pairwise distinct.
pub(crate) fn deepest_confirmed(witnesses: &[&AccountId], threshold: usize) -> usize {
    let n = witnesses.len();
    let mut best = 0;
    let mut seen = HashSet::with_capacity(threshold);
    for i in 1..n {
        if i + threshold >= n {
            break;
        }
        seen.clear();
        if witnesses[i + 1..=i + threshold].iter().all(|w| seen.insert(*w)) {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<AccountId> {
        names.iter().map(|n| AccountId::new(*n)).collect()
    }

    #[test]
    fn distinct_run_confirms() {
        let w = ids(&["", "a", "b", "c", "a"]);
        let refs: Vec<&AccountId> = w.iter().collect();
        // node 3 (c) has only one block above it
        assert_eq!(deepest_confirmed(&refs, 2), 2);
        assert_eq!(deepest_confirmed(&refs, 3), 1);
        assert_eq!(deepest_confirmed(&refs, 4), 0);
    }

    #[test]
    fn repeated_witness_breaks_the_run() {
        let w = ids(&["", "a", "b", "b", "b"]);
        let refs: Vec<&AccountId> = w.iter().collect();
        assert_eq!(deepest_confirmed(&refs, 2), 0);

        let w = ids(&["", "a", "b", "b", "c"]);
        let refs: Vec<&AccountId> = w.iter().collect();
        // node 2 sees (b, c); node 1 sees (b, b)
        assert_eq!(deepest_confirmed(&refs, 2), 2);
    }

    #[test]
    fn single_witness_threshold_one() {
        let w = ids(&["", "a", "a", "a"]);
        let refs: Vec<&AccountId> = w.iter().collect();
        assert_eq!(deepest_confirmed(&refs, 1), 2);
    }

    use crate::chain::{pass_through, MemoryChain};
    use crate::genesis::genesis_block;

    const NAMES: [&str; 3] = ["alice", "bob", "carol"];

    fn child(parent: &Block, witness: &str, slot: i64) -> Block {
        let mut blk = parent.clone();
        blk.content = Vec::new();
        blk.header.number = parent.number() + 1;
        blk.header.parent_hash = parent.hash();
        blk.header.witness = AccountId::new(witness);
        blk.header.time = slot;
        blk.header.info = Vec::new();
        blk.header.tree_hash = blk.calculate_tree_hash();
        blk
    }

    /// genesis, then `count` blocks produced round-robin by the three names
    fn gen_blocks(count: usize) -> Vec<Block> {
        let mut out = vec![genesis_block()];
        for i in 1..=count {
            let blk = child(&out[i - 1], NAMES[i % 3], i as i64);
            out.push(blk);
        }
        out
    }

    fn cache(threshold: usize) -> BlockCache {
        let store = Arc::new(MemoryChain::new());
        store.push(Arc::new(genesis_block())).unwrap();
        BlockCache::new(store, StatePool::new(), CacheOptions::with_threshold(threshold)).unwrap()
    }

    #[test]
    fn gap_blocks_confirmation_until_filled() {
        let blocks = gen_blocks(10);
        let cache = cache(2);
        for (i, blk) in blocks.iter().enumerate().skip(1) {
            if i == 4 {
                continue;
            }
            let res = cache.add(blk.clone(), &pass_through);
            if i > 4 {
                assert!(matches!(res, Err(CacheError::Orphan { .. })));
            } else {
                res.unwrap();
            }
        }
        assert_eq!(cache.confirmed_length(), 2);
        assert_eq!(cache.orphan_count(), 6);

        cache.add(blocks[4].clone(), &pass_through).unwrap();
        assert_eq!(cache.confirmed_length(), 9);
        assert_eq!(cache.longest_chain().length(), 11);
        assert_eq!(cache.orphan_count(), 0);
    }

    #[test]
    fn repeated_witness_prevents_confirmation() {
        let cache = cache(2);
        let g = genesis_block();
        let b1 = child(&g, "alice", 1);
        let b2 = child(&b1, "bob", 2);
        let b3 = child(&b2, "bob", 3);
        for b in [&b1, &b2, &b3] {
            cache.add(b.clone(), &pass_through).unwrap();
        }
        // b1 is followed by (bob, bob)
        assert_eq!(cache.confirmed_length(), 1);

        let b4 = child(&b3, "carol", 4);
        cache.add(b4, &pass_through).unwrap();
        // b3 now sees (carol) only; b2 sees (bob, carol)
        assert_eq!(cache.confirmed_length(), 3);
    }

    #[test]
    fn failed_verification_leaves_cache_untouched() {
        let blocks = gen_blocks(4);
        let cache = cache(2);
        for blk in &blocks[1..4] {
            cache.add(blk.clone(), &pass_through).unwrap();
        }
        let confirmed = cache.confirmed_length();
        let longest = cache.longest_chain().top().hash();
        let leaves = cache.leaves();
        let nodes = cache.len();

        let reject = |_: &Block, _: &Block, _: &StatePool| -> Result<StatePool, VerifyError> {
            Err(VerifyError::Rejected("no".into()))
        };
        let err = cache.add(blocks[4].clone(), &reject).unwrap_err();
        assert!(matches!(err, CacheError::Verification(_)));

        assert_eq!(cache.confirmed_length(), confirmed);
        assert_eq!(cache.longest_chain().top().hash(), longest);
        assert_eq!(cache.leaves(), leaves);
        assert_eq!(cache.len(), nodes);
    }

    #[test]
    fn structural_violation_is_a_verification_error() {
        let blocks = gen_blocks(2);
        let cache = cache(2);
        cache.add(blocks[1].clone(), &pass_through).unwrap();
        let mut bad = blocks[2].clone();
        bad.header.number = 5;
        let err = cache.add(bad, &pass_through).unwrap_err();
        assert!(matches!(err, CacheError::Verification(VerifyError::HeightMismatch { .. })));
    }

    #[test]
    fn promotion_prunes_competing_branch() {
        let cache = cache(2);
        let g = genesis_block();
        let a1 = child(&g, "alice", 1);
        let x1 = child(&g, "carol", 1);
        let x2 = child(&x1, "alice", 2);
        cache.add(a1.clone(), &pass_through).unwrap();
        cache.add(x1.clone(), &pass_through).unwrap();
        cache.add(x2.clone(), &pass_through).unwrap();
        assert_eq!(cache.leaves().len(), 2);

        let a2 = child(&a1, "bob", 2);
        let a3 = child(&a2, "carol", 3);
        cache.add(a2.clone(), &pass_through).unwrap();
        cache.add(a3.clone(), &pass_through).unwrap();
        assert_eq!(cache.confirmed_length(), 2);
        assert!(cache.find_block(&x1.hash()).is_none());
        assert_eq!(cache.leaves(), vec![a3.hash()]);

        // extending the pruned branch is now an orphan
        let x3 = child(&x2, "bob", 3);
        let err = cache.add(x3, &pass_through).unwrap_err();
        assert!(matches!(err, CacheError::Orphan { .. }));
    }

    #[test]
    fn equal_length_tie_break_is_arrival_independent() {
        let g = genesis_block();
        let a = child(&g, "alice", 1);
        let b = child(&g, "bob", 1);
        let first = cache(3);
        first.add(a.clone(), &pass_through).unwrap();
        first.add(b.clone(), &pass_through).unwrap();
        let second = cache(3);
        second.add(b.clone(), &pass_through).unwrap();
        second.add(a.clone(), &pass_through).unwrap();

        let expected = a.hash().min(b.hash());
        assert_eq!(first.longest_chain().top().hash(), expected);
        assert_eq!(second.longest_chain().top().hash(), expected);
    }

    #[test]
    fn confirmed_length_is_monotone_and_bounded() {
        let blocks = gen_blocks(12);
        let cache = cache(2);
        let mut last = cache.confirmed_length();
        for blk in blocks.iter().skip(1) {
            cache.add(blk.clone(), &pass_through).unwrap();
            let now = cache.confirmed_length();
            assert!(now >= last);
            assert!(now <= cache.longest_chain().length());
            last = now;
        }
    }

    #[test]
    fn duplicate_is_rejected() {
        let blocks = gen_blocks(1);
        let cache = cache(2);
        cache.add(blocks[1].clone(), &pass_through).unwrap();
        let err = cache.add(blocks[1].clone(), &pass_through).unwrap_err();
        assert!(matches!(err, CacheError::Duplicate { number: 1, .. }));
    }

    #[test]
    fn confirmed_blocks_are_streamed_in_order() {
        let blocks = gen_blocks(5);
        let cache = cache(2);
        let mut rx = cache.on_block_chan().unwrap();
        assert!(cache.on_block_chan().is_none());
        for blk in blocks.iter().skip(1) {
            cache.add(blk.clone(), &pass_through).unwrap();
        }
        let mut heights = Vec::new();
        while let Ok(b) = rx.try_recv() {
            heights.push(b.number());
        }
        assert_eq!(heights, vec![1, 2, 3]);
    }

    struct FailingStore(MemoryChain);

    impl ChainStore for FailingStore {
        fn push(&self, _block: Arc<Block>) -> Result<(), StoreError> {
            Err(StoreError::Corrupt("disk full".into()))
        }
        fn top(&self) -> Result<Option<Arc<Block>>, StoreError> {
            self.0.top()
        }
        fn get_block_by_number(&self, number: u64) -> Result<Option<Arc<Block>>, StoreError> {
            self.0.get_block_by_number(number)
        }
        fn length(&self) -> u64 {
            self.0.length()
        }
    }

    #[test]
    fn store_failure_halts_the_cache() {
        let inner = MemoryChain::new();
        inner.push(Arc::new(genesis_block())).unwrap();
        let cache = BlockCache::new(
            Arc::new(FailingStore(inner)),
            StatePool::new(),
            CacheOptions::with_threshold(1),
        )
        .unwrap();
        let blocks = gen_blocks(3);
        cache.add(blocks[1].clone(), &pass_through).unwrap();
        let err = cache.add(blocks[2].clone(), &pass_through).unwrap_err();
        assert!(err.is_fatal());
        assert!(cache.is_halted());
        let err = cache.add(blocks[3].clone(), &pass_through).unwrap_err();
        assert!(matches!(err, CacheError::Halted));
    }

    #[test]
    fn draw_marks_the_longest_tip() {
        let blocks = gen_blocks(2);
        let cache = cache(3);
        for blk in blocks.iter().skip(1) {
            cache.add(blk.clone(), &pass_through).unwrap();
        }
        let text = cache.draw();
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().last().unwrap().ends_with(" *"));
    }

    #[test]
    fn full_notify_queue_does_not_block_readers() {
        let store = Arc::new(MemoryChain::new());
        store.push(Arc::new(genesis_block())).unwrap();
        let opts = CacheOptions {
            notify_capacity: 1,
            notify_timeout: Duration::from_millis(1_500),
            ..CacheOptions::with_threshold(1)
        };
        let cache = Arc::new(BlockCache::new(store, StatePool::new(), opts).unwrap());
        let blocks = gen_blocks(3);
        // block 1 is promoted and fills the queue; nobody consumes it
        cache.add(blocks[1].clone(), &pass_through).unwrap();
        cache.add(blocks[2].clone(), &pass_through).unwrap();

        let writer = {
            let cache = cache.clone();
            let next = blocks[3].clone();
            std::thread::spawn(move || cache.add(next, &pass_through))
        };
        std::thread::sleep(Duration::from_millis(200));

        let started = Instant::now();
        let view = cache.longest_chain();
        let waited = started.elapsed();
        assert!(waited < Duration::from_millis(500), "reader waited {waited:?}");
        assert_eq!(view.top().number(), 3);

        writer.join().unwrap().unwrap();
        assert_eq!(cache.confirmed_length(), 3);
    }

    #[test]
    fn block_at_or_below_root_is_stale() {
        let blocks = gen_blocks(4);
        let cache = cache(2);
        for blk in blocks.iter().skip(1) {
            cache.add(blk.clone(), &pass_through).unwrap();
        }
        assert_eq!(cache.confirmed_length(), 3);

        // a competing block at a confirmed height
        let rival = child(&blocks[0], "carol", 7);
        let err = cache.add(rival, &pass_through).unwrap_err();
        assert!(matches!(err, CacheError::Stale { number: 1, root: 2 }));
        let err = cache.add(child(&blocks[1], "alice", 8), &pass_through).unwrap_err();
        assert!(matches!(err, CacheError::Stale { number: 2, root: 2 }));
        assert_eq!(cache.orphan_count(), 0);
    }

    #[test]
    fn parked_blocks_use_the_parked_verifier() {
        let reject = |_: &Block, _: &Block, _: &StatePool| -> Result<StatePool, VerifyError> {
            Err(VerifyError::Rejected("parked".into()))
        };
        let cache = cache(3).with_parked_verifier(Arc::new(reject));
        let blocks = gen_blocks(3);
        assert!(matches!(
            cache.add(blocks[2].clone(), &pass_through),
            Err(CacheError::Orphan { .. })
        ));
        assert_eq!(cache.orphan_count(), 1);

        // the parent attaches with a lenient verifier; the parked child does not
        cache.add(blocks[1].clone(), &pass_through).unwrap();
        assert_eq!(cache.orphan_count(), 0);
        assert!(cache.find_block(&blocks[2].hash()).is_none());
        assert_eq!(cache.longest_chain().top().hash(), blocks[1].hash());
    }
}
