//! Proof-of-believability driver
//!
//! Two roles share one [`BlockCache`]:
//!
//! - producer: on every slot boundary, if the schedule names the local
//!   account, build a block on the longest chain, add it with the local
//!   verifier and broadcast it;
//! - consumer: decode inbound blocks (new and height-sync replies) and add
//!   them with the full verifier.
//!
//! Two more tasks answer height-sync requests from peers and forward
//! confirmed blocks to the tx source. A chain store failure stops them all.

pub mod block_builder;

pub use block_builder::{build_block, BuiltBlock};

use crate::block::Block;
use crate::cache::{BlockCache, CacheError, CacheOptions, ChainView};
use crate::chain::{BlockVerifier, ChainStore, StoreError};
use crate::config::{ConfigError, ConsensusConfig};
use crate::consensus::{
    now_unix_millis, time_until_next_slot, witness_of_time, DynamicProperty, StaticProperty,
    Timestamp,
};
use crate::genesis::genesis_block;
use crate::identity::Account;
use crate::mempool::TxSource;
use crate::metrics::PROM_POB_BLOCKS_PRODUCED;
use crate::p2p::{Message, ReqType, Router, RouterError};
use crate::state::StatePool;
use crate::types::short_hex;
use anyhow::Context;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum PobError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("chain store: {0}")]
    Store(#[from] StoreError),
    #[error("block cache: {0}")]
    Cache(#[from] CacheError),
    #[error("router: {0}")]
    Router(#[from] RouterError),
}

pub struct PoB {
    account: Account,
    static_prop: Arc<StaticProperty>,
    dynamic_prop: Mutex<DynamicProperty>,
    cache: Arc<BlockCache>,
    tx_source: Arc<dyn TxSource>,
    router: Arc<dyn Router>,
    tx_per_block: usize,
    full: BlockVerifier,
    local: BlockVerifier,
}

impl PoB {
    /// Validate `cfg`, push genesis into an empty store and root the cache at
    /// the store's tip. `base_state` is the state snapshot of that tip.
    pub fn new(
        account: Account,
        store: Arc<dyn ChainStore>,
        base_state: StatePool,
        cfg: &ConsensusConfig,
        tx_source: Arc<dyn TxSource>,
        router: Arc<dyn Router>,
    ) -> Result<Self, PobError> {
        cfg.validate()?;
        let static_prop = Arc::new(StaticProperty::from_config(cfg)?);
        if !static_prop.is_witness(account.id()) {
            tracing::warn!(
                target = "pob::driver",
                account = %account.id(),
                "local account is not in the witness list; this node only follows"
            );
        }

        if store.length() == 0 {
            let genesis = genesis_block();
            tracing::info!(
                target = "pob::driver",
                hash = %short_hex(&genesis.hash()),
                "empty chain store, pushing genesis"
            );
            store.push(Arc::new(genesis))?;
        }

        let mut dynamic_prop = DynamicProperty::default();
        if let Some(top) = store.top()? {
            dynamic_prop.update(&top.header, &static_prop);
        }
        let full = BlockVerifier::full(static_prop.clone());
        let cache = BlockCache::new(store, base_state, CacheOptions::from_config(cfg))?
            .with_parked_verifier(Arc::new(full.clone()));

        Ok(Self {
            cache: Arc::new(cache),
            full,
            local: BlockVerifier::local(static_prop.clone()),
            account,
            static_prop,
            dynamic_prop: Mutex::new(dynamic_prop),
            tx_source,
            router,
            tx_per_block: cfg.tx_per_block,
        })
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn block_cache(&self) -> &Arc<BlockCache> {
        &self.cache
    }

    pub fn static_property(&self) -> &StaticProperty {
        &self.static_prop
    }

    pub fn dynamic_property(&self) -> DynamicProperty {
        self.dynamic_prop.lock().clone()
    }

    /// Build (but do not add) a block on `chain` at `slot`.
    ///
    /// Pending txs with a bad signature are dropped from the tx source. Txs
    /// the longest pool refuses stay pending: they may sit in an unconfirmed
    /// block and come back after a reorg. Confirmation evicts them.
    pub fn gen_block(&self, chain: &ChainView, pool: &StatePool, slot: Timestamp) -> Block {
        let candidates = self.tx_source.pending_transactions(self.tx_per_block);
        let built = build_block(&self.account, chain.top(), pool, candidates, slot);
        if !built.skipped.is_empty() {
            tracing::debug!(
                target = "pob::driver",
                skipped = built.skipped.len(),
                "pending txs not applicable on the longest pool"
            );
        }
        if !built.rejected.is_empty() {
            tracing::warn!(
                target = "pob::driver",
                dropped = built.rejected.len(),
                "pending txs with bad signatures dropped"
            );
            self.tx_source.discard(&built.rejected);
        }
        built.block
    }

    /// Produce for slot `ts` if it is ours and the longest chain has not
    /// reached it yet. Returns the produced block.
    pub fn produce_at(&self, ts: Timestamp) -> Result<Option<Arc<Block>>, CacheError> {
        {
            let dp = self.dynamic_prop.lock();
            if witness_of_time(&self.static_prop, &dp, ts) != self.account.id() {
                return Ok(None);
            }
        }
        let chain = self.cache.longest_chain();
        if chain.top().header.time >= ts.slot {
            return Ok(None);
        }
        let pool = self.cache.longest_pool();
        let block = self.gen_block(&chain, &pool, ts);
        let hash = block.hash();

        self.cache.add(block.clone(), &self.local)?;
        self.dynamic_prop.lock().update(&block.header, &self.static_prop);
        PROM_POB_BLOCKS_PRODUCED.inc();
        tracing::info!(
            target = "pob::driver",
            height = block.number(),
            hash = %short_hex(&hash),
            slot = ts.slot,
            txs = block.content.len(),
            "block produced"
        );

        match block.encode() {
            Ok(bytes) => self.router.broadcast(Message::broadcast(
                self.account.id().clone(),
                ReqType::NewBlock,
                bytes,
            )),
            Err(e) => tracing::warn!(
                target = "pob::driver",
                error = %e,
                "produced block not encodable"
            ),
        }
        Ok(Some(Arc::new(block)))
    }

    /// Feed one inbound block message through the cache. Only fatal cache
    /// errors are returned; everything else is logged and dropped.
    pub fn handle_block(&self, msg: &Message) -> Result<(), CacheError> {
        let block = match Block::decode(&msg.body) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(
                    target = "pob::driver",
                    from = %msg.from,
                    error = %e,
                    "undecodable block dropped"
                );
                return Ok(());
            }
        };
        let number = block.number();
        let header = block.header.clone();

        match self.cache.add(block, &self.full) {
            Ok(()) => {
                self.dynamic_prop.lock().update(&header, &self.static_prop);
                Ok(())
            }
            Err(CacheError::Orphan { .. }) => {
                if number > 0 && !msg.from.is_empty() {
                    self.request_height(msg, number - 1);
                }
                Ok(())
            }
            Err(CacheError::Duplicate { .. }) => Ok(()),
            Err(CacheError::Stale { root, .. }) => {
                tracing::debug!(
                    target = "pob::driver",
                    from = %msg.from,
                    height = number,
                    root,
                    "stale block ignored"
                );
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(
                    target = "pob::driver",
                    from = %msg.from,
                    height = number,
                    error = %e,
                    "block rejected"
                );
                Ok(())
            }
        }
    }

    fn request_height(&self, msg: &Message, height: u64) {
        let me = self.account.id().clone();
        let req = match Message::request_height(me, msg.from.clone(), height) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target = "pob::driver", error = %e, "height request not encodable");
                return;
            }
        };
        if let Err(e) = self.router.send(req) {
            tracing::debug!(target = "pob::driver", height, error = %e, "height request not sent");
        }
    }

    /// Answer a `ReqBlockHeight` from the longest chain, if we have that height.
    pub fn handle_height_request(&self, msg: &Message) {
        let height = match msg.requested_height() {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(
                    target = "pob::driver",
                    from = %msg.from,
                    error = %e,
                    "bad height request"
                );
                return;
            }
        };
        let block = match self.cache.longest_chain().get_block_by_number(height) {
            Ok(Some(b)) => b,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(target = "pob::driver", height, error = %e, "height lookup failed");
                return;
            }
        };
        let body = match block.encode() {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(target = "pob::driver", height, error = %e, "block not encodable");
                return;
            }
        };
        let reply = Message::new(
            self.account.id().clone(),
            msg.from.clone(),
            ReqType::RecvBlockHeight,
            body,
        );
        if let Err(e) = self.router.send(reply) {
            tracing::debug!(target = "pob::driver", height, error = %e, "height reply not sent");
        }
    }

    /// Subscribe to the router and spawn the producer, consumer and sync tasks.
    pub fn run(self: Arc<Self>) -> anyhow::Result<PobHandle> {
        let blocks = self
            .router
            .filter(ReqType::NewBlock)
            .context("subscribe to new blocks")?;
        let sync_blocks = self
            .router
            .filter(ReqType::RecvBlockHeight)
            .context("subscribe to height-sync replies")?;
        let height_reqs = self
            .router
            .filter(ReqType::ReqBlockHeight)
            .context("subscribe to height-sync requests")?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let stop_tx = Arc::new(stop_tx);

        let producer = tokio::spawn(self.clone().producer_loop(stop_rx.clone(), stop_tx.clone()));
        let consumer = tokio::spawn(
            self.clone()
                .consumer_loop(blocks, sync_blocks, stop_rx.clone(), stop_tx.clone()),
        );
        let sync = tokio::spawn(self.clone().sync_loop(height_reqs, stop_rx.clone()));
        let mut tasks = vec![producer, consumer, sync];
        match self.cache.on_block_chan() {
            Some(confirmed) => {
                let forward = self.clone().confirmed_loop(confirmed, stop_rx);
                tasks.push(tokio::spawn(forward));
            }
            None => tracing::debug!(
                target = "pob::driver",
                "confirmed-block stream already taken; not forwarding to the tx source"
            ),
        }

        tracing::info!(
            target = "pob::driver",
            account = %self.account.id(),
            witnesses = self.static_prop.number_of_witnesses(),
            slot_ms = self.static_prop.slot_ms(),
            threshold = self.cache.confirm_threshold(),
            "consensus started"
        );

        Ok(PobHandle {
            stop: stop_tx,
            tasks,
        })
    }

    async fn producer_loop(
        self: Arc<Self>,
        mut stop: watch::Receiver<bool>,
        halt: Arc<watch::Sender<bool>>,
    ) {
        let slot_ms = self.static_prop.slot_ms();
        loop {
            let wait = time_until_next_slot(now_unix_millis(), slot_ms);
            tokio::select! {
                _ = stop.changed() => break,
                _ = tokio::time::sleep(wait) => {}
            }
            if *stop.borrow() {
                break;
            }
            let ts = Timestamp::now(slot_ms);
            if let Err(e) = self.produce_at(ts) {
                if e.is_fatal() {
                    tracing::error!(target = "pob::driver", error = %e, "stopping consensus");
                    let _ = halt.send(true);
                    break;
                }
                tracing::warn!(
                    target = "pob::driver",
                    slot = ts.slot,
                    error = %e,
                    "local block not added"
                );
            }
        }
        tracing::debug!(target = "pob::driver", "producer stopped");
    }

    async fn consumer_loop(
        self: Arc<Self>,
        mut blocks: mpsc::Receiver<Message>,
        mut sync_blocks: mpsc::Receiver<Message>,
        mut stop: watch::Receiver<bool>,
        halt: Arc<watch::Sender<bool>>,
    ) {
        loop {
            let msg = tokio::select! {
                _ = stop.changed() => break,
                Some(m) = blocks.recv() => m,
                Some(m) = sync_blocks.recv() => m,
                else => break,
            };
            if let Err(e) = self.handle_block(&msg) {
                tracing::error!(target = "pob::driver", error = %e, "stopping consensus");
                let _ = halt.send(true);
                break;
            }
        }
        tracing::debug!(target = "pob::driver", "consumer stopped");
    }

    async fn sync_loop(
        self: Arc<Self>,
        mut reqs: mpsc::Receiver<Message>,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                req = reqs.recv() => match req {
                    Some(m) => self.handle_height_request(&m),
                    None => break,
                },
            }
        }
        tracing::debug!(target = "pob::driver", "height-sync responder stopped");
    }

    async fn confirmed_loop(
        self: Arc<Self>,
        mut confirmed: mpsc::Receiver<Arc<Block>>,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                blk = confirmed.recv() => match blk {
                    Some(b) => self.tx_source.on_confirmed(&b),
                    None => break,
                },
            }
        }
        tracing::debug!(target = "pob::driver", "confirmed-block forwarder stopped");
    }
}

/// Running driver tasks.
pub struct PobHandle {
    stop: Arc<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl PobHandle {
    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Signal every task and wait for them to exit.
    pub async fn stop(self) -> anyhow::Result<()> {
        let _ = self.stop.send(true);
        for t in self.tasks {
            t.await.context("consensus task panicked")?;
        }
        Ok(())
    }
}
