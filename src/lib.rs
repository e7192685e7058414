//! pob-core: witness-scheduled consensus core
//!
//! A fixed set of witnesses take turns producing blocks on time slots. The
//! [`cache::BlockCache`] holds every competing fork above the last confirmed
//! block and finalizes a block once enough distinct witnesses have built on
//! it. [`pob::PoB`] drives production and ingestion on top of it.

pub mod block;
pub mod cache;
pub mod chain;
pub mod config;
pub mod consensus;
pub mod genesis;
pub mod identity;
pub mod mempool;
pub mod metrics;
pub mod p2p;
pub mod pob;
pub mod state;
pub mod tx;
pub mod types;

pub use block::{Block, BlockHeader};
pub use cache::{BlockCache, CacheError, CacheOptions, ChainView};
pub use chain::{BlockVerifier, ChainStore, MemoryChain, SledChain, Verifier, VerifyError};
pub use config::ConsensusConfig;
pub use consensus::{witness_of_time, DynamicProperty, StaticProperty, Timestamp};
pub use identity::{Account, AccountId};
pub use mempool::{TxPool, TxSource};
pub use pob::{PoB, PobHandle};
pub use state::StatePool;
pub use tx::Transaction;
pub use types::Hash;
