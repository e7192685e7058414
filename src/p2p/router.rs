//! Message routing: the [`Router`] trait and an in-process hub

use super::protocol::{Message, ReqType};
use super::INBOUND_CAPACITY;
use crate::identity::AccountId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("{0:?} messages already have a subscriber")]
    AlreadySubscribed(ReqType),
    #[error("peer {0} is not connected")]
    UnknownPeer(AccountId),
    #[error("peer id {0} is already taken")]
    DuplicatePeer(AccountId),
    #[error("peer {peer} did not accept a {kind:?} message: {reason}")]
    Undelivered {
        peer: AccountId,
        kind: ReqType,
        reason: &'static str,
    },
}

/// Typed inbound channels plus outbound delivery.
///
/// `broadcast` is best effort: a peer with no subscriber or a full queue
/// misses the message. `send` reports such a drop as an error.
pub trait Router: Send + Sync {
    fn local_id(&self) -> &AccountId;

    /// Inbound messages of one type. One subscriber per type.
    fn filter(&self, req_type: ReqType) -> Result<mpsc::Receiver<Message>, RouterError>;

    /// Deliver to every peer but the sender.
    fn broadcast(&self, msg: Message);

    /// Deliver to `msg.to`.
    fn send(&self, msg: Message) -> Result<(), RouterError>;
}

type Inbox = HashMap<ReqType, mpsc::Sender<Message>>;

/// Shared hub all [`LocalRouter`]s of one test network register with.
#[derive(Default, Clone)]
pub struct LocalNetwork {
    peers: Arc<RwLock<HashMap<AccountId, Inbox>>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, id: AccountId) -> Result<LocalRouter, RouterError> {
        let mut peers = self.peers.write();
        if peers.contains_key(&id) {
            return Err(RouterError::DuplicatePeer(id));
        }
        peers.insert(id.clone(), Inbox::new());
        Ok(LocalRouter {
            id,
            net: self.clone(),
        })
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    fn deliver(&self, to: &AccountId, msg: Message) -> Result<(), RouterError> {
        let kind = msg.req_type;
        let undelivered = |reason| RouterError::Undelivered {
            peer: to.clone(),
            kind,
            reason,
        };
        let peers = self.peers.read();
        let inbox = peers
            .get(to)
            .ok_or_else(|| RouterError::UnknownPeer(to.clone()))?;
        let tx = inbox.get(&kind).ok_or_else(|| undelivered("no subscriber"))?;
        tx.try_send(msg).map_err(|e| {
            tracing::warn!(
                target = "pob::p2p",
                peer = %to,
                error = %e,
                "inbound queue rejected message"
            );
            match e {
                mpsc::error::TrySendError::Full(_) => undelivered("queue full"),
                mpsc::error::TrySendError::Closed(_) => undelivered("subscriber gone"),
            }
        })
    }
}

pub struct LocalRouter {
    id: AccountId,
    net: LocalNetwork,
}

impl Router for LocalRouter {
    fn local_id(&self) -> &AccountId {
        &self.id
    }

    fn filter(&self, req_type: ReqType) -> Result<mpsc::Receiver<Message>, RouterError> {
        let mut peers = self.net.peers.write();
        let inbox = peers
            .get_mut(&self.id)
            .ok_or_else(|| RouterError::UnknownPeer(self.id.clone()))?;
        if inbox.get(&req_type).is_some_and(|tx| !tx.is_closed()) {
            return Err(RouterError::AlreadySubscribed(req_type));
        }
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        inbox.insert(req_type, tx);
        Ok(rx)
    }

    fn broadcast(&self, msg: Message) {
        let targets: Vec<AccountId> = self
            .net
            .peers
            .read()
            .keys()
            .filter(|id| **id != self.id)
            .cloned()
            .collect();
        let mut delivered = 0usize;
        for peer in &targets {
            if self.net.deliver(peer, msg.clone()).is_ok() {
                delivered += 1;
            }
        }
        tracing::trace!(
            target = "pob::p2p",
            kind = ?msg.req_type,
            delivered,
            peers = targets.len(),
            "broadcast"
        );
    }

    fn send(&self, msg: Message) -> Result<(), RouterError> {
        let to = msg.to.clone();
        self.net.deliver(&to, msg)
    }
}

impl Drop for LocalRouter {
    fn drop(&mut self) {
        self.net.peers.write().remove(&self.id);
    }
}
