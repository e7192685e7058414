//! Network boundary for the consensus driver
//!
//! Transport is pluggable: the driver only sees the [`Router`] trait. The
//! in-process [`LocalRouter`] connects several drivers inside one runtime.

pub mod protocol;
pub mod router;

pub use protocol::{Message, ReqType};
pub use router::{LocalNetwork, LocalRouter, Router, RouterError};

/// Inbound queue depth per subscribed message type.
pub const INBOUND_CAPACITY: usize = 1024;
