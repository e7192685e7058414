//! Account identity
//!
//! Ed25519 keypairs for witnesses and transaction publishers. The account
//! identifier is the base58-encoded public key.

pub mod account;

pub use account::{Account, AccountId, KeyError};
