//! Witness / account identity derived from Ed25519 public keys
//!
//! Canonical formula: account_id = base58(ed25519_pubkey_bytes)
//!
//! The identifier is the key itself, so any node can check a block or
//! transaction signature from the declared producer without a key registry.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("account id is not valid base58: {0}")]
    Base58(String),
    #[error("account id must decode to 32 bytes, got {0}")]
    KeyLength(usize),
    #[error("account id is not a valid ed25519 public key")]
    InvalidKey,
    #[error("signature must be 64 bytes, got {0}")]
    SignatureLength(usize),
    #[error("signature verification failed")]
    BadSignature,
}

/// Public identifier of a witness or transaction publisher.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_pubkey(key: &VerifyingKey) -> Self {
        Self(bs58::encode(key.as_bytes()).into_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode the identifier back into the Ed25519 key it was derived from.
    pub fn verifying_key(&self) -> Result<VerifyingKey, KeyError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| KeyError::Base58(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::KeyLength(bytes.len()))?;
        VerifyingKey::from_bytes(&arr).map_err(|_| KeyError::InvalidKey)
    }

    /// Verify `signature` over `message` against this account's key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), KeyError> {
        let key = self.verifying_key()?;
        let sig =
            Signature::from_slice(signature)
                .map_err(|_| KeyError::SignatureLength(signature.len()))?;
        key.verify_strict(message, &sig)
            .map_err(|_| KeyError::BadSignature)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Local signing account.
#[derive(Clone)]
pub struct Account {
    id: AccountId,
    signing_key: SigningKey,
}

impl Account {
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let id = AccountId::from_pubkey(&signing_key.verifying_key());
        Self { id, signing_key }
    }

    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut rand::rngs::OsRng))
    }

    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(secret))
    }

    /// Deterministic account from a passphrase: secret = blake3(seed).
    pub fn from_seed(seed: &str) -> Self {
        Self::from_secret_bytes(blake3::hash(seed.as_bytes()).as_bytes())
    }

    pub fn id(&self) -> &AccountId {
        &self.id
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_roundtrips_to_key() {
        let account = Account::generate();
        let key = account.id().verifying_key().unwrap();
        assert_eq!(key, account.public_key());
    }

    #[test]
    fn seeded_accounts_are_deterministic() {
        let a = Account::from_seed("witness-0");
        let b = Account::from_seed("witness-0");
        let c = Account::from_seed("witness-1");
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn signature_verifies_only_for_signer_and_message() {
        let account = Account::generate();
        let other = Account::generate();
        let sig = account.sign(b"head");

        assert!(account.id().verify(b"head", &sig).is_ok());
        assert_eq!(
            account.id().verify(b"tail", &sig),
            Err(KeyError::BadSignature)
        );
        assert_eq!(other.id().verify(b"head", &sig), Err(KeyError::BadSignature));
        assert_eq!(
            account.id().verify(b"head", &sig[..10]),
            Err(KeyError::SignatureLength(10))
        );
    }

    #[test]
    fn garbage_ids_are_rejected() {
        assert!(matches!(
            AccountId::new("0OIl").verifying_key(),
            Err(KeyError::Base58(_))
        ));
        assert!(matches!(
            AccountId::new("abc").verifying_key(),
            Err(KeyError::KeyLength(_))
        ));
    }
}
