use super::BlockHeader;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Upper bound on any single encoded object accepted off the wire.
pub const MAX_ENCODED_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("bincode: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("encoded object is {0} bytes, limit is {MAX_ENCODED_BYTES}")]
    TooLarge(usize),
    #[error("{trailing} trailing bytes after decoded object")]
    TrailingBytes { trailing: usize },
}

/// Stable wire encoding (bincode, fixed-width little-endian integers).
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(bincode::serialize(value)?)
}

/// Strict decode: the whole buffer must be consumed, so `encode(decode(b)) == b`.
pub fn decode<T: DeserializeOwned + Serialize>(bytes: &[u8]) -> Result<T, CodecError> {
    if bytes.len() > MAX_ENCODED_BYTES {
        return Err(CodecError::TooLarge(bytes.len()));
    }
    let value: T = bincode::deserialize(bytes)?;
    let used = bincode::serialized_size(&value)? as usize;
    if used != bytes.len() {
        return Err(CodecError::TrailingBytes {
            trailing: bytes.len().saturating_sub(used),
        });
    }
    Ok(value)
}

/// Header bytes covered by the witness signature ("head info").
///
/// Layout: MAGIC + version + parent + tree_hash + info + number + witness + time.
/// Variable-length fields are prefixed with their u64 LE length.
pub fn head_info_bytes(h: &BlockHeader) -> Vec<u8> {
    let witness = h.witness.as_str().as_bytes();
    let mut out =
        Vec::with_capacity(4 + 4 + 32 + 32 + 8 + h.info.len() + 8 + 8 + witness.len() + 8);

    out.extend_from_slice(b"PoBH"); // magic
    out.extend_from_slice(&h.version.to_le_bytes());
    out.extend_from_slice(&h.parent_hash);
    out.extend_from_slice(&h.tree_hash);
    out.extend_from_slice(&(h.info.len() as u64).to_le_bytes());
    out.extend_from_slice(&h.info);
    out.extend_from_slice(&h.number.to_le_bytes());
    out.extend_from_slice(&(witness.len() as u64).to_le_bytes());
    out.extend_from_slice(witness);
    out.extend_from_slice(&h.time.to_le_bytes());
    out
}
