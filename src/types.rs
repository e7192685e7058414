//! Hash primitives shared by blocks, transactions and the fork tree

/// 32-byte blake3 digest.
pub type Hash = [u8; 32];

pub const ZERO_HASH: Hash = [0u8; 32];

pub fn blake3_hash(bytes: &[u8]) -> Hash {
    blake3::hash(bytes).into()
}

/// First 8 hex chars of a hash, for logs and tree dumps.
pub fn short_hex(h: &Hash) -> String {
    hex::encode(&h[..4])
}

/// Binary merkle root; an odd node is paired with itself. Empty input gives `ZERO_HASH`.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return ZERO_HASH;
    }

    let mut level: Vec<Hash> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for chunk in level.chunks(2) {
            let mut data = Vec::with_capacity(64);
            data.extend_from_slice(&chunk[0]);
            if chunk.len() > 1 {
                data.extend_from_slice(&chunk[1]);
            } else {
                data.extend_from_slice(&chunk[0]);
            }
            next.push(blake3_hash(&data));
        }
        level = next;
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merkle_root_of_single_leaf_is_the_leaf() {
        let leaf = blake3_hash(b"tx");
        assert_eq!(merkle_root(&[leaf]), leaf);
    }

    #[test]
    fn merkle_root_depends_on_order() {
        let a = blake3_hash(b"a");
        let b = blake3_hash(b"b");
        assert_ne!(merkle_root(&[a, b]), merkle_root(&[b, a]));
        assert_eq!(merkle_root(&[]), ZERO_HASH);
    }

    #[test]
    fn odd_leaf_is_duplicated() {
        let a = blake3_hash(b"a");
        let b = blake3_hash(b"b");
        let c = blake3_hash(b"c");
        assert_eq!(merkle_root(&[a, b, c]), merkle_root(&[a, b, c, c]));
    }
}
