//! Hashing functions using Keccak-256

use pando_core::Hash;
use sha3::{Digest, Keccak256};

/// Compute the Keccak-256 hash of data
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);
    Hash::from_bytes(bytes)
}

/// Default hash function (Keccak-256)
pub fn hash(data: &[u8]) -> Hash {
    keccak256(data)
}

/// Hash multiple pieces of data as one stream
pub fn hash_multiple(parts: &[&[u8]]) -> Hash {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);
    Hash::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_deterministic() {
        let data = b"pando";
        assert_eq!(keccak256(data), keccak256(data));
        assert_ne!(keccak256(data), Hash::ZERO);
    }

    #[test]
    fn test_keccak256_known_vector() {
        // Keccak-256 of the empty string
        let expected =
            Hash::from_hex("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470")
                .unwrap();
        assert_eq!(keccak256(b""), expected);
    }

    #[test]
    fn test_hash_multiple_matches_concatenation() {
        let joined = hash(b"hello world");
        let parts = hash_multiple(&[b"hello ", b"world"]);
        assert_eq!(joined, parts);
    }
}
