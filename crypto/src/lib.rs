//! Cryptographic primitives for the Pando network
//!
//! Ed25519 account keys and signatures, BLS12-381 aggregate signatures for
//! the consensus tiers, Keccak-256 hashing, and the deterministic hash-based
//! PRNG that drives sampling.

pub mod bls;
pub mod hash_rand;
pub mod hashing;
pub mod keys;
pub mod signing;

pub use bls::BlsSecretKey;
pub use hash_rand::HashRand;
pub use keys::KeyPair;
