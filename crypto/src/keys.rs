//! Account key management
//!
//! Ed25519 keypairs for transaction signing and address derivation.

use ed25519_dalek::{SigningKey as Ed25519SigningKey, VerifyingKey as Ed25519VerifyingKey};
use pando_core::{Address, PandoError, PandoResult, PublicKey};
use rand::rngs::OsRng;

use crate::hashing::keccak256;

/// A keypair for signing and verification
#[derive(Clone)]
pub struct KeyPair {
    signing_key: Ed25519SigningKey,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let signing_key = Ed25519SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Create keypair from seed bytes
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = Ed25519SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Get the public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_bytes(self.signing_key.verifying_key().to_bytes())
    }

    /// Get the address derived from the public key
    pub fn address(&self) -> Address {
        address_from_public_key(&self.public_key())
    }

    pub(crate) fn signing_key(&self) -> &Ed25519SigningKey {
        &self.signing_key
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        // ed25519-dalek zeroizes the signing key internally
    }
}

/// Derive an address from a public key: the trailing 20 bytes of its
/// Keccak-256 hash.
pub fn address_from_public_key(public_key: &PublicKey) -> Address {
    let hash = keccak256(public_key.as_bytes());
    Address::from_slice(&hash.as_bytes()[12..]).expect("20-byte tail of a 32-byte hash")
}

/// Verify that an address matches a public key
pub fn verify_address(address: &Address, public_key: &PublicKey) -> bool {
    address == &address_from_public_key(public_key)
}

/// Convert our PublicKey type to an Ed25519 verifying key
pub fn public_key_to_ed25519(key: &PublicKey) -> PandoResult<Ed25519VerifyingKey> {
    Ed25519VerifyingKey::from_bytes(key.as_bytes()).map_err(|_| PandoError::InvalidPublicKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_derivation_is_stable() {
        let kp = KeyPair::from_seed(&[42u8; 32]);
        assert_eq!(kp.address(), kp.address());
        assert!(verify_address(&kp.address(), &kp.public_key()));
    }

    #[test]
    fn test_addresses_differ_per_key() {
        let a = KeyPair::from_seed(&[1u8; 32]);
        let b = KeyPair::from_seed(&[2u8; 32]);
        assert_ne!(a.address(), b.address());
        assert!(!verify_address(&a.address(), &b.public_key()));
    }
}
