//! Transaction signatures
//!
//! Ed25519 signatures over RLP signing payloads. Addresses are derived from
//! verifying keys, so verification always goes through the signer's public
//! key carried alongside the signature in the transaction input.

use ed25519_dalek::{Signer, Verifier};
use pando_core::{PandoError, PandoResult, PublicKey, Signature};

use crate::keys::{public_key_to_ed25519, KeyPair};

/// Sign a payload with the keypair's signing key.
pub fn sign(keypair: &KeyPair, payload: &[u8]) -> Signature {
    Signature::from_bytes(keypair.signing_key().sign(payload).to_bytes())
}

/// Verify a payload signature against the signer's public key.
pub fn verify(public_key: &PublicKey, payload: &[u8], signature: &Signature) -> PandoResult<()> {
    let verifying_key = public_key_to_ed25519(public_key)?;
    let signature = ed25519_dalek::Signature::from_bytes(signature.as_bytes());

    verifying_key
        .verify(payload, &signature)
        .map_err(|_| PandoError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let keypair = KeyPair::from_seed(&[7u8; 32]);
        let payload = b"deposit stake";

        let signature = sign(&keypair, payload);
        assert!(verify(&keypair.public_key(), payload, &signature).is_ok());
    }

    #[test]
    fn test_invalid_signature() {
        let keypair1 = KeyPair::from_seed(&[7u8; 32]);
        let keypair2 = KeyPair::from_seed(&[8u8; 32]);
        let payload = b"deposit stake";

        let signature = sign(&keypair1, payload);

        assert!(verify(&keypair2.public_key(), payload, &signature).is_err());
        assert!(verify(&keypair1.public_key(), b"another payload", &signature).is_err());
    }
}
