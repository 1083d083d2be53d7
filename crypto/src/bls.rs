//! BLS12-381 signatures (min-pk variant)
//!
//! Aggregate signatures over the proof-of-possession ciphersuite. Aggregated
//! verification supports per-signer multiplicities: the effective public key
//! is `Σᵢ mᵢ · PKᵢ`, matching a signer whose signature was aggregated `mᵢ`
//! times during gossip.

use blst::min_pk;
use blst::BLST_ERROR;
use pando_core::{BlsPublicKey, BlsSignature, PandoError, PandoResult};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Domain separation tag for signatures
const SIG_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// Domain separation tag for proofs of possession
const POP_DST: &[u8] = b"BLS_POP_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// A BLS secret key. The raw scalar is scrubbed from memory on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct BlsSecretKey {
    secret: [u8; 32],
}

impl BlsSecretKey {
    /// Generate a new random secret key
    pub fn generate() -> Self {
        let mut ikm = Zeroizing::new([0u8; 32]);
        rand::rngs::OsRng.fill_bytes(ikm.as_mut_slice());
        Self::from_seed(&ikm)
    }

    /// Derive a secret key from 32 bytes of input key material
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let sk = min_pk::SecretKey::key_gen(seed, &[]).expect("32-byte ikm is always valid");
        Self {
            secret: sk.to_bytes(),
        }
    }

    fn scalar(&self) -> min_pk::SecretKey {
        min_pk::SecretKey::from_bytes(&self.secret).expect("stored scalar is valid")
    }

    /// Get the corresponding public key
    pub fn public_key(&self) -> BlsPublicKey {
        BlsPublicKey::from_bytes(self.scalar().sk_to_pk().to_bytes())
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> BlsSignature {
        BlsSignature::from_bytes(self.scalar().sign(message, SIG_DST, &[]).to_bytes())
    }

    /// Produce a proof of possession for the public key
    pub fn pop_prove(&self) -> BlsSignature {
        let sk = self.scalar();
        let pk_bytes = sk.sk_to_pk().to_bytes();
        BlsSignature::from_bytes(sk.sign(&pk_bytes, POP_DST, &[]).to_bytes())
    }
}

fn to_blst_pubkey(pubkey: &BlsPublicKey) -> PandoResult<min_pk::PublicKey> {
    min_pk::PublicKey::from_bytes(pubkey.as_bytes()).map_err(|_| PandoError::InvalidPublicKey)
}

fn to_blst_signature(signature: &BlsSignature) -> PandoResult<min_pk::Signature> {
    min_pk::Signature::from_bytes(signature.as_bytes()).map_err(|_| PandoError::InvalidSignature)
}

/// Verify a signature over a message by a single public key
pub fn verify(pubkey: &BlsPublicKey, message: &[u8], signature: &BlsSignature) -> bool {
    let (Ok(pk), Ok(sig)) = (to_blst_pubkey(pubkey), to_blst_signature(signature)) else {
        return false;
    };
    sig.verify(true, message, SIG_DST, &[], &pk, true) == BLST_ERROR::BLST_SUCCESS
}

/// Verify a proof of possession for a public key
pub fn pop_verify(pubkey: &BlsPublicKey, pop: &BlsSignature) -> bool {
    let (Ok(pk), Ok(sig)) = (to_blst_pubkey(pubkey), to_blst_signature(pop)) else {
        return false;
    };
    sig.verify(true, pubkey.as_bytes(), POP_DST, &[], &pk, true) == BLST_ERROR::BLST_SUCCESS
}

/// Aggregate two signatures into one
pub fn combine_signatures(a: &BlsSignature, b: &BlsSignature) -> PandoResult<BlsSignature> {
    let sa = to_blst_signature(a)?;
    let sb = to_blst_signature(b)?;
    let agg = min_pk::AggregateSignature::aggregate(&[&sa, &sb], false)
        .map_err(|_| PandoError::InvalidSignature)?;
    Ok(BlsSignature::from_bytes(agg.to_signature().to_bytes()))
}

/// Aggregate a list of signatures into one
pub fn aggregate_signatures(signatures: &[BlsSignature]) -> PandoResult<BlsSignature> {
    if signatures.is_empty() {
        return Err(PandoError::InvalidSignature);
    }
    let parsed: Vec<min_pk::Signature> = signatures
        .iter()
        .map(to_blst_signature)
        .collect::<PandoResult<_>>()?;
    let refs: Vec<&min_pk::Signature> = parsed.iter().collect();
    let agg = min_pk::AggregateSignature::aggregate(&refs, false)
        .map_err(|_| PandoError::InvalidSignature)?;
    Ok(BlsSignature::from_bytes(agg.to_signature().to_bytes()))
}

fn point_add(a: &min_pk::PublicKey, b: &min_pk::PublicKey) -> PandoResult<min_pk::PublicKey> {
    let agg = min_pk::AggregatePublicKey::aggregate(&[a, b], false)
        .map_err(|_| PandoError::InvalidPublicKey)?;
    Ok(agg.to_public_key())
}

/// Computes `m · pk` by binary double-and-add. Returns `None` for `m == 0`.
fn point_scale(pk: &min_pk::PublicKey, mut m: u32) -> PandoResult<Option<min_pk::PublicKey>> {
    let mut acc: Option<min_pk::PublicKey> = None;
    let mut base = pk.clone();
    while m > 0 {
        if m & 1 == 1 {
            acc = Some(match acc {
                None => base.clone(),
                Some(a) => point_add(&a, &base)?,
            });
        }
        m >>= 1;
        if m > 0 {
            base = point_add(&base, &base)?;
        }
    }
    Ok(acc)
}

/// Aggregate public keys with per-key multiplicities: `Σᵢ mᵢ · PKᵢ`.
///
/// Keys with a zero multiplicity contribute nothing; at least one key must
/// have a non-zero multiplicity.
pub fn aggregate_public_keys(
    pubkeys: &[BlsPublicKey],
    multiplies: &[u32],
) -> PandoResult<BlsPublicKey> {
    if pubkeys.len() != multiplies.len() {
        return Err(PandoError::InvalidVote(
            "pubkey and multiplicity lengths differ".to_string(),
        ));
    }

    let mut terms: Vec<min_pk::PublicKey> = Vec::with_capacity(pubkeys.len());
    for (pubkey, &m) in pubkeys.iter().zip(multiplies) {
        let pk = to_blst_pubkey(pubkey)?;
        if let Some(scaled) = point_scale(&pk, m)? {
            terms.push(scaled);
        }
    }

    let refs: Vec<&min_pk::PublicKey> = terms.iter().collect();
    let agg = min_pk::AggregatePublicKey::aggregate(&refs, false)
        .map_err(|_| PandoError::InvalidPublicKey)?;
    Ok(BlsPublicKey::from_bytes(agg.to_public_key().to_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(seed: u8) -> BlsSecretKey {
        BlsSecretKey::from_seed(&[seed; 32])
    }

    #[test]
    fn test_sign_and_verify() {
        let sk = key(1);
        let msg = b"checkpoint block";
        let sig = sk.sign(msg);

        assert!(verify(&sk.public_key(), msg, &sig));
        assert!(!verify(&sk.public_key(), b"other block", &sig));
        assert!(!verify(&key(2).public_key(), msg, &sig));
    }

    #[test]
    fn test_pop() {
        let sk = key(3);
        let pop = sk.pop_prove();
        assert!(pop_verify(&sk.public_key(), &pop));
        assert!(!pop_verify(&key(4).public_key(), &pop));
        // A plain signature over the pubkey bytes uses a different domain
        let fake = sk.sign(sk.public_key().as_bytes());
        assert!(!pop_verify(&sk.public_key(), &fake));
    }

    #[test]
    fn test_aggregate_with_multiplicities() {
        let sk1 = key(5);
        let sk2 = key(6);
        let msg = b"checkpoint block";

        // Signer 1 is aggregated twice, signer 2 once
        let sig = aggregate_signatures(&[sk1.sign(msg), sk1.sign(msg), sk2.sign(msg)]).unwrap();
        let agg_pk =
            aggregate_public_keys(&[sk1.public_key(), sk2.public_key()], &[2, 1]).unwrap();

        assert!(verify(&agg_pk, msg, &sig));

        // Wrong multiplicities must fail verification
        let wrong_pk =
            aggregate_public_keys(&[sk1.public_key(), sk2.public_key()], &[1, 1]).unwrap();
        assert!(!verify(&wrong_pk, msg, &sig));
    }

    #[test]
    fn test_scaled_aggregation_matches_repeated_keys() {
        let sk = key(7);
        let pk = sk.public_key();

        let tripled = aggregate_public_keys(&[pk], &[3]).unwrap();
        let repeated = aggregate_public_keys(&[pk, pk, pk], &[1, 1, 1]).unwrap();
        assert_eq!(tripled, repeated);
    }

    #[test]
    fn test_zero_multiplicity_contributes_nothing() {
        let sk1 = key(8);
        let sk2 = key(9);

        let with_zero =
            aggregate_public_keys(&[sk1.public_key(), sk2.public_key()], &[1, 0]).unwrap();
        let alone = aggregate_public_keys(&[sk1.public_key()], &[1]).unwrap();
        assert_eq!(with_zero, alone);
    }
}
