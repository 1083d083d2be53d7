//! Edge votes and aggregated edge votes
//!
//! An edge worker signs off on a checkpoint block with a BLS signature over
//! the RLP-encoded block hash. Gossip merges individual votes into
//! `AggregatedEdgeVotes`, a multi-signature with per-signer multiplicities
//! tracking how many times each signature was folded in.

use pando_core::{Address, BlsPublicKey, BlsSignature, Hash, PandoError, PandoResult};
use pando_crypto::bls;
use pando_crypto::BlsSecretKey;
use pando_state::EdgePool;
use rlp::RlpStream;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The signed payload for edge votes: RLP of the block hash alone. Height,
/// timestamp, address and multiplicities are never signed.
pub fn edge_vote_sign_bytes(block: &Hash) -> Vec<u8> {
    let mut s = RlpStream::new_list(1);
    s.append(block);
    s.out().to_vec()
}

/// A single edge worker's vote for a checkpoint block
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeVote {
    /// Hash of the block
    pub block: Hash,
    /// Height of the block, informational only
    pub height: u64,
    /// Address of the edge worker
    pub address: Address,
    /// BLS signature over the signed payload
    pub signature: BlsSignature,
    /// Unix timestamp of creation, informational only
    pub timestamp: i64,
}

impl EdgeVote {
    pub fn new(block: Hash, height: u64, address: Address, signature: BlsSignature) -> Self {
        Self {
            block,
            height,
            address,
            signature,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Create and sign a vote in one step.
    pub fn signed(block: Hash, height: u64, address: Address, key: &BlsSecretKey) -> Self {
        let signature = key.sign(&edge_vote_sign_bytes(&block));
        Self::new(block, height, address, signature)
    }

    pub fn sign_bytes(&self) -> Vec<u8> {
        edge_vote_sign_bytes(&self.block)
    }

    /// Verifies the vote against the worker's BLS public key.
    pub fn validate(&self, pubkey: &BlsPublicKey) -> PandoResult<()> {
        if self.signature.is_empty() {
            return Err(PandoError::InvalidVote("signature cannot be nil".into()));
        }
        if !bls::verify(pubkey, &self.sign_bytes(), &self.signature) {
            return Err(PandoError::InvalidVote(
                "edge vote signature validation failed".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for EdgeVote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EdgeVote{{block: {}, height: {}, address: {}}}",
            self.block, self.height, self.address
        )
    }
}

/// Aggregated edge votes on a block
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedEdgeVotes {
    /// Hash of the block
    pub block: Hash,
    /// Multiplicity of each signer, parallel to `addresses`
    pub multiplies: Vec<u32>,
    /// Signer addresses, strictly ascending
    pub addresses: Vec<Address>,
    /// Aggregated BLS signature
    pub signature: BlsSignature,
}

impl AggregatedEdgeVotes {
    /// The singleton aggregation of one raw vote.
    pub fn from_vote(vote: &EdgeVote) -> Self {
        Self {
            block: vote.block,
            multiplies: vec![1],
            addresses: vec![vote.address],
            signature: vote.signature,
        }
    }

    pub fn sign_bytes(&self) -> Vec<u8> {
        edge_vote_sign_bytes(&self.block)
    }

    /// Number of signers with a non-zero multiplicity.
    pub fn abs(&self) -> usize {
        self.multiplies.iter().filter(|m| **m != 0).count()
    }

    /// Creates a new aggregation combining two vote sets. Returns `Ok(None)`
    /// when `other` is a subset of `self` and contributes nothing new.
    pub fn merge(&self, other: &AggregatedEdgeVotes) -> PandoResult<Option<AggregatedEdgeVotes>> {
        if self.block != other.block {
            return Err(PandoError::IncompatibleVotes);
        }

        let mut new_multiplies = Vec::new();
        let mut new_addresses = Vec::new();
        let mut is_subset = true;

        let mut i = 0;
        let mut j = 0;
        while i < self.addresses.len() && j < other.addresses.len() {
            match self.addresses[i].cmp(&other.addresses[j]) {
                std::cmp::Ordering::Equal => {
                    let sum = self.multiplies[i]
                        .checked_add(other.multiplies[j])
                        .ok_or(PandoError::MultiplierOverflow)?;
                    new_addresses.push(self.addresses[i]);
                    new_multiplies.push(sum);
                    i += 1;
                    j += 1;
                }
                std::cmp::Ordering::Less => {
                    new_addresses.push(self.addresses[i]);
                    new_multiplies.push(self.multiplies[i]);
                    i += 1;
                    // an address only in `self` does not break subset-ness
                }
                std::cmp::Ordering::Greater => {
                    new_addresses.push(other.addresses[j]);
                    new_multiplies.push(other.multiplies[j]);
                    j += 1;
                    is_subset = false;
                }
            }
        }
        if i < self.addresses.len() {
            new_addresses.extend_from_slice(&self.addresses[i..]);
            new_multiplies.extend_from_slice(&self.multiplies[i..]);
        }
        if j < other.addresses.len() {
            new_addresses.extend_from_slice(&other.addresses[j..]);
            new_multiplies.extend_from_slice(&other.multiplies[j..]);
            is_subset = false;
        }

        if is_subset {
            return Ok(None);
        }

        let signature = bls::combine_signatures(&self.signature, &other.signature)?;
        Ok(Some(AggregatedEdgeVotes {
            block: self.block,
            multiplies: new_multiplies,
            addresses: new_addresses,
            signature,
        }))
    }

    /// Selects the better of two votes: the one carrying more signers.
    pub fn pick<'a>(
        &'a self,
        other: &'a AggregatedEdgeVotes,
    ) -> PandoResult<&'a AggregatedEdgeVotes> {
        if self.block != other.block {
            return Err(PandoError::IncompatibleVotes);
        }
        if other.abs() > self.abs() {
            Ok(other)
        } else {
            Ok(self)
        }
    }

    /// Full validation against the edge pool snapshot for this block.
    pub fn validate(&self, pool: &EdgePool) -> PandoResult<()> {
        if self.signature.is_empty() {
            return Err(PandoError::InvalidVote("signature cannot be nil".into()));
        }
        if self.addresses.is_empty() {
            return Err(PandoError::InvalidVote("aggregated vote is empty".into()));
        }
        if self.addresses.len() != self.multiplies.len() {
            return Err(PandoError::InvalidVote(
                "aggregated vote lengths are inconsistent".into(),
            ));
        }
        for window in self.addresses.windows(2) {
            if window[0] >= window[1] {
                return Err(PandoError::InvalidVote(
                    "aggregated vote addresses must be sorted".into(),
                ));
            }
        }
        for addr in &self.addresses {
            if pool.random_reward_weight(&self.block, addr) == 0 {
                return Err(PandoError::InvalidVote(
                    "aggregated vote contains workers not selected for checkpoint reward".into(),
                ));
            }
        }

        let pubkeys = self.pub_keys(pool).ok_or_else(|| {
            PandoError::InvalidVote("aggregated vote contains unknown workers".into())
        })?;
        let agg_pubkey = bls::aggregate_public_keys(&pubkeys, &self.multiplies)?;
        if !bls::verify(&agg_pubkey, &self.sign_bytes(), &self.signature) {
            return Err(PandoError::InvalidVote(
                "aggregated vote signature verification failed".into(),
            ));
        }

        Ok(())
    }

    fn pub_keys(&self, pool: &EdgePool) -> Option<Vec<BlsPublicKey>> {
        pool.get_pub_keys(&self.addresses)
    }
}

impl fmt::Debug for AggregatedEdgeVotes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AggregatedEdgeVotes{{block: {}, addresses: {:?}, multiplies: {:?}}}",
            self.block, self.addresses, self.multiplies
        )
    }
}

/// Aggregated guardian votes on a block. Multiplicities are positional over
/// the guardian candidate pool's sorted order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregatedGuardianVotes {
    pub block: Hash,
    pub multiplies: Vec<u32>,
    pub signature: BlsSignature,
}

impl AggregatedGuardianVotes {
    pub fn new(block: Hash, multiplies: Vec<u32>, signature: BlsSignature) -> Self {
        Self {
            block,
            multiplies,
            signature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;
    use pando_core::coins::coins_to_wei;
    use pando_state::StoreView;

    fn block() -> Hash {
        Hash::from_bytes([0xbb; 32])
    }

    fn addr(b: u8) -> Address {
        Address([b; 20])
    }

    fn key(seed: u8) -> BlsSecretKey {
        BlsSecretKey::from_seed(&[seed; 32])
    }

    fn singleton(address: Address, seed: u8) -> AggregatedEdgeVotes {
        let vote = EdgeVote::signed(block(), 1001, address, &key(seed));
        AggregatedEdgeVotes::from_vote(&vote)
    }

    #[test]
    fn test_merge_subset_returns_none() {
        let a = singleton(addr(1), 1).merge(&singleton(addr(2), 2)).unwrap().unwrap();
        let b = singleton(addr(1), 1);

        assert!(a.merge(&b).unwrap().is_none());
    }

    #[test]
    fn test_merge_disjoint() {
        let a = singleton(addr(1), 1).merge(&singleton(addr(2), 2)).unwrap().unwrap();
        let mut c = singleton(addr(3), 3);
        c.multiplies = vec![2];

        let merged = a.merge(&c).unwrap().unwrap();
        assert_eq!(merged.addresses, vec![addr(1), addr(2), addr(3)]);
        assert_eq!(merged.multiplies, vec![1, 1, 2]);
    }

    #[test]
    fn test_merge_sums_multiplicities() {
        let a = singleton(addr(1), 1);
        let b = singleton(addr(1), 1).merge(&singleton(addr(2), 2)).unwrap().unwrap();

        let merged = b.merge(&a).unwrap().unwrap();
        assert_eq!(merged.addresses, vec![addr(1), addr(2)]);
        assert_eq!(merged.multiplies, vec![2, 1]);
    }

    #[test]
    fn test_merge_is_commutative_in_content() {
        let a = singleton(addr(1), 1).merge(&singleton(addr(3), 3)).unwrap().unwrap();
        let b = singleton(addr(2), 2).merge(&singleton(addr(3), 3)).unwrap().unwrap();

        let ab = a.merge(&b).unwrap().unwrap();
        let ba = b.merge(&a).unwrap().unwrap();
        assert_eq!(ab.addresses, ba.addresses);
        assert_eq!(ab.multiplies, ba.multiplies);
    }

    #[test]
    fn test_merge_result_is_sorted() {
        let a = singleton(addr(5), 5).merge(&singleton(addr(9), 9)).unwrap().unwrap();
        let b = singleton(addr(1), 1).merge(&singleton(addr(7), 7)).unwrap().unwrap();

        let merged = a.merge(&b).unwrap().unwrap();
        assert!(merged.addresses.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_merge_rejects_different_blocks() {
        let a = singleton(addr(1), 1);
        let vote = EdgeVote::signed(Hash::from_bytes([0xcc; 32]), 1001, addr(2), &key(2));
        let b = AggregatedEdgeVotes::from_vote(&vote);

        assert!(matches!(a.merge(&b), Err(PandoError::IncompatibleVotes)));
    }

    #[test]
    fn test_merge_detects_multiplier_overflow() {
        let mut a = singleton(addr(1), 1);
        a.multiplies = vec![u32::MAX];
        let mut b = singleton(addr(1), 1).merge(&singleton(addr(2), 2)).unwrap().unwrap();
        b.multiplies = vec![1, 1];

        assert!(matches!(
            a.merge(&b),
            Err(PandoError::MultiplierOverflow)
        ));
    }

    #[test]
    fn test_pick_prefers_more_signers() {
        let a = singleton(addr(1), 1);
        let b = singleton(addr(2), 2).merge(&singleton(addr(3), 3)).unwrap().unwrap();

        assert_eq!(a.pick(&b).unwrap().addresses.len(), 2);
        assert_eq!(b.pick(&a).unwrap().addresses.len(), 2);
    }

    fn pool_with_workers(seeds: &[(u8, u8)]) -> EdgePool {
        let view = StoreView::new(1);
        let pool = EdgePool::new(view, false);
        for (addr_byte, key_seed) in seeds {
            pool.deposit_stake(
                addr(0xee),
                addr(*addr_byte),
                coins_to_wei(35_000),
                key(*key_seed).public_key(),
                1,
            )
            .unwrap();
        }
        pool
    }

    #[test]
    fn test_validate_merged_signature() {
        let pool = pool_with_workers(&[(1, 1), (2, 2)]);

        let merged = singleton(addr(1), 1).merge(&singleton(addr(2), 2)).unwrap().unwrap();
        merged.validate(&pool).unwrap();
    }

    #[test]
    fn test_validate_rejects_unknown_signer() {
        let pool = pool_with_workers(&[(1, 1)]);

        let merged = singleton(addr(1), 1).merge(&singleton(addr(2), 2)).unwrap().unwrap();
        assert!(merged.validate(&pool).is_err());
    }

    #[test]
    fn test_validate_rejects_unsorted_addresses() {
        let pool = pool_with_workers(&[(1, 1), (2, 2)]);

        let mut merged = singleton(addr(1), 1).merge(&singleton(addr(2), 2)).unwrap().unwrap();
        merged.addresses.swap(0, 1);
        merged.multiplies.swap(0, 1);
        assert!(merged.validate(&pool).is_err());
    }

    #[test]
    fn test_validate_rejects_wrong_multiplicity() {
        let pool = pool_with_workers(&[(1, 1), (2, 2)]);

        let mut merged = singleton(addr(1), 1).merge(&singleton(addr(2), 2)).unwrap().unwrap();
        // claim signer 1 signed twice even though it signed once
        merged.multiplies = vec![2, 1];
        assert!(merged.validate(&pool).is_err());
    }

    #[test]
    fn test_validate_requires_positive_weight() {
        // A worker whose stakes were all withdrawn samples a zero weight
        let pool = pool_with_workers(&[(1, 1)]);
        pool.withdraw_stake(addr(0xee), addr(1), 10).unwrap();

        let vote = singleton(addr(1), 1);
        assert!(vote.validate(&pool).is_err());

        // sanity: the total stake went back to zero
        assert_eq!(pool.total_stake(), BigInt::from(0));
    }

    #[test]
    fn test_sign_bytes_only_covers_block() {
        let v1 = EdgeVote::signed(block(), 1001, addr(1), &key(1));
        let v2 = EdgeVote::signed(block(), 2001, addr(2), &key(2));
        assert_eq!(v1.sign_bytes(), v2.sign_bytes());
    }
}
