//! Edge vote bookkeeper
//!
//! Time-bounded FIFO dedup of recently seen edge votes. The vote key
//! deliberately ignores the height reported by the vote, so duplicates
//! reporting different heights still collapse onto one record.

use parking_lot::Mutex;
use pando_crypto::hashing::keccak256;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::vote::EdgeVote;

/// Default number of vote records kept before FIFO eviction
pub const DEFAULT_MAX_NUM_VOTES_CACHED: usize = 5_000_000;

/// Records older than this are evicted on every query; longer than one
/// checkpoint interval
const MAX_VOTE_LIFE: Duration = Duration::from_secs(20 * 60);

/// A sighting record for one vote key
#[derive(Debug, Clone)]
pub struct VoteRecord {
    pub hash: String,
    pub count: u64,
    pub created_at: Instant,
}

impl VoteRecord {
    fn is_outdated(&self) -> bool {
        self.created_at.elapsed() > MAX_VOTE_LIFE
    }
}

#[derive(Default)]
struct Inner {
    vote_map: HashMap<String, VoteRecord>,
    vote_list: VecDeque<String>,
}

/// Keeps track of recently seen edge votes
pub struct EdgeVoteBookkeeper {
    inner: Mutex<Inner>,
    max_num_votes: usize,
}

impl EdgeVoteBookkeeper {
    pub fn new(max_num_votes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_num_votes,
        }
    }

    /// Records a sighting of the vote. Returns `true` if the vote is new;
    /// repeat sightings bump the record's count and return `false`.
    pub fn record(&self, vote: &EdgeVote) -> bool {
        let mut inner = self.inner.lock();
        Self::remove_outdated(&mut inner);

        let vote_hash = get_vote_hash(vote);
        if let Some(record) = inner.vote_map.get_mut(&vote_hash) {
            record.count += 1;
            return false;
        }

        if inner.vote_list.len() >= self.max_num_votes {
            // evict the oldest record
            if let Some(popped) = inner.vote_list.pop_front() {
                inner.vote_map.remove(&popped);
            }
        }

        let record = VoteRecord {
            hash: vote_hash.clone(),
            count: 0,
            created_at: Instant::now(),
        };
        inner.vote_map.insert(vote_hash.clone(), record);
        inner.vote_list.push_back(vote_hash);

        true
    }

    /// Whether the vote has been seen before.
    pub fn has_seen(&self, vote: &EdgeVote) -> bool {
        let mut inner = self.inner.lock();
        Self::remove_outdated(&mut inner);
        inner.vote_map.contains_key(&get_vote_hash(vote))
    }

    /// How many times the vote was seen again after first being recorded.
    pub fn receive_count(&self, vote: &EdgeVote) -> u64 {
        let mut inner = self.inner.lock();
        Self::remove_outdated(&mut inner);
        inner
            .vote_map
            .get(&get_vote_hash(vote))
            .map(|r| r.count)
            .unwrap_or(0)
    }

    fn remove_outdated(inner: &mut Inner) {
        while let Some(front) = inner.vote_list.front() {
            let outdated = inner
                .vote_map
                .get(front)
                .map(|r| r.is_outdated())
                .unwrap_or(true);
            if !outdated {
                return;
            }
            let hash = inner.vote_list.pop_front().expect("front exists");
            inner.vote_map.remove(&hash);
        }
    }
}

impl Default for EdgeVoteBookkeeper {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NUM_VOTES_CACHED)
    }
}

/// Dedup key for a vote: Keccak-256 of "address:block", hex encoded. The
/// reported height is discarded.
pub fn get_vote_hash(vote: &EdgeVote) -> String {
    let vote_str = format!("{}:{}", vote.address.to_hex(), vote.block.to_hex());
    keccak256(vote_str.as_bytes()).to_hex()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pando_core::{Address, BlsSignature, Hash};

    fn vote(addr_byte: u8, block_byte: u8, height: u64) -> EdgeVote {
        EdgeVote::new(
            Hash::from_bytes([block_byte; 32]),
            height,
            Address([addr_byte; 20]),
            BlsSignature([1u8; 96]),
        )
    }

    #[test]
    fn test_vote_hash_ignores_height() {
        assert_eq!(get_vote_hash(&vote(1, 2, 100)), get_vote_hash(&vote(1, 2, 999)));
        assert_ne!(get_vote_hash(&vote(1, 2, 100)), get_vote_hash(&vote(1, 3, 100)));
        assert_ne!(get_vote_hash(&vote(1, 2, 100)), get_vote_hash(&vote(2, 2, 100)));
    }

    #[test]
    fn test_record_counts_repeat_sightings() {
        let bookkeeper = EdgeVoteBookkeeper::new(100);
        let v = vote(1, 2, 100);

        assert!(!bookkeeper.has_seen(&v));
        assert!(bookkeeper.record(&v));
        assert!(bookkeeper.has_seen(&v));
        assert_eq!(bookkeeper.receive_count(&v), 0);

        assert!(!bookkeeper.record(&v));
        assert_eq!(bookkeeper.receive_count(&v), 1);

        // the same vote reporting another height still dedups
        assert!(!bookkeeper.record(&vote(1, 2, 555)));
        assert_eq!(bookkeeper.receive_count(&v), 2);
    }

    #[test]
    fn test_capacity_eviction_is_fifo() {
        let bookkeeper = EdgeVoteBookkeeper::new(2);
        let v1 = vote(1, 1, 1);
        let v2 = vote(2, 1, 1);
        let v3 = vote(3, 1, 1);

        assert!(bookkeeper.record(&v1));
        assert!(bookkeeper.record(&v2));
        assert!(bookkeeper.record(&v3));

        assert!(!bookkeeper.has_seen(&v1));
        assert!(bookkeeper.has_seen(&v2));
        assert!(bookkeeper.has_seen(&v3));
    }
}
