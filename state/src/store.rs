//! Ledger state views
//!
//! A `StoreView` is the ordered key-value window over the ledger state at a
//! given block height. Views are cheap to clone (clones share the same
//! underlying map); `snapshot` produces an independent deep copy. A view is
//! single-threaded within a block's execution; read-only snapshots may be
//! shared across tasks.

use num_bigint::BigInt;
use num_traits::Signed;
use parking_lot::RwLock;
use pando_core::coins::{bigint_from_rlp_bytes, bigint_to_rlp_bytes};
use pando_core::{Address, Coins};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::edge_pool::StakeWithHolder;
use crate::keys;
use crate::pools::{GuardianCandidatePool, ValidatorCandidatePool};

/// Account state: balance and transaction sequence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub sequence: u64,
    pub balance: Coins,
}

impl Account {
    pub fn new(sequence: u64, balance: Coins) -> Self {
        Self { sequence, balance }
    }
}

impl Encodable for Account {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.sequence);
        s.append(&self.balance);
    }
}

impl Decodable for Account {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(Account {
            sequence: rlp.val_at(0)?,
            balance: rlp.val_at(1)?,
        })
    }
}

/// Heights of blocks that contain stake transactions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeightList {
    pub heights: Vec<u64>,
}

impl HeightList {
    pub fn append(&mut self, height: u64) {
        self.heights.push(height);
    }
}

impl Encodable for HeightList {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.append_list(&self.heights);
    }
}

impl Decodable for HeightList {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(HeightList {
            heights: rlp.as_list()?,
        })
    }
}

/// Ordered key-value view over ledger state at a block height
#[derive(Clone)]
pub struct StoreView {
    height: u64,
    data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
    coinbase_processed: Arc<AtomicBool>,
}

impl StoreView {
    pub fn new(height: u64) -> Self {
        Self {
            height,
            data: Arc::new(RwLock::new(BTreeMap::new())),
            coinbase_processed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Height of the block this view reflects. During transaction execution
    /// the view points at the parent of the block being executed.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Independent deep copy of this view at a new height.
    pub fn snapshot_at(&self, height: u64) -> StoreView {
        StoreView {
            height,
            data: Arc::new(RwLock::new(self.data.read().clone())),
            coinbase_processed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Independent deep copy at the same height.
    pub fn snapshot(&self) -> StoreView {
        self.snapshot_at(self.height)
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.read().get(key).cloned()
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.data.read().contains_key(key)
    }

    pub fn set(&self, key: Vec<u8>, value: Vec<u8>) {
        self.data.write().insert(key, value);
    }

    pub fn delete(&self, key: &[u8]) {
        self.data.write().remove(key);
    }

    /// Visit every entry under `prefix` in ascending key order. The callback
    /// returns `false` to stop early.
    pub fn traverse(&self, prefix: &[u8], mut visit: impl FnMut(&[u8], &[u8]) -> bool) {
        let data = self.data.read();
        for (key, value) in data.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            if !visit(key, value) {
                break;
            }
        }
    }

    // ------------------------- typed accessors -------------------------

    pub fn get_account(&self, addr: &Address) -> Option<Account> {
        let data = self.get(&keys::account_key(addr))?;
        Some(
            rlp::decode(&data)
                .unwrap_or_else(|e| panic!("corrupted account entry for {}: {}", addr, e)),
        )
    }

    pub fn set_account(&self, addr: &Address, account: &Account) {
        self.set(keys::account_key(addr), rlp::encode(account).to_vec());
    }

    /// Total non-withdrawn stake across all edge workers.
    pub fn get_total_edge_stake(&self) -> BigInt {
        match self.get(&keys::edge_total_stake_key()) {
            Some(data) => bigint_from_rlp_bytes(&data),
            None => BigInt::from(0),
        }
    }

    pub fn set_total_edge_stake(&self, total: &BigInt) {
        if total.is_negative() {
            panic!("negative total edge stake: {}", total);
        }
        self.set(keys::edge_total_stake_key(), bigint_to_rlp_bytes(total));
    }

    pub fn get_validator_candidate_pool(&self) -> ValidatorCandidatePool {
        match self.get(&keys::validator_candidate_pool_key()) {
            Some(data) => {
                rlp::decode(&data).unwrap_or_else(|e| panic!("corrupted validator pool: {}", e))
            }
            None => ValidatorCandidatePool::default(),
        }
    }

    pub fn update_validator_candidate_pool(&self, pool: &ValidatorCandidatePool) {
        self.set(
            keys::validator_candidate_pool_key(),
            rlp::encode(pool).to_vec(),
        );
    }

    pub fn get_guardian_candidate_pool(&self) -> GuardianCandidatePool {
        match self.get(&keys::guardian_candidate_pool_key()) {
            Some(data) => {
                rlp::decode(&data).unwrap_or_else(|e| panic!("corrupted guardian pool: {}", e))
            }
            None => GuardianCandidatePool::default(),
        }
    }

    pub fn update_guardian_candidate_pool(&self, pool: &GuardianCandidatePool) {
        self.set(
            keys::guardian_candidate_pool_key(),
            rlp::encode(pool).to_vec(),
        );
    }

    /// Edge stakes scheduled to be returned at `height`.
    pub fn get_edge_stake_returns(&self, height: u64) -> Vec<StakeWithHolder> {
        match self.get(&keys::edge_stake_returns_key(height)) {
            Some(data) => Rlp::new(&data)
                .as_list()
                .unwrap_or_else(|e| panic!("corrupted stake return index at {}: {}", height, e)),
            None => Vec::new(),
        }
    }

    pub fn set_edge_stake_returns(&self, height: u64, returns: &[StakeWithHolder]) {
        self.set(
            keys::edge_stake_returns_key(height),
            rlp::encode_list(returns).to_vec(),
        );
    }

    pub fn delete_edge_stake_returns(&self, height: u64) {
        self.delete(&keys::edge_stake_returns_key(height));
    }

    pub fn get_stake_transaction_height_list(&self) -> HeightList {
        match self.get(&keys::stake_transaction_height_list_key()) {
            Some(data) => {
                rlp::decode(&data).unwrap_or_else(|e| panic!("corrupted height list: {}", e))
            }
            None => HeightList::default(),
        }
    }

    pub fn update_stake_transaction_height_list(&self, list: &HeightList) {
        self.set(
            keys::stake_transaction_height_list_key(),
            rlp::encode(list).to_vec(),
        );
    }

    /// Whether this block's coinbase transaction has been processed.
    pub fn coinbase_transaction_processed(&self) -> bool {
        self.coinbase_processed.load(Ordering::SeqCst)
    }

    pub fn set_coinbase_transaction_processed(&self, processed: bool) {
        self.coinbase_processed.store(processed, Ordering::SeqCst);
    }
}
