//! Edge worker pool
//!
//! The persistent pool of utility-staked edge workers, keyed by holder
//! address inside a state view, plus the stake-weighted sampling that
//! decides which workers are eligible for a checkpoint.

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use pando_core::config::MIN_EDGE_ENTERPRISE_STAKE_DEPOSIT;
use pando_core::{
    Address, BlsPublicKey, EdgeWorker, Hash, PandoError, PandoResult, Stake, StakeHolder,
};
use pando_crypto::HashRand;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use tracing::{debug, info};

use crate::keys;
use crate::store::StoreView;

/// Expected total number of selected stake units per checkpoint
const EDGE_REWARD_SAMPLES: u64 = 800;

/// A withdrawn stake waiting to be returned, remembered with its holder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeWithHolder {
    pub holder: Address,
    pub stake: Stake,
}

impl Encodable for StakeWithHolder {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.holder);
        s.append(&self.stake);
    }
}

impl Decodable for StakeWithHolder {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(StakeWithHolder {
            holder: rlp.val_at(0)?,
            stake: rlp.val_at(1)?,
        })
    }
}

/// Pool of edge workers backed by a state view
pub struct EdgePool {
    read_only: bool,
    sv: StoreView,
}

impl EdgePool {
    pub fn new(sv: StoreView, read_only: bool) -> Self {
        Self { read_only, sv }
    }

    /// Checks if the given holder address is in the pool.
    pub fn contains(&self, addr: &Address) -> bool {
        self.get(addr).is_some()
    }

    /// Returns the worker for a holder address, if present.
    pub fn get(&self, addr: &Address) -> Option<EdgeWorker> {
        let data = self.sv.get(&keys::edge_worker_key(addr))?;
        Some(
            rlp::decode(&data)
                .unwrap_or_else(|e| panic!("corrupted edge worker entry for {}: {}", addr, e)),
        )
    }

    /// BLS public keys for the given holders; `None` if any holder is
    /// missing from the pool.
    pub fn get_pub_keys(&self, addrs: &[Address]) -> Option<Vec<BlsPublicKey>> {
        addrs
            .iter()
            .map(|addr| self.get(addr).map(|w| w.pubkey))
            .collect()
    }

    /// Inserts or updates a worker.
    pub fn upsert(&self, worker: &EdgeWorker) {
        if self.read_only {
            panic!("EdgePool.upsert: the pool is read-only");
        }
        self.sv.set(
            keys::edge_worker_key(&worker.holder()),
            rlp::encode(worker).to_vec(),
        );
    }

    /// Deletes a worker from the pool.
    pub fn remove(&self, worker: &EdgeWorker) {
        if self.read_only {
            panic!("EdgePool.remove: the pool is read-only");
        }
        self.sv.delete(&keys::edge_worker_key(&worker.holder()));
    }

    /// All workers in ascending holder order. With `with_stake`, workers
    /// whose stakes are all withdrawn are skipped.
    pub fn get_all(&self, with_stake: bool) -> Vec<EdgeWorker> {
        let mut workers = Vec::new();
        self.sv.traverse(&keys::edge_worker_key_prefix(), |_, v| {
            let worker: EdgeWorker =
                rlp::decode(v).unwrap_or_else(|e| panic!("corrupted edge worker entry: {}", e));
            if with_stake {
                let has_stake = worker.stake_holder.stakes.iter().any(|s| !s.withdrawn);
                if !has_stake {
                    return true;
                }
            }
            workers.push(worker);
            true
        });
        workers
    }

    /// Total non-withdrawn stake across the pool.
    pub fn total_stake(&self) -> BigInt {
        self.sv.get_total_edge_stake()
    }

    pub fn deposit_stake(
        &self,
        source: Address,
        holder: Address,
        amount: BigInt,
        pubkey: BlsPublicKey,
        _block_height: u64,
    ) -> PandoResult<()> {
        if self.read_only {
            panic!("EdgePool.deposit_stake: the pool is read-only");
        }

        let worker = match self.get(&holder) {
            None => {
                let mut stake_holder = StakeHolder::new(holder, Vec::new());
                stake_holder.deposit_stake(source, amount.clone())?;
                EdgeWorker::new(stake_holder, pubkey)
            }
            Some(mut worker) => {
                if worker.holder() != holder {
                    panic!(
                        "EdgePool.deposit_stake: holder mismatch, worker.holder = {}, holder = {}",
                        worker.holder(),
                        holder
                    );
                }
                worker.deposit_stake(source, amount.clone())?;
                worker
            }
        };

        self.upsert(&worker);

        let total = self.sv.get_total_edge_stake() + &amount;
        self.sv.set_total_edge_stake(&total);

        Ok(())
    }

    pub fn withdraw_stake(
        &self,
        source: Address,
        holder: Address,
        current_height: u64,
    ) -> PandoResult<Stake> {
        if self.read_only {
            panic!("EdgePool.withdraw_stake: the pool is read-only");
        }

        let mut worker = self
            .get(&holder)
            .ok_or(PandoError::StakeHolderNotFound(holder))?;
        if worker.holder() != holder {
            panic!(
                "EdgePool.withdraw_stake: holder mismatch, worker.holder = {}, holder = {}",
                worker.holder(),
                holder
            );
        }

        let withdrawn = worker.withdraw_stake(source, current_height)?;
        self.upsert(&worker);

        let total = self.sv.get_total_edge_stake() - &withdrawn.amount;
        self.sv.set_total_edge_stake(&total);

        Ok(withdrawn)
    }

    /// Returns a withdrawn stake that is due at `current_height`, deleting
    /// the worker once its stake set becomes empty.
    pub fn return_stake(
        &self,
        current_height: u64,
        holder: Address,
        returned_stake: Stake,
    ) -> PandoResult<()> {
        if self.read_only {
            panic!("EdgePool.return_stake: the pool is read-only");
        }

        let mut worker = self
            .get(&holder)
            .ok_or(PandoError::StakeHolderNotFound(holder))?;

        let source = returned_stake.source;
        if let Some(stake) = worker
            .stake_holder
            .stakes
            .iter()
            .find(|s| s.source == source)
        {
            if !stake.withdrawn || stake.return_height != current_height {
                panic!(
                    "returned stake mismatch: holder = {}, source = {}, current_height = {}, withdrawn = {}, return_height = {}",
                    holder, source, current_height, stake.withdrawn, stake.return_height
                );
            }

            info!(source = %source, amount = %stake.amount, "Returning edge stake");
            worker.return_stake(source, current_height)?;

            if worker.stake_holder.stakes.is_empty() {
                self.remove(&worker);
            } else {
                self.upsert(&worker);
            }
        }

        Ok(())
    }

    /// Deterministic stake-weighted sampling weight for a holder at a block.
    /// Zero means the worker is not selected for this checkpoint.
    pub fn random_reward_weight(&self, block: &Hash, addr: &Address) -> u32 {
        let Some(worker) = self.get(addr) else {
            debug!(address = %addr, block = %block, "edge weight 0: not staked yet");
            return 0;
        };

        let total_stake = self.sv.get_total_edge_stake();
        let stake = worker.total_stake();

        let mut seed = Vec::with_capacity(Hash::ZERO.as_bytes().len() + addr.as_bytes().len());
        seed.extend_from_slice(block.as_bytes());
        seed.extend_from_slice(addr.as_bytes());

        sample_edge_weight(&mut HashRand::new(&seed), &stake, &total_stake)
    }
}

// The sampling below follows Algorand-style crypto sortition. With n the
// expected total number of selected stake units, S the worker's stake and
// S_min the enterprise stake unit, we flip a biased coin b = floor(S/S_min)
// times with head probability p = a * n * S_min / S_total, where
// a = (S/S_min) / b compensates stakes that are not a multiple of S_min.
// Splitting a stake across workers keeps the expected return unchanged.
pub fn sample_edge_weight(rng: &mut HashRand, stake: &BigInt, total_stake: &BigInt) -> u32 {
    if stake.is_zero() || total_stake.is_zero() {
        // happens when sampling a worker whose stakes are all withdrawn
        return 0;
    }

    if total_stake.is_negative() {
        panic!("negative total edge stake: {}", total_stake);
    }

    let unit = &*MIN_EDGE_ENTERPRISE_STAKE_DEPOSIT;
    let b = stake / unit;
    if b.is_zero() {
        return 0;
    }

    let base = BigInt::from(10u64).pow(18);
    let p = &base * BigInt::from(EDGE_REWARD_SAMPLES) * stake / total_stake / &b;

    let base = base.to_biguint().expect("base is positive");
    let p = p.to_biguint().expect("head probability is non-negative");

    let trials = b.to_u64().unwrap_or(u64::MAX);
    let mut weight = 0u32;
    for _ in 0..trials {
        if rng.next_below(&base) < p {
            weight += 1;
        }
    }

    weight
}
