//! Chain configuration
//!
//! Milestone heights, protocol constants and per-network settings. All of
//! this is immutable after startup and threaded through constructors.

use num_bigint::BigInt;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::coins::coins_to_wei;
use crate::types::{Address, Hash};

/// Interval between validator/guardian reward checkpoints
pub const CHECKPOINT_INTERVAL: u64 = 100;

/// Interval between edge reward checkpoints
pub const EDGE_CHECKPOINT_INTERVAL: u64 = 1000;

/// Number of blocks a withdrawn stake stays locked before it is returned
pub const STAKE_RETURN_LOCKING_PERIOD: u64 = 28_800;

/// Returns whether a block height is a validator/guardian checkpoint.
pub fn is_checkpoint_height(height: u64) -> bool {
    height % CHECKPOINT_INTERVAL == 1
}

/// Returns whether a block height is an edge checkpoint.
pub fn is_edge_checkpoint_height(height: u64) -> bool {
    height % EDGE_CHECKPOINT_INTERVAL == 1
}

/// Returns the height of the last checkpoint at or below `height`.
pub fn last_checkpoint_height(height: u64) -> u64 {
    (height / CHECKPOINT_INTERVAL) * CHECKPOINT_INTERVAL + 1
}

/// Minimum stake for a validator deposit (200,000 PTX)
pub static MIN_VALIDATOR_STAKE_DEPOSIT: Lazy<BigInt> = Lazy::new(|| coins_to_wei(200_000));

/// Minimum stake for a guardian deposit (10,000 PTX)
pub static MIN_GUARDIAN_STAKE_DEPOSIT: Lazy<BigInt> = Lazy::new(|| coins_to_wei(10_000));

/// Minimum stake for an enterprise-tier edge deposit (35,000 PTX).
/// Also the stake unit of the checkpoint sampling algorithm.
pub static MIN_EDGE_ENTERPRISE_STAKE_DEPOSIT: Lazy<BigInt> = Lazy::new(|| coins_to_wei(35_000));

/// Minimum stake for a pro-tier edge deposit (10,000 PTX)
pub static MIN_EDGE_PRO_STAKE_DEPOSIT: Lazy<BigInt> = Lazy::new(|| coins_to_wei(10_000));

/// Minimum stake for a lite-tier edge deposit (1,000 PTX)
pub static MIN_EDGE_LITE_STAKE_DEPOSIT: Lazy<BigInt> = Lazy::new(|| coins_to_wei(1_000));

/// Minimum stake for a mobile-tier edge deposit (250 PTX)
pub static MIN_EDGE_MOBILE_STAKE_DEPOSIT: Lazy<BigInt> = Lazy::new(|| coins_to_wei(250));

/// Per-network chain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain identifier mixed into transaction signing payloads
    pub chain_id: String,

    /// Minimal block height to enable the validator PTX reward
    pub height_enable_validator_reward: u64,

    /// Minimal block height to enable the Pando1.0 feature set (guardians)
    pub height_enable_pando1: u64,

    /// Minimal block height to enable the Pando2.0 feature set (edge workers)
    pub height_enable_pando2: u64,

    /// Block height to enable sampling of staking rewards
    pub height_sample_staking_reward: u64,

    /// Block height to enable the adjusted fee schedule
    pub height_fee_adjustment: u64,

    /// Block hash overrides keyed by height, consumed by snapshot import
    pub hardcoded_block_hashes: HashMap<u64, Hash>,

    /// Beneficiary of the default reward cut when a staker has no
    /// distribution rule configured
    pub reward_fee_address: Address,
}

impl ChainConfig {
    /// Mainnet configuration.
    pub fn mainnet() -> Self {
        Self {
            chain_id: "pandomainnet".to_string(),
            height_enable_validator_reward: 1,
            height_enable_pando1: 1,
            height_enable_pando2: 4_417_900,
            height_sample_staking_reward: 1,
            height_fee_adjustment: 1,
            hardcoded_block_hashes: HashMap::new(),
            reward_fee_address: Address::from_hex("0x034bfe9293dc20c5d9f32a9349261c8df2f873c4")
                .expect("valid fee address"),
        }
    }

    /// Returns the hardcoded hash for `height`, if one is configured.
    pub fn hardcoded_block_hash(&self, height: u64) -> Option<&Hash> {
        self.hardcoded_block_hashes.get(&height)
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::mainnet()
    }
}

/// Tuning knobs for the edge consensus engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConsensusConfig {
    /// Capacity of the raw and aggregate vote inboxes; excess votes are
    /// dropped since gossip replicates them
    pub vote_queue_size: usize,
}

impl Default for EdgeConsensusConfig {
    fn default() -> Self {
        Self {
            vote_queue_size: 1024,
        }
    }
}
