//! Coinbase reward execution
//!
//! Runs once per block. At checkpoint heights it computes the
//! validator/guardian rewards and, at edge checkpoints, the edge mining
//! rewards, then mints the outputs. Reward computation is deterministic:
//! the randomized path is seeded from on-chain values and the reward map is
//! keyed by address in sorted order.

use num_bigint::BigInt;
use num_traits::Zero;
use once_cell::sync::Lazy;
use pando_consensus::{AggregatedEdgeVotes, AggregatedGuardianVotes};
use pando_core::coins::WEI_MULTIPLIER;
use pando_core::config::{
    is_checkpoint_height, is_edge_checkpoint_height, CHECKPOINT_INTERVAL, EDGE_CHECKPOINT_INTERVAL,
};
use pando_core::{
    Address, ChainConfig, Coins, Hash, PandoError, PandoResult, Stake, ValidatorSet,
};
use pando_crypto::signing;
use pando_crypto::HashRand;
use pando_state::{
    EdgePool, GuardianCandidatePool, StakeRewardDistributionRuleSet, StoreView,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::executor::{get_or_make_account, TxExecutor, TxInfo, ViewSelector};
use crate::transaction::{CoinbaseTx, Tx};

/// Validator/guardian utility reward minted per block
static PTX_REWARD_PER_BLOCK: Lazy<BigInt> = Lazy::new(|| BigInt::from(7) * &*WEI_MULTIPLIER);

/// Edge utility reward minted per block
static EDGE_PTX_REWARD_PER_BLOCK: Lazy<BigInt> = Lazy::new(|| BigInt::from(1) * &*WEI_MULTIPLIER);

/// Flat cut credited to the fee address when a staker has no split rule
static SPLIT_FALLBACK_FEE_REWARD: Lazy<BigInt> = Lazy::new(|| BigInt::from(10) * &*WEI_MULTIPLIER);

/// Number of uniform draws in the randomized reward path
const PTX_REWARD_SAMPLES: u64 = 400;

/// What the coinbase executor needs to know about the block being executed.
/// Injected by the ledger so the executor does not hold a reference back
/// into the consensus engine.
pub trait CheckpointContext: Send + Sync {
    /// The active validator set.
    fn validator_set(&self) -> ValidatorSet;

    /// The guardian aggregate vote embedded in the current block.
    fn guardian_votes(&self) -> Option<AggregatedGuardianVotes>;

    /// The edge aggregate vote embedded in the current block.
    fn edge_votes(&self) -> Option<AggregatedEdgeVotes>;

    /// A state view as of the given block.
    fn view_of_block(&self, block: &Hash) -> PandoResult<StoreView>;
}

/// Executes the per-block coinbase transaction
pub struct CoinbaseTxExecutor {
    config: Arc<ChainConfig>,
    context: Arc<dyn CheckpointContext>,
}

impl CoinbaseTxExecutor {
    pub fn new(config: Arc<ChainConfig>, context: Arc<dyn CheckpointContext>) -> Self {
        Self { config, context }
    }

    fn cast<'a>(&self, tx: &'a Tx) -> PandoResult<&'a CoinbaseTx> {
        match tx {
            Tx::Coinbase(tx) => Ok(tx),
            _ => Err(PandoError::InvalidTransaction(
                "expected a coinbase transaction".into(),
            )),
        }
    }

    /// Recomputes the reward map this block is expected to mint.
    pub fn expected_rewards(&self, view: &StoreView) -> PandoResult<BTreeMap<Address, Coins>> {
        // the view points to the parent of the current block
        let block_height = view.height() + 1;

        let validator_set = self.context.validator_set();
        let guardian_votes = self.context.guardian_votes();
        let edge_votes = self.context.edge_votes();

        let (guardian_pool, edge_pool) = retrieve_pools(
            &self.config,
            self.context.as_ref(),
            block_height,
            guardian_votes.as_ref(),
            edge_votes.as_ref(),
        )?;

        Ok(calculate_reward(
            &self.config,
            view,
            &validator_set,
            guardian_votes.as_ref(),
            guardian_pool.as_ref(),
            edge_votes.as_ref(),
            edge_pool.as_ref(),
        ))
    }

    /// Returns the edge stakes whose locking period ends at this block and
    /// credits them back to their sources.
    fn return_due_edge_stakes(&self, view: &StoreView) -> PandoResult<()> {
        let block_height = view.height() + 1;
        let due = view.get_edge_stake_returns(block_height);
        if due.is_empty() {
            return Ok(());
        }

        let pool = EdgePool::new(view.clone(), false);
        for item in due {
            let source = item.stake.source;
            let amount = item.stake.amount.clone();
            pool.return_stake(block_height, item.holder, item.stake)?;

            let mut account = get_or_make_account(view, &source);
            account.balance = account.balance.plus(&Coins::ptx(amount.clone()));
            view.set_account(&source, &account);

            info!(source = %source, amount = %amount, "Returned edge stake");
        }
        view.delete_edge_stake_returns(block_height);

        Ok(())
    }
}

impl TxExecutor for CoinbaseTxExecutor {
    fn sanity_check(
        &self,
        chain_id: &str,
        view: &StoreView,
        _view_sel: ViewSelector,
        tx: &Tx,
    ) -> PandoResult<()> {
        let tx = self.cast(tx)?;

        tx.proposer.validate_basic()?;

        // at most one coinbase transaction per block
        if view.coinbase_transaction_processed() {
            return Err(PandoError::InvalidTransaction(
                "another coinbase transaction has been processed for the current block".into(),
            ));
        }

        let validator_set = self.context.validator_set();
        if !validator_set.contains(&tx.proposer.address) {
            return Err(PandoError::InvalidTransaction(
                "coinbase proposer is not a validator".into(),
            ));
        }

        let sign_bytes = tx.sign_bytes(chain_id);
        signing::verify(&tx.proposer.public_key, &sign_bytes, &tx.proposer.signature)
            .map_err(|_| PandoError::InvalidSignature)?;

        let block_height = view.height() + 1;
        if tx.block_height != block_height {
            return Err(PandoError::InvalidTransaction(format!(
                "invalid block height for the coinbase transaction: tx {} vs state {}",
                tx.block_height, block_height
            )));
        }

        let expected = self.expected_rewards(view)?;
        let actual: BTreeMap<Address, Coins> = tx
            .outputs
            .iter()
            .map(|o| (o.address, o.coins.clone()))
            .collect();
        if actual != expected {
            return Err(PandoError::InvalidTransaction(
                "coinbase outputs do not match the expected rewards".into(),
            ));
        }

        Ok(())
    }

    fn process(
        &self,
        chain_id: &str,
        view: &StoreView,
        _view_sel: ViewSelector,
        tx: &Tx,
    ) -> PandoResult<Hash> {
        let tx_hash = tx.hash(chain_id);
        let tx = self.cast(tx)?;

        if view.coinbase_transaction_processed() {
            return Err(PandoError::InvalidTransaction(
                "another coinbase transaction has been processed for the current block".into(),
            ));
        }

        for output in &tx.outputs {
            let mut account = get_or_make_account(view, &output.address);
            account.balance = account.balance.plus(&output.coins);
            view.set_account(&output.address, &account);
        }

        view.set_coinbase_transaction_processed(true);

        self.return_due_edge_stakes(view)?;

        Ok(tx_hash)
    }

    fn get_tx_info(&self, tx: &Tx) -> PandoResult<TxInfo> {
        let tx = self.cast(tx)?;
        Ok(TxInfo {
            address: tx.proposer.address,
            sequence: tx.proposer.sequence,
            effective_gas_price: BigInt::zero(),
        })
    }

    fn calculate_effective_gas_price(&self, _tx: &Tx) -> PandoResult<BigInt> {
        Ok(BigInt::zero())
    }
}

/// Loads the guardian and edge pools backing this block's rewards. Edge
/// rewards require the edge vote to target the same block as the guardian
/// vote, since the guardian vote is what confirms the checkpoint.
pub fn retrieve_pools(
    config: &ChainConfig,
    context: &dyn CheckpointContext,
    block_height: u64,
    guardian_votes: Option<&AggregatedGuardianVotes>,
    edge_votes: Option<&AggregatedEdgeVotes>,
) -> PandoResult<(Option<GuardianCandidatePool>, Option<EdgePool>)> {
    if block_height < config.height_enable_pando1 {
        return Ok((None, None));
    }

    let Some(guardian_votes) = guardian_votes else {
        return Ok((None, None));
    };

    let checkpoint_view = context.view_of_block(&guardian_votes.block)?;
    let guardian_pool = checkpoint_view.get_guardian_candidate_pool();

    if block_height < config.height_enable_pando2 {
        return Ok((Some(guardian_pool), None));
    }

    let edge_pool = match edge_votes {
        Some(edge_votes) if edge_votes.block == guardian_votes.block => {
            Some(EdgePool::new(checkpoint_view, true))
        }
        Some(edge_votes) => {
            warn!(
                edge_block = %edge_votes.block,
                guardian_block = %guardian_votes.block,
                "edge vote targets a different block than the guardian vote, skipping edge rewards"
            );
            None
        }
        None => None,
    };

    Ok((Some(guardian_pool), edge_pool))
}

/// Calculates the block reward for each account. The result is keyed by
/// address, which iterates in sorted order.
pub fn calculate_reward(
    config: &ChainConfig,
    view: &StoreView,
    validator_set: &ValidatorSet,
    guardian_votes: Option<&AggregatedGuardianVotes>,
    guardian_pool: Option<&GuardianCandidatePool>,
    edge_votes: Option<&AggregatedEdgeVotes>,
    edge_pool: Option<&EdgePool>,
) -> BTreeMap<Address, Coins> {
    let mut rewards = BTreeMap::new();
    // the view points to the parent of the current block
    let block_height = view.height() + 1;

    if block_height < config.height_enable_validator_reward {
        grant_validators_with_zero_reward(validator_set, &mut rewards);
    } else if block_height < config.height_enable_pando1
        || guardian_votes.is_none()
        || guardian_pool.is_none()
    {
        grant_validator_reward(view, validator_set, &mut rewards, block_height);
    } else {
        let guardian_votes = guardian_votes.expect("checked above");
        let guardian_pool = guardian_pool.expect("checked above");
        grant_validator_and_guardian_reward(
            config,
            view,
            validator_set,
            guardian_votes,
            guardian_pool,
            &mut rewards,
            block_height,
        );
        if block_height >= config.height_enable_pando2 {
            grant_edge_reward(config, view, edge_votes, edge_pool, &mut rewards, block_height);
        }
    }

    rewards
}

/// Before validator rewards are enabled every validator still gets a
/// zero-coin entry so downstream receipts keep a consistent shape.
fn grant_validators_with_zero_reward(
    validator_set: &ValidatorSet,
    rewards: &mut BTreeMap<Address, Coins>,
) {
    for validator in validator_set.validators() {
        rewards.insert(validator.address, Coins::zero());
    }
}

/// Proportional validator-only rewards, used before the guardian era.
fn grant_validator_reward(
    view: &StoreView,
    validator_set: &ValidatorSet,
    rewards: &mut BTreeMap<Address, Coins>,
    block_height: u64,
) {
    if !is_checkpoint_height(block_height) {
        return;
    }

    let total_stake = validator_set.total_stake();
    if total_stake.is_zero() {
        return;
    }

    let vcp = view.get_validator_candidate_pool();
    let mut stake_source_map: BTreeMap<Address, BigInt> = BTreeMap::new();
    for validator in validator_set.validators() {
        let delegate = vcp
            .find_stake_delegate(&validator.address)
            .unwrap_or_else(|| {
                panic!(
                    "failed to find stake delegate in the VCP: {}",
                    validator.address
                )
            });
        for stake in &delegate.stakes {
            if stake.withdrawn {
                continue;
            }
            let entry = stake_source_map
                .entry(stake.source)
                .or_insert_with(BigInt::zero);
            *entry += &stake.amount;
        }
    }

    let total_reward = &*PTX_REWARD_PER_BLOCK * BigInt::from(CHECKPOINT_INTERVAL);

    // the sources divide the block reward proportional to their stake
    for (source, amount) in &stake_source_map {
        let reward = &total_reward * amount / &total_stake;
        info!(staker = %source, reward = %reward, "Block reward");
        add_reward_to_map(rewards, *source, reward);
    }
}

/// Checkpoint rewards for validators and voting guardians.
fn grant_validator_and_guardian_reward(
    config: &ChainConfig,
    view: &StoreView,
    validator_set: &ValidatorSet,
    guardian_votes: &AggregatedGuardianVotes,
    guardian_pool: &GuardianCandidatePool,
    rewards: &mut BTreeMap<Address, Coins>,
    block_height: u64,
) {
    if !is_checkpoint_height(block_height) {
        return;
    }

    let mut total_stake = validator_set.total_stake();
    let guardian_pool = guardian_pool.with_stake();

    if total_stake.is_zero() {
        return;
    }

    // stakes from the same source stay grouped together for compatibility
    // with the sampling walk
    let mut effective_stakes: Vec<Vec<Stake>> = Vec::new();
    let mut group_index: HashMap<Address, usize> = HashMap::new();

    let vcp = view.get_validator_candidate_pool();
    for validator in validator_set.validators() {
        let delegate = vcp
            .find_stake_delegate(&validator.address)
            .unwrap_or_else(|| {
                panic!(
                    "failed to find stake delegate in the VCP: {}",
                    validator.address
                )
            });
        for stake in &delegate.stakes {
            if stake.withdrawn {
                continue;
            }
            let mut stake = stake.clone();
            stake.holder = delegate.holder;
            let idx = *group_index
                .entry(stake.source)
                .or_insert_with(|| {
                    effective_stakes.push(Vec::new());
                    effective_stakes.len() - 1
                });
            effective_stakes[idx].push(stake);
        }
    }

    for (i, guardian) in guardian_pool.guardians().iter().enumerate() {
        if guardian_votes.multiplies.get(i).copied().unwrap_or(0) == 0 {
            continue;
        }
        for stake in &guardian.stake_holder.stakes {
            if stake.withdrawn {
                continue;
            }
            total_stake += &stake.amount;

            let mut stake = stake.clone();
            stake.holder = guardian.holder();
            let idx = *group_index
                .entry(stake.source)
                .or_insert_with(|| {
                    effective_stakes.push(Vec::new());
                    effective_stakes.len() - 1
                });
            effective_stakes[idx].push(stake);
        }
    }

    let total_reward = &*PTX_REWARD_PER_BLOCK * BigInt::from(CHECKPOINT_INTERVAL);

    let srdsr = (block_height >= config.height_enable_pando2)
        .then(|| StakeRewardDistributionRuleSet::new(view.clone()));

    if block_height < config.height_sample_staking_reward {
        issue_fixed_reward(
            &effective_stakes,
            &total_stake,
            rewards,
            &total_reward,
            srdsr.as_ref(),
            config,
        );
    } else {
        issue_randomized_reward(
            guardian_votes,
            view,
            &effective_stakes,
            &total_stake,
            rewards,
            &total_reward,
            srdsr.as_ref(),
            config,
        );
    }
}

/// Edge mining rewards at edge checkpoints. Only signers of the edge
/// aggregate vote with a non-zero sampled weight accumulate effective
/// stake.
fn grant_edge_reward(
    config: &ChainConfig,
    view: &StoreView,
    edge_votes: Option<&AggregatedEdgeVotes>,
    edge_pool: Option<&EdgePool>,
    rewards: &mut BTreeMap<Address, Coins>,
    block_height: u64,
) {
    if !is_checkpoint_height(block_height) || !is_edge_checkpoint_height(block_height) {
        return;
    }
    let (Some(edge_votes), Some(pool)) = (edge_votes, edge_pool) else {
        return;
    };

    let pool_total = pool.total_stake();
    if pool_total.is_zero() {
        return;
    }

    let amplifier = &*WEI_MULTIPLIER;
    let mut effective_stakes: Vec<Vec<Stake>> = Vec::new();
    let mut group_index: HashMap<Address, usize> = HashMap::new();
    let mut total_effective_stake = BigInt::zero();

    for (addr, mult) in edge_votes.addresses.iter().zip(&edge_votes.multiplies) {
        if *mult == 0 {
            continue;
        }
        let Some(worker) = pool.get(addr) else {
            continue;
        };
        let weight = pool.random_reward_weight(&edge_votes.block, addr);
        if weight == 0 {
            continue;
        }

        let amplified_weight = amplifier * BigInt::from(weight);
        for stake in &worker.stake_holder.stakes {
            if stake.withdrawn {
                continue;
            }
            let effective_amount = &amplified_weight * &stake.amount / &pool_total;
            debug!(
                holder = %worker.holder(),
                staker = %stake.source,
                weight,
                effective = %effective_amount,
                "edge effective stake"
            );

            let effective = Stake {
                holder: worker.holder(),
                source: stake.source,
                amount: effective_amount.clone(),
                withdrawn: false,
                return_height: u64::MAX,
            };
            let idx = *group_index
                .entry(effective.source)
                .or_insert_with(|| {
                    effective_stakes.push(Vec::new());
                    effective_stakes.len() - 1
                });
            effective_stakes[idx].push(effective);

            total_effective_stake += effective_amount;
        }
    }

    let total_reward = &*EDGE_PTX_REWARD_PER_BLOCK * BigInt::from(EDGE_CHECKPOINT_INTERVAL);
    info!(total_reward = %total_reward, "Edge reward distributed to voting edge stakers");

    let srdsr = (block_height >= config.height_enable_pando2)
        .then(|| StakeRewardDistributionRuleSet::new(view.clone()));

    issue_fixed_reward(
        &effective_stakes,
        &total_effective_stake,
        rewards,
        &total_reward,
        srdsr.as_ref(),
        config,
    );
}

fn add_reward_to_map(rewards: &mut BTreeMap<Address, Coins>, receiver: Address, amount: BigInt) {
    let coins = Coins::ptx(amount);
    let entry = rewards.entry(receiver).or_insert_with(Coins::zero);
    *entry = entry.plus(&coins);
}

/// Applies the holder's reward split, or the default fee-address cut when
/// no rule is configured.
fn handle_split(
    stake: &Stake,
    srdsr: &StakeRewardDistributionRuleSet,
    reward: &BigInt,
    rewards: &mut BTreeMap<Address, Coins>,
    config: &ChainConfig,
) {
    if stake.holder.is_empty() {
        panic!("stake holder is not set");
    }

    let Some(rule) = srdsr.get(&stake.holder) else {
        add_reward_to_map(
            rewards,
            config.reward_fee_address,
            SPLIT_FALLBACK_FEE_REWARD.clone(),
        );
        add_reward_to_map(rewards, stake.source, reward.clone());
        return;
    };

    if rule.split_basis_point == 0 {
        panic!(
            "split basis point is 0: holder = {}, beneficiary = {}",
            rule.stake_holder, rule.beneficiary
        );
    }

    let split_reward = reward * BigInt::from(rule.split_basis_point) / BigInt::from(10_000u32);
    let source_reward = reward - &split_reward;

    debug!(
        split = %split_reward,
        source = %source_reward,
        basis_points = rule.split_basis_point,
        "reward redistribution"
    );

    if split_reward > *reward {
        panic!("invalid reward redistribution metadata");
    }

    add_reward_to_map(rewards, stake.source, source_reward);
    add_reward_to_map(rewards, rule.beneficiary, split_reward);
}

/// Splits the total reward proportionally to stake.
fn issue_fixed_reward(
    effective_stakes: &[Vec<Stake>],
    total_stake: &BigInt,
    rewards: &mut BTreeMap<Address, Coins>,
    total_reward: &BigInt,
    srdsr: Option<&StakeRewardDistributionRuleSet>,
    config: &ChainConfig,
) {
    if total_stake.is_zero() {
        return;
    }

    match srdsr {
        Some(rules) => {
            for stakes in effective_stakes {
                for stake in stakes {
                    let reward = total_reward * &stake.amount / total_stake;
                    handle_split(stake, rules, &reward, rewards, config);
                }
            }
        }
        None => {
            // aggregate all stakes of a source before rewarding, for
            // compatibility with the previous algorithm
            for stakes in effective_stakes {
                if stakes.is_empty() {
                    continue;
                }
                let source_total: BigInt = stakes.iter().map(|s| &s.amount).sum();
                let reward = total_reward * &source_total / total_stake;
                add_reward_to_map(rewards, stakes[0].source, reward);
            }
        }
    }
}

/// Draws a constant number of uniform samples over the stake interval and
/// rewards each staker per sample hit.
#[allow(clippy::too_many_arguments)]
fn issue_randomized_reward(
    guardian_votes: &AggregatedGuardianVotes,
    view: &StoreView,
    effective_stakes: &[Vec<Stake>],
    total_stake: &BigInt,
    rewards: &mut BTreeMap<Address, Coins>,
    total_reward: &BigInt,
    srdsr: Option<&StakeRewardDistributionRuleSet>,
    config: &ChainConfig,
) {
    if total_stake.is_zero() {
        return;
    }
    let bound = total_stake
        .to_biguint()
        .expect("total stake is non-negative");

    let mut samples: Vec<BigInt> = Vec::with_capacity(PTX_REWARD_SAMPLES as usize);
    for i in 0..PTX_REWARD_SAMPLES {
        // seed = block height || sampling index || checkpoint hash
        let mut seed = Vec::with_capacity(16 + guardian_votes.block.as_bytes().len());
        seed.extend_from_slice(&view.height().to_be_bytes());
        seed.extend_from_slice(&i.to_be_bytes());
        seed.extend_from_slice(guardian_votes.block.as_bytes());

        samples.push(BigInt::from(HashRand::new(&seed).next_below(&bound)));
    }
    samples.sort();

    let n = BigInt::from(PTX_REWARD_SAMPLES);
    let mut curr = 0usize;
    let mut curr_sum = BigInt::zero();

    match srdsr {
        Some(rules) => {
            for stakes in effective_stakes {
                for stake in stakes {
                    let upper = &curr_sum + &stake.amount;
                    let mut count = 0u64;
                    while curr < samples.len()
                        && samples[curr] >= curr_sum
                        && samples[curr] < upper
                    {
                        count += 1;
                        curr += 1;
                    }
                    curr_sum = upper;

                    if count > 0 {
                        let reward = total_reward * BigInt::from(count) / &n;
                        info!(staker = %stake.source, reward = %reward, "Block reward (before split)");
                        handle_split(stake, rules, &reward, rewards, config);
                    }
                }
            }
        }
        None => {
            // aggregate all stakes of a source before rewarding, for
            // compatibility with the previous algorithm
            for stakes in effective_stakes {
                if stakes.is_empty() {
                    continue;
                }
                let source_total: BigInt = stakes.iter().map(|s| &s.amount).sum();

                let upper = &curr_sum + &source_total;
                let mut count = 0u64;
                while curr < samples.len() && samples[curr] >= curr_sum && samples[curr] < upper {
                    count += 1;
                    curr += 1;
                }
                curr_sum = upper;

                if count > 0 {
                    let reward = total_reward * BigInt::from(count) / &n;
                    info!(staker = %stakes[0].source, reward = %reward, "Block reward");
                    add_reward_to_map(rewards, stakes[0].source, reward);
                }
            }
        }
    }
}
