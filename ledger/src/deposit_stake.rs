//! Stake deposit execution

use num_bigint::BigInt;
use num_traits::Zero;
use pando_core::config::{
    MIN_EDGE_ENTERPRISE_STAKE_DEPOSIT, MIN_EDGE_LITE_STAKE_DEPOSIT, MIN_EDGE_MOBILE_STAKE_DEPOSIT,
    MIN_EDGE_PRO_STAKE_DEPOSIT, MIN_GUARDIAN_STAKE_DEPOSIT, MIN_VALIDATOR_STAKE_DEPOSIT,
};
use pando_core::{ChainConfig, Hash, PandoError, PandoResult};
use pando_crypto::bls;
use pando_crypto::keys::verify_address;
use pando_crypto::signing;
use pando_state::{EdgePool, StoreView};
use std::sync::Arc;
use tracing::debug;

use crate::executor::{
    charge_fee, effective_gas_price, get_input, sanity_check_for_fee, validate_input_advanced,
    TxExecutor, TxInfo, ViewSelector,
};
use crate::transaction::{DepositStakeTx, StakePurpose, Tx};

/// Executes stake deposit transactions against all three pools
pub struct DepositStakeExecutor {
    config: Arc<ChainConfig>,
}

impl DepositStakeExecutor {
    pub fn new(config: Arc<ChainConfig>) -> Self {
        Self { config }
    }

    fn cast<'a>(&self, tx: &'a Tx) -> PandoResult<&'a DepositStakeTx> {
        match tx {
            Tx::DepositStake(tx) => Ok(tx),
            _ => Err(PandoError::InvalidTransaction(
                "expected a deposit-stake transaction".into(),
            )),
        }
    }

    /// BLS credentials check for a holder new to a BLS-keyed pool: the
    /// holder signs its proof of possession, and the proof must verify.
    fn check_bls_summary(&self, tx: &DepositStakeTx) -> PandoResult<()> {
        if tx.bls_pubkey.is_empty() {
            return Err(PandoError::InvalidStake("must provide BLS pubkey".into()));
        }
        if tx.bls_pop.is_empty() {
            return Err(PandoError::InvalidStake("must provide BLS POP".into()));
        }
        if tx.holder_sig.as_bytes().iter().all(|b| *b == 0) {
            return Err(PandoError::InvalidStake(
                "must provide holder signature".into(),
            ));
        }

        if !verify_address(&tx.holder.address, &tx.holder_pubkey) {
            return Err(PandoError::InvalidAddress(
                "holder address does not match holder public key".into(),
            ));
        }
        if signing::verify(&tx.holder_pubkey, tx.bls_pop.as_bytes(), &tx.holder_sig).is_err() {
            return Err(PandoError::InvalidStake(
                "BLS key info is not properly signed".into(),
            ));
        }
        if !bls::pop_verify(&tx.bls_pubkey, &tx.bls_pop) {
            return Err(PandoError::InvalidStake("BLS POP is invalid".into()));
        }

        Ok(())
    }
}

fn min_stake_for_purpose(purpose: StakePurpose) -> &'static BigInt {
    match purpose {
        StakePurpose::Validator => &MIN_VALIDATOR_STAKE_DEPOSIT,
        StakePurpose::Guardian => &MIN_GUARDIAN_STAKE_DEPOSIT,
        StakePurpose::EdgeEnterprise => &MIN_EDGE_ENTERPRISE_STAKE_DEPOSIT,
        StakePurpose::EdgePro => &MIN_EDGE_PRO_STAKE_DEPOSIT,
        StakePurpose::EdgeLite => &MIN_EDGE_LITE_STAKE_DEPOSIT,
        StakePurpose::EdgeMobile => &MIN_EDGE_MOBILE_STAKE_DEPOSIT,
    }
}

impl TxExecutor for DepositStakeExecutor {
    fn sanity_check(
        &self,
        chain_id: &str,
        view: &StoreView,
        _view_sel: ViewSelector,
        tx: &Tx,
    ) -> PandoResult<()> {
        let tx = self.cast(tx)?;
        // the view points to the parent of the current block
        let block_height = view.height() + 1;

        match tx.purpose {
            StakePurpose::Guardian if block_height < self.config.height_enable_pando1 => {
                return Err(PandoError::FeatureNotActive(self.config.height_enable_pando1));
            }
            p if p.is_edge() && block_height < self.config.height_enable_pando2 => {
                return Err(PandoError::FeatureNotActive(self.config.height_enable_pando2));
            }
            _ => {}
        }

        tx.source.validate_basic()?;

        let source_account = get_input(view, &tx.source)?;
        let sign_bytes = tx.sign_bytes(chain_id);
        validate_input_advanced(&source_account, &sign_bytes, &tx.source).map_err(|e| {
            debug!(source = %tx.source.address, error = %e, "deposit input validation failed");
            e
        })?;

        sanity_check_for_fee(&self.config, &tx.fee, block_height)?;

        let stake = &tx.source.coins;
        if !stake.is_valid() || !stake.is_nonnegative() {
            return Err(PandoError::InvalidStake(
                "invalid stake for stake deposit".into(),
            ));
        }
        if !stake.pando_wei.is_zero() {
            return Err(PandoError::InvalidStake(
                "staking is in utility currency; native amount must be zero".into(),
            ));
        }

        let minimum = min_stake_for_purpose(tx.purpose);
        if stake.ptx_wei < *minimum {
            return Err(PandoError::InsufficientStake {
                minimum: minimum.to_string(),
            });
        }

        let minimal_balance = stake.plus(&tx.fee);
        if !source_account.balance.is_gte(&minimal_balance) {
            debug!(source = %tx.source.address, "deposit source has insufficient balance");
            return Err(PandoError::InsufficientFund {
                balance: source_account.balance.to_string(),
                required: minimal_balance.to_string(),
            });
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
        // the view points to the parent of the current block
        let block_height = view.height() + 1;

        let mut source_account = get_input(view, &tx.source)?;
        if !charge_fee(&mut source_account, &tx.fee) {
            return Err(PandoError::InvalidTransaction(
                "failed to charge transaction fee".into(),
            ));
        }

        let stake = &tx.source.coins;
        if !source_account.balance.is_gte(stake) {
            return Err(PandoError::NotEnoughBalanceToStake);
        }
        source_account.balance = source_account.balance.minus(stake);

        let source_address = tx.source.address;
        let holder_address = tx.holder.address;
        let stake_amount = stake.ptx_wei.clone();

        match tx.purpose {
            StakePurpose::Validator => {
                let mut vcp = view.get_validator_candidate_pool();
                vcp.deposit_stake(source_address, holder_address, stake_amount, block_height)?;
                view.update_validator_candidate_pool(&vcp);
            }
            StakePurpose::Guardian => {
                let mut gcp = view.get_guardian_candidate_pool();
                if !gcp.contains(&holder_address) {
                    self.check_bls_summary(tx)?;
                }
                gcp.deposit_stake(
                    source_address,
                    holder_address,
                    stake_amount,
                    tx.bls_pubkey,
                    block_height,
                )?;
                view.update_guardian_candidate_pool(&gcp);
            }
            purpose => {
                let pool = EdgePool::new(view.clone(), false);
                if !pool.contains(&holder_address) {
                    self.check_bls_summary(tx)?;
                }

                let minimum = min_stake_for_purpose(purpose);
                if stake_amount < *minimum {
                    return Err(PandoError::InsufficientStake {
                        minimum: minimum.to_string(),
                    });
                }

                pool.deposit_stake(
                    source_address,
                    holder_address,
                    stake_amount,
                    tx.bls_pubkey,
                    block_height,
                )?;
            }
        }

        // only validator stake transactions feed the height list
        if tx.purpose == StakePurpose::Validator {
            let mut height_list = view.get_stake_transaction_height_list();
            height_list.append(block_height);
            view.update_stake_transaction_height_list(&height_list);
        }

        source_account.sequence += 1;
        view.set_account(&source_address, &source_account);

        Ok(tx_hash)
    }

    fn get_tx_info(&self, tx: &Tx) -> PandoResult<TxInfo> {
        let tx = self.cast(tx)?;
        Ok(TxInfo {
            address: tx.source.address,
            sequence: tx.source.sequence,
            effective_gas_price: effective_gas_price(&tx.fee),
        })
    }

    fn calculate_effective_gas_price(&self, tx: &Tx) -> PandoResult<BigInt> {
        let tx = self.cast(tx)?;
        Ok(effective_gas_price(&tx.fee))
    }
}
