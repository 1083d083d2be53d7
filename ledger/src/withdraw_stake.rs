//! Stake withdrawal execution
//!
//! Withdrawing does not return the stake to the source. It marks the stake
//! withdrawn and schedules its return after the locking period; for the edge
//! pool the due height is also indexed so the coinbase executor can return
//! the stake when that height is reached.

use num_bigint::BigInt;
use pando_core::{ChainConfig, Hash, PandoError, PandoResult};
use pando_state::{EdgePool, StakeWithHolder, StoreView};
use std::sync::Arc;
use tracing::debug;

use crate::executor::{
    charge_fee, effective_gas_price, get_input, sanity_check_for_fee, validate_input_advanced,
    TxExecutor, TxInfo, ViewSelector,
};
use crate::transaction::{StakePurpose, Tx, WithdrawStakeTx};

/// Executes stake withdrawal transactions against all three pools
pub struct WithdrawStakeExecutor {
    config: Arc<ChainConfig>,
}

impl WithdrawStakeExecutor {
    pub fn new(config: Arc<ChainConfig>) -> Self {
        Self { config }
    }

    fn cast<'a>(&self, tx: &'a Tx) -> PandoResult<&'a WithdrawStakeTx> {
        match tx {
            Tx::WithdrawStake(tx) => Ok(tx),
            _ => Err(PandoError::InvalidTransaction(
                "expected a withdraw-stake transaction".into(),
            )),
        }
    }
}

impl TxExecutor for WithdrawStakeExecutor {
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

        tx.source.validate_basic()?;

        let source_account = get_input(view, &tx.source)?;
        let sign_bytes = tx.sign_bytes(chain_id);
        validate_input_advanced(&source_account, &sign_bytes, &tx.source).map_err(|e| {
            debug!(source = %tx.source.address, error = %e, "withdraw input validation failed");
            e
        })?;

        sanity_check_for_fee(&self.config, &tx.fee, block_height)?;

        if !source_account.balance.is_gte(&tx.fee) {
            debug!(source = %tx.source.address, "withdraw source has insufficient balance");
            return Err(PandoError::InsufficientFund {
                balance: source_account.balance.to_string(),
                required: tx.fee.to_string(),
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
        let current_height = view.height() + 1;

        let mut source_account = get_input(view, &tx.source)?;
        if !charge_fee(&mut source_account, &tx.fee) {
            return Err(PandoError::InvalidTransaction(
                "failed to charge transaction fee".into(),
            ));
        }

        let source_address = tx.source.address;
        let holder_address = tx.holder.address;

        match tx.purpose {
            StakePurpose::Validator => {
                let mut vcp = view.get_validator_candidate_pool();
                vcp.withdraw_stake(source_address, holder_address, current_height)?;
                view.update_validator_candidate_pool(&vcp);
            }
            StakePurpose::Guardian => {
                let mut gcp = view.get_guardian_candidate_pool();
                gcp.withdraw_stake(source_address, holder_address, current_height)?;
                view.update_guardian_candidate_pool(&gcp);
            }
            _ => {
                let pool = EdgePool::new(view.clone(), false);
                let withdrawn =
                    pool.withdraw_stake(source_address, holder_address, current_height)?;
                update_edge_stake_returns(view, holder_address, withdrawn);
            }
        }

        // only validator stake transactions feed the height list
        if tx.purpose == StakePurpose::Validator {
            let mut height_list = view.get_stake_transaction_height_list();
            height_list.append(current_height);
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

/// Records the withdrawn stake under its return height so the coinbase
/// executor can return it on time.
fn update_edge_stake_returns(
    view: &StoreView,
    holder: pando_core::Address,
    withdrawn: pando_core::Stake,
) {
    let return_height = withdrawn.return_height;
    let mut returns = view.get_edge_stake_returns(return_height);
    returns.push(StakeWithHolder {
        holder,
        stake: withdrawn,
    });
    view.set_edge_stake_returns(return_height, &returns);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deposit_stake::DepositStakeExecutor;
    use crate::executor::minimum_transaction_fee;
    use crate::test_support::*;
    use num_bigint::BigInt;
    use pando_core::coins::coins_to_wei;
    use pando_core::config::STAKE_RETURN_LOCKING_PERIOD;
    use pando_core::Coins;
    use pando_state::Account;

    #[test]
    fn test_deposit_withdraw_round_trip() {
        let fixture = Fixture::new();
        let view = fixture.view_at(100);
        view.set_account(
            &fixture.source.address(),
            &Account::new(0, Coins::ptx(coins_to_wei(50_000))),
        );
        let fee = minimum_transaction_fee(&fixture.config, 101);

        let deposit = fixture.deposit_tx(coins_to_wei(35_000), StakePurpose::EdgeEnterprise, 1);
        DepositStakeExecutor::new(fixture.config.clone())
            .process("pandotest", &view, ViewSelector::Delivered, &deposit)
            .unwrap();

        let account = view.get_account(&fixture.source.address()).unwrap();
        assert_eq!(account.balance.ptx_wei, coins_to_wei(15_000) - &fee);
        assert_eq!(account.sequence, 1);

        let pool = EdgePool::new(view.clone(), true);
        assert_eq!(pool.total_stake(), coins_to_wei(35_000));

        let withdraw = fixture.withdraw_tx(StakePurpose::EdgeEnterprise, 2);
        let executor = WithdrawStakeExecutor::new(fixture.config.clone());
        executor
            .sanity_check("pandotest", &view, ViewSelector::Delivered, &withdraw)
            .unwrap();
        executor
            .process("pandotest", &view, ViewSelector::Delivered, &withdraw)
            .unwrap();

        // the withdrawal only costs the fee
        let account = view.get_account(&fixture.source.address()).unwrap();
        assert_eq!(
            account.balance.ptx_wei,
            coins_to_wei(15_000) - &fee - &fee
        );
        assert_eq!(account.sequence, 2);
        assert_eq!(pool.total_stake(), BigInt::from(0));

        let worker = pool.get(&fixture.holder.address()).unwrap();
        let stake = &worker.stake_holder.stakes[0];
        assert!(stake.withdrawn);
        assert_eq!(stake.return_height, 101 + STAKE_RETURN_LOCKING_PERIOD);

        // the return index remembers the stake at its due height
        let returns = view.get_edge_stake_returns(101 + STAKE_RETURN_LOCKING_PERIOD);
        assert_eq!(returns.len(), 1);
        assert_eq!(returns[0].holder, fixture.holder.address());
    }

    #[test]
    fn test_withdraw_unknown_holder_fails() {
        let fixture = Fixture::new();
        let view = fixture.view_at(100);
        view.set_account(
            &fixture.source.address(),
            &Account::new(0, Coins::ptx(coins_to_wei(1))),
        );

        let withdraw = fixture.withdraw_tx(StakePurpose::EdgeEnterprise, 1);
        let executor = WithdrawStakeExecutor::new(fixture.config.clone());

        executor
            .sanity_check("pandotest", &view, ViewSelector::Delivered, &withdraw)
            .unwrap();
        assert!(executor
            .process("pandotest", &view, ViewSelector::Delivered, &withdraw)
            .is_err());
    }

    #[test]
    fn test_withdraw_rejects_fee_below_minimum() {
        let fixture = Fixture::new();
        let view = fixture.view_at(100);
        view.set_account(
            &fixture.source.address(),
            &Account::new(0, Coins::ptx(coins_to_wei(1))),
        );

        let mut withdraw = fixture.withdraw_tx(StakePurpose::EdgeEnterprise, 1);
        if let Tx::WithdrawStake(inner) = &mut withdraw {
            inner.fee = Coins::ptx(BigInt::from(1));
            inner.sign("pandotest", &fixture.source);
        }

        let executor = WithdrawStakeExecutor::new(fixture.config.clone());
        assert!(matches!(
            executor.sanity_check("pandotest", &view, ViewSelector::Delivered, &withdraw),
            Err(PandoError::FeeTooLow { .. })
        ));
    }
}
