//! Transaction execution for the Pando network
//!
//! The `TxExecutor` capability and its concrete executors: stake deposits
//! and withdrawals across the three staking tiers, and the coinbase
//! transaction that mints checkpoint rewards.

pub mod coinbase;
pub mod deposit_stake;
pub mod executor;
pub mod transaction;
pub mod withdraw_stake;

#[cfg(test)]
pub(crate) mod test_support;

pub use coinbase::{calculate_reward, retrieve_pools, CheckpointContext, CoinbaseTxExecutor};
pub use deposit_stake::DepositStakeExecutor;
pub use executor::{TxExecutor, TxInfo, ViewSelector};
pub use transaction::{
    CoinbaseTx, DepositStakeTx, StakePurpose, Tx, TxInput, TxOutput, WithdrawStakeTx,
};
pub use withdraw_stake::WithdrawStakeExecutor;
