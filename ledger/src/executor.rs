//! The transaction-executor capability and shared execution helpers

use num_bigint::BigInt;
use num_traits::Zero;
use pando_core::{Address, ChainConfig, Coins, Hash, PandoError, PandoResult};
use pando_crypto::signing;
use pando_state::{Account, StoreView};

use crate::transaction::{Tx, TxInput};

/// Minimum fee for a regular transaction, in PTXWei
pub const MINIMUM_TRANSACTION_FEE_PTX_WEI: u64 = 1_000_000_000_000;

/// Minimum fee after the fee-adjustment milestone, in PTXWei
pub const MINIMUM_TRANSACTION_FEE_PTX_WEI_ADJUSTED: u64 = 1_000_000_000_000_000;

/// Gas charged to a regular (non-contract) transaction
pub const REGULAR_TX_GAS: u64 = 10_000;

/// Which ledger view a transaction is executed against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewSelector {
    Delivered,
    Checked,
    Screened,
}

/// Mempool-facing metadata about a transaction
#[derive(Debug, Clone, PartialEq)]
pub struct TxInfo {
    pub address: Address,
    pub sequence: u64,
    pub effective_gas_price: BigInt,
}

/// Capability implemented by each concrete transaction executor
pub trait TxExecutor {
    /// Validates the transaction against the view without mutating state.
    fn sanity_check(
        &self,
        chain_id: &str,
        view: &StoreView,
        view_sel: ViewSelector,
        tx: &Tx,
    ) -> PandoResult<()>;

    /// Applies the transaction to the view, returning its hash.
    fn process(
        &self,
        chain_id: &str,
        view: &StoreView,
        view_sel: ViewSelector,
        tx: &Tx,
    ) -> PandoResult<Hash>;

    /// Metadata for mempool ordering.
    fn get_tx_info(&self, tx: &Tx) -> PandoResult<TxInfo>;

    /// Fee divided by the regular transaction gas.
    fn calculate_effective_gas_price(&self, tx: &Tx) -> PandoResult<BigInt>;
}

/// Minimum transaction fee at the given height.
pub fn minimum_transaction_fee(config: &ChainConfig, block_height: u64) -> BigInt {
    if block_height < config.height_fee_adjustment {
        BigInt::from(MINIMUM_TRANSACTION_FEE_PTX_WEI)
    } else {
        BigInt::from(MINIMUM_TRANSACTION_FEE_PTX_WEI_ADJUSTED)
    }
}

/// Checks the fee is utility-currency only and meets the height minimum.
pub fn sanity_check_for_fee(
    config: &ChainConfig,
    fee: &Coins,
    block_height: u64,
) -> PandoResult<()> {
    let minimum = minimum_transaction_fee(config, block_height);
    if !fee.is_valid() || !fee.pando_wei.is_zero() || fee.ptx_wei < minimum {
        return Err(PandoError::FeeTooLow {
            minimum: minimum.to_string(),
            provided: fee.ptx_wei.to_string(),
        });
    }
    Ok(())
}

/// Fetches the account behind a transaction input.
pub fn get_input(view: &StoreView, input: &TxInput) -> PandoResult<Account> {
    view.get_account(&input.address)
        .ok_or_else(|| PandoError::InvalidTransaction(format!(
            "failed to get the source account: {}",
            input.address
        )))
}

/// Fetches an account, creating an empty one if absent.
pub fn get_or_make_account(view: &StoreView, addr: &Address) -> Account {
    view.get_account(addr).unwrap_or_default()
}

/// Signature and sequence validation for a transaction input.
pub fn validate_input_advanced(
    account: &Account,
    sign_bytes: &[u8],
    input: &TxInput,
) -> PandoResult<()> {
    if input.sequence != account.sequence + 1 {
        return Err(PandoError::InvalidSequence {
            expected: account.sequence + 1,
            got: input.sequence,
        });
    }
    signing::verify(&input.public_key, sign_bytes, &input.signature)
        .map_err(|_| PandoError::InvalidSignature)?;
    Ok(())
}

/// Deducts the fee from the account balance. Returns false if the balance
/// cannot cover it.
pub fn charge_fee(account: &mut Account, fee: &Coins) -> bool {
    if !account.balance.is_gte(fee) {
        return false;
    }
    account.balance = account.balance.minus(fee);
    true
}

/// Effective gas price of a regular transaction: fee over gas.
pub fn effective_gas_price(fee: &Coins) -> BigInt {
    &fee.ptx_wei / BigInt::from(REGULAR_TX_GAS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pando_core::coins::coins_to_wei;
    use pando_crypto::KeyPair;

    #[test]
    fn test_fee_sanity() {
        let config = ChainConfig::mainnet();
        let minimum = minimum_transaction_fee(&config, 100);

        assert!(sanity_check_for_fee(&config, &Coins::ptx(minimum.clone()), 100).is_ok());
        assert!(matches!(
            sanity_check_for_fee(&config, &Coins::ptx(minimum.clone() - 1), 100),
            Err(PandoError::FeeTooLow { .. })
        ));
        // fees are paid in utility currency only
        let mixed = Coins::new(BigInt::from(1), minimum);
        assert!(sanity_check_for_fee(&config, &mixed, 100).is_err());
    }

    #[test]
    fn test_charge_fee() {
        let mut account = Account::new(0, Coins::ptx(coins_to_wei(1)));
        let fee = Coins::ptx(BigInt::from(MINIMUM_TRANSACTION_FEE_PTX_WEI_ADJUSTED));

        assert!(charge_fee(&mut account, &fee));
        assert_eq!(
            account.balance.ptx_wei,
            coins_to_wei(1) - BigInt::from(MINIMUM_TRANSACTION_FEE_PTX_WEI_ADJUSTED)
        );

        let mut poor = Account::new(0, Coins::zero());
        assert!(!charge_fee(&mut poor, &fee));
    }

    #[test]
    fn test_validate_input_sequence() {
        let kp = KeyPair::from_seed(&[3u8; 32]);
        let account = Account::new(4, Coins::ptx(coins_to_wei(1)));

        let mut input = TxInput::new(kp.address(), Coins::zero(), 5, kp.public_key());
        let payload = b"payload";
        input.signature = signing::sign(&kp, payload);
        assert!(validate_input_advanced(&account, payload, &input).is_ok());

        input.sequence = 4;
        assert!(matches!(
            validate_input_advanced(&account, payload, &input),
            Err(PandoError::InvalidSequence { .. })
        ));
    }

    #[test]
    fn test_effective_gas_price() {
        let fee = Coins::ptx(BigInt::from(MINIMUM_TRANSACTION_FEE_PTX_WEI_ADJUSTED));
        assert_eq!(
            effective_gas_price(&fee),
            BigInt::from(MINIMUM_TRANSACTION_FEE_PTX_WEI_ADJUSTED / REGULAR_TX_GAS)
        );
    }
}
