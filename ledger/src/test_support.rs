//! Shared fixtures for executor tests

use num_bigint::BigInt;
use pando_core::{ChainConfig, Coins};
use pando_crypto::{BlsSecretKey, KeyPair};
use pando_state::StoreView;
use std::sync::Arc;

use crate::executor::minimum_transaction_fee;
use crate::transaction::{
    CoinbaseTx, DepositStakeTx, StakePurpose, Tx, TxInput, TxOutput, WithdrawStakeTx,
};

/// A source account, a holder and its BLS identity, under a config with the
/// edge era active from genesis.
pub struct Fixture {
    pub config: Arc<ChainConfig>,
    pub source: KeyPair,
    pub holder: KeyPair,
    pub holder_bls: BlsSecretKey,
}

impl Fixture {
    pub fn new() -> Self {
        let mut config = ChainConfig::mainnet();
        config.height_enable_pando2 = 1;
        Self::with_config(config)
    }

    pub fn with_config(config: ChainConfig) -> Self {
        Self {
            config: Arc::new(config),
            source: KeyPair::from_seed(&[1u8; 32]),
            holder: KeyPair::from_seed(&[2u8; 32]),
            holder_bls: BlsSecretKey::from_seed(&[3u8; 32]),
        }
    }

    pub fn view_at(&self, height: u64) -> StoreView {
        StoreView::new(height)
    }

    fn fee(&self) -> Coins {
        Coins::ptx(minimum_transaction_fee(&self.config, u64::MAX))
    }

    /// A signed deposit of `amount` PTXWei from the source to the holder.
    pub fn deposit_tx(&self, amount: BigInt, purpose: StakePurpose, sequence: u64) -> Tx {
        let bls_pop = self.holder_bls.pop_prove();
        let holder_sig = pando_crypto::signing::sign(&self.holder, bls_pop.as_bytes());

        let mut tx = DepositStakeTx {
            fee: self.fee(),
            source: TxInput::new(
                self.source.address(),
                Coins::ptx(amount),
                sequence,
                self.source.public_key(),
            ),
            holder: TxOutput::new(self.holder.address(), Coins::zero()),
            purpose,
            bls_pubkey: self.holder_bls.public_key(),
            bls_pop,
            holder_pubkey: self.holder.public_key(),
            holder_sig,
        };
        tx.sign("pandotest", &self.source);
        Tx::DepositStake(tx)
    }

    /// A signed withdrawal of the source's stake from the holder.
    pub fn withdraw_tx(&self, purpose: StakePurpose, sequence: u64) -> Tx {
        let mut tx = WithdrawStakeTx {
            fee: self.fee(),
            source: TxInput::new(
                self.source.address(),
                Coins::zero(),
                sequence,
                self.source.public_key(),
            ),
            holder: TxOutput::new(self.holder.address(), Coins::zero()),
            purpose,
        };
        tx.sign("pandotest", &self.source);
        Tx::WithdrawStake(tx)
    }
}

/// A signed coinbase transaction from the given proposer.
pub fn coinbase_tx(
    proposer: &KeyPair,
    outputs: Vec<TxOutput>,
    block_height: u64,
    chain_id: &str,
) -> Tx {
    let mut tx = CoinbaseTx {
        proposer: TxInput::new(
            proposer.address(),
            Coins::zero(),
            0,
            proposer.public_key(),
        ),
        outputs,
        block_height,
    };
    tx.sign(chain_id, proposer);
    Tx::Coinbase(tx)
}
