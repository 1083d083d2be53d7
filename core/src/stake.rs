//! Stake data model
//!
//! A `Stake` is a single deposit from a source account to a holder. A
//! `StakeHolder` collects the stakes delegated to one holder address.
//! Edge workers and guardians are stake holders with a BLS public key.

use num_bigint::BigInt;
use num_traits::Signed;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::coins::{bigint_from_rlp_bytes, bigint_to_rlp_bytes};
use crate::config::STAKE_RETURN_LOCKING_PERIOD;
use crate::error::{PandoError, PandoResult};
use crate::types::{Address, BlsPublicKey};

/// A single stake deposit
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stake {
    pub source: Address,
    pub amount: BigInt,
    pub withdrawn: bool,
    pub return_height: u64,
    pub holder: Address,
}

impl Stake {
    pub fn new(source: Address, amount: BigInt) -> Self {
        Self {
            source,
            amount,
            withdrawn: false,
            return_height: u64::MAX,
            holder: Address::ZERO,
        }
    }
}

impl fmt::Debug for Stake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stake{{source: {}, amount: {}, withdrawn: {}, return_height: {}}}",
            self.source, self.amount, self.withdrawn, self.return_height
        )
    }
}

impl Encodable for Stake {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(5);
        s.append(&self.source);
        s.append(&bigint_to_rlp_bytes(&self.amount));
        s.append(&(self.withdrawn as u8));
        s.append(&self.return_height);
        s.append(&self.holder);
    }
}

impl Decodable for Stake {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        let amount: Vec<u8> = rlp.val_at(1)?;
        let withdrawn: u8 = rlp.val_at(2)?;
        Ok(Stake {
            source: rlp.val_at(0)?,
            amount: bigint_from_rlp_bytes(&amount),
            withdrawn: withdrawn != 0,
            return_height: rlp.val_at(3)?,
            holder: rlp.val_at(4)?,
        })
    }
}

/// A holder address together with the stakes delegated to it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeHolder {
    pub holder: Address,
    pub stakes: Vec<Stake>,
}

impl StakeHolder {
    pub fn new(holder: Address, stakes: Vec<Stake>) -> Self {
        Self { holder, stakes }
    }

    /// Sum of all non-withdrawn stake amounts.
    pub fn total_stake(&self) -> BigInt {
        self.stakes
            .iter()
            .filter(|s| !s.withdrawn)
            .map(|s| &s.amount)
            .sum()
    }

    /// Adds a deposit, accumulating into an existing non-withdrawn stake
    /// from the same source.
    pub fn deposit_stake(&mut self, source: Address, amount: BigInt) -> PandoResult<()> {
        if amount.is_negative() {
            return Err(PandoError::InvalidStake(format!(
                "invalid stake amount: {}",
                amount
            )));
        }
        for stake in &mut self.stakes {
            if stake.source == source && !stake.withdrawn {
                stake.amount += &amount;
                return Ok(());
            }
        }
        self.stakes.push(Stake::new(source, amount));
        Ok(())
    }

    /// Marks the stake from `source` as withdrawn and schedules its return.
    ///
    /// Panics if the matched stake was already withdrawn: that indicates
    /// corrupted state.
    pub fn withdraw_stake(&mut self, source: Address, current_height: u64) -> PandoResult<Stake> {
        for stake in &mut self.stakes {
            if stake.source == source {
                if stake.withdrawn {
                    panic!(
                        "stake already withdrawn: holder = {}, source = {}",
                        self.holder, source
                    );
                }
                stake.withdrawn = true;
                stake.return_height = current_height + STAKE_RETURN_LOCKING_PERIOD;
                return Ok(stake.clone());
            }
        }
        Err(PandoError::StakeNotFound {
            holder: self.holder,
            stake_source: source,
        })
    }

    /// Removes and returns the withdrawn stake from `source` that is due at
    /// `current_height`.
    pub fn return_stake(&mut self, source: Address, current_height: u64) -> PandoResult<Stake> {
        for idx in 0..self.stakes.len() {
            let stake = &self.stakes[idx];
            if stake.source == source && stake.withdrawn && stake.return_height == current_height {
                return Ok(self.stakes.remove(idx));
            }
        }
        Err(PandoError::StakeNotFound {
            holder: self.holder,
            stake_source: source,
        })
    }
}

impl Encodable for StakeHolder {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.holder);
        s.append_list(&self.stakes);
    }
}

impl Decodable for StakeHolder {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(StakeHolder {
            holder: rlp.val_at(0)?,
            stakes: rlp.list_at(1)?,
        })
    }
}

/// A utility-currency-staked edge worker, identified by its holder address
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeWorker {
    pub stake_holder: StakeHolder,
    pub pubkey: BlsPublicKey,
}

impl EdgeWorker {
    pub fn new(stake_holder: StakeHolder, pubkey: BlsPublicKey) -> Self {
        Self {
            stake_holder,
            pubkey,
        }
    }

    pub fn holder(&self) -> Address {
        self.stake_holder.holder
    }

    pub fn total_stake(&self) -> BigInt {
        self.stake_holder.total_stake()
    }

    pub fn deposit_stake(&mut self, source: Address, amount: BigInt) -> PandoResult<()> {
        self.stake_holder.deposit_stake(source, amount)
    }

    pub fn withdraw_stake(&mut self, source: Address, current_height: u64) -> PandoResult<Stake> {
        self.stake_holder.withdraw_stake(source, current_height)
    }

    pub fn return_stake(&mut self, source: Address, current_height: u64) -> PandoResult<Stake> {
        self.stake_holder.return_stake(source, current_height)
    }
}

impl Encodable for EdgeWorker {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.stake_holder);
        s.append(&self.pubkey);
    }
}

impl Decodable for EdgeWorker {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(EdgeWorker {
            stake_holder: rlp.val_at(0)?,
            pubkey: rlp.val_at(1)?,
        })
    }
}

/// A native-staked intermediate-tier consensus participant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guardian {
    pub stake_holder: StakeHolder,
    pub pubkey: BlsPublicKey,
}

impl Guardian {
    pub fn new(stake_holder: StakeHolder, pubkey: BlsPublicKey) -> Self {
        Self {
            stake_holder,
            pubkey,
        }
    }

    pub fn holder(&self) -> Address {
        self.stake_holder.holder
    }

    pub fn total_stake(&self) -> BigInt {
        self.stake_holder.total_stake()
    }

    pub fn has_stake(&self) -> bool {
        self.stake_holder.stakes.iter().any(|s| !s.withdrawn)
    }
}

impl Encodable for Guardian {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.stake_holder);
        s.append(&self.pubkey);
    }
}

impl Decodable for Guardian {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(Guardian {
            stake_holder: rlp.val_at(0)?,
            pubkey: rlp.val_at(1)?,
        })
    }
}

/// An active block-producing validator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    pub stake: BigInt,
}

impl Validator {
    pub fn new(address: Address, stake: BigInt) -> Self {
        Self { address, stake }
    }
}

/// The set of active validators for a block
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSet {
    validators: Vec<Validator>,
}

impl ValidatorSet {
    pub fn new(validators: Vec<Validator>) -> Self {
        Self { validators }
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    pub fn total_stake(&self) -> BigInt {
        self.validators.iter().map(|v| &v.stake).sum()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.validators.iter().any(|v| v.address == *address)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}
