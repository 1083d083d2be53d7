//! Transaction types
//!
//! Inputs carry the signer's public key alongside the signature since
//! Ed25519 cannot recover the signer from a signature. Signing payloads are
//! RLP over the chain ID and the transaction content, signatures excluded.

use pando_core::{
    Address, BlsPublicKey, BlsSignature, Coins, Hash, PandoError, PandoResult, PublicKey,
    Signature,
};
use pando_crypto::hashing::keccak256;
use pando_crypto::keys::verify_address;
use pando_crypto::signing;
use pando_crypto::KeyPair;
use rlp::RlpStream;
use serde::{Deserialize, Serialize};

/// What a stake deposit is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakePurpose {
    Validator,
    Guardian,
    EdgeEnterprise,
    EdgePro,
    EdgeLite,
    EdgeMobile,
}

impl StakePurpose {
    pub fn is_edge(&self) -> bool {
        matches!(
            self,
            StakePurpose::EdgeEnterprise
                | StakePurpose::EdgePro
                | StakePurpose::EdgeLite
                | StakePurpose::EdgeMobile
        )
    }

    fn discriminant(&self) -> u8 {
        match self {
            StakePurpose::Validator => 0,
            StakePurpose::Guardian => 1,
            StakePurpose::EdgeEnterprise => 2,
            StakePurpose::EdgePro => 3,
            StakePurpose::EdgeLite => 4,
            StakePurpose::EdgeMobile => 5,
        }
    }
}

/// A signed transaction input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxInput {
    pub address: Address,
    pub coins: Coins,
    pub sequence: u64,
    pub public_key: PublicKey,
    pub signature: Signature,
}

impl TxInput {
    pub fn new(address: Address, coins: Coins, sequence: u64, public_key: PublicKey) -> Self {
        Self {
            address,
            coins,
            sequence,
            public_key,
            signature: Signature([0u8; 64]),
        }
    }

    /// Structural validation: the address must belong to the public key.
    pub fn validate_basic(&self) -> PandoResult<()> {
        if self.address.is_empty() {
            return Err(PandoError::InvalidAddress("input address is empty".into()));
        }
        if !verify_address(&self.address, &self.public_key) {
            return Err(PandoError::InvalidAddress(
                "input address does not match public key".into(),
            ));
        }
        Ok(())
    }
}

/// A transaction output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: Address,
    pub coins: Coins,
}

impl TxOutput {
    pub fn new(address: Address, coins: Coins) -> Self {
        Self { address, coins }
    }
}

fn append_input_unsigned(s: &mut RlpStream, input: &TxInput) {
    s.begin_list(3);
    s.append(&input.address);
    s.append(&input.coins);
    s.append(&input.sequence);
}

fn append_output(s: &mut RlpStream, output: &TxOutput) {
    s.begin_list(2);
    s.append(&output.address);
    s.append(&output.coins);
}

/// Deposits stake from a source account to a holder in one of the pools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositStakeTx {
    pub fee: Coins,
    pub source: TxInput,
    pub holder: TxOutput,
    pub purpose: StakePurpose,
    pub bls_pubkey: BlsPublicKey,
    pub bls_pop: BlsSignature,
    pub holder_pubkey: PublicKey,
    pub holder_sig: Signature,
}

impl DepositStakeTx {
    pub fn sign_bytes(&self, chain_id: &str) -> Vec<u8> {
        let mut s = RlpStream::new_list(7);
        s.append(&chain_id.as_bytes());
        s.append(&"deposit_stake".as_bytes());
        s.append(&self.fee);
        append_input_unsigned(&mut s, &self.source);
        append_output(&mut s, &self.holder);
        s.append(&self.purpose.discriminant());
        s.append(&self.bls_pubkey);
        s.out().to_vec()
    }

    /// Signs the source input.
    pub fn sign(&mut self, chain_id: &str, keypair: &KeyPair) {
        self.source.signature = signing::sign(keypair, &self.sign_bytes(chain_id));
    }
}

/// Marks a stake as withdrawn; the stake returns after the locking period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawStakeTx {
    pub fee: Coins,
    pub source: TxInput,
    pub holder: TxOutput,
    pub purpose: StakePurpose,
}

impl WithdrawStakeTx {
    pub fn sign_bytes(&self, chain_id: &str) -> Vec<u8> {
        let mut s = RlpStream::new_list(6);
        s.append(&chain_id.as_bytes());
        s.append(&"withdraw_stake".as_bytes());
        s.append(&self.fee);
        append_input_unsigned(&mut s, &self.source);
        append_output(&mut s, &self.holder);
        s.append(&self.purpose.discriminant());
        s.out().to_vec()
    }

    pub fn sign(&mut self, chain_id: &str, keypair: &KeyPair) {
        self.source.signature = signing::sign(keypair, &self.sign_bytes(chain_id));
    }
}

/// Mints the per-block rewards computed at checkpoint heights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinbaseTx {
    pub proposer: TxInput,
    pub outputs: Vec<TxOutput>,
    pub block_height: u64,
}

impl CoinbaseTx {
    pub fn sign_bytes(&self, chain_id: &str) -> Vec<u8> {
        let mut s = RlpStream::new_list(5);
        s.append(&chain_id.as_bytes());
        s.append(&"coinbase".as_bytes());
        append_input_unsigned(&mut s, &self.proposer);
        s.begin_list(self.outputs.len());
        for output in &self.outputs {
            append_output(&mut s, output);
        }
        s.append(&self.block_height);
        s.out().to_vec()
    }

    pub fn sign(&mut self, chain_id: &str, keypair: &KeyPair) {
        self.proposer.signature = signing::sign(keypair, &self.sign_bytes(chain_id));
    }
}

/// All transaction kinds known to the executors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Tx {
    DepositStake(DepositStakeTx),
    WithdrawStake(WithdrawStakeTx),
    Coinbase(CoinbaseTx),
}

impl Tx {
    pub fn sign_bytes(&self, chain_id: &str) -> Vec<u8> {
        match self {
            Tx::DepositStake(tx) => tx.sign_bytes(chain_id),
            Tx::WithdrawStake(tx) => tx.sign_bytes(chain_id),
            Tx::Coinbase(tx) => tx.sign_bytes(chain_id),
        }
    }

    /// Transaction id: the hash of the signing payload.
    pub fn hash(&self, chain_id: &str) -> Hash {
        keccak256(&self.sign_bytes(chain_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;
    use pando_core::coins::coins_to_wei;

    fn input_for(keypair: &KeyPair, amount: BigInt, sequence: u64) -> TxInput {
        TxInput::new(
            keypair.address(),
            Coins::ptx(amount),
            sequence,
            keypair.public_key(),
        )
    }

    #[test]
    fn test_validate_basic_checks_address() {
        let kp = KeyPair::from_seed(&[1u8; 32]);
        let good = input_for(&kp, coins_to_wei(1), 1);
        assert!(good.validate_basic().is_ok());

        let mut bad = good.clone();
        bad.address = Address([9u8; 20]);
        assert!(bad.validate_basic().is_err());
    }

    #[test]
    fn test_sign_bytes_exclude_signature() {
        let kp = KeyPair::from_seed(&[1u8; 32]);
        let holder = KeyPair::from_seed(&[2u8; 32]);
        let mut tx = DepositStakeTx {
            fee: Coins::ptx(BigInt::from(1_000_000_000_000_000u64)),
            source: input_for(&kp, coins_to_wei(35_000), 1),
            holder: TxOutput::new(holder.address(), Coins::zero()),
            purpose: StakePurpose::EdgeEnterprise,
            bls_pubkey: BlsPublicKey([1u8; 48]),
            bls_pop: BlsSignature([2u8; 96]),
            holder_pubkey: holder.public_key(),
            holder_sig: Signature([0u8; 64]),
        };

        let before = tx.sign_bytes("pandotest");
        tx.sign("pandotest", &kp);
        assert_eq!(before, tx.sign_bytes("pandotest"));
        assert!(signing::verify(&kp.public_key(), &before, &tx.source.signature).is_ok());
    }

    #[test]
    fn test_sign_bytes_cover_chain_id() {
        let kp = KeyPair::from_seed(&[1u8; 32]);
        let tx = WithdrawStakeTx {
            fee: Coins::zero(),
            source: input_for(&kp, Coins::zero().ptx_wei, 1),
            holder: TxOutput::new(kp.address(), Coins::zero()),
            purpose: StakePurpose::Validator,
        };
        assert_ne!(tx.sign_bytes("chain-a"), tx.sign_bytes("chain-b"));
    }

    #[test]
    fn test_tx_hash_differs_by_content() {
        let kp = KeyPair::from_seed(&[1u8; 32]);
        let tx1 = Tx::WithdrawStake(WithdrawStakeTx {
            fee: Coins::zero(),
            source: input_for(&kp, Coins::zero().ptx_wei, 1),
            holder: TxOutput::new(kp.address(), Coins::zero()),
            purpose: StakePurpose::Validator,
        });
        let tx2 = Tx::WithdrawStake(WithdrawStakeTx {
            fee: Coins::zero(),
            source: input_for(&kp, Coins::zero().ptx_wei, 2),
            holder: TxOutput::new(kp.address(), Coins::zero()),
            purpose: StakePurpose::Validator,
        });
        assert_ne!(tx1.hash("pandotest"), tx2.hash("pandotest"));
    }
}
