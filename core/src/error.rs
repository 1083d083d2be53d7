//! Error types for the Pando network

use thiserror::Error;

use crate::types::Address;

/// Result type for Pando operations
pub type PandoResult<T> = Result<T, PandoError>;

/// Stable numeric codes surfaced with transaction results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    GenericError = 1,
    InvalidSignature = 2,
    InvalidSequence = 3,
    InsufficientFund = 4,
    InvalidFee = 5,
    InvalidStake = 6,
    InvalidStakePurpose = 7,
    InsufficientStake = 8,
    StakeExceedsCap = 9,
    NotEnoughBalanceToStake = 10,
    StorageError = 11,
}

/// Main error type for the Pando network
#[derive(Error, Debug)]
pub enum PandoError {
    // ============ Cryptography Errors ============
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    // ============ Transaction Errors ============
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Invalid sequence: expected {expected}, got {got}")]
    InvalidSequence { expected: u64, got: u64 },

    #[error("Insufficient fund: balance is {balance}, required {required}")]
    InsufficientFund { balance: String, required: String },

    #[error("Fee too low: minimum {minimum} PTXWei, provided {provided}")]
    FeeTooLow { minimum: String, provided: String },

    // ============ Staking Errors ============
    #[error("Invalid stake: {0}")]
    InvalidStake(String),

    #[error("Invalid stake purpose")]
    InvalidStakePurpose,

    #[error("Insufficient stake: at least {minimum} PTXWei is required")]
    InsufficientStake { minimum: String },

    #[error("Stake exceeds the cap: {0}")]
    StakeExceedsCap(String),

    #[error("Not enough balance to stake")]
    NotEnoughBalanceToStake,

    #[error("No matched stake found: holder = {holder}, source = {stake_source}")]
    StakeNotFound { holder: Address, stake_source: Address },

    #[error("Stake holder not found: {0}")]
    StakeHolderNotFound(Address),

    #[error("Feature not active yet, please wait until block height {0}")]
    FeatureNotActive(u64),

    // ============ Vote Errors ============
    #[error("Invalid vote: {0}")]
    InvalidVote(String),

    #[error("Cannot merge incompatible votes")]
    IncompatibleVotes,

    #[error("Signature multipliers overflowed")]
    MultiplierOverflow,

    // ============ State Errors ============
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Block not found: {0}")]
    BlockNotFound(String),

    // ============ General Errors ============
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PandoError {
    /// Maps the error to its stable numeric transaction-result code.
    pub fn code(&self) -> ErrorCode {
        match self {
            PandoError::InvalidSignature
            | PandoError::InvalidPublicKey
            | PandoError::InvalidAddress(_) => ErrorCode::InvalidSignature,
            PandoError::InvalidSequence { .. } => ErrorCode::InvalidSequence,
            PandoError::InsufficientFund { .. } => ErrorCode::InsufficientFund,
            PandoError::FeeTooLow { .. } => ErrorCode::InvalidFee,
            PandoError::InvalidStake(_) => ErrorCode::InvalidStake,
            PandoError::InvalidStakePurpose => ErrorCode::InvalidStakePurpose,
            PandoError::InsufficientStake { .. } => ErrorCode::InsufficientStake,
            PandoError::StakeExceedsCap(_) => ErrorCode::StakeExceedsCap,
            PandoError::NotEnoughBalanceToStake => ErrorCode::NotEnoughBalanceToStake,
            PandoError::StorageError(_) => ErrorCode::StorageError,
            _ => ErrorCode::GenericError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(PandoError::InvalidStakePurpose.code(), ErrorCode::InvalidStakePurpose);
        assert_eq!(
            PandoError::FeeTooLow {
                minimum: "1".into(),
                provided: "0".into()
            }
            .code(),
            ErrorCode::InvalidFee
        );
        assert_eq!(
            PandoError::Internal("x".into()).code(),
            ErrorCode::GenericError
        );
    }
}
