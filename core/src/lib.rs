//! Core data model for the Pando network
//!
//! Fundamental identifiers, two-currency coin arithmetic, the stake
//! lifecycle, chain configuration and the shared error taxonomy.

pub mod coins;
pub mod config;
pub mod error;
pub mod stake;
pub mod types;

pub use coins::{parse_coin_amount, Coins};
pub use config::{ChainConfig, EdgeConsensusConfig};
pub use error::{ErrorCode, PandoError, PandoResult};
pub use stake::{EdgeWorker, Guardian, Stake, StakeHolder, Validator, ValidatorSet};
pub use types::{Address, BlsPublicKey, BlsSignature, Hash, PublicKey, Signature};
