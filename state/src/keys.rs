//! Ledger state keys
//!
//! Every persisted ledger value lives under one of these byte-string
//! prefixes inside a state view.

use pando_core::Address;

/// Build the state key for an account
pub fn account_key(addr: &Address) -> Vec<u8> {
    let mut key = b"ls/a/".to_vec();
    key.extend_from_slice(addr.as_bytes());
    key
}

/// State key for the validator candidate pool
pub fn validator_candidate_pool_key() -> Vec<u8> {
    b"ls/vcp".to_vec()
}

/// State key for the guardian candidate pool
pub fn guardian_candidate_pool_key() -> Vec<u8> {
    b"ls/gcp".to_vec()
}

/// Prefix of the per-worker edge pool keys
pub fn edge_worker_key_prefix() -> Vec<u8> {
    b"ls/edge/".to_vec()
}

/// Build the edge pool key for a holder address
pub fn edge_worker_key(addr: &Address) -> Vec<u8> {
    let mut key = edge_worker_key_prefix();
    key.extend_from_slice(addr.as_bytes());
    key
}

/// State key for the edge pool's total active stake
pub fn edge_total_stake_key() -> Vec<u8> {
    b"ls/edgetas".to_vec()
}

/// Build the key for edge stake returns due at a height
pub fn edge_stake_returns_key(height: u64) -> Vec<u8> {
    format!("ls/edgesrk/{}", height).into_bytes()
}

/// Prefix of the stake-reward distribution rules
pub fn stake_reward_distribution_key_prefix() -> Vec<u8> {
    b"ls/srdrs/".to_vec()
}

/// Build the stake-reward distribution rule key for a holder
pub fn stake_reward_distribution_key(addr: &Address) -> Vec<u8> {
    let mut key = stake_reward_distribution_key_prefix();
    key.extend_from_slice(addr.as_bytes());
    key
}

/// State key for the list of heights containing stake transactions
pub fn stake_transaction_height_list_key() -> Vec<u8> {
    b"ls/sthl".to_vec()
}
