//! Stake-reward distribution rules
//!
//! A holder may configure a basis-point split that redirects part of its
//! stakers' rewards to a beneficiary address. Rules are persisted per holder
//! under `ls/srdrs/<addr>`.

use pando_core::Address;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

use crate::keys;
use crate::store::StoreView;

/// Reward split configuration for one stake holder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardDistribution {
    pub stake_holder: Address,
    pub beneficiary: Address,
    /// Share of the reward redirected to the beneficiary, in basis points
    pub split_basis_point: u64,
}

impl Encodable for RewardDistribution {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.stake_holder);
        s.append(&self.beneficiary);
        s.append(&self.split_basis_point);
    }
}

impl Decodable for RewardDistribution {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(RewardDistribution {
            stake_holder: rlp.val_at(0)?,
            beneficiary: rlp.val_at(1)?,
            split_basis_point: rlp.val_at(2)?,
        })
    }
}

/// View over the per-holder reward distribution rules
pub struct StakeRewardDistributionRuleSet {
    sv: StoreView,
}

impl StakeRewardDistributionRuleSet {
    pub fn new(sv: StoreView) -> Self {
        Self { sv }
    }

    pub fn get(&self, holder: &Address) -> Option<RewardDistribution> {
        let data = self.sv.get(&keys::stake_reward_distribution_key(holder))?;
        Some(
            rlp::decode(&data)
                .unwrap_or_else(|e| panic!("corrupted reward rule for {}: {}", holder, e)),
        )
    }

    pub fn set(&self, rule: &RewardDistribution) {
        self.sv.set(
            keys::stake_reward_distribution_key(&rule.stake_holder),
            rlp::encode(rule).to_vec(),
        );
    }

    pub fn remove(&self, holder: &Address) {
        self.sv
            .delete(&keys::stake_reward_distribution_key(holder));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_round_trip() {
        let view = StoreView::new(1);
        let rules = StakeRewardDistributionRuleSet::new(view);

        let holder = Address([1u8; 20]);
        assert!(rules.get(&holder).is_none());

        let rule = RewardDistribution {
            stake_holder: holder,
            beneficiary: Address([2u8; 20]),
            split_basis_point: 2500,
        };
        rules.set(&rule);
        assert_eq!(rules.get(&holder), Some(rule));

        rules.remove(&holder);
        assert!(rules.get(&holder).is_none());
    }
}
