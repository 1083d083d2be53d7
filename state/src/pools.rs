//! Validator and guardian candidate pools
//!
//! Both pools are persisted whole under a single state key and keep their
//! members in ascending holder order. Guardian aggregate votes refer to
//! guardians by position in that order.

use num_bigint::BigInt;
use pando_core::{
    Address, BlsPublicKey, Guardian, PandoError, PandoResult, Stake, StakeHolder,
};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

/// Candidates for the validator set, with their delegated stakes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorCandidatePool {
    sorted_candidates: Vec<StakeHolder>,
}

impl ValidatorCandidatePool {
    pub fn candidates(&self) -> &[StakeHolder] {
        &self.sorted_candidates
    }

    /// Finds the stake delegate for a validator address.
    pub fn find_stake_delegate(&self, addr: &Address) -> Option<&StakeHolder> {
        self.sorted_candidates.iter().find(|c| c.holder == *addr)
    }

    pub fn total_stake(&self) -> BigInt {
        self.sorted_candidates.iter().map(|c| c.total_stake()).sum()
    }

    pub fn deposit_stake(
        &mut self,
        source: Address,
        holder: Address,
        amount: BigInt,
        _block_height: u64,
    ) -> PandoResult<()> {
        match self
            .sorted_candidates
            .iter()
            .position(|c| c.holder == holder)
        {
            Some(idx) => self.sorted_candidates[idx].deposit_stake(source, amount)?,
            None => {
                let mut candidate = StakeHolder::new(holder, Vec::new());
                candidate.deposit_stake(source, amount)?;
                let pos = self
                    .sorted_candidates
                    .partition_point(|c| c.holder < holder);
                self.sorted_candidates.insert(pos, candidate);
            }
        }
        Ok(())
    }

    pub fn withdraw_stake(
        &mut self,
        source: Address,
        holder: Address,
        current_height: u64,
    ) -> PandoResult<Stake> {
        let candidate = self
            .sorted_candidates
            .iter_mut()
            .find(|c| c.holder == holder)
            .ok_or(PandoError::StakeHolderNotFound(holder))?;
        candidate.withdraw_stake(source, current_height)
    }
}

impl Encodable for ValidatorCandidatePool {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.append_list(&self.sorted_candidates);
    }
}

impl Decodable for ValidatorCandidatePool {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(ValidatorCandidatePool {
            sorted_candidates: rlp.as_list()?,
        })
    }
}

/// Candidates for the guardian tier
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardianCandidatePool {
    sorted_guardians: Vec<Guardian>,
}

impl GuardianCandidatePool {
    pub fn guardians(&self) -> &[Guardian] {
        &self.sorted_guardians
    }

    pub fn len(&self) -> usize {
        self.sorted_guardians.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted_guardians.is_empty()
    }

    pub fn contains(&self, holder: &Address) -> bool {
        self.sorted_guardians.iter().any(|g| g.holder() == *holder)
    }

    /// The pool restricted to guardians with non-withdrawn stake, preserving
    /// order so vote multiplicities keep lining up.
    pub fn with_stake(&self) -> GuardianCandidatePool {
        GuardianCandidatePool {
            sorted_guardians: self
                .sorted_guardians
                .iter()
                .filter(|g| g.has_stake())
                .cloned()
                .collect(),
        }
    }

    pub fn deposit_stake(
        &mut self,
        source: Address,
        holder: Address,
        amount: BigInt,
        pubkey: BlsPublicKey,
        _block_height: u64,
    ) -> PandoResult<()> {
        match self
            .sorted_guardians
            .iter()
            .position(|g| g.holder() == holder)
        {
            Some(idx) => self.sorted_guardians[idx]
                .stake_holder
                .deposit_stake(source, amount)?,
            None => {
                let mut stake_holder = StakeHolder::new(holder, Vec::new());
                stake_holder.deposit_stake(source, amount)?;
                let guardian = Guardian::new(stake_holder, pubkey);
                let pos = self
                    .sorted_guardians
                    .partition_point(|g| g.holder() < holder);
                self.sorted_guardians.insert(pos, guardian);
            }
        }
        Ok(())
    }

    pub fn withdraw_stake(
        &mut self,
        source: Address,
        holder: Address,
        current_height: u64,
    ) -> PandoResult<Stake> {
        let guardian = self
            .sorted_guardians
            .iter_mut()
            .find(|g| g.holder() == holder)
            .ok_or(PandoError::StakeHolderNotFound(holder))?;
        guardian.stake_holder.withdraw_stake(source, current_height)
    }
}

impl Encodable for GuardianCandidatePool {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.append_list(&self.sorted_guardians);
    }
}

impl Decodable for GuardianCandidatePool {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(GuardianCandidatePool {
            sorted_guardians: rlp.as_list()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pando_core::coins::coins_to_wei;

    fn addr(b: u8) -> Address {
        Address([b; 20])
    }

    #[test]
    fn test_vcp_deposit_keeps_holder_order() {
        let mut vcp = ValidatorCandidatePool::default();
        vcp.deposit_stake(addr(1), addr(30), coins_to_wei(200_000), 1)
            .unwrap();
        vcp.deposit_stake(addr(1), addr(10), coins_to_wei(200_000), 1)
            .unwrap();
        vcp.deposit_stake(addr(1), addr(20), coins_to_wei(200_000), 1)
            .unwrap();

        let holders: Vec<Address> = vcp.candidates().iter().map(|c| c.holder).collect();
        assert_eq!(holders, vec![addr(10), addr(20), addr(30)]);
        assert_eq!(vcp.total_stake(), coins_to_wei(600_000));
    }

    #[test]
    fn test_vcp_find_stake_delegate() {
        let mut vcp = ValidatorCandidatePool::default();
        vcp.deposit_stake(addr(1), addr(10), coins_to_wei(200_000), 1)
            .unwrap();

        assert!(vcp.find_stake_delegate(&addr(10)).is_some());
        assert!(vcp.find_stake_delegate(&addr(11)).is_none());
    }

    #[test]
    fn test_gcp_with_stake_preserves_order() {
        let mut gcp = GuardianCandidatePool::default();
        gcp.deposit_stake(addr(1), addr(10), coins_to_wei(10_000), BlsPublicKey([1; 48]), 1)
            .unwrap();
        gcp.deposit_stake(addr(1), addr(20), coins_to_wei(10_000), BlsPublicKey([2; 48]), 1)
            .unwrap();
        gcp.deposit_stake(addr(1), addr(30), coins_to_wei(10_000), BlsPublicKey([3; 48]), 1)
            .unwrap();

        gcp.withdraw_stake(addr(1), addr(20), 100).unwrap();

        let active = gcp.with_stake();
        let holders: Vec<Address> = active.guardians().iter().map(|g| g.holder()).collect();
        assert_eq!(holders, vec![addr(10), addr(30)]);
        // the full pool still has all three
        assert_eq!(gcp.len(), 3);
    }

    #[test]
    fn test_pool_rlp_round_trip() {
        let mut gcp = GuardianCandidatePool::default();
        gcp.deposit_stake(addr(1), addr(10), coins_to_wei(10_000), BlsPublicKey([1; 48]), 1)
            .unwrap();

        let decoded: GuardianCandidatePool = rlp::decode(&rlp::encode(&gcp)).unwrap();
        assert_eq!(gcp, decoded);

        let mut vcp = ValidatorCandidatePool::default();
        vcp.deposit_stake(addr(1), addr(10), coins_to_wei(200_000), 1)
            .unwrap();
        let decoded: ValidatorCandidatePool = rlp::decode(&rlp::encode(&vcp)).unwrap();
        assert_eq!(vcp, decoded);
    }
}
