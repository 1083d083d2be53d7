//! Edge consensus engine
//!
//! A single-writer actor that collects edge votes for the in-flight
//! checkpoint block and aggregates them across gossip rounds. All entry
//! points go through one mutex; validation and merging happen on the main
//! loop task. Votes are soft state: full inboxes drop, gossip re-delivers.

use lru::LruCache;
use parking_lot::Mutex;
use pando_core::{Address, EdgeConsensusConfig, Hash, PandoResult};
use pando_state::EdgePool;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bookkeeper::EdgeVoteBookkeeper;
use crate::vote::{AggregatedEdgeVotes, EdgeVote};

/// Estimated log2 of the gossip fan-out (2^3 = 8 neighbors)
const MAX_EDGE_LOG_NEIGHBORS: u32 = 3;

/// Maximum number of gossip rounds per block
const MAX_EDGE_ROUND: u32 = 20;

/// Capacity of the per-block sample-result cache
const SAMPLE_RESULT_CACHE_SIZE: usize = 1_000_000;

/// Capability to load the edge pool snapshot backing a block's checkpoint.
/// Injected by the parent consensus engine.
pub trait CheckpointLedger: Send + Sync {
    fn edge_pool_of_last_checkpoint(&self, block: &Hash) -> PandoResult<EdgePool>;
}

struct EngineState {
    block: Option<Hash>,
    round: u32,
    /// The aggregate this node broadcasts in the current round
    curr_vote: Option<AggregatedEdgeVotes>,
    /// The best aggregate known so far
    next_vote: Option<AggregatedEdgeVotes>,
    pool: Option<EdgePool>,
    sample_result: LruCache<Address, bool>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            block: None,
            round: 1,
            curr_vote: None,
            next_vote: None,
            pool: None,
            sample_result: LruCache::new(
                NonZeroUsize::new(SAMPLE_RESULT_CACHE_SIZE).expect("non-zero cache size"),
            ),
        }
    }
}

type Inboxes = (
    mpsc::Receiver<EdgeVote>,
    mpsc::Receiver<AggregatedEdgeVotes>,
);

/// The edge-tier consensus engine
pub struct EdgeEngine {
    ledger: Arc<dyn CheckpointLedger>,
    bookkeeper: EdgeVoteBookkeeper,
    state: Mutex<EngineState>,
    ev_tx: mpsc::Sender<EdgeVote>,
    aev_tx: mpsc::Sender<AggregatedEdgeVotes>,
    inboxes: Mutex<Option<Inboxes>>,
}

impl EdgeEngine {
    pub fn new(config: EdgeConsensusConfig, ledger: Arc<dyn CheckpointLedger>) -> Self {
        let (ev_tx, ev_rx) = mpsc::channel(config.vote_queue_size);
        let (aev_tx, aev_rx) = mpsc::channel(config.vote_queue_size);
        Self {
            ledger,
            bookkeeper: EdgeVoteBookkeeper::default(),
            state: Mutex::new(EngineState::new()),
            ev_tx,
            aev_tx,
            inboxes: Mutex::new(Some((ev_rx, aev_rx))),
        }
    }

    /// Spawns the main loop. The engine stops when `cancel` fires.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let (ev_rx, aev_rx) = self
            .inboxes
            .lock()
            .take()
            .expect("edge engine already started");
        tokio::spawn(async move { self.main_loop(ev_rx, aev_rx, cancel).await })
    }

    async fn main_loop(
        &self,
        mut ev_rx: mpsc::Receiver<EdgeVote>,
        mut aev_rx: mpsc::Receiver<AggregatedEdgeVotes>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                Some(vote) = ev_rx.recv() => self.process_vote(vote),
                Some(vote) = aev_rx.recv() => self.process_aggregated_vote(vote),
                else => return,
            }
        }
    }

    /// Resets the per-block state for a newly proposed checkpoint block.
    pub fn start_new_block(&self, block: Hash) {
        let mut state = self.state.lock();

        state.block = Some(block);
        state.next_vote = None;
        state.curr_vote = None;
        state.round = 1;

        let pool = self
            .ledger
            .edge_pool_of_last_checkpoint(&block)
            .unwrap_or_else(|e| panic!("failed to load edge pool for {}: {}", block, e));
        state.pool = Some(pool);
        state.sample_result.clear();

        debug!(block = %block, "Starting new block");
    }

    /// Advances the gossip round, promoting the best-known aggregate to the
    /// broadcast slot. Driven by the parent consensus engine's timer.
    pub fn start_new_round(&self) {
        let mut state = self.state.lock();
        if state.round < MAX_EDGE_ROUND {
            state.round += 1;
            if let Some(next) = state.next_vote.clone() {
                state.curr_vote = Some(next);
            }
        }
    }

    /// The aggregate to broadcast this round.
    pub fn vote_to_broadcast(&self) -> Option<AggregatedEdgeVotes> {
        self.state.lock().curr_vote.clone()
    }

    /// The best-known aggregate for the in-flight block.
    pub fn best_vote(&self) -> Option<AggregatedEdgeVotes> {
        self.state.lock().next_vote.clone()
    }

    pub fn bookkeeper(&self) -> &EdgeVoteBookkeeper {
        &self.bookkeeper
    }

    /// Entry point for raw votes arriving from gossip.
    pub fn handle_vote(&self, vote: EdgeVote) {
        if !self.bookkeeper.record(&vote) {
            // seen earlier, safely ignore
            return;
        }

        debug!(address = %vote.address, block = %vote.block, "Received edge vote for the first time");

        if self.ev_tx.try_send(vote).is_err() {
            debug!("edge engine queue is full, discarding edge vote");
        }
    }

    /// Entry point for aggregated votes arriving from gossip.
    pub fn handle_aggregated_vote(&self, vote: AggregatedEdgeVotes) {
        if self.aev_tx.try_send(vote).is_err() {
            debug!("edge engine queue is full, discarding aggregated edge vote");
        }
    }

    fn process_vote(&self, vote: EdgeVote) {
        let valid = {
            let mut state = self.state.lock();
            Self::validate_vote(&mut state, &vote)
        };
        if !valid {
            return;
        }

        debug!(address = %vote.address, block = %vote.block, "Validated edge vote");

        let aggregated = AggregatedEdgeVotes::from_vote(&vote);
        if self.aev_tx.try_send(aggregated).is_err() {
            debug!("edge engine queue is full, discarding converted edge vote");
        }
    }

    fn process_aggregated_vote(&self, vote: AggregatedEdgeVotes) {
        let mut state = self.state.lock();

        if !Self::validate_aggregated_vote(&state, &vote) {
            return;
        }

        let Some(next_vote) = &state.next_vote else {
            state.next_vote = Some(vote);
            return;
        };

        let candidate = match next_vote.merge(&vote) {
            Ok(candidate) => candidate,
            Err(e) => {
                debug!(
                    block = ?state.block,
                    round = state.round,
                    error = %e,
                    "Failed to merge aggregated edge vote"
                );
                None
            }
        };

        let Some(candidate) = candidate else {
            // incoming vote is a subset of the current best
            debug!(block = %vote.block, "Skipping aggregated edge vote: no new signers");
            return;
        };

        if !check_multiplies_for_round(&candidate, state.round + 1) {
            debug!(
                block = %vote.block,
                round = state.round,
                "Skipping aggregated edge vote: candidate vote overflows"
            );
            return;
        }

        state.next_vote = Some(candidate);

        debug!(
            block = ?state.block,
            round = state.round,
            "New aggregated edge vote"
        );
    }

    fn validate_vote(state: &mut EngineState, vote: &EdgeVote) -> bool {
        if state.pool.is_none() {
            return false;
        }
        let Some(block) = state.block else {
            return false;
        };
        if vote.block != block {
            debug!(
                local_block = %block,
                vote_block = %vote.block,
                "Ignoring edge vote: block hash does not match local candidate"
            );
            return false;
        }

        // consult the sample cache before re-deriving the weight
        let cached = state.sample_result.get(&vote.address).copied();
        let selected = match cached {
            Some(selected) => selected,
            None => {
                let pool = state.pool.as_ref().expect("pool checked above");
                let selected = pool.random_reward_weight(&block, &vote.address) != 0;
                state.sample_result.put(vote.address, selected);
                selected
            }
        };
        if !selected {
            debug!(
                address = %vote.address,
                "Ignoring edge vote: not selected by random sampling"
            );
            return false;
        }

        let pool = state.pool.as_ref().expect("pool checked above");
        let Some(pubkeys) = pool.get_pub_keys(&[vote.address]) else {
            debug!(address = %vote.address, "Ignoring edge vote: failed to get pubkey");
            return false;
        };
        if let Err(e) = vote.validate(&pubkeys[0]) {
            debug!(address = %vote.address, error = %e, "Ignoring edge vote: invalid signature");
            return false;
        }

        true
    }

    fn validate_aggregated_vote(state: &EngineState, vote: &AggregatedEdgeVotes) -> bool {
        let Some(block) = state.block else {
            debug!("Ignoring aggregated edge vote: local not ready");
            return false;
        };
        if vote.block != block {
            debug!(
                local_block = %block,
                vote_block = %vote.block,
                "Ignoring aggregated edge vote: block hash does not match local candidate"
            );
            return false;
        }
        if !check_multiplies_for_round(vote, state.round) {
            debug!(
                round = state.round,
                "Ignoring aggregated edge vote: multiplies exceed limit for round"
            );
            return false;
        }
        let Some(pool) = &state.pool else {
            return false;
        };
        if let Err(e) = vote.validate(pool) {
            debug!(error = %e, "Ignoring aggregated edge vote: invalid vote");
            return false;
        }

        true
    }
}

/// At round `k` a signature can have traversed at most `k` gossip hops, so
/// its multiplicity is bounded by the fan-out to the k-th power.
fn max_multiply(k: u32) -> u64 {
    1u64 << (k * MAX_EDGE_LOG_NEIGHBORS).min(63)
}

fn check_multiplies_for_round(vote: &AggregatedEdgeVotes, k: u32) -> bool {
    vote.multiplies.iter().all(|m| u64::from(*m) <= max_multiply(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pando_core::coins::coins_to_wei;
    use pando_core::{BlsSignature, PandoResult};
    use pando_crypto::BlsSecretKey;
    use pando_state::StoreView;
    use std::time::Duration;

    struct StaticLedger {
        view: StoreView,
    }

    impl CheckpointLedger for StaticLedger {
        fn edge_pool_of_last_checkpoint(&self, _block: &Hash) -> PandoResult<EdgePool> {
            Ok(EdgePool::new(self.view.clone(), true))
        }
    }

    fn addr(b: u8) -> Address {
        Address([b; 20])
    }

    fn key(seed: u8) -> BlsSecretKey {
        BlsSecretKey::from_seed(&[seed; 32])
    }

    fn block() -> Hash {
        Hash::from_bytes([0xaa; 32])
    }

    /// A view holding enterprise-staked workers for the given (addr, key) seeds.
    fn staked_view(seeds: &[(u8, u8)]) -> StoreView {
        let view = StoreView::new(1);
        let pool = EdgePool::new(view.clone(), false);
        for (addr_byte, key_seed) in seeds {
            pool.deposit_stake(
                addr(0xee),
                addr(*addr_byte),
                coins_to_wei(35_000),
                key(*key_seed).public_key(),
                1,
            )
            .unwrap();
        }
        view
    }

    fn engine_for(view: StoreView) -> Arc<EdgeEngine> {
        Arc::new(EdgeEngine::new(
            EdgeConsensusConfig::default(),
            Arc::new(StaticLedger { view }),
        ))
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_vote_is_aggregated_into_best_vote() {
        let engine = engine_for(staked_view(&[(1, 1)]));
        let cancel = CancellationToken::new();
        engine.clone().start(cancel.clone());

        engine.start_new_block(block());
        engine.handle_vote(EdgeVote::signed(block(), 1001, addr(1), &key(1)));

        wait_for(|| engine.best_vote().is_some()).await;

        let best = engine.best_vote().unwrap();
        assert_eq!(best.addresses, vec![addr(1)]);
        assert_eq!(best.multiplies, vec![1]);

        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_vote_is_dropped_by_bookkeeper() {
        let engine = engine_for(staked_view(&[(1, 1)]));
        let cancel = CancellationToken::new();
        engine.clone().start(cancel.clone());

        engine.start_new_block(block());
        let vote = EdgeVote::signed(block(), 1001, addr(1), &key(1));
        engine.handle_vote(vote.clone());
        engine.handle_vote(vote.clone());

        wait_for(|| engine.best_vote().is_some()).await;

        assert_eq!(engine.bookkeeper().receive_count(&vote), 1);
        let best = engine.best_vote().unwrap();
        assert_eq!(best.multiplies, vec![1]);

        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_votes_from_two_workers_merge() {
        let engine = engine_for(staked_view(&[(1, 1), (2, 2)]));
        let cancel = CancellationToken::new();
        engine.clone().start(cancel.clone());

        engine.start_new_block(block());
        engine.handle_vote(EdgeVote::signed(block(), 1001, addr(1), &key(1)));
        engine.handle_vote(EdgeVote::signed(block(), 1001, addr(2), &key(2)));

        wait_for(|| {
            engine
                .best_vote()
                .map(|v| v.addresses.len() == 2)
                .unwrap_or(false)
        })
        .await;

        let best = engine.best_vote().unwrap();
        assert_eq!(best.addresses, vec![addr(1), addr(2)]);
        assert_eq!(best.multiplies, vec![1, 1]);

        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_aggregated_vote_is_accepted_and_subset_dropped() {
        let engine = engine_for(staked_view(&[(1, 1)]));
        let cancel = CancellationToken::new();
        engine.clone().start(cancel.clone());

        engine.start_new_block(block());
        let aggregated =
            AggregatedEdgeVotes::from_vote(&EdgeVote::signed(block(), 1001, addr(1), &key(1)));
        engine.handle_aggregated_vote(aggregated.clone());

        wait_for(|| engine.best_vote().is_some()).await;
        assert_eq!(engine.best_vote().unwrap().multiplies, vec![1]);

        // re-delivering the same aggregate contributes no new signers
        engine.handle_aggregated_vote(aggregated);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(engine.best_vote().unwrap().multiplies, vec![1]);

        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_vote_for_other_block_is_rejected() {
        let engine = engine_for(staked_view(&[(1, 1)]));
        let cancel = CancellationToken::new();
        engine.clone().start(cancel.clone());

        engine.start_new_block(block());
        let other = Hash::from_bytes([0xcc; 32]);
        engine.handle_vote(EdgeVote::signed(other, 1001, addr(1), &key(1)));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(engine.best_vote().is_none());

        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unstaked_worker_vote_is_rejected() {
        let engine = engine_for(staked_view(&[(1, 1)]));
        let cancel = CancellationToken::new();
        engine.clone().start(cancel.clone());

        engine.start_new_block(block());
        // worker 9 never deposited
        engine.handle_vote(EdgeVote::signed(block(), 1001, addr(9), &key(9)));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(engine.best_vote().is_none());

        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_new_round_promotes_best_vote_to_broadcast() {
        let engine = engine_for(staked_view(&[(1, 1)]));
        let cancel = CancellationToken::new();
        engine.clone().start(cancel.clone());

        engine.start_new_block(block());
        assert!(engine.vote_to_broadcast().is_none());

        engine.handle_vote(EdgeVote::signed(block(), 1001, addr(1), &key(1)));
        wait_for(|| engine.best_vote().is_some()).await;

        engine.start_new_round();
        let broadcast = engine.vote_to_broadcast().unwrap();
        assert_eq!(broadcast.addresses, vec![addr(1)]);

        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_new_block_resets_state() {
        let engine = engine_for(staked_view(&[(1, 1)]));
        let cancel = CancellationToken::new();
        engine.clone().start(cancel.clone());

        engine.start_new_block(block());
        engine.handle_vote(EdgeVote::signed(block(), 1001, addr(1), &key(1)));
        wait_for(|| engine.best_vote().is_some()).await;

        engine.start_new_block(Hash::from_bytes([0xdd; 32]));
        assert!(engine.best_vote().is_none());
        assert!(engine.vote_to_broadcast().is_none());

        cancel.cancel();
    }

    #[test]
    fn test_round_multiplicity_cap() {
        let vote = AggregatedEdgeVotes {
            block: block(),
            addresses: vec![addr(1)],
            multiplies: vec![9],
            signature: BlsSignature([1u8; 96]),
        };

        // round 1 allows up to 2^3 = 8
        assert!(!check_multiplies_for_round(&vote, 1));
        // round 2 allows up to 2^6 = 64
        assert!(check_multiplies_for_round(&vote, 2));

        // large rounds saturate without overflowing
        assert!(check_multiplies_for_round(&vote, MAX_EDGE_ROUND + 5));
    }
}
