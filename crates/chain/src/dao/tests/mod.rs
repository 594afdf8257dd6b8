//! Scenario test untuk `GovernanceEngine`: block di-connect satu per satu
//! di atas `MemoryStore`, bobot stake tetap per staker.

mod admission;
mod reorg;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::consensus_params::ConsensusParamsPos as P;
use crate::dao::engine::{BlockSummary, ConnectedBlock, GovernanceEngine, GovernanceSettings, GovernanceTx, StakerVotes};
use crate::dao::flags::proposal_version;
use crate::dao::payment_request::{AcceptAllSignatures, PaymentRequestTx, SignatureOracle};
use crate::dao::proposal::ProposalTx;
use crate::dao::vote_cache::FixedWeights;
use crate::dao::DaoError;
use crate::db::MemoryStore;
use crate::destination::TxDestination;
use crate::types::{Amount, Hash160, Hash256, Network, StakerScript, COIN};

pub(super) const BLOCK_SPACING: u32 = 60;

pub(super) fn staker(name: char) -> StakerScript {
    StakerScript::new(vec![name as u8; 8])
}

pub(super) fn txid(b: u8) -> Hash256 {
    Hash256::from_bytes([b; 32])
}

pub(super) fn owner() -> TxDestination {
    TxDestination::KeyId(Hash160::from_bytes([0x11; 20]))
}

pub(super) fn proposal_tx(amount: Amount, deadline: u64) -> ProposalTx {
    ProposalTx {
        owner: owner(),
        payment_address: owner(),
        amount,
        deadline,
        description: "grow the ecosystem".to_string(),
        version: proposal_version::BASE,
        fee: 50 * COIN,
    }
}

pub(super) fn payment_request_tx(proposal: Hash256, amount: Amount) -> PaymentRequestTx {
    PaymentRequestTx {
        proposal_hash: proposal,
        amount,
        description: "milestone one".to_string(),
        random: "a1b2".to_string(),
        signature: Vec::new(),
        version: proposal_version::BASE,
        fee: COIN / 10_000,
    }
}

/// Engine + store + urutan block. Staker block selalu `S` (bobot 0) kecuali
/// diminta lain; vote dimasukkan sebagai vote coinstake staker yang disebut.
pub(super) struct Harness {
    pub engine: GovernanceEngine,
    pub store: Arc<MemoryStore>,
    pub fund_per_block: Amount,
}

impl Harness {
    /// Stake A:60 B:25 C:15, cycle 10 block.
    pub fn new(overrides: &[(P, i64)]) -> Self {
        let mut all = vec![(P::VotingCycleLength, 10)];
        all.extend_from_slice(overrides);
        let settings = GovernanceSettings::for_network(Network::Regtest)
            .with_overrides(&all)
            .expect("valid overrides");
        let weights: BTreeMap<StakerScript, u64> =
            [(staker('A'), 60), (staker('B'), 25), (staker('C'), 15)].into_iter().collect();

        let store = Arc::new(MemoryStore::new());
        let engine = GovernanceEngine::new(store.clone(), settings)
            .with_weights(Box::new(FixedWeights::new(weights)))
            .with_signatures(Box::new(AcceptAllSignatures));
        Harness { engine, store, fund_per_block: 10 * COIN }
    }

    pub fn with_signatures(mut self, signatures: Box<dyn SignatureOracle>) -> Self {
        self.engine = self.engine.with_signatures(signatures);
        self
    }

    pub fn next_height(&self) -> u32 {
        self.engine.tip().map_or(0, |t| t + 1)
    }

    /// Block kosong berikutnya.
    pub fn block(&self) -> ConnectedBlock {
        let height = self.next_height();
        let mut block = ConnectedBlock::new(height, height * BLOCK_SPACING, staker('S'));
        block.fund_contribution = self.fund_per_block;
        block
    }

    pub fn connect(&mut self, block: ConnectedBlock) -> BlockSummary {
        self.engine.connect_block(&block).expect("connect")
    }

    pub fn try_connect(&mut self, block: ConnectedBlock) -> Result<BlockSummary, DaoError> {
        self.engine.connect_block(&block)
    }

    /// Connect block kosong sampai tip = `height`. Return block yang di-connect.
    pub fn advance_to(&mut self, height: u32) -> Vec<ConnectedBlock> {
        let mut connected = Vec::new();
        while self.engine.tip().map_or(true, |t| t < height) {
            let block = self.block();
            self.connect(block.clone());
            connected.push(block);
        }
        connected
    }

    pub fn connect_tx(&mut self, tx: GovernanceTx) -> ConnectedBlock {
        let block = self.block().with_tx(tx);
        self.connect(block.clone());
        block
    }

    /// Block berisi vote dari beberapa staker.
    pub fn connect_votes(&mut self, votes: &[(char, Hash256, i64)]) -> ConnectedBlock {
        let mut block = self.block();
        let mut by_staker: BTreeMap<char, Vec<(Hash256, i64)>> = BTreeMap::new();
        for (who, hash, value) in votes {
            by_staker.entry(*who).or_default().push((*hash, *value));
        }
        for (who, entries) in by_staker {
            block.votes.push(StakerVotes { staker: staker(who), entries, light_fee: None });
        }
        self.connect(block.clone());
        block
    }

    pub fn tip(&self) -> u32 {
        self.engine.tip().unwrap_or(0)
    }
}
