//! # Stock Chain Governance Library
//!
//! Library inti node governance: state machine DAO on-chain, voting parameter
//! konsensus, index address / token di atas LMDB, dan vote lokal operator.
//!
//! ## Module Overview
//!
//! | Module | Fungsi |
//! |--------|--------|
//! | `types` | Core types: Hash160, Hash256, StakerScript, Amount, Network |
//! | `destination` | TxDestination + address ownership |
//! | `db` | `KvStore`: LMDB dan in-memory, `WriteBatch` atomik |
//! | `index` | Record key/value address index, history, unspent, token UTXO |
//! | `consensus_params` | Tabel parameter konsensus + overlay hasil voting |
//! | `dao` | Governance engine: proposal, payment request, consultation, vote |
//! | `cli` | Command line read-only untuk operator |
//!
//! ## Block Flow
//!
//! ```text
//! driver chain ──connect_block(h)──▶ DaoChain ──▶ GovernanceEngine
//!                                         │            │
//!                                         │            └─ WriteBatch (dao + index + token)
//!                                         └─ RwLock: query paralel, mutasi eksklusif
//! ```
//!
//! Driver memanggil `connect_block` berurutan per height dan `disconnect_block`
//! untuk tip saat reorg. Error `is_fatal()` berarti store tidak lagi sesuai
//! dengan chain; driver wajib berhenti.

pub mod types;
pub mod destination;
pub mod db;
pub mod index;
pub mod consensus_params;
pub mod dao;
pub mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use stock_common::Config;
use thiserror::Error;
use tracing::{debug, info};

use crate::consensus_params::{ConsensusParamsPos, ParamReport};
use crate::dao::engine::BlockSummary;
use crate::dao::intents::{IntentError, VotingIntents};
use crate::dao::vote_script::VoteScriptError;
use crate::dao::{ConnectedBlock, DaoError, GovernanceEngine, GovernanceSettings};
use crate::db::{KvStore, LmdbStore, StoreError, DEFAULT_MAP_SIZE};
use crate::destination::AddressType;
use crate::index::address::{self, AddressHistoryKey, AddressHistoryValue, AddressIndexKey};
use crate::index::token::{self, TokenId, TokenUtxoKey, TokenUtxoValue};
use crate::types::{Amount, Hash160};

pub use crate::types::{Hash256, Network, StakerScript, COIN};

// ════════════════════════════════════════════════════════════════════════════
// CHAIN ERROR
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum ChainError {
    #[error(transparent)]
    Dao(#[from] DaoError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Intent(#[from] IntentError),

    #[error(transparent)]
    VoteScript(#[from] VoteScriptError),
}

impl ChainError {
    /// Store atau cache vote sudah tidak konsisten dengan chain.
    pub fn is_fatal(&self) -> bool {
        match self {
            ChainError::Dao(e) => e.is_fatal(),
            ChainError::Store(_) => true,
            _ => false,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// DAO CHAIN
// ════════════════════════════════════════════════════════════════════════════

/// Handle node governance: store, engine dan voting intents lokal.
#[derive(Clone)]
pub struct DaoChain {
    pub db: Arc<dyn KvStore>,
    pub engine: Arc<RwLock<GovernanceEngine>>,
    pub intents: Arc<RwLock<VotingIntents>>,
    /// File JSON intents; `None` = intents hanya di memory.
    intents_path: Option<PathBuf>,
}

impl DaoChain {
    /// Buka LMDB di `data_dir` dari config lalu load state governance.
    pub fn open(cfg: &Config) -> anyhow::Result<Self> {
        let data_dir = cfg.data_dir.as_deref().unwrap_or("./data");
        let map_size = cfg.map_size.unwrap_or(DEFAULT_MAP_SIZE);
        let settings = GovernanceSettings::from_config(cfg)?;
        let store: Arc<dyn KvStore> = Arc::new(LmdbStore::open(data_dir, map_size)?);

        let intents_path = cfg.intents_file.as_ref().map(PathBuf::from);
        let intents = match &intents_path {
            Some(path) => VotingIntents::load(path)?,
            None => VotingIntents::new(),
        };

        let chain = DaoChain::with_store(store, settings)?.with_intents(intents, intents_path);
        info!(
            data_dir,
            network = %chain.engine.read().settings().network,
            tip = ?chain.tip(),
            "governance chain opened"
        );
        Ok(chain)
    }

    /// Engine di atas store yang sudah ada (LMDB atau memory).
    pub fn with_store(store: Arc<dyn KvStore>, settings: GovernanceSettings) -> Result<Self, ChainError> {
        let engine = GovernanceEngine::load(store.clone(), settings)?;
        Ok(DaoChain {
            db: store,
            engine: Arc::new(RwLock::new(engine)),
            intents: Arc::new(RwLock::new(VotingIntents::new())),
            intents_path: None,
        })
    }

    pub fn with_intents(mut self, intents: VotingIntents, path: Option<PathBuf>) -> Self {
        self.intents = Arc::new(RwLock::new(intents));
        self.intents_path = path;
        self
    }

    pub fn intents_path(&self) -> Option<&Path> {
        self.intents_path.as_deref()
    }

    /// Read guard engine untuk query yang mengembalikan reference.
    pub fn engine(&self) -> RwLockReadGuard<'_, GovernanceEngine> {
        self.engine.read()
    }

    pub fn tip(&self) -> Option<u32> {
        self.engine.read().tip()
    }

    // ────────────────────────────────────────────────────────────────────────
    // BLOCK DRIVER
    // ────────────────────────────────────────────────────────────────────────

    pub fn connect_block(&self, block: &ConnectedBlock) -> Result<BlockSummary, ChainError> {
        let mut engine = self.engine.write();
        Ok(engine.connect_block(block)?)
    }

    pub fn disconnect_block(&self, block: &ConnectedBlock) -> Result<BlockSummary, ChainError> {
        let mut engine = self.engine.write();
        Ok(engine.disconnect_block(block)?)
    }

    // ────────────────────────────────────────────────────────────────────────
    // QUERIES
    // ────────────────────────────────────────────────────────────────────────

    pub fn consensus_parameters(&self) -> Vec<ParamReport> {
        let engine = self.engine.read();
        engine.consensus_parameters(engine.tip().unwrap_or(0))
    }

    pub fn consensus_parameter(&self, id: ConsensusParamsPos) -> i64 {
        self.engine.read().get_consensus_parameter(id)
    }

    pub fn fund_available(&self) -> Amount {
        let engine = self.engine.read();
        engine.fund_available(engine.tip().unwrap_or(0))
    }

    pub fn address_index(
        &self,
        address_type: AddressType,
        hash: Hash160,
        range: Option<(u32, u32)>,
    ) -> Result<Vec<(AddressIndexKey, Amount)>, ChainError> {
        Ok(address::address_index(self.db.as_ref(), address_type, hash, range)?)
    }

    pub fn address_balance(&self, address_type: AddressType, hash: Hash160) -> Result<(Amount, Amount), ChainError> {
        Ok(address::address_balance(self.db.as_ref(), address_type, hash)?)
    }

    pub fn address_history(
        &self,
        hash: Hash160,
        hash2: Hash160,
        start: u32,
        end: u32,
        filter: u8,
    ) -> Result<Vec<(AddressHistoryKey, AddressHistoryValue)>, ChainError> {
        Ok(address::address_history(self.db.as_ref(), hash, hash2, start, end, filter)?)
    }

    pub fn token_utxos(&self, id: &TokenId, from: u32, to: u32) -> Result<Vec<(TokenUtxoKey, TokenUtxoValue)>, ChainError> {
        Ok(token::token_utxos(self.db.as_ref(), id, from, to)?)
    }

    // ────────────────────────────────────────────────────────────────────────
    // VOTING INTENTS
    // ────────────────────────────────────────────────────────────────────────

    /// Ubah intents lalu simpan ke file (kalau ada). Perubahan dibatalkan
    /// kalau `f` gagal.
    pub fn update_intents<F>(&self, f: F) -> Result<(), ChainError>
    where
        F: FnOnce(&mut VotingIntents) -> Result<(), IntentError>,
    {
        let mut intents = self.intents.write();
        let mut next = intents.clone();
        f(&mut next)?;
        if let Some(path) = &self.intents_path {
            next.save(path)?;
            debug!(path = %path.display(), "voting intents saved");
        }
        *intents = next;
        Ok(())
    }

    /// Script vote yang akan dimasukkan staker lokal ke coinstake berikutnya.
    pub fn coinstake_vote_scripts(&self) -> Result<Vec<Vec<u8>>, ChainError> {
        let engine = self.engine.read();
        let intents = self.intents.read();
        Ok(intents.coinstake_scripts(|hash| engine.vote_target(hash))?)
    }
}

impl std::fmt::Debug for DaoChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaoChain")
            .field("tip", &self.tip())
            .field("intents_path", &self.intents_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::engine::GovernanceTx;
    use crate::dao::flags::proposal_version;
    use crate::dao::proposal::ProposalTx;
    use crate::dao::vote_script::{decode_vote, VoteOutput, VoteTarget};
    use crate::dao::VOTE_YES;
    use crate::db::MemoryStore;
    use crate::destination::TxDestination;

    fn memory_chain() -> DaoChain {
        let settings = GovernanceSettings::for_network(Network::Regtest);
        DaoChain::with_store(Arc::new(MemoryStore::new()), settings).expect("empty store loads")
    }

    fn proposal_block(height: u32) -> ConnectedBlock {
        let owner = TxDestination::KeyId(Hash160::from_bytes([0x11; 20]));
        let tx = ProposalTx {
            owner: owner.clone(),
            payment_address: owner,
            amount: 10 * COIN,
            deadline: 10_000,
            description: "node operators fund".to_string(),
            version: proposal_version::BASE,
            fee: 50 * COIN,
        };
        ConnectedBlock::new(height, height * 60, StakerScript::new(vec![1; 8]))
            .with_tx(GovernanceTx::Proposal { txid: Hash256::from_bytes([7; 32]), tx })
    }

    #[test]
    fn test_connect_and_query_through_lock() {
        let chain = memory_chain();
        chain.connect_block(&ConnectedBlock::new(0, 0, StakerScript::new(vec![1; 8]))).expect("genesis");
        chain.connect_block(&proposal_block(1)).expect("proposal block");

        assert_eq!(chain.tip(), Some(1));
        assert_eq!(chain.engine().state().proposals.len(), 1);
        assert_eq!(chain.consensus_parameter(ConsensusParamsPos::VotingCycleLength), 20);
        assert_eq!(chain.consensus_parameters().len(), crate::consensus_params::MAX_CONSENSUS_PARAMS);
    }

    #[test]
    fn test_intents_feed_coinstake_scripts() {
        let chain = memory_chain();
        chain.connect_block(&ConnectedBlock::new(0, 0, StakerScript::new(vec![1; 8]))).expect("genesis");
        chain.connect_block(&proposal_block(1)).expect("proposal block");

        let hash = Hash256::from_bytes([7; 32]);
        chain.update_intents(|i| i.proposal_vote(hash, VOTE_YES)).expect("vote");
        // nilai yang sama ditolak dan intents tidak berubah
        assert!(chain.update_intents(|i| i.proposal_vote(hash, VOTE_YES)).is_err());
        assert_eq!(chain.intents.read().vote(&hash), Some(VOTE_YES));

        let scripts = chain.coinstake_vote_scripts().expect("scripts");
        assert_eq!(scripts.len(), 1);
        match decode_vote(&scripts[0]).expect("decodes") {
            VoteOutput::Vote { target, hash: voted, value } => {
                assert_eq!(target, VoteTarget::Proposal);
                assert_eq!(voted, hash);
                assert_eq!(value, VOTE_YES);
            }
            other => panic!("unexpected output {:?}", other),
        }

        // script coinstake kembali masuk lewat block berikutnya
        let staker = StakerScript::new(vec![1; 8]);
        let block = ConnectedBlock::new(2, 120, staker.clone())
            .with_vote_scripts(scripts.iter().map(Vec::as_slice))
            .expect("governance scripts");
        chain.connect_block(&block).expect("vote block");
        let engine = chain.engine();
        let votes = engine.staker_votes(&staker).expect("staker voted");
        assert_eq!(votes[&2][&hash], VOTE_YES);
    }

    #[test]
    fn test_open_with_config_uses_lmdb() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config {
            data_dir: Some(dir.path().join("db").display().to_string()),
            map_size: Some(16 * 1024 * 1024),
            network: Some("regtest".to_string()),
            intents_file: Some(dir.path().join("intents.json").display().to_string()),
            ..Config::default()
        };
        let chain = DaoChain::open(&cfg).expect("open");
        assert_eq!(chain.tip(), None);
        chain.connect_block(&ConnectedBlock::new(0, 0, StakerScript::new(vec![1; 8]))).expect("genesis");
        chain.update_intents(|i| i.support(Hash256::from_bytes([3; 32]))).expect("support");
        drop(chain);

        let reopened = DaoChain::open(&cfg).expect("reopen");
        assert_eq!(reopened.tip(), Some(0));
        assert!(reopened.intents.read().is_supported(&Hash256::from_bytes([3; 32])));
    }
}
