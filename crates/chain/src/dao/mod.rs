//! # DAO Governance Core
//!
//! State machine governance on-chain: proposal, payment request, consultation
//! dan consultation answer, plus voting parameter konsensus.
//!
//! ## Alur Per Block
//!
//! ```text
//! connect_block(h)
//!   ├─ admission   : validasi tx governance + vote (invalid => block ditolak)
//!   ├─ objects     : object baru masuk dengan state NIL di height h
//!   ├─ vote_cache  : vote staker dicatat di (staker, h)
//!   ├─ boundary?   : h % VOTING_CYCLE_LENGTH == 0
//!   │     └─ tally window (h - len, h], transisi state di height h
//!   └─ WriteBatch  : satu batch atomik per block
//! ```
//!
//! `disconnect_block(h)` menghapus persis entry yang ditulis di height `h`
//! (state history, cycle record, vote, overlay parameter). Tidak ada
//! recompute dari awal.
//!
//! ## Module
//!
//! | Module | Fungsi |
//! |--------|--------|
//! | `flags` | `DaoState` + decode bitmask version |
//! | `state_history` | (height, state) per object, binary search |
//! | `proposal` / `payment_request` / `consultation` / `answer` | Entity governance |
//! | `vote_cache` | `VoteCache`, `Tally`, stake weight, threshold |
//! | `vote_script` | Encoding vote output coinstake / light wallet |
//! | `admission` | Validasi struktural tx dan vote |
//! | `engine` | `GovernanceEngine` |
//! | `intents` | Vote lokal operator node |

pub mod admission;
pub mod answer;
pub mod consultation;
pub mod engine;
pub mod flags;
pub mod intents;
pub mod payment_request;
pub mod proposal;
pub mod state_history;
pub mod vote_cache;
pub mod vote_script;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consensus_params::ParamError;
use crate::db::StoreError;

pub use admission::AdmissionError;
pub use engine::{ConnectedBlock, GovernanceEngine, GovernanceSettings, GovernanceTx, ProposalFilter, StakerVotes};
pub use flags::{DaoState, FlagError};
pub use vote_cache::{Tally, VoteCache, VOTE_ABSTAIN, VOTE_NO, VOTE_REMOVE, VOTE_YES};

#[derive(Debug, Error)]
pub enum DaoError {
    #[error("state history out of order: last entry at {last}, new entry at {height}")]
    HistoryOrder { last: u32, height: u32 },

    #[error("block out of order: expected height {expected}, got {got}")]
    OutOfOrder { expected: u32, got: u32 },

    #[error("not found: {0}")]
    NotFound(String),

    /// Driver reorg memanggil disconnect yang tidak punya pasangan connect.
    /// Caller wajib abort.
    #[error("reorg inconsistency: {0}")]
    ReorgInconsistency(String),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Param(#[from] ParamError),

    #[error(transparent)]
    Flag(#[from] FlagError),
}

impl DaoError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, DaoError::ReorgInconsistency(_) | DaoError::HistoryOrder { .. } | DaoError::Store(_))
    }
}

/// Hasil tally satu cycle yang sudah dievaluasi untuk satu object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecord {
    /// Boundary height tempat cycle ini ditutup.
    pub height: u32,
    pub tally: Tally,
}

/// Jumlah cycle yang selesai sejak `since` (exclusive).
pub(crate) fn cycles_since(cycles: &[CycleRecord], since: Option<u32>) -> usize {
    match since {
        Some(since) => cycles.iter().filter(|c| c.height > since).count(),
        None => cycles.len(),
    }
}

/// Hapus cycle record yang ditulis di `height`.
pub(crate) fn remove_cycle_at(cycles: &mut Vec<CycleRecord>, height: u32) -> bool {
    let before = cycles.len();
    cycles.retain(|c| c.height != height);
    cycles.len() != before
}
