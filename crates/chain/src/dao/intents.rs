//! Vote lokal operator node (`mapAddedVotes` / `mapSupported`).
//!
//! Bukan bagian dari state konsensus. Dibaca saat node membuat coinstake:
//! entry yang masih bisa di-vote di-encode menjadi vote output.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::dao::engine::GovernanceState;
use crate::dao::flags::DaoState;
use crate::dao::vote_cache::{VOTE_ABSTAIN, VOTE_NO, VOTE_REMOVE, VOTE_YES};
use crate::dao::vote_script::{encode_vote, VoteScriptError, VoteTarget};
use crate::types::Hash256;

#[derive(Debug, Error)]
pub enum IntentError {
    #[error("{0} is already in the list with the same value")]
    AlreadyInList(Hash256),

    #[error("{0} is not in the list")]
    NotInList(Hash256),

    #[error("vote value {0} is not allowed here")]
    InvalidValue(i64),

    #[error("intents file io: {0}")]
    Io(#[from] std::io::Error),

    #[error("intents file json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Hasil `proposalvotelist` / `paymentrequestvotelist`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VoteList {
    pub yes: Vec<Hash256>,
    pub no: Vec<Hash256>,
    #[serde(rename = "abs")]
    pub abstain: Vec<Hash256>,
    pub null: Vec<Hash256>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingIntents {
    added_votes: BTreeMap<Hash256, i64>,
    supported: BTreeSet<Hash256>,
}

impl VotingIntents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load dari file JSON. File yang belum ada = store kosong.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IntentError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IntentError> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }

    pub fn vote(&self, hash: &Hash256) -> Option<i64> {
        self.added_votes.get(hash).copied()
    }

    pub fn is_supported(&self, hash: &Hash256) -> bool {
        self.supported.contains(hash)
    }

    pub fn supported(&self) -> &BTreeSet<Hash256> {
        &self.supported
    }

    /// `proposalvote <hash> yes|no|abs`
    pub fn proposal_vote(&mut self, hash: Hash256, value: i64) -> Result<(), IntentError> {
        if !matches!(value, VOTE_YES | VOTE_NO | VOTE_ABSTAIN) {
            return Err(IntentError::InvalidValue(value));
        }
        self.set_vote(hash, value)
    }

    /// `paymentrequestvote <hash> yes|no|abs`
    pub fn payment_request_vote(&mut self, hash: Hash256, value: i64) -> Result<(), IntentError> {
        self.proposal_vote(hash, value)
    }

    /// `consultationvote <hash> value|abs`: nilai range, atau abstain.
    pub fn consultation_vote(&mut self, hash: Hash256, value: i64) -> Result<(), IntentError> {
        if value < VOTE_ABSTAIN {
            return Err(IntentError::InvalidValue(value));
        }
        self.set_vote(hash, value)
    }

    /// `support <hash>`
    pub fn support(&mut self, hash: Hash256) -> Result<(), IntentError> {
        if !self.supported.insert(hash) {
            return Err(IntentError::AlreadyInList(hash));
        }
        debug!(object = %hash, "support intent added");
        Ok(())
    }

    /// `support <hash> false`
    pub fn remove_support(&mut self, hash: &Hash256) -> Result<(), IntentError> {
        if !self.supported.remove(hash) {
            return Err(IntentError::NotInList(*hash));
        }
        Ok(())
    }

    /// `proposalvote <hash> remove` dan sejenisnya.
    pub fn remove(&mut self, hash: &Hash256) -> Result<(), IntentError> {
        match self.added_votes.remove(hash) {
            Some(_) => {
                debug!(object = %hash, "vote intent removed");
                Ok(())
            }
            None => Err(IntentError::NotInList(*hash)),
        }
    }

    fn set_vote(&mut self, hash: Hash256, value: i64) -> Result<(), IntentError> {
        // Nilai berbeda menimpa nilai lama
        if self.added_votes.insert(hash, value) == Some(value) {
            return Err(IntentError::AlreadyInList(hash));
        }
        debug!(object = %hash, value, "vote intent set");
        Ok(())
    }

    /// Kelompokkan proposal yang masih NIL menurut vote lokal.
    pub fn proposal_vote_list(&self, state: &GovernanceState, tip: u32) -> VoteList {
        let pending = state
            .proposals
            .values()
            .filter(|p| p.state_at(tip) == DaoState::Nil)
            .map(|p| p.hash);
        self.vote_list(pending)
    }

    pub fn payment_request_vote_list(&self, state: &GovernanceState, tip: u32) -> VoteList {
        let pending = state
            .payment_requests
            .values()
            .filter(|pr| pr.state_at(tip) == DaoState::Nil)
            .map(|pr| pr.hash);
        self.vote_list(pending)
    }

    pub fn vote_list(&self, candidates: impl IntoIterator<Item = Hash256>) -> VoteList {
        let mut list = VoteList::default();
        for hash in candidates {
            match self.vote(&hash) {
                Some(VOTE_YES) => list.yes.push(hash),
                Some(VOTE_NO) => list.no.push(hash),
                Some(VOTE_ABSTAIN) => list.abstain.push(hash),
                _ => list.null.push(hash),
            }
        }
        list
    }

    /// Entry yang akan masuk coinstake: hanya object yang saat ini bisa di-vote
    /// dengan nilai yang cocok untuk target-nya.
    pub fn coinstake_votes<F>(&self, target_of: F) -> Vec<(VoteTarget, Hash256, i64)>
    where
        F: Fn(&Hash256) -> Option<VoteTarget>,
    {
        let mut out = Vec::new();
        for (hash, value) in &self.added_votes {
            let Some(target) = target_of(hash) else { continue };
            if fits(target, *value) {
                out.push((target, *hash, *value));
            }
        }
        for hash in &self.supported {
            if target_of(hash) == Some(VoteTarget::Support) && !self.added_votes.contains_key(hash) {
                out.push((VoteTarget::Support, *hash, VOTE_YES));
            }
        }
        out
    }

    pub fn coinstake_scripts<F>(&self, target_of: F) -> Result<Vec<Vec<u8>>, VoteScriptError>
    where
        F: Fn(&Hash256) -> Option<VoteTarget>,
    {
        self.coinstake_votes(target_of)
            .into_iter()
            .map(|(target, hash, value)| encode_vote(target, &hash, value))
            .collect()
    }
}

fn fits(target: VoteTarget, value: i64) -> bool {
    if value == VOTE_REMOVE {
        return false;
    }
    match target {
        VoteTarget::Proposal | VoteTarget::PaymentRequest => matches!(value, VOTE_YES | VOTE_NO | VOTE_ABSTAIN),
        VoteTarget::Support => value == VOTE_YES,
        VoteTarget::Consultation => value == VOTE_ABSTAIN || value >= 0,
    }
}
