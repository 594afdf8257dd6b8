//! # Consultation
//!
//! ## Lifecycle
//!
//! ```text
//! NIL (support) ──supported──► REFLECTION ──reflection length──► ACCEPTED (voting)
//!   │                                                              │
//!   └─ no support after MAX_SUPPORT_CYCLES ─► EXPIRED               ├─ quorum + MIN_CYCLES ─► PASSED
//!                                                                  └─ MAX_VOTING_CYCLES ───► EXPIRED
//! ```
//!
//! Tiga jenis:
//! - **Answers**: answer teks, pemenang = plurality.
//! - **Range**: staker vote angka di `[min, max]`, hasil = weighted lower median.
//! - **ConsensusParameter**: answer berisi nilai parameter; yang PASSED masuk
//!   overlay `ConsensusParams`. Versi SUPER mengubah beberapa id sekaligus.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::consensus_params::{ConsensusParamsPos, ParamError};
use crate::dao::answer::AnswerValue;
use crate::dao::flags::{consultation_version, ConsultationFlags, DaoState, FlagError};
use crate::dao::state_history::StateHistory;
use crate::dao::{cycles_since, remove_cycle_at, CycleRecord, DaoError};
use crate::types::{Amount, Hash256};

pub const MAX_QUESTION_LEN: usize = 1024;
pub const MAX_ANSWERS: u32 = 16;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsultationKind {
    Answers { max_answers: u32 },
    Range { min: i64, max: i64 },
    ConsensusParameter { ids: Vec<ConsensusParamsPos> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultationTx {
    pub question: String,
    pub kind: ConsultationKind,
    /// Answer yang dibawa langsung oleh tx ini.
    pub initial_answers: Vec<AnswerValue>,
    pub version: u64,
    pub fee: Amount,
}

impl ConsultationTx {
    /// `proposeconsensuschange`: satu parameter, answer pertama = nilai usulan.
    pub fn consensus_change(id: ConsensusParamsPos, display: i64, fee: Amount) -> Result<Self, ParamError> {
        id.validate_display_value(display)?;
        Ok(ConsultationTx {
            question: format!("Consensus change for: {}", id.description()),
            kind: ConsultationKind::ConsensusParameter { ids: vec![id] },
            initial_answers: vec![AnswerValue::Number(id.to_stored_value(display))],
            version: consultation_version::BASE
                | consultation_version::MORE_ANSWERS
                | consultation_version::CONSENSUS_PARAMETER
                | consultation_version::EXCLUDE,
            fee,
        })
    }

    /// `proposecombinedconsensuschange`: beberapa parameter diubah bersama.
    pub fn combined_consensus_change(values: &[(ConsensusParamsPos, i64)], fee: Amount) -> Result<Self, ParamError> {
        let mut ids = Vec::with_capacity(values.len());
        let mut stored = Vec::with_capacity(values.len());
        for (id, display) in values {
            id.validate_display_value(*display)?;
            ids.push(*id);
            stored.push(id.to_stored_value(*display));
        }
        let descriptions: Vec<&str> = ids.iter().map(|id| id.description()).collect();
        Ok(ConsultationTx {
            question: format!("Consensus change for: {}", descriptions.join(", ")),
            kind: ConsultationKind::ConsensusParameter { ids },
            initial_answers: vec![AnswerValue::Numbers(stored)],
            version: consultation_version::BASE
                | consultation_version::MORE_ANSWERS
                | consultation_version::CONSENSUS_PARAMETER
                | consultation_version::EXCLUDE
                | consultation_version::SUPER,
            fee,
        })
    }

    /// Fee minimum: fee consultation + fee answer per initial answer.
    pub fn min_fee(&self, consultation_fee: Amount, answer_fee: Amount) -> Amount {
        consultation_fee + answer_fee * self.initial_answers.len() as Amount
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consultation {
    pub hash: Hash256,
    pub question: String,
    pub kind: ConsultationKind,
    pub flags: ConsultationFlags,
    pub fee: Amount,
    pub creation_height: u32,
    pub history: StateHistory,
    pub cycles: Vec<CycleRecord>,
}

impl Consultation {
    pub fn from_tx(hash: Hash256, tx: &ConsultationTx, height: u32) -> Result<Self, FlagError> {
        Ok(Consultation {
            hash,
            question: tx.question.clone(),
            kind: tx.kind.clone(),
            flags: ConsultationFlags::decode(tx.version)?,
            fee: tx.fee,
            creation_height: height,
            history: StateHistory::new(height, DaoState::Nil),
            cycles: Vec::new(),
        })
    }

    pub fn state_at(&self, tip: u32) -> DaoState {
        self.history.state_at(tip)
    }

    pub fn is_range(&self) -> bool {
        matches!(self.kind, ConsultationKind::Range { .. })
    }

    pub fn consensus_ids(&self) -> &[ConsensusParamsPos] {
        match &self.kind {
            ConsultationKind::ConsensusParameter { ids } => ids,
            _ => &[],
        }
    }

    /// `CanHaveNewAnswers`: MORE_ANSWERS dan masih di support phase.
    pub fn can_have_new_answers(&self, tip: u32) -> bool {
        self.flags.more_answers && self.state_at(tip) == DaoState::Nil
    }

    /// Support phase atau voting phase.
    pub fn is_open(&self, tip: u32) -> bool {
        matches!(self.state_at(tip), DaoState::Nil | DaoState::Reflection | DaoState::Accepted)
    }

    /// Apakah `value` adalah vote yang sah untuk consultation ini.
    pub fn accepts_vote(&self, value: i64) -> bool {
        use crate::dao::vote_cache::{VOTE_ABSTAIN, VOTE_REMOVE, VOTE_YES};
        if value == VOTE_ABSTAIN || value == VOTE_REMOVE {
            return true;
        }
        match self.kind {
            // 1 = support selama support phase
            ConsultationKind::Range { min, max } => value == VOTE_YES || (min..=max).contains(&value),
            _ => false,
        }
    }

    /// Minimum answer yang harus SUPPORTED sebelum masuk reflection.
    pub fn min_supported_answers(&self) -> usize {
        match self.kind {
            ConsultationKind::Answers { .. } => 2,
            ConsultationKind::ConsensusParameter { .. } => 1,
            ConsultationKind::Range { .. } => 0,
        }
    }

    pub fn completed_cycles(&self, tip: u32) -> usize {
        cycles_since(&self.cycles, self.history.state_since(tip))
    }

    /// Hasil range consultation: median dari cycle yang membuatnya PASSED.
    pub fn range_result(&self, tip: u32) -> Option<i64> {
        let ConsultationKind::Range { min, max } = self.kind else { return None };
        if self.state_at(tip) != DaoState::Passed {
            return None;
        }
        let passed_at = self.history.state_since(tip)?;
        let record = self.cycles.iter().find(|c| c.height == passed_at)?;
        lower_median(&record.tally.values, min, max)
    }

    pub fn push_state(&mut self, height: u32, state: DaoState) -> Result<(), DaoError> {
        self.history.push(height, state)
    }

    pub fn remove_at(&mut self, height: u32) -> bool {
        let state = self.history.remove_at(height);
        let cycle = remove_cycle_at(&mut self.cycles, height);
        state || cycle
    }
}

/// Weighted lower median dari histogram nilai di `[min, max]`.
pub fn lower_median(values: &BTreeMap<i64, u64>, min: i64, max: i64) -> Option<i64> {
    let in_range = || values.range(min..=max).filter(|(_, w)| **w > 0);
    let total: u64 = in_range().map(|(_, w)| *w).sum();
    if total == 0 {
        return None;
    }
    let mut acc = 0u64;
    for (value, weight) in in_range() {
        acc += weight;
        if acc * 2 >= total {
            return Some(*value);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::vote_cache::Tally;
    use crate::types::COIN;

    #[test]
    fn consensus_change_builder() {
        let tx = ConsultationTx::consensus_change(ConsensusParamsPos::ProposalMaxVotingCycles, 5, 15 * COIN)
            .expect("valid");
        assert_eq!(tx.question, "Consensus change for: Maximum of voting cycles for fund proposal votings");
        assert_eq!(tx.initial_answers, vec![AnswerValue::Number(4)]);
        let flags = ConsultationFlags::decode(tx.version).expect("flags");
        assert!(flags.consensus_parameter && flags.more_answers && !flags.super_version);
        assert_eq!(tx.min_fee(10 * COIN, 5 * COIN), 15 * COIN);

        assert!(ConsultationTx::consensus_change(ConsensusParamsPos::ConfidentialTokensEnabled, 3, COIN).is_err());
    }

    #[test]
    fn combined_change_is_super() {
        let values = [(ConsensusParamsPos::ProposalMinAccept, 6_000), (ConsensusParamsPos::ProposalMinReject, 6_000)];
        let tx = ConsultationTx::combined_consensus_change(&values, COIN).expect("valid");
        assert!(ConsultationFlags::decode(tx.version).expect("flags").super_version);
        assert_eq!(tx.initial_answers, vec![AnswerValue::Numbers(vec![6_000, 6_000])]);
    }

    #[test]
    fn range_votes_and_median() {
        let tx = ConsultationTx {
            question: "block size?".to_string(),
            kind: ConsultationKind::Range { min: 100, max: 1_000 },
            initial_answers: Vec::new(),
            version: consultation_version::BASE | consultation_version::ANSWER_IS_A_RANGE,
            fee: COIN,
        };
        let mut c = Consultation::from_tx(Hash256::from_bytes([1; 32]), &tx, 5).expect("flags");
        assert!(c.accepts_vote(500));
        assert!(c.accepts_vote(1));
        assert!(!c.accepts_vote(1_001));
        assert!(!c.can_have_new_answers(5));

        let mut values = BTreeMap::new();
        values.insert(200, 30);
        values.insert(500, 30);
        values.insert(900, 40);
        // out of range votes never count
        values.insert(5_000, 1_000);
        let tally = Tally { values, ..Tally::default() };
        c.cycles.push(CycleRecord { height: 100, tally });
        c.push_state(100, DaoState::Passed).expect("push");
        assert_eq!(c.range_result(100), Some(500));
        assert_eq!(c.range_result(99), None);
    }

    #[test]
    fn lower_median_picks_lower_on_even_split() {
        let mut values = BTreeMap::new();
        values.insert(10, 50);
        values.insert(20, 50);
        assert_eq!(lower_median(&values, 0, 100), Some(10));
        assert_eq!(lower_median(&BTreeMap::new(), 0, 100), None);
    }
}
