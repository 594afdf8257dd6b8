//! Consultation answer.
//!
//! Nilai answer consensus-parameter disimpan sebagai **stored value** (decrement
//! rule sudah diterapkan). `display_values` membalik aturan itu untuk dibaca.

use serde::{Deserialize, Serialize};

use crate::consensus_params::{ConsensusParamsPos, ParamError};
use crate::dao::flags::{answer_version, AnswerFlags, DaoState, FlagError};
use crate::dao::state_history::StateHistory;
use crate::dao::{cycles_since, remove_cycle_at, CycleRecord, DaoError};
use crate::types::{Amount, Hash256};

pub const MAX_ANSWER_TEXT_LEN: usize = 255;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerValue {
    Text(String),
    /// Satu parameter konsensus (stored value).
    Number(i64),
    /// Combined consensus change: satu stored value per id consultation.
    Numbers(Vec<i64>),
}

impl AnswerValue {
    /// Stored values in parameter order; empty for text answers.
    pub fn numbers(&self) -> Vec<i64> {
        match self {
            AnswerValue::Text(_) => Vec::new(),
            AnswerValue::Number(v) => vec![*v],
            AnswerValue::Numbers(vs) => vs.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerTx {
    pub parent: Hash256,
    pub value: AnswerValue,
    pub version: u64,
    pub fee: Amount,
}

impl AnswerTx {
    pub fn text(parent: Hash256, text: impl Into<String>, fee: Amount) -> Self {
        AnswerTx {
            parent,
            value: AnswerValue::Text(text.into()),
            version: answer_version::BASE | answer_version::EXCLUDE,
            fee,
        }
    }

    /// Answer untuk consultation consensus-change satu parameter.
    pub fn consensus_value(parent: Hash256, id: ConsensusParamsPos, display: i64, fee: Amount) -> Result<Self, ParamError> {
        id.validate_display_value(display)?;
        Ok(AnswerTx {
            parent,
            value: AnswerValue::Number(id.to_stored_value(display)),
            version: answer_version::BASE | answer_version::EXCLUDE,
            fee,
        })
    }

    /// Answer untuk combined consensus change, urutan sama dengan id consultation.
    pub fn consensus_values(parent: Hash256, values: &[(ConsensusParamsPos, i64)], fee: Amount) -> Result<Self, ParamError> {
        let mut stored = Vec::with_capacity(values.len());
        for (id, display) in values {
            id.validate_display_value(*display)?;
            stored.push(id.to_stored_value(*display));
        }
        Ok(AnswerTx {
            parent,
            value: AnswerValue::Numbers(stored),
            version: answer_version::BASE | answer_version::EXCLUDE | answer_version::SUPER,
            fee,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultationAnswer {
    pub hash: Hash256,
    pub parent: Hash256,
    pub value: AnswerValue,
    pub flags: AnswerFlags,
    pub fee: Amount,
    pub creation_height: u32,
    pub history: StateHistory,
    pub cycles: Vec<CycleRecord>,
}

impl ConsultationAnswer {
    pub fn from_tx(hash: Hash256, tx: &AnswerTx, height: u32) -> Result<Self, FlagError> {
        Ok(ConsultationAnswer {
            hash,
            parent: tx.parent,
            value: tx.value.clone(),
            flags: AnswerFlags::decode(tx.version)?,
            fee: tx.fee,
            creation_height: height,
            history: StateHistory::new(height, DaoState::Nil),
            cycles: Vec::new(),
        })
    }

    /// Hash answer awal yang dibawa langsung oleh tx consultation.
    pub fn initial_hash(consultation: &Hash256, index: u32) -> Hash256 {
        let mut buf = Vec::with_capacity(36);
        buf.extend_from_slice(consultation.as_bytes());
        buf.extend_from_slice(&index.to_le_bytes());
        Hash256::digest(&buf)
    }

    pub fn state_at(&self, tip: u32) -> DaoState {
        self.history.state_at(tip)
    }

    pub fn is_supported(&self, tip: u32) -> bool {
        matches!(self.state_at(tip), DaoState::Supported | DaoState::Passed)
    }

    pub fn completed_cycles(&self, tip: u32) -> usize {
        cycles_since(&self.cycles, self.history.state_since(tip))
    }

    /// Display values per parameter id (decrement rule dibalik).
    pub fn display_values(&self, ids: &[ConsensusParamsPos]) -> Vec<(ConsensusParamsPos, i64)> {
        ids.iter()
            .zip(self.value.numbers())
            .map(|(id, stored)| (*id, id.to_display_value(stored)))
            .collect()
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::COIN;

    #[test]
    fn consensus_value_is_stored_decremented() {
        let parent = Hash256::from_bytes([3; 32]);
        let tx = AnswerTx::consensus_value(parent, ConsensusParamsPos::ProposalMaxVotingCycles, 5, 5 * COIN)
            .expect("valid");
        assert_eq!(tx.value, AnswerValue::Number(4));

        let answer = ConsultationAnswer::from_tx(Hash256::from_bytes([4; 32]), &tx, 10).expect("flags");
        assert_eq!(
            answer.display_values(&[ConsensusParamsPos::ProposalMaxVotingCycles]),
            vec![(ConsensusParamsPos::ProposalMaxVotingCycles, 5)]
        );
    }

    #[test]
    fn combined_values_keep_order() {
        let parent = Hash256::from_bytes([3; 32]);
        let values = [
            (ConsensusParamsPos::ProposalMinQuorum, 6_000),
            (ConsensusParamsPos::PaymentRequestMaxVotingCycles, 10),
        ];
        let tx = AnswerTx::consensus_values(parent, &values, COIN).expect("valid");
        assert_eq!(tx.value, AnswerValue::Numbers(vec![6_000, 9]));
        assert!(AnswerFlags::decode(tx.version).expect("flags").super_version);

        let bad = [(ConsensusParamsPos::ProposalMinQuorum, 20_000)];
        assert!(AnswerTx::consensus_values(parent, &bad, COIN).is_err());
    }

    #[test]
    fn initial_hashes_are_distinct_per_index() {
        let c = Hash256::from_bytes([8; 32]);
        assert_ne!(ConsultationAnswer::initial_hash(&c, 0), ConsultationAnswer::initial_hash(&c, 1));
        assert_ne!(ConsultationAnswer::initial_hash(&c, 0), c);
    }
}
