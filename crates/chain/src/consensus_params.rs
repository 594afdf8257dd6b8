//! # Consensus Parameter Table
//!
//! Tabel parameter protokol yang bisa diubah lewat consultation DAO.
//!
//! ## Resolusi Nilai
//!
//! ```text
//! effective(id, tip) = overlay entry terakhir untuk id dengan height <= tip
//!                      (dikembalikan dalam display value)
//!                    | compiled default per network
//! ```
//!
//! ## Decrement Rule (CONSENSUS-CRITICAL)
//!
//! `PROPOSAL_MAX_VOTING_CYCLES` dan `PAYMENT_REQUEST_MAX_VOTING_CYCLES` disimpan
//! sebagai `display - 1` di answer consultation dan di overlay, lalu ditambah 1
//! saat dibaca. Aturan ini harus simetris di jalur propose dan jalur baca;
//! mengubahnya berarti fork terhadap chain history yang sudah ada.
//!
//! Percent dinyatakan dalam basis point (10000 = 100%).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::types::{Amount, Hash256, Network, COIN};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("consensus parameter id {0} out of range (max {max})", max = MAX_CONSENSUS_PARAMS)]
    OutOfRange(u32),

    #[error("unknown consensus parameter name: {0}")]
    UnknownName(String),

    #[error("invalid value {value} for {param}: {reason}")]
    InvalidValue { param: ConsensusParamsPos, value: i64, reason: &'static str },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    Number,
    Percent,
    Amount,
    Bool,
    BlockHeight,
    CycleCount,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamType::Number => "number",
            ParamType::Percent => "percent",
            ParamType::Amount => "amount",
            ParamType::Bool => "bool",
            ParamType::BlockHeight => "block",
            ParamType::CycleCount => "cycle",
        };
        f.write_str(s)
    }
}

pub const MAX_CONSENSUS_PARAMS: usize = 28;

/// Ordinal id parameter. Urutan enum = urutan id on-chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ConsensusParamsPos {
    VotingCycleLength = 0,
    ConsultationMinSupport,
    ConsultationAnswerMinSupport,
    ConsultationMinCycles,
    ConsultationMaxVotingCycles,
    ConsultationMaxSupportCycles,
    ConsultationReflectionLength,
    ConsultationMinFee,
    ConsultationAnswerMinFee,
    ProposalMinQuorum,
    ProposalMinAccept,
    ProposalMinReject,
    ProposalMinFee,
    ProposalMaxVotingCycles,
    PaymentRequestMinQuorum,
    PaymentRequestMinAccept,
    PaymentRequestMinReject,
    PaymentRequestMinFee,
    PaymentRequestMaxVotingCycles,
    FundSpreadAccumulation,
    FundPercentPerBlock,
    GenerationPerBlock,
    StocknsFee,
    DaoVoteLightMinFee,
    ConfidentialTokensEnabled,
    DotstockLength,
    DotstockMaxdata,
    DotstockFeeExtradata,
}

use ConsensusParamsPos as P;

/// (id, machine name, type, description)
const TABLE: [(ConsensusParamsPos, &str, ParamType, &str); MAX_CONSENSUS_PARAMS] = [
    (P::VotingCycleLength, "VOTING_CYCLE_LENGTH", ParamType::BlockHeight, "Length in blocks of a voting cycle"),
    (P::ConsultationMinSupport, "CONSULTATION_MIN_SUPPORT", ParamType::Percent, "Minimum of support needed for starting a range consultation"),
    (P::ConsultationAnswerMinSupport, "CONSULTATION_ANSWER_MIN_SUPPORT", ParamType::Percent, "Minimum of support needed for a consultation answer proposal"),
    (P::ConsultationMinCycles, "CONSULTATION_MIN_CYCLES", ParamType::CycleCount, "Earliest cycle when a consultation can get in confirmation phase"),
    (P::ConsultationMaxVotingCycles, "CONSULTATION_MAX_VOTING_CYCLES", ParamType::CycleCount, "Length in cycles for consultation votings"),
    (P::ConsultationMaxSupportCycles, "CONSULTATION_MAX_SUPPORT_CYCLES", ParamType::CycleCount, "Maximum of voting cycles for a consultation to gain support"),
    (P::ConsultationReflectionLength, "CONSULTATION_REFLECTION_LENGTH", ParamType::CycleCount, "Length in cycles for the reflection phase of consultations"),
    (P::ConsultationMinFee, "CONSULTATION_MIN_FEE", ParamType::Amount, "Minimum fee to submit a consultation"),
    (P::ConsultationAnswerMinFee, "CONSULTATION_ANSWER_MIN_FEE", ParamType::Amount, "Minimum fee to submit a consultation answer proposal"),
    (P::ProposalMinQuorum, "PROPOSAL_MIN_QUORUM", ParamType::Percent, "Minimum of quorum for fund proposal votings"),
    (P::ProposalMinAccept, "PROPOSAL_MIN_ACCEPT", ParamType::Percent, "Minimum of positive votes for a fund proposal to be accepted"),
    (P::ProposalMinReject, "PROPOSAL_MIN_REJECT", ParamType::Percent, "Minimum of negative votes for a fund proposal to be rejected"),
    (P::ProposalMinFee, "PROPOSAL_MIN_FEE", ParamType::Amount, "Minimum fee to submit a fund proposal"),
    (P::ProposalMaxVotingCycles, "PROPOSAL_MAX_VOTING_CYCLES", ParamType::CycleCount, "Maximum of voting cycles for fund proposal votings"),
    (P::PaymentRequestMinQuorum, "PAYMENT_REQUEST_MIN_QUORUM", ParamType::Percent, "Minimum of quorum for payment request votings"),
    (P::PaymentRequestMinAccept, "PAYMENT_REQUEST_MIN_ACCEPT", ParamType::Percent, "Minimum of positive votes for a payment request to be accepted"),
    (P::PaymentRequestMinReject, "PAYMENT_REQUEST_MIN_REJECT", ParamType::Percent, "Minimum of negative votes for a payment request to be rejected"),
    (P::PaymentRequestMinFee, "PAYMENT_REQUEST_MIN_FEE", ParamType::Amount, "Minimum fee to submit a payment request"),
    (P::PaymentRequestMaxVotingCycles, "PAYMENT_REQUEST_MAX_VOTING_CYCLES", ParamType::CycleCount, "Maximum of voting cycles for payment request votings"),
    (P::FundSpreadAccumulation, "FUND_SPREAD_ACCUMULATION", ParamType::Number, "Frequency of the fund accumulation transaction"),
    (P::FundPercentPerBlock, "FUND_PERCENT_PER_BLOCK", ParamType::Percent, "Percentage of generated 0DYNS going to the Fund"),
    (P::GenerationPerBlock, "GENERATION_PER_BLOCK", ParamType::Amount, "Amount of 0DYNS generated per block"),
    (P::StocknsFee, "STOCKNS_FEE", ParamType::Amount, "Fee for registering a name in DotSTOCK"),
    (P::DaoVoteLightMinFee, "DAO_VOTE_LIGHT_MIN_FEE", ParamType::Amount, "Minimum fee as a fund contribution to submit a DAO vote using a light wallet"),
    (P::ConfidentialTokensEnabled, "CONFIDENTIAL_TOKENS_ENABLED", ParamType::Bool, "Confidential tokens enabled"),
    (P::DotstockLength, "DOTSTOCK_LENGTH", ParamType::Number, "Length in blocks of a dotSTOCK registration"),
    (P::DotstockMaxdata, "DOTSTOCK_MAXDATA", ParamType::Number, "Max data in bytes attached to a dotSTOCK name without cost"),
    (P::DotstockFeeExtradata, "DOTSTOCK_FEE_EXTRADATA", ParamType::Amount, "Fee for attaching extra data to a name"),
];

impl ConsensusParamsPos {
    pub fn all() -> impl Iterator<Item = ConsensusParamsPos> {
        TABLE.iter().map(|(id, _, _, _)| *id)
    }

    pub fn from_index(id: u32) -> Result<Self, ParamError> {
        TABLE
            .get(id as usize)
            .map(|(pos, _, _, _)| *pos)
            .ok_or(ParamError::OutOfRange(id))
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        TABLE[self.index()].1
    }

    pub fn param_type(self) -> ParamType {
        TABLE[self.index()].2
    }

    pub fn description(self) -> &'static str {
        TABLE[self.index()].3
    }

    /// Parameter yang disimpan sebagai `display - 1`.
    pub fn is_decremented(self) -> bool {
        matches!(self, P::ProposalMaxVotingCycles | P::PaymentRequestMaxVotingCycles)
    }

    /// Display value -> value stored in answers and in the overlay.
    pub fn to_stored_value(self, display: i64) -> i64 {
        if self.is_decremented() { display - 1 } else { display }
    }

    /// Stored value -> display value returned to callers.
    pub fn to_display_value(self, stored: i64) -> i64 {
        if self.is_decremented() { stored + 1 } else { stored }
    }

    /// Range check terhadap display value sesuai type parameter.
    pub fn validate_display_value(self, value: i64) -> Result<(), ParamError> {
        let reason = match self.param_type() {
            ParamType::Bool if value != 0 && value != 1 => Some("bool must be 0 or 1"),
            ParamType::Percent if !(0..=10_000).contains(&value) => Some("percent must be within 0..=10000"),
            ParamType::BlockHeight | ParamType::CycleCount if value < 1 => Some("must be at least 1"),
            _ if value < 0 => Some("must not be negative"),
            _ => None,
        };
        match reason {
            Some(reason) => Err(ParamError::InvalidValue { param: self, value, reason }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for ConsensusParamsPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConsensusParamsPos {
    type Err = ParamError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix("CONSENSUS_PARAM_").unwrap_or(s);
        TABLE
            .iter()
            .find(|(_, n, _, _)| *n == name)
            .map(|(id, _, _, _)| *id)
            .ok_or_else(|| ParamError::UnknownName(s.to_string()))
    }
}

// ════════════════════════════════════════════════════════════════════════════
// COMPILED DEFAULTS
// ════════════════════════════════════════════════════════════════════════════

/// Compiled-in defaults (display values), optionally overridden by config.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsensusDefaults {
    values: [i64; MAX_CONSENSUS_PARAMS],
}

impl ConsensusDefaults {
    pub fn for_network(network: Network) -> Self {
        let (cycle_len, light_fee, tokens, dotstock_len) = match network {
            Network::Main => (20_160, COIN / 10, 0, 1_051_200),
            Network::Test => (1_440, COIN / 10, 1, 10_080),
            Network::Regtest => (20, COIN / 10, 1, 100),
        };
        let values = [
            cycle_len,        // VOTING_CYCLE_LENGTH
            1_500,            // CONSULTATION_MIN_SUPPORT
            500,              // CONSULTATION_ANSWER_MIN_SUPPORT
            2,                // CONSULTATION_MIN_CYCLES
            4,                // CONSULTATION_MAX_VOTING_CYCLES
            4,                // CONSULTATION_MAX_SUPPORT_CYCLES
            1,                // CONSULTATION_REFLECTION_LENGTH
            10 * COIN,        // CONSULTATION_MIN_FEE
            5 * COIN,         // CONSULTATION_ANSWER_MIN_FEE
            5_000,            // PROPOSAL_MIN_QUORUM
            7_000,            // PROPOSAL_MIN_ACCEPT
            7_000,            // PROPOSAL_MIN_REJECT
            50 * COIN,        // PROPOSAL_MIN_FEE
            6,                // PROPOSAL_MAX_VOTING_CYCLES
            5_000,            // PAYMENT_REQUEST_MIN_QUORUM
            7_000,            // PAYMENT_REQUEST_MIN_ACCEPT
            7_000,            // PAYMENT_REQUEST_MIN_REJECT
            COIN / 10_000,    // PAYMENT_REQUEST_MIN_FEE
            8,                // PAYMENT_REQUEST_MAX_VOTING_CYCLES
            500,              // FUND_SPREAD_ACCUMULATION
            1_250,            // FUND_PERCENT_PER_BLOCK
            2 * COIN,         // GENERATION_PER_BLOCK
            10 * COIN,        // STOCKNS_FEE
            light_fee,        // DAO_VOTE_LIGHT_MIN_FEE
            tokens,           // CONFIDENTIAL_TOKENS_ENABLED
            dotstock_len,     // DOTSTOCK_LENGTH
            2_048,            // DOTSTOCK_MAXDATA
            COIN / 10,        // DOTSTOCK_FEE_EXTRADATA
        ];
        ConsensusDefaults { values }
    }

    pub fn get(&self, id: ConsensusParamsPos) -> i64 {
        self.values[id.index()]
    }

    pub fn set(&mut self, id: ConsensusParamsPos, display: i64) -> Result<(), ParamError> {
        id.validate_display_value(display)?;
        self.values[id.index()] = display;
        Ok(())
    }

    /// Apply `NAME = value` overrides from config.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, i64>) -> Result<Self, ParamError> {
        for (name, value) in overrides {
            let id = ConsensusParamsPos::from_str(name)?;
            self.set(id, *value)?;
        }
        Ok(self)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// VOTED OVERLAY
// ════════════════════════════════════════════════════════════════════════════

/// Nilai hasil consultation yang lolos, berlaku mulai `height`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamEntry {
    pub height: u32,
    /// Stored value (decrement rule already applied).
    pub value: i64,
    /// Consultation that produced this value.
    pub source: Hash256,
}

/// Snapshot parameter untuk reporting (`getconsensusparameters`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParamReport {
    pub id: u32,
    pub name: &'static str,
    pub desc: &'static str,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub value: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsensusParams {
    defaults: ConsensusDefaults,
    overlay: BTreeMap<ConsensusParamsPos, Vec<ParamEntry>>,
}

impl ConsensusParams {
    pub fn new(defaults: ConsensusDefaults) -> Self {
        ConsensusParams { defaults, overlay: BTreeMap::new() }
    }

    pub fn defaults(&self) -> &ConsensusDefaults {
        &self.defaults
    }

    /// Default value and type for a raw id. Fails for `id >= MAX_CONSENSUS_PARAMS`.
    pub fn get_default(&self, id: u32) -> Result<(i64, ParamType), ParamError> {
        let pos = ConsensusParamsPos::from_index(id)?;
        Ok((self.defaults.get(pos), pos.param_type()))
    }

    /// Effective display value of `id` as of `tip`.
    pub fn get_consensus_parameter(&self, id: ConsensusParamsPos, tip: u32) -> i64 {
        self.voted_entry(id, tip)
            .map(|e| id.to_display_value(e.value))
            .unwrap_or_else(|| self.defaults.get(id))
    }

    /// Most recent overlay entry at or before `tip`.
    pub fn voted_entry(&self, id: ConsensusParamsPos, tip: u32) -> Option<&ParamEntry> {
        let entries = self.overlay.get(&id)?;
        let idx = entries.partition_point(|e| e.height <= tip);
        idx.checked_sub(1).map(|i| &entries[i])
    }

    /// Append an accepted value. Heights per id must be non-decreasing; an entry
    /// at the same height replaces the previous one (joint super change).
    pub fn push_entry(&mut self, id: ConsensusParamsPos, entry: ParamEntry) {
        let entries = self.overlay.entry(id).or_default();
        if let Some(last) = entries.last() {
            if last.height == entry.height {
                entries.pop();
            }
        }
        entries.push(entry);
    }

    /// Remove overlay entries written at exactly `height`. Returns removed ids.
    pub fn remove_at(&mut self, height: u32) -> Vec<ConsensusParamsPos> {
        let mut removed = Vec::new();
        for (id, entries) in self.overlay.iter_mut() {
            let before = entries.len();
            entries.retain(|e| e.height != height);
            if entries.len() != before {
                removed.push(*id);
            }
        }
        self.overlay.retain(|_, v| !v.is_empty());
        removed
    }

    pub fn entries(&self) -> impl Iterator<Item = (ConsensusParamsPos, &ParamEntry)> {
        self.overlay.iter().flat_map(|(id, v)| v.iter().map(move |e| (*id, e)))
    }

    pub fn report(&self, tip: u32) -> Vec<ParamReport> {
        ConsensusParamsPos::all()
            .map(|id| ParamReport {
                id: id.index() as u32,
                name: id.name(),
                desc: id.description(),
                param_type: id.param_type(),
                value: self.get_consensus_parameter(id, tip),
            })
            .collect()
    }

    /// Convenience for amount-typed parameters.
    pub fn amount(&self, id: ConsensusParamsPos, tip: u32) -> Amount {
        self.get_consensus_parameter(id, tip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_order_matches_ids() {
        for (i, id) in ConsensusParamsPos::all().enumerate() {
            assert_eq!(id.index(), i, "{} out of order", id);
            assert_eq!(ConsensusParamsPos::from_index(i as u32).expect("in range"), id);
        }
        assert_eq!(ConsensusParamsPos::all().count(), MAX_CONSENSUS_PARAMS);
        assert_eq!(P::DotstockFeeExtradata.index(), 27);
        assert_eq!(P::ProposalMaxVotingCycles.index(), 13);
    }

    #[test]
    fn out_of_range_id_rejected() {
        let params = ConsensusParams::new(ConsensusDefaults::for_network(Network::Main));
        assert_eq!(params.get_default(28), Err(ParamError::OutOfRange(28)));
        assert_eq!(params.get_default(0).expect("cycle length"), (20_160, ParamType::BlockHeight));
        assert_eq!(params.get_default(9).expect("quorum"), (5_000, ParamType::Percent));
    }

    #[test]
    fn names_parse_with_and_without_prefix() {
        assert_eq!("PROPOSAL_MIN_QUORUM".parse::<ConsensusParamsPos>().expect("name"), P::ProposalMinQuorum);
        assert_eq!(
            "CONSENSUS_PARAM_VOTING_CYCLE_LENGTH".parse::<ConsensusParamsPos>().expect("name"),
            P::VotingCycleLength
        );
        assert!("NOPE".parse::<ConsensusParamsPos>().is_err());
    }

    #[test]
    fn decrement_rule_only_for_max_voting_cycles() {
        assert_eq!(P::ProposalMaxVotingCycles.to_stored_value(5), 4);
        assert_eq!(P::PaymentRequestMaxVotingCycles.to_stored_value(5), 4);
        assert_eq!(P::ProposalMaxVotingCycles.to_display_value(4), 5);
        assert_eq!(P::ConsultationMaxVotingCycles.to_stored_value(5), 5);
        assert_eq!(P::ProposalMinQuorum.to_display_value(5000), 5000);
    }

    #[test]
    fn overlay_resolution_by_tip() {
        let mut params = ConsensusParams::new(ConsensusDefaults::for_network(Network::Regtest));
        let src = Hash256::from_bytes([1; 32]);
        params.push_entry(P::ProposalMaxVotingCycles, ParamEntry { height: 100, value: 4, source: src });
        params.push_entry(P::ProposalMaxVotingCycles, ParamEntry { height: 200, value: 9, source: src });

        assert_eq!(params.get_consensus_parameter(P::ProposalMaxVotingCycles, 99), 6);
        assert_eq!(params.get_consensus_parameter(P::ProposalMaxVotingCycles, 100), 5);
        assert_eq!(params.get_consensus_parameter(P::ProposalMaxVotingCycles, 199), 5);
        assert_eq!(params.get_consensus_parameter(P::ProposalMaxVotingCycles, 500), 10);

        assert_eq!(params.remove_at(200), vec![P::ProposalMaxVotingCycles]);
        assert_eq!(params.get_consensus_parameter(P::ProposalMaxVotingCycles, 500), 5);
        params.remove_at(100);
        assert_eq!(params, ConsensusParams::new(ConsensusDefaults::for_network(Network::Regtest)));
    }

    #[test]
    fn overrides_validate_type() {
        let mut ov = BTreeMap::new();
        ov.insert("PROPOSAL_MIN_QUORUM".to_string(), 7_000);
        let d = ConsensusDefaults::for_network(Network::Main).with_overrides(&ov).expect("override");
        assert_eq!(d.get(P::ProposalMinQuorum), 7_000);

        ov.insert("CONFIDENTIAL_TOKENS_ENABLED".to_string(), 2);
        assert!(matches!(
            ConsensusDefaults::for_network(Network::Main).with_overrides(&ov),
            Err(ParamError::InvalidValue { .. })
        ));
    }

    #[test]
    fn report_lists_every_parameter() {
        let params = ConsensusParams::new(ConsensusDefaults::for_network(Network::Test));
        let report = params.report(0);
        assert_eq!(report.len(), MAX_CONSENSUS_PARAMS);
        assert_eq!(report[0].name, "VOTING_CYCLE_LENGTH");
        assert_eq!(report[0].value, 1_440);
        assert_eq!(report[24].value, 1);
    }
}
