//! # DAO State & Version Flags
//!
//! `nVersion` on-chain adalah bitmask. Bitmask hanya hidup di boundary
//! serialisasi; business logic memakai struct boolean bernama hasil `decode`.
//!
//! | Object | Bit |
//! |--------|-----|
//! | Proposal / PaymentRequest | BASE 1<<1, REDUCED_QUORUM 1<<2, ABSTAIN_VOTE 1<<3, EXCLUDE 1<<4, SUPER 1<<5 |
//! | Consultation | BASE 1<<0, ANSWER_IS_A_RANGE 1<<1, MORE_ANSWERS 1<<2, CONSENSUS_PARAMETER 1<<3, EXCLUDE 1<<4, SUPER 1<<5 |
//! | ConsultationAnswer | BASE 1<<0, EXCLUDE 1<<1, SUPER 1<<2 |

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagError {
    #[error("{object} version {raw:#x} is missing the base bit")]
    MissingBase { object: &'static str, raw: u64 },

    #[error("{object} version {raw:#x} has unknown bits {unknown:#x}")]
    UnknownBits { object: &'static str, raw: u64, unknown: u64 },

    #[error("{object} version {raw:#x}: {reason}")]
    Conflict { object: &'static str, raw: u64, reason: &'static str },
}

/// Generic object state. Tidak semua state berlaku untuk semua object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DaoState {
    /// Created, awaiting cycle evaluation (proposal/PR voting, consultation support phase)
    Nil,
    /// Proposal/PR accepted; consultation in voting phase
    Accepted,
    Rejected,
    Expired,
    /// Proposal won the vote but the fund cannot lock the amount yet
    PendingFunds,
    /// Proposal deadline passed while a payment request is still in voting
    PendingVotingPreq,
    AcceptedExpired,
    /// Answer (or range consultation) reached the support threshold
    Supported,
    /// Consultation between support and voting
    Reflection,
    /// Consultation (and its winning answer) finished with quorum
    Passed,
}

impl DaoState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DaoState::Nil => "nil",
            DaoState::Accepted => "accepted",
            DaoState::Rejected => "rejected",
            DaoState::Expired => "expired",
            DaoState::PendingFunds => "pending_funds",
            DaoState::PendingVotingPreq => "pending_voting_preq",
            DaoState::AcceptedExpired => "accepted_expired",
            DaoState::Supported => "supported",
            DaoState::Reflection => "reflection",
            DaoState::Passed => "passed",
        }
    }
}

impl fmt::Display for DaoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn check_bits(object: &'static str, raw: u64, base: u64, known: u64) -> Result<(), FlagError> {
    if raw & base == 0 {
        return Err(FlagError::MissingBase { object, raw });
    }
    let unknown = raw & !known;
    if unknown != 0 {
        return Err(FlagError::UnknownBits { object, raw, unknown });
    }
    Ok(())
}

// ════════════════════════════════════════════════════════════════════════════
// PROPOSAL / PAYMENT REQUEST
// ════════════════════════════════════════════════════════════════════════════

pub mod proposal_version {
    pub const BASE: u64 = 1 << 1;
    pub const REDUCED_QUORUM: u64 = 1 << 2;
    pub const ABSTAIN_VOTE: u64 = 1 << 3;
    pub const EXCLUDE: u64 = 1 << 4;
    pub const SUPER: u64 = 1 << 5;
    pub const ALL: u64 = BASE | REDUCED_QUORUM | ABSTAIN_VOTE | EXCLUDE | SUPER;
}

/// Flag proposal dan payment request (bit layout sama).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundFlags {
    pub reduced_quorum: bool,
    /// Abstain votes count toward quorum participation.
    pub abstain_vote: bool,
    /// Abstain votes are excluded from the support ratio denominator.
    pub exclude: bool,
    /// Minted instead of paid from the community fund.
    pub super_version: bool,
}

impl FundFlags {
    pub fn decode(object: &'static str, raw: u64) -> Result<Self, FlagError> {
        use proposal_version::*;
        check_bits(object, raw, BASE, ALL)?;
        Ok(FundFlags {
            reduced_quorum: raw & REDUCED_QUORUM != 0,
            abstain_vote: raw & ABSTAIN_VOTE != 0,
            exclude: raw & EXCLUDE != 0,
            super_version: raw & SUPER != 0,
        })
    }

    pub fn encode(&self) -> u64 {
        use proposal_version::*;
        let mut raw = BASE;
        if self.reduced_quorum { raw |= REDUCED_QUORUM; }
        if self.abstain_vote { raw |= ABSTAIN_VOTE; }
        if self.exclude { raw |= EXCLUDE; }
        if self.super_version { raw |= SUPER; }
        raw
    }
}

// ════════════════════════════════════════════════════════════════════════════
// CONSULTATION
// ════════════════════════════════════════════════════════════════════════════

pub mod consultation_version {
    pub const BASE: u64 = 1;
    pub const ANSWER_IS_A_RANGE: u64 = 1 << 1;
    pub const MORE_ANSWERS: u64 = 1 << 2;
    pub const CONSENSUS_PARAMETER: u64 = 1 << 3;
    pub const EXCLUDE: u64 = 1 << 4;
    pub const SUPER: u64 = 1 << 5;
    pub const ALL: u64 = BASE | ANSWER_IS_A_RANGE | MORE_ANSWERS | CONSENSUS_PARAMETER | EXCLUDE | SUPER;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultationFlags {
    pub range: bool,
    pub more_answers: bool,
    pub consensus_parameter: bool,
    pub exclude: bool,
    pub super_version: bool,
}

impl ConsultationFlags {
    pub fn decode(raw: u64) -> Result<Self, FlagError> {
        use consultation_version::*;
        const OBJECT: &str = "consultation";
        check_bits(OBJECT, raw, BASE, ALL)?;
        let flags = ConsultationFlags {
            range: raw & ANSWER_IS_A_RANGE != 0,
            more_answers: raw & MORE_ANSWERS != 0,
            consensus_parameter: raw & CONSENSUS_PARAMETER != 0,
            exclude: raw & EXCLUDE != 0,
            super_version: raw & SUPER != 0,
        };
        if flags.range && flags.more_answers {
            return Err(FlagError::Conflict { object: OBJECT, raw, reason: "range consultation cannot admit answers" });
        }
        if flags.range && flags.consensus_parameter {
            return Err(FlagError::Conflict { object: OBJECT, raw, reason: "consensus consultation cannot be a range" });
        }
        if flags.consensus_parameter && !flags.more_answers {
            return Err(FlagError::Conflict { object: OBJECT, raw, reason: "consensus consultation must admit answers" });
        }
        if flags.super_version && !flags.consensus_parameter {
            return Err(FlagError::Conflict { object: OBJECT, raw, reason: "super requires consensus parameter" });
        }
        Ok(flags)
    }

    pub fn encode(&self) -> u64 {
        use consultation_version::*;
        let mut raw = BASE;
        if self.range { raw |= ANSWER_IS_A_RANGE; }
        if self.more_answers { raw |= MORE_ANSWERS; }
        if self.consensus_parameter { raw |= CONSENSUS_PARAMETER; }
        if self.exclude { raw |= EXCLUDE; }
        if self.super_version { raw |= SUPER; }
        raw
    }
}

// ════════════════════════════════════════════════════════════════════════════
// ANSWER
// ════════════════════════════════════════════════════════════════════════════

pub mod answer_version {
    pub const BASE: u64 = 1;
    pub const EXCLUDE: u64 = 1 << 1;
    pub const SUPER: u64 = 1 << 2;
    pub const ALL: u64 = BASE | EXCLUDE | SUPER;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerFlags {
    pub exclude: bool,
    pub super_version: bool,
}

impl AnswerFlags {
    pub fn decode(raw: u64) -> Result<Self, FlagError> {
        use answer_version::*;
        check_bits("answer", raw, BASE, ALL)?;
        Ok(AnswerFlags { exclude: raw & EXCLUDE != 0, super_version: raw & SUPER != 0 })
    }

    pub fn encode(&self) -> u64 {
        use answer_version::*;
        let mut raw = BASE;
        if self.exclude { raw |= EXCLUDE; }
        if self.super_version { raw |= SUPER; }
        raw
    }
}
