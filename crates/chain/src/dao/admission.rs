//! # Admission Rules
//!
//! Validasi struktural transaksi governance dan vote **sebelum** masuk state.
//! Object yang invalid tidak pernah masuk replicated state: satu tx invalid
//! membuat seluruh block ditolak dan tip tidak maju.
//!
//! Semua nilai dibaca dengan parameter konsensus yang berlaku di height block.

use thiserror::Error;

use crate::consensus_params::{ConsensusParamsPos as P, ParamError};
use crate::dao::answer::{AnswerTx, AnswerValue, MAX_ANSWER_TEXT_LEN};
use crate::dao::consultation::{ConsultationKind, ConsultationTx, MAX_ANSWERS, MAX_QUESTION_LEN};
use crate::dao::engine::GovernanceState;
use crate::dao::flags::{AnswerFlags, ConsultationFlags, DaoState, FlagError, FundFlags};
use crate::dao::payment_request::{PaymentRequestTx, SignatureOracle};
use crate::dao::proposal::{ProposalTx, MAX_DESCRIPTION_LEN};
use crate::dao::vote_cache::{VOTE_ABSTAIN, VOTE_NO, VOTE_REMOVE, VOTE_YES};
use crate::types::{Amount, Hash256};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("{kind} fee {fee} below minimum {min}")]
    FeeTooLow { kind: &'static str, fee: Amount, min: Amount },

    #[error("{kind} amount {amount} is not positive")]
    InvalidAmount { kind: &'static str, amount: Amount },

    #[error("proposal deadline must be positive")]
    InvalidDeadline,

    #[error("{kind} total overflows")]
    AmountOverflow { kind: &'static str },

    #[error("{kind} text too long ({len} > {max})")]
    TextTooLong { kind: &'static str, len: usize, max: usize },

    #[error("invalid destination for {0}")]
    InvalidDestination(&'static str),

    #[error("object {0} already exists")]
    DuplicateObject(Hash256),

    #[error("unknown proposal {0}")]
    UnknownProposal(Hash256),

    #[error("proposal {proposal} is {state}, payment requests need an accepted proposal")]
    ProposalNotAccepted { proposal: Hash256, state: DaoState },

    #[error("payment request amount {amount} exceeds available {available}")]
    ExceedsAvailable { amount: Amount, available: Amount },

    #[error("payment request signature does not match the proposal owner")]
    BadSignature,

    #[error("super flag of {0} does not match its parent")]
    SuperMismatch(&'static str),

    #[error("invalid consultation: {0}")]
    InvalidConsultation(&'static str),

    #[error("invalid range {min}..={max}")]
    InvalidRange { min: i64, max: i64 },

    #[error("unknown consultation {0}")]
    UnknownConsultation(Hash256),

    #[error("consultation {0} does not accept new answers")]
    NoNewAnswers(Hash256),

    #[error("invalid answer: {0}")]
    InvalidAnswer(&'static str),

    #[error("answer already proposed for consultation {0}")]
    DuplicateAnswer(Hash256),

    #[error("vote for unknown object {0}")]
    UnknownObject(Hash256),

    #[error("vote value {value} not allowed for {hash}")]
    InvalidVote { hash: Hash256, value: i64 },

    #[error("light vote fee {fee} below minimum {min}")]
    LightFeeTooLow { fee: Amount, min: Amount },

    #[error(transparent)]
    Param(#[from] ParamError),

    #[error(transparent)]
    Flag(#[from] FlagError),
}

fn check_fee(kind: &'static str, fee: Amount, min: Amount) -> Result<(), AdmissionError> {
    if fee < min {
        return Err(AdmissionError::FeeTooLow { kind, fee, min });
    }
    Ok(())
}

fn check_text(kind: &'static str, text: &str, max: usize) -> Result<(), AdmissionError> {
    if text.len() > max {
        return Err(AdmissionError::TextTooLong { kind, len: text.len(), max });
    }
    Ok(())
}

fn check_new_hash(state: &GovernanceState, hash: &Hash256) -> Result<(), AdmissionError> {
    if state.contains(hash) {
        return Err(AdmissionError::DuplicateObject(*hash));
    }
    Ok(())
}

// ════════════════════════════════════════════════════════════════════════════
// FUND
// ════════════════════════════════════════════════════════════════════════════

pub fn check_proposal(state: &GovernanceState, hash: &Hash256, tx: &ProposalTx, height: u32) -> Result<(), AdmissionError> {
    check_new_hash(state, hash)?;
    FundFlags::decode("proposal", tx.version)?;
    check_fee("proposal", tx.fee, state.params.amount(P::ProposalMinFee, height))?;
    if tx.amount <= 0 {
        return Err(AdmissionError::InvalidAmount { kind: "proposal", amount: tx.amount });
    }
    if tx.deadline == 0 {
        return Err(AdmissionError::InvalidDeadline);
    }
    check_text("proposal description", &tx.description, MAX_DESCRIPTION_LEN)?;
    if !tx.owner.is_valid() {
        return Err(AdmissionError::InvalidDestination("proposal owner"));
    }
    if !tx.payment_address.is_valid() {
        return Err(AdmissionError::InvalidDestination("proposal payment address"));
    }
    Ok(())
}

pub fn check_payment_request(
    state: &GovernanceState,
    hash: &Hash256,
    tx: &PaymentRequestTx,
    height: u32,
    signatures: &dyn SignatureOracle,
) -> Result<(), AdmissionError> {
    check_new_hash(state, hash)?;
    let flags = FundFlags::decode("payment request", tx.version)?;
    check_fee("payment request", tx.fee, state.params.amount(P::PaymentRequestMinFee, height))?;
    check_text("payment request id", &tx.description, MAX_DESCRIPTION_LEN)?;

    // 1. Parent harus ada dan ACCEPTED
    let proposal = state
        .proposals
        .get(&tx.proposal_hash)
        .ok_or(AdmissionError::UnknownProposal(tx.proposal_hash))?;
    if !proposal.can_request_payment(height) {
        return Err(AdmissionError::ProposalNotAccepted {
            proposal: tx.proposal_hash,
            state: proposal.state_at(height),
        });
    }
    if flags.super_version != proposal.is_super() {
        return Err(AdmissionError::SuperMismatch("payment request"));
    }

    // 2. Amount dalam sisa dana (termasuk request lain yang masih voting)
    if tx.amount <= 0 {
        return Err(AdmissionError::InvalidAmount { kind: "payment request", amount: tx.amount });
    }
    let available = proposal.available(state.payment_requests.values(), height, true);
    if tx.amount > available {
        return Err(AdmissionError::ExceedsAvailable { amount: tx.amount, available });
    }

    // 3. Signature owner
    let message = tx.signed_message();
    if !signatures.verify(&proposal.owner, message.as_bytes(), &tx.signature) {
        return Err(AdmissionError::BadSignature);
    }
    Ok(())
}

// ════════════════════════════════════════════════════════════════════════════
// CONSULTATION
// ════════════════════════════════════════════════════════════════════════════

pub fn check_consultation(state: &GovernanceState, hash: &Hash256, tx: &ConsultationTx, height: u32) -> Result<(), AdmissionError> {
    check_new_hash(state, hash)?;
    let flags = ConsultationFlags::decode(tx.version)?;
    let min_fee = tx.min_fee(
        state.params.amount(P::ConsultationMinFee, height),
        state.params.amount(P::ConsultationAnswerMinFee, height),
    );
    check_fee("consultation", tx.fee, min_fee)?;
    if tx.question.is_empty() {
        return Err(AdmissionError::InvalidConsultation("empty question"));
    }
    check_text("consultation question", &tx.question, MAX_QUESTION_LEN)?;

    match &tx.kind {
        ConsultationKind::Range { min, max } => {
            if !flags.range {
                return Err(AdmissionError::InvalidConsultation("range kind without range flag"));
            }
            if *min < 0 || min >= max {
                return Err(AdmissionError::InvalidRange { min: *min, max: *max });
            }
            if !tx.initial_answers.is_empty() {
                return Err(AdmissionError::InvalidConsultation("range consultation cannot carry answers"));
            }
        }
        ConsultationKind::Answers { max_answers } => {
            if flags.range || flags.consensus_parameter {
                return Err(AdmissionError::InvalidConsultation("answer kind with range or consensus flag"));
            }
            if *max_answers == 0 || *max_answers > MAX_ANSWERS {
                return Err(AdmissionError::InvalidConsultation("max answers out of range"));
            }
            if tx.initial_answers.len() > *max_answers as usize {
                return Err(AdmissionError::InvalidConsultation("more answers than allowed"));
            }
            for (i, value) in tx.initial_answers.iter().enumerate() {
                check_text_answer(value)?;
                if tx.initial_answers[..i].contains(value) {
                    return Err(AdmissionError::DuplicateAnswer(*hash));
                }
            }
        }
        ConsultationKind::ConsensusParameter { ids } => {
            if !flags.consensus_parameter {
                return Err(AdmissionError::InvalidConsultation("consensus kind without consensus flag"));
            }
            if ids.is_empty() {
                return Err(AdmissionError::InvalidConsultation("no parameter ids"));
            }
            if ids.len() > 1 && !flags.super_version {
                return Err(AdmissionError::InvalidConsultation("combined change requires super flag"));
            }
            for (i, id) in ids.iter().enumerate() {
                if ids[..i].contains(id) {
                    return Err(AdmissionError::InvalidConsultation("duplicate parameter id"));
                }
            }
            if tx.initial_answers.is_empty() {
                return Err(AdmissionError::InvalidConsultation("consensus change needs a proposed value"));
            }
            for value in &tx.initial_answers {
                check_consensus_answer(ids, value)?;
            }
        }
    }
    Ok(())
}

fn check_text_answer(value: &AnswerValue) -> Result<(), AdmissionError> {
    match value {
        AnswerValue::Text(text) if text.is_empty() => Err(AdmissionError::InvalidAnswer("empty answer")),
        AnswerValue::Text(text) => check_text("answer", text, MAX_ANSWER_TEXT_LEN),
        _ => Err(AdmissionError::InvalidAnswer("numeric answer for a text consultation")),
    }
}

/// Nilai answer consensus divalidasi sebagai display value per tipe parameter.
fn check_consensus_answer(ids: &[P], value: &AnswerValue) -> Result<(), AdmissionError> {
    let stored = match (ids.len(), value) {
        (1, AnswerValue::Number(v)) => vec![*v],
        (n, AnswerValue::Numbers(vs)) if n > 1 && vs.len() == n => vs.clone(),
        _ => return Err(AdmissionError::InvalidAnswer("answer does not match parameter ids")),
    };
    for (id, v) in ids.iter().zip(stored) {
        id.validate_display_value(id.to_display_value(v))?;
    }
    Ok(())
}

pub fn check_answer(state: &GovernanceState, hash: &Hash256, tx: &AnswerTx, height: u32) -> Result<(), AdmissionError> {
    check_new_hash(state, hash)?;
    let flags = AnswerFlags::decode(tx.version)?;
    check_fee("consultation answer", tx.fee, state.params.amount(P::ConsultationAnswerMinFee, height))?;

    let parent = state
        .consultations
        .get(&tx.parent)
        .ok_or(AdmissionError::UnknownConsultation(tx.parent))?;
    if !parent.can_have_new_answers(height) {
        return Err(AdmissionError::NoNewAnswers(tx.parent));
    }
    if flags.super_version != parent.flags.super_version {
        return Err(AdmissionError::SuperMismatch("consultation answer"));
    }

    let siblings: Vec<&AnswerValue> = state.answers_of(&tx.parent).map(|a| &a.value).collect();
    match &parent.kind {
        ConsultationKind::Answers { max_answers } => {
            check_text_answer(&tx.value)?;
            if siblings.len() >= *max_answers as usize {
                return Err(AdmissionError::InvalidAnswer("consultation already has the maximum number of answers"));
            }
        }
        ConsultationKind::ConsensusParameter { ids } => check_consensus_answer(ids, &tx.value)?,
        ConsultationKind::Range { .. } => return Err(AdmissionError::NoNewAnswers(tx.parent)),
    }
    if siblings.contains(&&tx.value) {
        return Err(AdmissionError::DuplicateAnswer(tx.parent));
    }
    Ok(())
}

// ════════════════════════════════════════════════════════════════════════════
// VOTES
// ════════════════════════════════════════════════════════════════════════════

/// Nilai vote yang sah per jenis object.
///
/// | Object | Nilai |
/// |--------|-------|
/// | proposal / payment request | yes, no, remove; abstain kalau flag ABSTAIN_VOTE |
/// | range consultation | abstain, remove, support (1), `[min, max]` |
/// | consultation lain | abstain, remove |
/// | answer | support (1), remove |
pub fn check_vote(state: &GovernanceState, hash: &Hash256, value: i64) -> Result<(), AdmissionError> {
    let fund_vote_ok = |flags: &FundFlags| match value {
        VOTE_YES | VOTE_NO | VOTE_REMOVE => true,
        VOTE_ABSTAIN => flags.abstain_vote,
        _ => false,
    };
    let ok = if let Some(p) = state.proposals.get(hash) {
        fund_vote_ok(&p.flags)
    } else if let Some(pr) = state.payment_requests.get(hash) {
        fund_vote_ok(&pr.flags)
    } else if let Some(c) = state.consultations.get(hash) {
        c.accepts_vote(value)
    } else if state.answers.contains_key(hash) {
        value == VOTE_YES || value == VOTE_REMOVE
    } else {
        return Err(AdmissionError::UnknownObject(*hash));
    };
    if !ok {
        return Err(AdmissionError::InvalidVote { hash: *hash, value });
    }
    Ok(())
}

pub fn check_light_fee(state: &GovernanceState, fee: Amount, height: u32) -> Result<(), AdmissionError> {
    let min = state.params.amount(P::DaoVoteLightMinFee, height);
    if fee < min {
        return Err(AdmissionError::LightFeeTooLow { fee, min });
    }
    Ok(())
}
