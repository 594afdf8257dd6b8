//! # Vote Output Script
//!
//! Vote governance ditanam di output OP_RETURN coinstake (atau tx light
//! wallet). Hanya prefix governance tetap di bawah yang dikenali; interpretasi
//! script umum ada di luar core.
//!
//! | Script | Arti |
//! |--------|------|
//! | `6a c1` | fund contribution |
//! | `6a c1 c2 <op> 20 <hash>` | vote proposal (op: c4 yes, c5 no, c7 abstain, c8 remove) |
//! | `6a c1 c3 <op> 20 <hash>` | vote payment request |
//! | `6a c9 c4 20 <hash>` | support consultation / answer |
//! | `6a c9 c8 20 <hash>` | hapus support |
//! | `6a cb ca 20 <hash> <num>` | nilai range / consultation |
//! | `6a cb c7 20 <hash>` | abstain consultation |
//! | `6a cb c8 20 <hash>` | hapus vote consultation |
//!
//! `<num>` adalah push script-number minimal: `OP_0`, `OP_1..OP_16`, atau
//! push data little-endian dengan sign bit.

use thiserror::Error;

use crate::dao::vote_cache::{VOTE_ABSTAIN, VOTE_NO, VOTE_REMOVE, VOTE_YES};
use crate::types::Hash256;

pub const OP_RETURN: u8 = 0x6a;
pub const OP_0: u8 = 0x00;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_CFUND: u8 = 0xc1;
pub const OP_PROP: u8 = 0xc2;
pub const OP_PREQ: u8 = 0xc3;
pub const OP_YES: u8 = 0xc4;
pub const OP_NO: u8 = 0xc5;
pub const OP_ABSTAIN: u8 = 0xc7;
pub const OP_REMOVE: u8 = 0xc8;
pub const OP_DAO: u8 = 0xc9;
pub const OP_VALUE: u8 = 0xca;
pub const OP_CONSULTATION: u8 = 0xcb;

const PUSH_HASH: u8 = 0x20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteScriptError {
    #[error("not a governance vote script")]
    NotGovernance,

    #[error("unknown vote opcode {0:#04x}")]
    UnknownOpcode(u8),

    #[error("malformed vote script: {0}")]
    Malformed(&'static str),

    #[error("vote value {0} cannot be encoded for this target")]
    UnencodableValue(i64),
}

/// Object yang menjadi sasaran vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum VoteTarget {
    Proposal,
    PaymentRequest,
    /// Support consultation (support phase) atau answer.
    Support,
    Consultation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteOutput {
    FundContribution,
    Vote { target: VoteTarget, hash: Hash256, value: i64 },
}

impl VoteOutput {
    /// Entry untuk vote cache; `None` untuk fund contribution.
    pub fn entry(&self) -> Option<(Hash256, i64)> {
        match self {
            VoteOutput::FundContribution => None,
            VoteOutput::Vote { hash, value, .. } => Some((*hash, *value)),
        }
    }
}

fn fund_opcode(value: i64) -> Result<u8, VoteScriptError> {
    match value {
        VOTE_YES => Ok(OP_YES),
        VOTE_NO => Ok(OP_NO),
        VOTE_ABSTAIN => Ok(OP_ABSTAIN),
        VOTE_REMOVE => Ok(OP_REMOVE),
        other => Err(VoteScriptError::UnencodableValue(other)),
    }
}

fn push_hash(out: &mut Vec<u8>, hash: &Hash256) {
    out.push(PUSH_HASH);
    out.extend_from_slice(hash.as_bytes());
}

/// Minimal script-number push.
pub fn push_number(out: &mut Vec<u8>, value: i64) {
    match value {
        0 => out.push(OP_0),
        -1 => out.push(OP_1NEGATE),
        1..=16 => out.push(OP_1 - 1 + value as u8),
        _ => {
            let bytes = script_num_bytes(value);
            out.push(bytes.len() as u8);
            out.extend_from_slice(&bytes);
        }
    }
}

fn script_num_bytes(value: i64) -> Vec<u8> {
    let negative = value < 0;
    let mut abs = value.unsigned_abs();
    let mut out = Vec::new();
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    match out.last_mut() {
        Some(last) if *last & 0x80 != 0 => out.push(if negative { 0x80 } else { 0x00 }),
        Some(last) if negative => *last |= 0x80,
        _ => {}
    }
    out
}

fn read_number(bytes: &[u8]) -> Result<i64, VoteScriptError> {
    let (&op, rest) = bytes.split_first().ok_or(VoteScriptError::Malformed("missing value"))?;
    let (value, used) = match op {
        OP_0 => (0, 0),
        OP_1NEGATE => (-1, 0),
        OP_1..=OP_16 => (i64::from(op - OP_1 + 1), 0),
        1..=8 => {
            let len = op as usize;
            let data = rest.get(..len).ok_or(VoteScriptError::Malformed("truncated value"))?;
            let mut abs: u64 = 0;
            for (i, b) in data.iter().enumerate() {
                let b = if i == len - 1 { b & 0x7f } else { *b };
                abs |= u64::from(b) << (8 * i);
            }
            let negative = data[len - 1] & 0x80 != 0;
            let value = abs as i64;
            (if negative { -value } else { value }, len)
        }
        _ => return Err(VoteScriptError::Malformed("bad value push")),
    };
    if rest.len() != used {
        return Err(VoteScriptError::Malformed("trailing bytes"));
    }
    Ok(value)
}

fn read_hash(bytes: &[u8]) -> Result<(Hash256, &[u8]), VoteScriptError> {
    if bytes.first() != Some(&PUSH_HASH) || bytes.len() < 33 {
        return Err(VoteScriptError::Malformed("expected 32-byte hash push"));
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes[1..33]);
    Ok((Hash256::from_bytes(arr), &bytes[33..]))
}

fn read_hash_only(bytes: &[u8]) -> Result<Hash256, VoteScriptError> {
    let (hash, rest) = read_hash(bytes)?;
    if !rest.is_empty() {
        return Err(VoteScriptError::Malformed("trailing bytes"));
    }
    Ok(hash)
}

pub fn encode_vote(target: VoteTarget, hash: &Hash256, value: i64) -> Result<Vec<u8>, VoteScriptError> {
    let mut out = vec![OP_RETURN];
    match target {
        VoteTarget::Proposal | VoteTarget::PaymentRequest => {
            let kind = if target == VoteTarget::Proposal { OP_PROP } else { OP_PREQ };
            out.extend_from_slice(&[OP_CFUND, kind, fund_opcode(value)?]);
            push_hash(&mut out, hash);
        }
        VoteTarget::Support => {
            let op = match value {
                VOTE_YES => OP_YES,
                VOTE_REMOVE => OP_REMOVE,
                other => return Err(VoteScriptError::UnencodableValue(other)),
            };
            out.extend_from_slice(&[OP_DAO, op]);
            push_hash(&mut out, hash);
        }
        VoteTarget::Consultation => match value {
            VOTE_ABSTAIN | VOTE_REMOVE => {
                let op = if value == VOTE_ABSTAIN { OP_ABSTAIN } else { OP_REMOVE };
                out.extend_from_slice(&[OP_CONSULTATION, op]);
                push_hash(&mut out, hash);
            }
            v if v >= 0 => {
                out.extend_from_slice(&[OP_CONSULTATION, OP_VALUE]);
                push_hash(&mut out, hash);
                push_number(&mut out, v);
            }
            other => return Err(VoteScriptError::UnencodableValue(other)),
        },
    }
    Ok(out)
}

pub fn fund_contribution_script() -> Vec<u8> {
    vec![OP_RETURN, OP_CFUND]
}

pub fn decode_vote(script: &[u8]) -> Result<VoteOutput, VoteScriptError> {
    let body = match script.split_first() {
        Some((&OP_RETURN, body)) => body,
        _ => return Err(VoteScriptError::NotGovernance),
    };
    match body {
        [OP_CFUND] => Ok(VoteOutput::FundContribution),
        [OP_CFUND, kind @ (OP_PROP | OP_PREQ), op, rest @ ..] => {
            let value = match *op {
                OP_YES => VOTE_YES,
                OP_NO => VOTE_NO,
                OP_ABSTAIN => VOTE_ABSTAIN,
                OP_REMOVE => VOTE_REMOVE,
                other => return Err(VoteScriptError::UnknownOpcode(other)),
            };
            let target = if *kind == OP_PROP { VoteTarget::Proposal } else { VoteTarget::PaymentRequest };
            Ok(VoteOutput::Vote { target, hash: read_hash_only(rest)?, value })
        }
        [OP_DAO, op, rest @ ..] => {
            let value = match *op {
                OP_YES => VOTE_YES,
                OP_REMOVE => VOTE_REMOVE,
                other => return Err(VoteScriptError::UnknownOpcode(other)),
            };
            Ok(VoteOutput::Vote { target: VoteTarget::Support, hash: read_hash_only(rest)?, value })
        }
        [OP_CONSULTATION, op, rest @ ..] => {
            let (hash, value) = match *op {
                OP_VALUE => {
                    let (hash, tail) = read_hash(rest)?;
                    (hash, read_number(tail)?)
                }
                OP_ABSTAIN => (read_hash_only(rest)?, VOTE_ABSTAIN),
                OP_REMOVE => (read_hash_only(rest)?, VOTE_REMOVE),
                other => return Err(VoteScriptError::UnknownOpcode(other)),
            };
            Ok(VoteOutput::Vote { target: VoteTarget::Consultation, hash, value })
        }
        _ => Err(VoteScriptError::NotGovernance),
    }
}

/// Vote entries dari output sebuah tx, urut sesuai output. Output yang bukan
/// governance dilewati; script governance yang rusak membuat seluruh tx invalid.
pub fn parse_vote_entries<'a>(
    scripts: impl IntoIterator<Item = &'a [u8]>,
) -> Result<Vec<(Hash256, i64)>, VoteScriptError> {
    let mut out = Vec::new();
    for script in scripts {
        match decode_vote(script) {
            Ok(vote) => out.extend(vote.entry()),
            Err(VoteScriptError::NotGovernance) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}
