//! Payment request.
//!
//! Owner proposal menarik sebagian dana proposal yang sudah ACCEPTED. Request
//! harus ditandatangani key owner atas pesan:
//!
//! ```text
//! <random>I kindly ask to withdraw <amount>0DYNS from the proposal <hash>. Payment request id: <id>
//! ```
//!
//! Verifikasi signature lewat `SignatureOracle` (script interpreter ada di luar core).

use serde::{Deserialize, Serialize};
use stock_common::crypto;

use crate::dao::flags::{DaoState, FlagError, FundFlags};
use crate::dao::state_history::StateHistory;
use crate::dao::{cycles_since, remove_cycle_at, CycleRecord, DaoError};
use crate::destination::TxDestination;
use crate::types::{Amount, Hash160, Hash256};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequestTx {
    pub proposal_hash: Hash256,
    pub amount: Amount,
    /// Payment request id yang ikut ditandatangani.
    pub description: String,
    pub random: String,
    pub signature: Vec<u8>,
    pub version: u64,
    pub fee: Amount,
}

impl PaymentRequestTx {
    pub fn signed_message(&self) -> String {
        signed_message(&self.random, self.amount, &self.proposal_hash, &self.description)
    }
}

pub fn signed_message(random: &str, amount: Amount, proposal: &Hash256, id: &str) -> String {
    format!(
        "{}I kindly ask to withdraw {}0DYNS from the proposal {}. Payment request id: {}",
        random, amount, proposal, id
    )
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub hash: Hash256,
    pub proposal_hash: Hash256,
    pub amount: Amount,
    pub description: String,
    pub flags: FundFlags,
    pub fee: Amount,
    pub creation_height: u32,
    pub history: StateHistory,
    pub cycles: Vec<CycleRecord>,
}

impl PaymentRequest {
    pub fn from_tx(hash: Hash256, tx: &PaymentRequestTx, height: u32) -> Result<Self, FlagError> {
        Ok(PaymentRequest {
            hash,
            proposal_hash: tx.proposal_hash,
            amount: tx.amount,
            description: tx.description.clone(),
            flags: FundFlags::decode("payment request", tx.version)?,
            fee: tx.fee,
            creation_height: height,
            history: StateHistory::new(height, DaoState::Nil),
            cycles: Vec::new(),
        })
    }

    pub fn state_at(&self, tip: u32) -> DaoState {
        self.history.state_at(tip)
    }

    pub fn is_votable(&self, tip: u32) -> bool {
        self.state_at(tip) == DaoState::Nil
    }

    pub fn completed_cycles(&self, tip: u32) -> usize {
        cycles_since(&self.cycles, self.history.state_since(tip))
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

// ════════════════════════════════════════════════════════════════════════════
// SIGNATURE ORACLE
// ════════════════════════════════════════════════════════════════════════════

/// "Apakah signature ini dibuat oleh owner?" Black box dari sisi core.
pub trait SignatureOracle: Send + Sync {
    fn verify(&self, owner: &TxDestination, message: &[u8], signature: &[u8]) -> bool;
}

/// Signature = `pubkey(32) || sig(64)` Ed25519; owner harus `KeyId` dari pubkey.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ed25519Oracle;

pub const ED25519_SIGNATURE_LEN: usize = 32 + 64;

impl SignatureOracle for Ed25519Oracle {
    fn verify(&self, owner: &TxDestination, message: &[u8], signature: &[u8]) -> bool {
        let TxDestination::KeyId(owner_key) = owner else { return false };
        if signature.len() != ED25519_SIGNATURE_LEN {
            return false;
        }
        let (pubkey, sig) = signature.split_at(32);
        if Hash160::from_bytes(crypto::key_hash(pubkey)) != *owner_key {
            return false;
        }
        crypto::verify_signature(pubkey, message, sig).unwrap_or(false)
    }
}

/// Sign a payment request message with a 64-byte Ed25519 keypair, producing
/// the `pubkey || sig` blob `Ed25519Oracle` expects.
pub fn sign_payment_request(keypair: &[u8], message: &str) -> Result<Vec<u8>, crypto::CryptoError> {
    let pubkey = crypto::public_key_bytes_from_keypair_bytes(keypair)?;
    let sig = crypto::sign_message(keypair, message.as_bytes())?;
    let mut out = Vec::with_capacity(ED25519_SIGNATURE_LEN);
    out.extend_from_slice(&pubkey);
    out.extend_from_slice(&sig);
    Ok(out)
}

/// Oracle untuk test dan tooling: menerima semua signature.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAllSignatures;

impl SignatureOracle for AcceptAllSignatures {
    fn verify(&self, _owner: &TxDestination, _message: &[u8], _signature: &[u8]) -> bool {
        true
    }
}
