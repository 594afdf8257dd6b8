//! Fund proposal.
//!
//! Proposal meminta `amount` dari community fund (atau mint baru untuk versi
//! SUPER). Setelah ACCEPTED, owner mengajukan payment request sampai jumlah
//! yang dibayar mencapai `amount` atau deadline lewat.

use serde::{Deserialize, Serialize};

use crate::dao::flags::{DaoState, FlagError, FundFlags};
use crate::dao::payment_request::PaymentRequest;
use crate::dao::state_history::StateHistory;
use crate::dao::{cycles_since, remove_cycle_at, CycleRecord, DaoError};
use crate::destination::TxDestination;
use crate::types::{Amount, Hash256};

pub const MAX_DESCRIPTION_LEN: usize = 1024;

/// Payload transaksi proposal seperti yang di-mine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalTx {
    pub owner: TxDestination,
    pub payment_address: TxDestination,
    pub amount: Amount,
    /// Detik setelah block yang menerima proposal.
    pub deadline: u64,
    pub description: String,
    pub version: u64,
    pub fee: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub hash: Hash256,
    pub owner: TxDestination,
    pub payment_address: TxDestination,
    pub amount: Amount,
    pub deadline: u64,
    pub description: String,
    pub flags: FundFlags,
    pub fee: Amount,
    pub creation_height: u32,
    pub history: StateHistory,
    pub cycles: Vec<CycleRecord>,
}

impl Proposal {
    pub fn from_tx(hash: Hash256, tx: &ProposalTx, height: u32) -> Result<Self, FlagError> {
        Ok(Proposal {
            hash,
            owner: tx.owner.clone(),
            payment_address: tx.payment_address.clone(),
            amount: tx.amount,
            deadline: tx.deadline,
            description: tx.description.clone(),
            flags: FundFlags::decode("proposal", tx.version)?,
            fee: tx.fee,
            creation_height: height,
            history: StateHistory::new(height, DaoState::Nil),
            cycles: Vec::new(),
        })
    }

    pub fn state_at(&self, tip: u32) -> DaoState {
        self.history.state_at(tip)
    }

    pub fn is_super(&self) -> bool {
        self.flags.super_version
    }

    /// Vote hanya dihitung selama state NIL.
    pub fn is_votable(&self, tip: u32) -> bool {
        self.state_at(tip) == DaoState::Nil
    }

    /// Payment request bisa dibuat selama proposal berstatus ACCEPTED.
    pub fn can_request_payment(&self, tip: u32) -> bool {
        self.state_at(tip) == DaoState::Accepted
    }

    /// Height pertama kali proposal ACCEPTED.
    pub fn accepted_height(&self) -> Option<u32> {
        self.history.first_height_of(DaoState::Accepted)
    }

    pub fn completed_cycles(&self, tip: u32) -> usize {
        cycles_since(&self.cycles, self.history.state_since(tip))
    }

    /// `GetAvailable`: amount dikurangi payment request yang sudah ACCEPTED.
    /// Dengan `include_pending`, payment request yang masih voting ikut dihitung.
    pub fn available<'a>(
        &self,
        requests: impl IntoIterator<Item = &'a PaymentRequest>,
        tip: u32,
        include_pending: bool,
    ) -> Amount {
        let used: Amount = requests
            .into_iter()
            .filter(|pr| pr.proposal_hash == self.hash)
            .filter(|pr| match pr.state_at(tip) {
                DaoState::Accepted => true,
                DaoState::Nil => include_pending,
                _ => false,
            })
            .map(|pr| pr.amount)
            .sum();
        self.amount - used
    }

    pub fn push_state(&mut self, height: u32, state: DaoState) -> Result<(), DaoError> {
        self.history.push(height, state)
    }

    /// Inverse dari semua perubahan di `height`. True kalau ada yang dihapus.
    pub fn remove_at(&mut self, height: u32) -> bool {
        let state = self.history.remove_at(height);
        let cycle = remove_cycle_at(&mut self.cycles, height);
        state || cycle
    }
}
