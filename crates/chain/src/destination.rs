//! # Transaction Destination
//!
//! Sum type tertutup untuk semua jenis tujuan output yang dikenal oleh
//! governance dan address index.
//!
//! | Variant | Index type | hash / hash2 |
//! |---------|-----------|--------------|
//! | `NoDestination` | - | tidak di-index |
//! | `KeyId` | `PubKeyHash` (1) | key / - |
//! | `ScriptId` | `ScriptHash` (2) | script / - |
//! | `ColdStaking` | `ColdStaking` (3) | staking / spending |
//! | `ColdStakingV2` | `ColdStakingV2` (4) | staking / spending (+ voting) |
//! | `BlsctDoubleKey` | - | tidak di-index (confidential) |
//! | `Script` | - | tidak di-index (raw script) |

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::Hash160;

/// Address type byte used as the first field of address index keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum AddressType {
    PubKeyHash = 1,
    ScriptHash = 2,
    ColdStaking = 3,
    ColdStakingV2 = 4,
}

impl AddressType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(AddressType::PubKeyHash),
            2 => Some(AddressType::ScriptHash),
            3 => Some(AddressType::ColdStaking),
            4 => Some(AddressType::ColdStakingV2),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxDestination {
    NoDestination,
    KeyId(Hash160),
    ScriptId(Hash160),
    ColdStaking { staking: Hash160, spending: Hash160 },
    ColdStakingV2 { staking: Hash160, spending: Hash160, voting: Hash160 },
    BlsctDoubleKey { view: Vec<u8>, spend: Vec<u8> },
    Script(Vec<u8>),
}

impl TxDestination {
    pub fn is_valid(&self) -> bool {
        !matches!(self, TxDestination::NoDestination)
    }

    /// Address type and primary hash for the unspent / index records.
    /// Confidential and raw destinations are not indexed.
    pub fn index_key(&self) -> Option<(AddressType, Hash160)> {
        match self {
            TxDestination::KeyId(h) => Some((AddressType::PubKeyHash, *h)),
            TxDestination::ScriptId(h) => Some((AddressType::ScriptHash, *h)),
            TxDestination::ColdStaking { staking, .. } => Some((AddressType::ColdStaking, *staking)),
            TxDestination::ColdStakingV2 { staking, .. } => Some((AddressType::ColdStakingV2, *staking)),
            _ => None,
        }
    }

    /// History legs of a value delta for this destination.
    ///
    /// Every leg is `(hash, hash2, spendable, stakable, voting_weight)` expressed
    /// as multipliers (0 or 1) of the delta. Cold staking splits the delta
    /// between the spending key and the staking key; v2 adds a voting key.
    pub fn history_legs(&self) -> Vec<(Hash160, Hash160, bool, bool, bool)> {
        match self {
            TxDestination::KeyId(h) | TxDestination::ScriptId(h) => {
                vec![(*h, Hash160::zero(), true, true, true)]
            }
            TxDestination::ColdStaking { staking, spending } => vec![
                (*spending, *staking, true, false, false),
                (*staking, *spending, false, true, true),
            ],
            TxDestination::ColdStakingV2 { staking, spending, voting } => vec![
                (*spending, *staking, true, false, false),
                (*staking, *spending, false, true, false),
                (*voting, *spending, false, false, true),
            ],
            _ => Vec::new(),
        }
    }
}

/// Ownership oracle: "is this destination mine". Dipakai untuk filter
/// `mine` di daftar proposal.
pub trait AddressOwnership {
    fn is_mine(&self, dest: &TxDestination) -> bool;
}

/// Ownership set sederhana berdasarkan key hash / script hash / BLSCT view key
/// yang dimiliki wallet lokal.
#[derive(Clone, Debug, Default)]
pub struct OwnedKeys {
    pub key_ids: BTreeSet<Hash160>,
    pub script_ids: BTreeSet<Hash160>,
    pub blsct_view_keys: BTreeSet<Vec<u8>>,
}

impl OwnedKeys {
    pub fn with_key(mut self, key: Hash160) -> Self {
        self.key_ids.insert(key);
        self
    }
}

impl AddressOwnership for OwnedKeys {
    fn is_mine(&self, dest: &TxDestination) -> bool {
        match dest {
            TxDestination::NoDestination | TxDestination::Script(_) => false,
            TxDestination::KeyId(h) => self.key_ids.contains(h),
            TxDestination::ScriptId(h) => self.script_ids.contains(h),
            TxDestination::ColdStaking { staking, spending } => {
                self.key_ids.contains(staking) || self.key_ids.contains(spending)
            }
            TxDestination::ColdStakingV2 { staking, spending, voting } => {
                self.key_ids.contains(staking)
                    || self.key_ids.contains(spending)
                    || self.key_ids.contains(voting)
            }
            TxDestination::BlsctDoubleKey { view, .. } => self.blsct_view_keys.contains(view),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(b: u8) -> Hash160 {
        Hash160::from_bytes([b; 20])
    }

    #[test]
    fn index_key_per_variant() {
        assert_eq!(TxDestination::KeyId(h(1)).index_key(), Some((AddressType::PubKeyHash, h(1))));
        assert_eq!(TxDestination::ScriptId(h(2)).index_key(), Some((AddressType::ScriptHash, h(2))));
        let cs = TxDestination::ColdStaking { staking: h(3), spending: h(4) };
        assert_eq!(cs.index_key(), Some((AddressType::ColdStaking, h(3))));
        assert_eq!(TxDestination::NoDestination.index_key(), None);
        assert_eq!(TxDestination::Script(vec![0x6a]).index_key(), None);
    }

    #[test]
    fn cold_staking_splits_history_legs() {
        let cs = TxDestination::ColdStaking { staking: h(3), spending: h(4) };
        let legs = cs.history_legs();
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0], (h(4), h(3), true, false, false));
        assert_eq!(legs[1], (h(3), h(4), false, true, true));

        let plain = TxDestination::KeyId(h(9)).history_legs();
        assert_eq!(plain, vec![(h(9), Hash160::zero(), true, true, true)]);
    }

    #[test]
    fn owned_keys_ownership() {
        let keys = OwnedKeys::default().with_key(h(4));
        assert!(keys.is_mine(&TxDestination::KeyId(h(4))));
        assert!(!keys.is_mine(&TxDestination::KeyId(h(5))));
        assert!(keys.is_mine(&TxDestination::ColdStaking { staking: h(1), spending: h(4) }));
        assert!(!keys.is_mine(&TxDestination::NoDestination));
    }

    #[test]
    fn address_type_byte_roundtrip() {
        for t in [AddressType::PubKeyHash, AddressType::ScriptHash, AddressType::ColdStaking, AddressType::ColdStakingV2] {
            assert_eq!(AddressType::from_u8(t.as_u8()), Some(t));
        }
        assert_eq!(AddressType::from_u8(0), None);
    }
}
