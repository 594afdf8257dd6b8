//! # Address Index
//!
//! Record key/value untuk address unspent index, address (delta) index, dan
//! address history index, plus writer connect/disconnect dan query range-scan.
//!
//! ## Layout (CONSENSUS-CRITICAL)
//!
//! | Record | Size | Layout |
//! |--------|------|--------|
//! | `AddressUnspentKey` | 57 | type(1) + hash160(20) + txhash(32) + index(4 LE) |
//! | `AddressIndexKey` | 66 | type(1) + hash160(20) + height(4 BE) + txindex(4 BE) + txhash(32) + index(4 LE) + spending(1) |
//! | `AddressHistoryKey` | 84 | hash160(20) + hash160_2(20) + height(4 BE) + txindex(4 BE) + txhash(32) + time(4 BE) |
//! | `AddressHistoryValue` | 25 | spendable(8 LE) + stakable(8 LE) + voting_weight(8 LE) + flags(1) |
//!
//! Iterator key (prefix untuk range scan):
//!
//! | Record | Size |
//! |--------|------|
//! | `AddressIndexIteratorKey` | 21 |
//! | `AddressIndexIteratorHeightKey` | 25 |
//! | `AddressHistoryIteratorKey` | 40 |
//! | `AddressHistoryIteratorHeightKey` | 44 |

use std::collections::BTreeMap;

use crate::db::{Column, KvStore, StoreError, WriteBatch};
use crate::destination::{AddressType, TxDestination};
use crate::index::codec::{var_bytes_size, write_var_bytes, DecodeError, FixedRecord, Reader, Record};
use crate::types::{Amount, Hash160, Hash256};

fn read_address_type(r: &mut Reader<'_>) -> Result<AddressType, DecodeError> {
    let b = r.u8()?;
    AddressType::from_u8(b).ok_or_else(|| r.invalid("type", format!("unknown address type {}", b)))
}

// ════════════════════════════════════════════════════════════════════════════
// UNSPENT INDEX
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct AddressUnspentKey {
    pub address_type: AddressType,
    pub hash: Hash160,
    pub txhash: Hash256,
    pub index: u32,
}

impl Record for AddressUnspentKey {
    const NAME: &'static str = "AddressUnspentKey";

    fn serialized_size(&self) -> usize {
        Self::SIZE
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.address_type.as_u8());
        out.extend_from_slice(self.hash.as_bytes());
        out.extend_from_slice(self.txhash.as_bytes());
        out.extend_from_slice(&self.index.to_le_bytes());
    }

    fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            address_type: read_address_type(r)?,
            hash: r.hash160()?,
            txhash: r.hash256()?,
            index: r.u32_le()?,
        })
    }
}

impl FixedRecord for AddressUnspentKey {
    const SIZE: usize = 57;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressUnspentValue {
    pub satoshis: Amount,
    pub script: Vec<u8>,
    pub block_height: i32,
}

impl AddressUnspentValue {
    /// Null marker: `satoshis == -1`.
    pub fn null() -> Self {
        AddressUnspentValue { satoshis: -1, script: Vec::new(), block_height: 0 }
    }

    pub fn is_null(&self) -> bool {
        self.satoshis == -1
    }
}

impl Record for AddressUnspentValue {
    const NAME: &'static str = "AddressUnspentValue";

    fn serialized_size(&self) -> usize {
        8 + var_bytes_size(self.script.len()) + 4
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.satoshis.to_le_bytes());
        write_var_bytes(out, &self.script);
        out.extend_from_slice(&self.block_height.to_le_bytes());
    }

    fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            satoshis: r.i64_le()?,
            script: r.var_bytes()?,
            block_height: r.i32_le()?,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════
// DELTA INDEX
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct AddressIndexKey {
    pub address_type: AddressType,
    pub hash: Hash160,
    pub block_height: u32,
    pub txindex: u32,
    pub txhash: Hash256,
    pub index: u32,
    pub spending: bool,
}

impl Record for AddressIndexKey {
    const NAME: &'static str = "AddressIndexKey";

    fn serialized_size(&self) -> usize {
        Self::SIZE
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.address_type.as_u8());
        out.extend_from_slice(self.hash.as_bytes());
        // heights are stored big-endian for range scans
        out.extend_from_slice(&self.block_height.to_be_bytes());
        out.extend_from_slice(&self.txindex.to_be_bytes());
        out.extend_from_slice(self.txhash.as_bytes());
        out.extend_from_slice(&self.index.to_le_bytes());
        out.push(self.spending as u8);
    }

    fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let address_type = read_address_type(r)?;
        let hash = r.hash160()?;
        let block_height = r.u32_be()?;
        let txindex = r.u32_be()?;
        let txhash = r.hash256()?;
        let index = r.u32_le()?;
        let spending = match r.u8()? {
            0 => false,
            1 => true,
            b => return Err(r.invalid("spending", format!("expected 0 or 1, got {}", b))),
        };
        Ok(Self { address_type, hash, block_height, txindex, txhash, index, spending })
    }
}

impl FixedRecord for AddressIndexKey {
    const SIZE: usize = 66;
}

/// Prefix key: semua entry untuk satu address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressIndexIteratorKey {
    pub address_type: AddressType,
    pub hash: Hash160,
}

impl Record for AddressIndexIteratorKey {
    const NAME: &'static str = "AddressIndexIteratorKey";

    fn serialized_size(&self) -> usize {
        Self::SIZE
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.address_type.as_u8());
        out.extend_from_slice(self.hash.as_bytes());
    }

    fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self { address_type: read_address_type(r)?, hash: r.hash160()? })
    }
}

impl FixedRecord for AddressIndexIteratorKey {
    const SIZE: usize = 21;
}

/// Prefix key: entry untuk satu address mulai dari height tertentu.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressIndexIteratorHeightKey {
    pub address_type: AddressType,
    pub hash: Hash160,
    pub block_height: u32,
}

impl Record for AddressIndexIteratorHeightKey {
    const NAME: &'static str = "AddressIndexIteratorHeightKey";

    fn serialized_size(&self) -> usize {
        Self::SIZE
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.address_type.as_u8());
        out.extend_from_slice(self.hash.as_bytes());
        out.extend_from_slice(&self.block_height.to_be_bytes());
    }

    fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self { address_type: read_address_type(r)?, hash: r.hash160()?, block_height: r.u32_be()? })
    }
}

impl FixedRecord for AddressIndexIteratorHeightKey {
    const SIZE: usize = 25;
}

// ════════════════════════════════════════════════════════════════════════════
// HISTORY INDEX
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct AddressHistoryKey {
    pub hash: Hash160,
    pub hash2: Hash160,
    pub block_height: u32,
    pub txindex: u32,
    pub txhash: Hash256,
    pub time: u32,
}

impl Record for AddressHistoryKey {
    const NAME: &'static str = "AddressHistoryKey";

    fn serialized_size(&self) -> usize {
        Self::SIZE
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.hash.as_bytes());
        out.extend_from_slice(self.hash2.as_bytes());
        out.extend_from_slice(&self.block_height.to_be_bytes());
        out.extend_from_slice(&self.txindex.to_be_bytes());
        out.extend_from_slice(self.txhash.as_bytes());
        out.extend_from_slice(&self.time.to_be_bytes());
    }

    fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            hash: r.hash160()?,
            hash2: r.hash160()?,
            block_height: r.u32_be()?,
            txindex: r.u32_be()?,
            txhash: r.hash256()?,
            time: r.u32_be()?,
        })
    }
}

impl FixedRecord for AddressHistoryKey {
    const SIZE: usize = 84;
}

pub const GENERATED_FLAG: u8 = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddressHistoryValue {
    pub spendable: Amount,
    pub stakable: Amount,
    pub voting_weight: Amount,
    pub flags: u8,
}

impl AddressHistoryValue {
    pub fn is_generated(&self) -> bool {
        self.flags & GENERATED_FLAG != 0
    }
}

impl Record for AddressHistoryValue {
    const NAME: &'static str = "AddressHistoryValue";

    fn serialized_size(&self) -> usize {
        Self::SIZE
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.spendable.to_le_bytes());
        out.extend_from_slice(&self.stakable.to_le_bytes());
        out.extend_from_slice(&self.voting_weight.to_le_bytes());
        out.push(self.flags);
    }

    fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            spendable: r.i64_le()?,
            stakable: r.i64_le()?,
            voting_weight: r.i64_le()?,
            flags: r.u8()?,
        })
    }
}

impl FixedRecord for AddressHistoryValue {
    const SIZE: usize = 25;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressHistoryIteratorKey {
    pub hash: Hash160,
    pub hash2: Hash160,
}

impl Record for AddressHistoryIteratorKey {
    const NAME: &'static str = "AddressHistoryIteratorKey";

    fn serialized_size(&self) -> usize {
        Self::SIZE
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.hash.as_bytes());
        out.extend_from_slice(self.hash2.as_bytes());
    }

    fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self { hash: r.hash160()?, hash2: r.hash160()? })
    }
}

impl FixedRecord for AddressHistoryIteratorKey {
    const SIZE: usize = 40;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressHistoryIteratorHeightKey {
    pub hash: Hash160,
    pub hash2: Hash160,
    pub block_height: u32,
}

impl Record for AddressHistoryIteratorHeightKey {
    const NAME: &'static str = "AddressHistoryIteratorHeightKey";

    fn serialized_size(&self) -> usize {
        Self::SIZE
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.hash.as_bytes());
        out.extend_from_slice(self.hash2.as_bytes());
        out.extend_from_slice(&self.block_height.to_be_bytes());
    }

    fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self { hash: r.hash160()?, hash2: r.hash160()?, block_height: r.u32_be()? })
    }
}

impl FixedRecord for AddressHistoryIteratorHeightKey {
    const SIZE: usize = 44;
}

/// Filter bit untuk query history.
pub mod history_filter {
    pub const SPENDABLE: u8 = 1;
    pub const STAKABLE: u8 = 2;
    pub const VOTING_WEIGHT: u8 = 4;
    pub const GENERATED: u8 = 8;
}

/// Filter 0 = semua entry. Bit amount memilih entry yang field-nya non-zero;
/// bit GENERATED membatasi ke entry coinstake.
pub fn history_matches(value: &AddressHistoryValue, filter: u8) -> bool {
    use self::history_filter::*;
    if filter & GENERATED != 0 && !value.is_generated() {
        return false;
    }
    let amount_bits = filter & (SPENDABLE | STAKABLE | VOTING_WEIGHT);
    if amount_bits == 0 {
        return true;
    }
    (amount_bits & SPENDABLE != 0 && value.spendable != 0)
        || (amount_bits & STAKABLE != 0 && value.stakable != 0)
        || (amount_bits & VOTING_WEIGHT != 0 && value.voting_weight != 0)
}

// ════════════════════════════════════════════════════════════════════════════
// BLOCK WRITER
// ════════════════════════════════════════════════════════════════════════════

/// Output baru dari sebuah transaksi.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedOutput {
    pub dest: TxDestination,
    pub amount: Amount,
    pub script: Vec<u8>,
    pub index: u32,
}

/// Input yang menghabiskan output lama. Membawa data output lama supaya
/// disconnect bisa mengembalikan unspent entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedSpend {
    pub dest: TxDestination,
    pub amount: Amount,
    pub prev_txhash: Hash256,
    pub prev_index: u32,
    pub prev_script: Vec<u8>,
    pub prev_height: i32,
    pub input_index: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedTx {
    pub txhash: Hash256,
    pub coinstake: bool,
    pub outputs: Vec<IndexedOutput>,
    pub spends: Vec<IndexedSpend>,
}

fn amount_value(amount: Amount) -> Vec<u8> {
    amount.to_le_bytes().to_vec()
}

/// Aggregate delta per (hash, hash2) for the history index of one tx.
fn history_deltas(tx: &IndexedTx) -> BTreeMap<(Hash160, Hash160), AddressHistoryValue> {
    let mut out: BTreeMap<(Hash160, Hash160), AddressHistoryValue> = BTreeMap::new();
    let flags = if tx.coinstake { GENERATED_FLAG } else { 0 };
    let legs = tx
        .outputs
        .iter()
        .map(|o| (&o.dest, o.amount))
        .chain(tx.spends.iter().map(|s| (&s.dest, -s.amount)));
    for (dest, delta) in legs {
        for (hash, hash2, spendable, stakable, voting) in dest.history_legs() {
            let entry = out.entry((hash, hash2)).or_insert(AddressHistoryValue { flags, ..Default::default() });
            if spendable {
                entry.spendable += delta;
            }
            if stakable {
                entry.stakable += delta;
            }
            if voting {
                entry.voting_weight += delta;
            }
        }
    }
    out
}

/// Tulis semua record index untuk satu transaksi ke batch.
pub fn connect_tx(batch: &mut WriteBatch, height: u32, txindex: u32, time: u32, tx: &IndexedTx) {
    for out in &tx.outputs {
        let Some((address_type, hash)) = out.dest.index_key() else { continue };
        let key = AddressIndexKey {
            address_type,
            hash,
            block_height: height,
            txindex,
            txhash: tx.txhash,
            index: out.index,
            spending: false,
        };
        batch.put(Column::AddressIndex, key.encode(), amount_value(out.amount));

        let ukey = AddressUnspentKey { address_type, hash, txhash: tx.txhash, index: out.index };
        let uval = AddressUnspentValue { satoshis: out.amount, script: out.script.clone(), block_height: height as i32 };
        batch.put(Column::AddressUnspent, ukey.encode(), uval.encode());
    }

    for spend in &tx.spends {
        let Some((address_type, hash)) = spend.dest.index_key() else { continue };
        let key = AddressIndexKey {
            address_type,
            hash,
            block_height: height,
            txindex,
            txhash: tx.txhash,
            index: spend.input_index,
            spending: true,
        };
        batch.put(Column::AddressIndex, key.encode(), amount_value(-spend.amount));

        let ukey = AddressUnspentKey { address_type, hash, txhash: spend.prev_txhash, index: spend.prev_index };
        batch.delete(Column::AddressUnspent, ukey.encode());
    }

    for ((hash, hash2), value) in history_deltas(tx) {
        let key = AddressHistoryKey { hash, hash2, block_height: height, txindex, txhash: tx.txhash, time };
        batch.put(Column::AddressHistory, key.encode(), value.encode());
    }
}

/// Inverse of [`connect_tx`]: hapus record yang ditulis dan kembalikan unspent
/// entry untuk output yang di-spend.
pub fn disconnect_tx(batch: &mut WriteBatch, height: u32, txindex: u32, time: u32, tx: &IndexedTx) {
    for out in &tx.outputs {
        let Some((address_type, hash)) = out.dest.index_key() else { continue };
        let key = AddressIndexKey {
            address_type,
            hash,
            block_height: height,
            txindex,
            txhash: tx.txhash,
            index: out.index,
            spending: false,
        };
        batch.delete(Column::AddressIndex, key.encode());
        let ukey = AddressUnspentKey { address_type, hash, txhash: tx.txhash, index: out.index };
        batch.delete(Column::AddressUnspent, ukey.encode());
    }

    for spend in &tx.spends {
        let Some((address_type, hash)) = spend.dest.index_key() else { continue };
        let key = AddressIndexKey {
            address_type,
            hash,
            block_height: height,
            txindex,
            txhash: tx.txhash,
            index: spend.input_index,
            spending: true,
        };
        batch.delete(Column::AddressIndex, key.encode());
        let ukey = AddressUnspentKey { address_type, hash, txhash: spend.prev_txhash, index: spend.prev_index };
        let uval = AddressUnspentValue {
            satoshis: spend.amount,
            script: spend.prev_script.clone(),
            block_height: spend.prev_height,
        };
        batch.put(Column::AddressUnspent, ukey.encode(), uval.encode());
    }

    for (hash, hash2) in history_deltas(tx).into_keys() {
        let key = AddressHistoryKey { hash, hash2, block_height: height, txindex, txhash: tx.txhash, time };
        batch.delete(Column::AddressHistory, key.encode());
    }
}

// ════════════════════════════════════════════════════════════════════════════
// QUERIES
// ════════════════════════════════════════════════════════════════════════════

fn decode_amount(bytes: &[u8]) -> Result<Amount, StoreError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| DecodeError::Truncated { record: "AddressIndexValue", needed: 8, remaining: bytes.len() })?;
    Ok(i64::from_le_bytes(arr))
}

/// Delta entries for an address, optionally limited to `start..=end` heights.
pub fn address_index(
    store: &dyn KvStore,
    address_type: AddressType,
    hash: Hash160,
    range: Option<(u32, u32)>,
) -> Result<Vec<(AddressIndexKey, Amount)>, StoreError> {
    let rows = match range {
        None => store.scan_prefix(Column::AddressIndex, &AddressIndexIteratorKey { address_type, hash }.encode())?,
        Some((start, end)) => {
            let from = AddressIndexIteratorHeightKey { address_type, hash, block_height: start }.encode();
            let to = match end.checked_add(1) {
                Some(next) => Some(AddressIndexIteratorHeightKey { address_type, hash, block_height: next }.encode()),
                None => crate::db::prefix_successor(&AddressIndexIteratorKey { address_type, hash }.encode()),
            };
            store.scan_range(Column::AddressIndex, &from, to.as_deref())?
        }
    };
    rows.into_iter()
        .map(|(k, v)| -> Result<_, StoreError> { Ok((AddressIndexKey::decode(&k)?, decode_amount(&v)?)) })
        .collect()
}

pub fn address_unspent(
    store: &dyn KvStore,
    address_type: AddressType,
    hash: Hash160,
) -> Result<Vec<(AddressUnspentKey, AddressUnspentValue)>, StoreError> {
    let prefix = AddressIndexIteratorKey { address_type, hash }.encode();
    store
        .scan_prefix(Column::AddressUnspent, &prefix)?
        .into_iter()
        .map(|(k, v)| -> Result<_, StoreError> { Ok((AddressUnspentKey::decode(&k)?, AddressUnspentValue::decode(&v)?)) })
        .collect()
}

/// History entries for `(hash, hash2)` within `start..=end`, filtered by
/// [`history_filter`] bits.
pub fn address_history(
    store: &dyn KvStore,
    hash: Hash160,
    hash2: Hash160,
    start: u32,
    end: u32,
    filter: u8,
) -> Result<Vec<(AddressHistoryKey, AddressHistoryValue)>, StoreError> {
    let from = AddressHistoryIteratorHeightKey { hash, hash2, block_height: start }.encode();
    let to = match end.checked_add(1) {
        Some(next) => Some(AddressHistoryIteratorHeightKey { hash, hash2, block_height: next }.encode()),
        None => crate::db::prefix_successor(&AddressHistoryIteratorKey { hash, hash2 }.encode()),
    };
    let mut out = Vec::new();
    for (k, v) in store.scan_range(Column::AddressHistory, &from, to.as_deref())? {
        let key = AddressHistoryKey::decode(&k)?;
        let value = AddressHistoryValue::decode(&v)?;
        if history_matches(&value, filter) {
            out.push((key, value));
        }
    }
    Ok(out)
}

/// `(balance, received)` dari delta index: received = jumlah delta positif.
pub fn address_balance(store: &dyn KvStore, address_type: AddressType, hash: Hash160) -> Result<(Amount, Amount), StoreError> {
    let mut balance = 0;
    let mut received = 0;
    for (key, amount) in address_index(store, address_type, hash, None)? {
        balance += amount;
        if !key.spending && amount > 0 {
            received += amount;
        }
    }
    Ok((balance, received))
}
