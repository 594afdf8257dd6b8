//! # Ordered Key/Value Store
//!
//! Abstraksi store yang dipakai governance engine dan address/token index.
//!
//! | Type | Fungsi |
//! |------|--------|
//! | `Column` | Bucket (named database) tempat record disimpan |
//! | `WriteBatch` | Kumpulan put/delete yang di-commit atomik (satu batch per block) |
//! | `KvStore` | Trait store: point lookup, range scan, atomic batch write |
//! | `MemoryStore` | Implementasi in-memory (BTreeMap), dipakai test |
//! | `LmdbStore` | Implementasi LMDB, satu named database per column |
//!
//! Urutan key adalah urutan byte (lexicographic). Semua key format di module
//! `index` dan `dao::engine` bergantung pada properti ini.

use lmdb::{Cursor, Database, DatabaseFlags, Environment, Transaction as LmdbTxn, WriteFlags};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::index::codec::DecodeError;

// ════════════════════════════════════════════════════════════════════════════
// ERROR TYPE
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum StoreError {
    /// Error dari LMDB environment / transaction
    #[error("lmdb error: {0}")]
    Lmdb(#[from] lmdb::Error),

    /// IO error umum
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record index tidak bisa di-decode: store korup
    #[error("corrupted record: {0}")]
    Decode(#[from] DecodeError),

    /// bincode gagal (serialize / deserialize)
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Isi store tidak konsisten dengan invariant
    #[error("store corruption: {0}")]
    Corruption(String),
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// BUCKET CONSTANTS
// ════════════════════════════════════════════════════════════════════════════
// Key formats are CONSENSUS-CRITICAL. Do not modify without hard fork.
// ════════════════════════════════════════════════════════════════════════════

/// Address index bucket
/// Key: AddressIndexKey (66 bytes)
/// Value: amount (i64 LE, negative for spends)
pub const BUCKET_ADDRESS_INDEX: &str = "address_index";

/// Address unspent bucket
/// Key: AddressUnspentKey (57 bytes)
/// Value: AddressUnspentValue
pub const BUCKET_ADDRESS_UNSPENT: &str = "address_unspent";

/// Address history bucket
/// Key: AddressHistoryKey (84 bytes)
/// Value: AddressHistoryValue (25 bytes)
pub const BUCKET_ADDRESS_HISTORY: &str = "address_history";

/// Token UTXO bucket
/// Key: TokenUtxoKey (40 bytes)
/// Value: TokenUtxoValue
pub const BUCKET_TOKEN_UTXO: &str = "token_utxo";

/// DAO objects bucket
/// Key: kind (1 byte) + object hash (32 bytes)
/// Value: bincode serialized object (proposal / payment request / consultation / answer)
pub const BUCKET_DAO_OBJECTS: &str = "dao_objects";

/// Vote list bucket
/// Key: SHA3-256(staker script) (32 bytes) + height (u32 BE)
/// Value: bincode serialized staker votes at that height
pub const BUCKET_VOTE_LIST: &str = "vote_list";

/// Consensus parameter overlay bucket
/// Key: parameter id (1 byte) + height (u32 BE)
/// Value: bincode serialized overlay entry
pub const BUCKET_CONSENSUS_PARAMS: &str = "consensus_params";

/// Meta bucket
/// Key: "tip" | "b" + height (u32 BE)
/// Value: tip height (u32 BE) | bincode serialized block meta
pub const BUCKET_META: &str = "meta";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    AddressIndex,
    AddressUnspent,
    AddressHistory,
    TokenUtxo,
    DaoObjects,
    VoteList,
    ConsensusParams,
    Meta,
}

impl Column {
    pub const ALL: [Column; 8] = [
        Column::AddressIndex,
        Column::AddressUnspent,
        Column::AddressHistory,
        Column::TokenUtxo,
        Column::DaoObjects,
        Column::VoteList,
        Column::ConsensusParams,
        Column::Meta,
    ];

    pub fn bucket_name(self) -> &'static str {
        match self {
            Column::AddressIndex => BUCKET_ADDRESS_INDEX,
            Column::AddressUnspent => BUCKET_ADDRESS_UNSPENT,
            Column::AddressHistory => BUCKET_ADDRESS_HISTORY,
            Column::TokenUtxo => BUCKET_TOKEN_UTXO,
            Column::DaoObjects => BUCKET_DAO_OBJECTS,
            Column::VoteList => BUCKET_VOTE_LIST,
            Column::ConsensusParams => BUCKET_CONSENSUS_PARAMS,
            Column::Meta => BUCKET_META,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// WRITE BATCH
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOperation {
    Put { column: Column, key: Vec<u8>, value: Vec<u8> },
    Delete { column: Column, key: Vec<u8> },
}

/// Operasi ditulis berurutan; operasi terakhir untuk key yang sama menang.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    operations: Vec<BatchOperation>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, column: Column, key: Vec<u8>, value: Vec<u8>) {
        self.operations.push(BatchOperation::Put { column, key, value });
    }

    pub fn delete(&mut self, column: Column, key: Vec<u8>) {
        self.operations.push(BatchOperation::Delete { column, key });
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[BatchOperation] {
        &self.operations
    }

    pub fn extend(&mut self, other: WriteBatch) {
        self.operations.extend(other.operations);
    }
}

// ════════════════════════════════════════════════════════════════════════════
// STORE TRAIT
// ════════════════════════════════════════════════════════════════════════════

pub type KvPairs = Vec<(Vec<u8>, Vec<u8>)>;

pub trait KvStore: Send + Sync {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Commit seluruh batch secara atomik: semua operasi atau tidak sama sekali.
    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Semua entry dengan `start <= key < end` (end `None` = sampai akhir), urut byte.
    fn scan_range(&self, column: Column, start: &[u8], end: Option<&[u8]>) -> Result<KvPairs, StoreError>;

    fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<KvPairs, StoreError> {
        let end = prefix_successor(prefix);
        self.scan_range(column, prefix, end.as_deref())
    }
}

/// Smallest key that sorts after every key starting with `prefix`.
/// `None` when the prefix is all 0xff (scan to the end).
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut out = prefix.to_vec();
    while let Some(last) = out.pop() {
        if last != 0xff {
            out.push(last + 1);
            return Some(out);
        }
    }
    None
}

// ════════════════════════════════════════════════════════════════════════════
// MEMORY STORE
// ════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct MemoryStore {
    columns: RwLock<BTreeMap<Column, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full copy of the store contents, for state comparison in tests.
    pub fn dump(&self) -> BTreeMap<Column, BTreeMap<Vec<u8>, Vec<u8>>> {
        let cols = self.columns.read();
        cols.iter()
            .filter(|(_, m)| !m.is_empty())
            .map(|(c, m)| (*c, m.clone()))
            .collect()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let cols = self.columns.read();
        Ok(cols.get(&column).and_then(|m| m.get(key).cloned()))
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut cols = self.columns.write();
        for op in batch.operations {
            match op {
                BatchOperation::Put { column, key, value } => {
                    cols.entry(column).or_default().insert(key, value);
                }
                BatchOperation::Delete { column, key } => {
                    if let Some(m) = cols.get_mut(&column) {
                        m.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    fn scan_range(&self, column: Column, start: &[u8], end: Option<&[u8]>) -> Result<KvPairs, StoreError> {
        let cols = self.columns.read();
        let Some(m) = cols.get(&column) else {
            return Ok(Vec::new());
        };
        Ok(m.range(start.to_vec()..)
            .take_while(|(k, _)| end.map_or(true, |e| k.as_slice() < e))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// LMDB STORE
// ════════════════════════════════════════════════════════════════════════════

pub const DEFAULT_MAP_SIZE: usize = 1_000_000_000;

pub struct LmdbStore {
    env: Arc<Environment>,
    env_path: PathBuf,
    dbs: HashMap<Column, Database>,
}

impl LmdbStore {
    /// Open LMDB environment at path, create named DBs
    pub fn open(path: impl AsRef<Path>, map_size: usize) -> Result<Self, StoreError> {
        let p = path.as_ref();
        std::fs::create_dir_all(p)?;

        let env = Environment::new()
            .set_max_dbs(Column::ALL.len() as u32)
            .set_map_size(map_size)
            .open(p)?;

        let mut dbs = HashMap::new();
        for column in Column::ALL {
            let db = env.create_db(Some(column.bucket_name()), DatabaseFlags::empty())?;
            dbs.insert(column, db);
        }

        debug!(path = %p.display(), map_size, "lmdb store opened");
        Ok(Self { env: Arc::new(env), env_path: p.to_path_buf(), dbs })
    }

    pub fn path(&self) -> &Path {
        &self.env_path
    }

    fn db(&self, column: Column) -> Result<Database, StoreError> {
        self.dbs
            .get(&column)
            .copied()
            .ok_or_else(|| StoreError::Corruption(format!("bucket {} not opened", column.bucket_name())))
    }
}

impl KvStore for LmdbStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let db = self.db(column)?;
        let rtxn = self.env.begin_ro_txn()?;
        match rtxn.get(db, &key) {
            Ok(v) => Ok(Some(v.to_vec())),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut wtxn = self.env.begin_rw_txn()?;
        for op in batch.operations {
            match op {
                BatchOperation::Put { column, key, value } => {
                    wtxn.put(self.db(column)?, &key, &value, WriteFlags::empty())?;
                }
                BatchOperation::Delete { column, key } => {
                    match wtxn.del(self.db(column)?, &key, None) {
                        Ok(_) | Err(lmdb::Error::NotFound) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
        wtxn.commit()?;
        Ok(())
    }

    fn scan_range(&self, column: Column, start: &[u8], end: Option<&[u8]>) -> Result<KvPairs, StoreError> {
        let db = self.db(column)?;
        let rtxn = self.env.begin_ro_txn()?;
        let mut out = Vec::new();
        {
            // jangan pakai iter_from(): unwrap MDB_SET_RANGE di lmdb 0.8
            let mut cursor = rtxn.open_ro_cursor(db)?;
            for (key, val) in cursor.iter() {
                if key < start {
                    continue;
                }
                if end.map_or(false, |e| key >= e) {
                    break;
                }
                out.push((key.to_vec(), val.to_vec()));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_successor_carries() {
        assert_eq!(prefix_successor(&[0x01, 0x02]), Some(vec![0x01, 0x03]));
        assert_eq!(prefix_successor(&[0x01, 0xff]), Some(vec![0x02]));
        assert_eq!(prefix_successor(&[0xff, 0xff]), None);
        assert_eq!(prefix_successor(&[]), None);
    }

    #[test]
    fn memory_store_batch_last_write_wins() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put(Column::Meta, b"k".to_vec(), b"1".to_vec());
        batch.put(Column::Meta, b"k".to_vec(), b"2".to_vec());
        batch.put(Column::Meta, b"gone".to_vec(), b"x".to_vec());
        batch.delete(Column::Meta, b"gone".to_vec());
        store.write_batch(batch).expect("write");

        assert_eq!(store.get(Column::Meta, b"k").expect("get"), Some(b"2".to_vec()));
        assert_eq!(store.get(Column::Meta, b"gone").expect("get"), None);
        assert_eq!(store.get(Column::VoteList, b"k").expect("get"), None);
    }

    #[test]
    fn memory_store_scan_prefix_is_byte_ordered() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        for key in [vec![1u8, 3], vec![1, 1], vec![2, 0], vec![1, 2], vec![0, 9]] {
            batch.put(Column::AddressIndex, key, vec![]);
        }
        store.write_batch(batch).expect("write");

        let keys: Vec<Vec<u8>> = store
            .scan_prefix(Column::AddressIndex, &[1])
            .expect("scan")
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![vec![1, 1], vec![1, 2], vec![1, 3]]);

        let ranged = store
            .scan_range(Column::AddressIndex, &[1, 2], Some(&[2, 0]))
            .expect("range");
        assert_eq!(ranged.len(), 2);
    }

    #[test]
    fn lmdb_store_batch_and_scan() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LmdbStore::open(dir.path(), 10 * 1024 * 1024).expect("open");

        let mut batch = WriteBatch::new();
        batch.put(Column::VoteList, vec![5, 0, 0, 0, 2], b"b".to_vec());
        batch.put(Column::VoteList, vec![5, 0, 0, 0, 1], b"a".to_vec());
        batch.put(Column::VoteList, vec![6, 0, 0, 0, 1], b"c".to_vec());
        store.write_batch(batch).expect("write");

        let rows = store.scan_prefix(Column::VoteList, &[5]).expect("scan");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1, b"a".to_vec());
        assert_eq!(rows[1].1, b"b".to_vec());

        let mut del = WriteBatch::new();
        del.delete(Column::VoteList, vec![5, 0, 0, 0, 1]);
        del.delete(Column::VoteList, vec![9, 9]);
        store.write_batch(del).expect("delete missing key is not an error");
        assert_eq!(store.get(Column::VoteList, &[5, 0, 0, 0, 1]).expect("get"), None);
        assert_eq!(store.get(Column::VoteList, &[6, 0, 0, 0, 1]).expect("get"), Some(b"c".to_vec()));
    }

    #[test]
    fn lmdb_store_scan_empty_and_past_end() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LmdbStore::open(dir.path(), 10 * 1024 * 1024).expect("open");

        // column kosong, start kosong
        assert!(store.scan_range(Column::TokenUtxo, &[], None).expect("empty column").is_empty());
        assert!(store.scan_prefix(Column::TokenUtxo, &[0x01]).expect("empty prefix").is_empty());

        let mut batch = WriteBatch::new();
        batch.put(Column::AddressHistory, vec![0x10; 4], b"x".to_vec());
        store.write_batch(batch).expect("write");

        assert!(store.scan_prefix(Column::AddressHistory, &[0x20]).expect("past last key").is_empty());
        assert_eq!(store.scan_range(Column::AddressHistory, &[], None).expect("full scan").len(), 1);
        assert_eq!(store.scan_prefix(Column::AddressHistory, &[0x10]).expect("hit").len(), 1);
    }
}
