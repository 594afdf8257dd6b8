//! Token UTXO index.
//!
//! Key (40 bytes): token key hash(32) + height(4 BE) + seq(4 BE).
//! `seq` adalah urutan output token di dalam block yang sama, sehingga beberapa
//! UTXO untuk token yang sama di satu block tidak saling menimpa.
//!
//! Value: outpoint txhash(32) + spending key (var bytes) + n(4 LE).
//! Null value memakai `n == u32::MAX`.

use serde::{Deserialize, Serialize};

use crate::db::{Column, KvStore, StoreError, WriteBatch};
use crate::index::codec::{var_bytes_size, write_var_bytes, DecodeError, FixedRecord, Reader, Record};
use crate::types::Hash256;

/// Token id: content hash plus optional NFT instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenId {
    pub token: Hash256,
    pub subid: Option<u64>,
}

impl TokenId {
    pub fn fungible(token: Hash256) -> Self {
        TokenId { token, subid: None }
    }

    pub fn nft(token: Hash256, subid: u64) -> Self {
        TokenId { token, subid: Some(subid) }
    }

    pub fn is_nft(&self) -> bool {
        self.subid.is_some()
    }

    /// 32-byte key used by the index. Fungible tokens use the token hash
    /// directly; NFT instances hash the token with the sub-id.
    pub fn key_hash(&self) -> Hash256 {
        match self.subid {
            None => self.token,
            Some(subid) => {
                let mut buf = Vec::with_capacity(40);
                buf.extend_from_slice(self.token.as_bytes());
                buf.extend_from_slice(&subid.to_le_bytes());
                Hash256::digest(&buf)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TokenUtxoKey {
    pub id: Hash256,
    pub height: u32,
    pub seq: u32,
}

impl Record for TokenUtxoKey {
    const NAME: &'static str = "TokenUtxoKey";

    fn serialized_size(&self) -> usize {
        Self::SIZE
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.id.as_bytes());
        out.extend_from_slice(&self.height.to_be_bytes());
        out.extend_from_slice(&self.seq.to_be_bytes());
    }

    fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self { id: r.hash256()?, height: r.u32_be()?, seq: r.u32_be()? })
    }
}

impl FixedRecord for TokenUtxoKey {
    const SIZE: usize = 40;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenUtxoValue {
    pub hash: Hash256,
    pub spending_key: Vec<u8>,
    pub n: u32,
}

impl TokenUtxoValue {
    pub fn null() -> Self {
        TokenUtxoValue { hash: Hash256::zero(), spending_key: Vec::new(), n: u32::MAX }
    }

    pub fn is_null(&self) -> bool {
        self.n == u32::MAX
    }
}

impl Record for TokenUtxoValue {
    const NAME: &'static str = "TokenUtxoValue";

    fn serialized_size(&self) -> usize {
        32 + var_bytes_size(self.spending_key.len()) + 4
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.hash.as_bytes());
        write_var_bytes(out, &self.spending_key);
        out.extend_from_slice(&self.n.to_le_bytes());
    }

    fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self { hash: r.hash256()?, spending_key: r.var_bytes()?, n: r.u32_le()? })
    }
}

/// Perubahan token UTXO dalam satu block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenUtxoOp {
    /// Mint atau output transfer baru.
    Create { id: TokenId, value: TokenUtxoValue },
    /// Transfer / burn: UTXO lama dihapus. Value disimpan untuk disconnect.
    Spend { key: TokenUtxoKey, value: TokenUtxoValue },
}

/// Creates are numbered by their position among the block's creates.
pub fn connect_token_ops(batch: &mut WriteBatch, height: u32, ops: &[TokenUtxoOp]) {
    let mut seq = 0u32;
    for op in ops {
        match op {
            TokenUtxoOp::Create { id, value } => {
                let key = TokenUtxoKey { id: id.key_hash(), height, seq };
                seq += 1;
                batch.put(Column::TokenUtxo, key.encode(), value.encode());
            }
            TokenUtxoOp::Spend { key, .. } => batch.delete(Column::TokenUtxo, key.encode()),
        }
    }
}

pub fn disconnect_token_ops(batch: &mut WriteBatch, height: u32, ops: &[TokenUtxoOp]) {
    let mut seq = 0u32;
    for op in ops {
        match op {
            TokenUtxoOp::Create { id, .. } => {
                let key = TokenUtxoKey { id: id.key_hash(), height, seq };
                seq += 1;
                batch.delete(Column::TokenUtxo, key.encode());
            }
            TokenUtxoOp::Spend { key, value } => batch.put(Column::TokenUtxo, key.encode(), value.encode()),
        }
    }
}

/// UTXO for a token created within `from..=to` heights, in height order.
pub fn token_utxos(
    store: &dyn KvStore,
    id: &TokenId,
    from: u32,
    to: u32,
) -> Result<Vec<(TokenUtxoKey, TokenUtxoValue)>, StoreError> {
    let key_hash = id.key_hash();
    let start = TokenUtxoKey { id: key_hash, height: from, seq: 0 }.encode();
    let end = match to.checked_add(1) {
        Some(next) => Some(TokenUtxoKey { id: key_hash, height: next, seq: 0 }.encode()),
        None => crate::db::prefix_successor(key_hash.as_bytes()),
    };
    let mut out = Vec::new();
    for (k, v) in store.scan_range(Column::TokenUtxo, &start, end.as_deref())? {
        let value = TokenUtxoValue::decode(&v)?;
        if value.is_null() {
            return Err(StoreError::Corruption(format!("null token utxo stored for {}", key_hash)));
        }
        out.push((TokenUtxoKey::decode(&k)?, value));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn value(n: u32) -> TokenUtxoValue {
        TokenUtxoValue { hash: Hash256::from_bytes([n as u8; 32]), spending_key: vec![0x02; 33], n }
    }

    #[test]
    fn key_layout_is_40_bytes_with_big_endian_height() {
        let key = TokenUtxoKey { id: Hash256::from_bytes([7; 32]), height: 0x0000_0102, seq: 3 };
        let bytes = key.encode();
        assert_eq!(bytes.len(), 40);
        assert_eq!(&bytes[32..36], &[0, 0, 1, 2]);
        assert_eq!(&bytes[36..40], &[0, 0, 0, 3]);
        assert_eq!(TokenUtxoKey::decode(&bytes).expect("decode"), key);
        assert!(TokenUtxoKey::decode(&bytes[..36]).is_err());
    }

    #[test]
    fn nft_instances_have_distinct_keys() {
        let token = Hash256::from_bytes([9; 32]);
        assert_eq!(TokenId::fungible(token).key_hash(), token);
        assert_ne!(TokenId::nft(token, 1).key_hash(), TokenId::nft(token, 2).key_hash());
        assert!(TokenId::nft(token, 1).is_nft());
    }

    #[test]
    fn mint_transfer_and_disconnect() {
        let store = MemoryStore::new();
        let id = TokenId::fungible(Hash256::from_bytes([1; 32]));

        let mint = vec![
            TokenUtxoOp::Create { id, value: value(0) },
            TokenUtxoOp::Create { id, value: value(1) },
        ];
        let mut b = WriteBatch::new();
        connect_token_ops(&mut b, 100, &mint);
        store.write_batch(b).expect("write");
        let after_mint = store.dump();

        let minted = token_utxos(&store, &id, 0, u32::MAX).expect("query");
        assert_eq!(minted.len(), 2);
        assert_eq!(minted[1].0.seq, 1);

        let transfer = vec![
            TokenUtxoOp::Spend { key: minted[0].0, value: minted[0].1.clone() },
            TokenUtxoOp::Create { id, value: value(5) },
        ];
        let mut b = WriteBatch::new();
        connect_token_ops(&mut b, 101, &transfer);
        store.write_batch(b).expect("write");

        let at_101 = token_utxos(&store, &id, 101, 101).expect("query");
        assert_eq!(at_101.len(), 1);
        assert_eq!(at_101[0].1.n, 5);
        assert_eq!(token_utxos(&store, &id, 0, u32::MAX).expect("query").len(), 2);

        let mut undo = WriteBatch::new();
        disconnect_token_ops(&mut undo, 101, &transfer);
        store.write_batch(undo).expect("write");
        assert_eq!(store.dump(), after_mint);
    }

    #[test]
    fn stored_null_value_is_corruption() {
        let store = MemoryStore::new();
        let id = TokenId::fungible(Hash256::from_bytes([2; 32]));
        let mut b = WriteBatch::new();
        b.put(
            Column::TokenUtxo,
            TokenUtxoKey { id: id.key_hash(), height: 1, seq: 0 }.encode(),
            TokenUtxoValue::null().encode(),
        );
        store.write_batch(b).expect("write");
        assert!(matches!(token_utxos(&store, &id, 0, 10), Err(StoreError::Corruption(_))));
    }
}
