//! Record codec untuk sorted key/value store.
//!
//! Aturan encoding (CONSENSUS-CRITICAL):
//! - Integer yang ikut menentukan urutan key (height, txindex, time) ditulis
//!   big-endian supaya urutan byte == urutan numerik.
//! - Integer lain ditulis little-endian.
//! - Byte string variable-length diawali compact size.
//!
//! `decode` menolak input terpotong maupun sisa byte: store dianggap korup.

use thiserror::Error;

use crate::types::{Hash160, Hash256};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{record}: truncated input (needed {needed} bytes, {remaining} remaining)")]
    Truncated { record: &'static str, needed: usize, remaining: usize },

    #[error("{record}: {extra} trailing bytes")]
    TrailingBytes { record: &'static str, extra: usize },

    #[error("{record}: invalid field {field}: {detail}")]
    InvalidField { record: &'static str, field: &'static str, detail: String },
}

/// Cursor baca atas slice byte milik satu record.
pub struct Reader<'a> {
    record: &'static str,
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(record: &'static str, buf: &'a [u8]) -> Self {
        Reader { record, buf, pos: 0 }
    }

    pub fn record(&self) -> &'static str {
        self.record
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.buf.len() - self.pos;
        if remaining < n {
            return Err(DecodeError::Truncated { record: self.record, needed: n, remaining });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.take(N)?);
        Ok(arr)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn u32_be(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn u32_le(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn i32_le(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn i64_le(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    pub fn hash160(&mut self) -> Result<Hash160, DecodeError> {
        Ok(Hash160(self.array()?))
    }

    pub fn hash256(&mut self) -> Result<Hash256, DecodeError> {
        Ok(Hash256(self.array()?))
    }

    /// Compact-size prefixed byte string.
    pub fn var_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.compact_size()?;
        let len = usize::try_from(len).map_err(|_| self.invalid("length", format!("{} too large", len)))?;
        Ok(self.take(len)?.to_vec())
    }

    fn compact_size(&mut self) -> Result<u64, DecodeError> {
        let first = self.u8()?;
        let (value, min) = match first {
            0xfd => (u16::from_le_bytes(self.array()?) as u64, 0xfd),
            0xfe => (u32::from_le_bytes(self.array()?) as u64, 0x1_0000),
            0xff => (u64::from_le_bytes(self.array()?), 0x1_0000_0000),
            b => return Ok(b as u64),
        };
        if value < min {
            return Err(self.invalid("compact_size", format!("non-canonical encoding of {}", value)));
        }
        Ok(value)
    }

    pub fn invalid(&self, field: &'static str, detail: String) -> DecodeError {
        DecodeError::InvalidField { record: self.record, field, detail }
    }

    pub fn finish(self) -> Result<(), DecodeError> {
        let extra = self.buf.len() - self.pos;
        if extra != 0 {
            return Err(DecodeError::TrailingBytes { record: self.record, extra });
        }
        Ok(())
    }
}

pub fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    let len = bytes.len() as u64;
    match len {
        0..=0xfc => out.push(len as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(len as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(len as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&len.to_le_bytes());
        }
    }
    out.extend_from_slice(bytes);
}

pub fn var_bytes_size(len: usize) -> usize {
    let prefix = match len as u64 {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    };
    prefix + len
}

/// Record dengan encoding deterministik.
///
/// `serialized_size` harus sama dengan panjang output `encode`; mismatch adalah
/// bug program (dicek dengan `debug_assert`), bukan error runtime.
pub trait Record: Sized {
    const NAME: &'static str;

    fn serialized_size(&self) -> usize;

    fn write_to(&self, out: &mut Vec<u8>);

    fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError>;

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_size());
        self.write_to(&mut out);
        debug_assert_eq!(out.len(), self.serialized_size(), "{} size mismatch", Self::NAME);
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(Self::NAME, bytes);
        let rec = Self::read_from(&mut r)?;
        r.finish()?;
        Ok(rec)
    }
}

/// Record dengan panjang tetap (semua key index).
pub trait FixedRecord: Record {
    const SIZE: usize;
}
