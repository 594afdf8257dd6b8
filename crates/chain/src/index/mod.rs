//! Key/value schema layer: codec, address index, token UTXO index.

pub mod codec;
pub mod address;
pub mod token;

pub use codec::{DecodeError, FixedRecord, Record};
