use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use hex::{encode as hex_encode, decode as hex_decode};
use anyhow::Result;

/// Amount in satoshi-like base units (signed, like history deltas).
pub type Amount = i64;

/// 1 coin = 10^8 base units.
pub const COIN: Amount = 100_000_000;

/// Hash160 is 20 bytes (key hash / script hash used by the address index)
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash160(pub [u8; 20]);

impl Hash160 {
    pub fn from_bytes(b: [u8; 20]) -> Self { Hash160(b) }
    pub fn zero() -> Self { Hash160([0u8; 20]) }
    pub fn as_bytes(&self) -> &[u8; 20] { &self.0 }
    pub fn is_zero(&self) -> bool { self.0 == [0u8; 20] }
    pub fn to_hex(&self) -> String { hex_encode(self.0) }
    pub fn from_hex(s: &str) -> Result<Self, anyhow::Error> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex_decode(s)?;
        if bytes.len() != 20 { anyhow::bail!("invalid hash160 length: {}", bytes.len()); }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Ok(Hash160(arr))
    }
    /// Key hash of a public key.
    pub fn of_pubkey(pubkey: &[u8]) -> Self {
        Hash160(stock_common::crypto::key_hash(pubkey))
    }
}

impl fmt::Display for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
impl fmt::Debug for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hash160").field(&self.to_hex()).finish()
    }
}
impl FromStr for Hash160 {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hash160::from_hex(s)
    }
}

/* --- serde serialize/deserialize for Hash160 as hex string --- */
impl Serialize for Hash160 {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where S: Serializer {
        serializer.serialize_str(&self.to_hex())
    }
}
impl<'de> Deserialize<'de> for Hash160 {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Hash160, D::Error>
    where D: Deserializer<'de> {
        let s = String::deserialize(deserializer)?;
        Hash160::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Hash256: SHA3-256 digest wrapper (32 bytes). Dipakai untuk hash object DAO,
/// txhash, dan token id.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn from_bytes(b: [u8; 32]) -> Self { Hash256(b) }
    pub fn zero() -> Self { Hash256([0u8; 32]) }
    pub fn as_bytes(&self) -> &[u8; 32] { &self.0 }
    pub fn to_hex(&self) -> String { hex_encode(self.0) }
    /// Content hash of arbitrary bytes.
    pub fn digest(data: &[u8]) -> Self {
        Hash256(stock_common::crypto::sha3_256(data))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hash256").field(&self.to_hex()).finish()
    }
}

impl FromStr for Hash256 {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let v = hex_decode(s)?;
        if v.len() != 32 { anyhow::bail!("invalid sha3-256 length"); }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&v);
        Ok(Hash256(arr))
    }
}

/* serde impls for Hash256 as hex string */
impl Serialize for Hash256 {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where S: Serializer {
        serializer.serialize_str(&self.to_hex())
    }
}
impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Hash256, D::Error>
    where D: Deserializer<'de> {
        let s = String::deserialize(deserializer)?;
        Hash256::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Staking script yang mengidentifikasi staker (opaque bytes).
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StakerScript(pub Vec<u8>);

impl StakerScript {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self { StakerScript(bytes.into()) }
    pub fn as_bytes(&self) -> &[u8] { &self.0 }
    pub fn to_hex(&self) -> String { hex_encode(&self.0) }
    /// Fixed 32-byte storage prefix (SHA3-256 of the script).
    pub fn key_hash(&self) -> Hash256 { Hash256::digest(&self.0) }
}

impl fmt::Display for StakerScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
impl fmt::Debug for StakerScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StakerScript").field(&self.to_hex()).finish()
    }
}
impl FromStr for StakerScript {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        Ok(StakerScript(hex_decode(s)?))
    }
}

impl Serialize for StakerScript {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where S: Serializer {
        serializer.serialize_str(&self.to_hex())
    }
}
impl<'de> Deserialize<'de> for StakerScript {
    fn deserialize<D>(deserializer: D) -> std::result::Result<StakerScript, D::Error>
    where D: Deserializer<'de> {
        let s = String::deserialize(deserializer)?;
        StakerScript::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Network selector for compiled-in consensus defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Main,
    Test,
    Regtest,
}

impl FromStr for Network {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" | "mainnet" => Ok(Network::Main),
            "test" | "testnet" => Ok(Network::Test),
            "regtest" | "devnet" => Ok(Network::Regtest),
            other => anyhow::bail!("unknown network: {}", other),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Network::Main => "main",
            Network::Test => "test",
            Network::Regtest => "regtest",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash256_hex_roundtrip() {
        let h = Hash256::digest(b"proposal");
        let parsed = Hash256::from_str(&h.to_hex()).expect("parse");
        assert_eq!(h, parsed);
        assert_eq!(h.to_hex().len(), 64);
        assert!(Hash256::from_str("abcd").is_err());
    }

    #[test]
    fn hash160_from_pubkey_deterministic() {
        let a = Hash160::of_pubkey(&[7u8; 32]);
        let b = Hash160::of_pubkey(&[7u8; 32]);
        assert_eq!(a, b);
        assert!(!a.is_zero());
        assert_eq!(Hash160::from_hex(&a.to_hex()).expect("hex"), a);
    }

    #[test]
    fn staker_script_serde_as_hex() {
        let s = StakerScript::new(vec![0x51, 0xc0, 0xff]);
        let json = serde_json::to_string(&s).expect("json");
        assert_eq!(json, "\"51c0ff\"");
        let back: StakerScript = serde_json::from_str(&json).expect("back");
        assert_eq!(back, s);
    }

    #[test]
    fn network_parse() {
        assert_eq!(Network::from_str("regtest").expect("net"), Network::Regtest);
        assert_eq!(Network::from_str("mainnet").expect("net"), Network::Main);
        assert!(Network::from_str("moon").is_err());
    }
}
