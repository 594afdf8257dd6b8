//! Simple config loader using TOML and serde.
//! Semua field optional; nilai default dipilih oleh consumer (chain crate).

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::fs;
use crate::Result;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Data directory tempat LMDB environment disimpan.
    pub data_dir: Option<String>,

    /// LMDB map size in bytes.
    pub map_size: Option<usize>,

    /// Network name: "main", "test" or "regtest".
    pub network: Option<String>,

    /// Path file JSON untuk local voting intents.
    pub intents_file: Option<String>,

    /// Override default consensus parameter, keyed by parameter name
    /// (e.g. `VOTING_CYCLE_LENGTH = 20`). Values are display values.
    #[serde(default)]
    pub consensus_overrides: BTreeMap<String, i64>,

    /// Sumber quorum untuk object dengan flag REDUCED_QUORUM.
    #[serde(default)]
    pub quorum: QuorumConfig,
}

/// Parameter name yang menyuplai quorum efektif untuk object REDUCED_QUORUM.
/// `None` berarti object memakai parameter quorum miliknya sendiri.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct QuorumConfig {
    pub proposal_reduced: Option<String>,
    pub payment_request_reduced: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: Some("./data".to_string()),
            map_size: Some(1_000_000_000),
            network: Some("main".to_string()),
            intents_file: None,
            consensus_overrides: BTreeMap::new(),
            quorum: QuorumConfig::default(),
        }
    }
}

/// Load config from a TOML file path.
/// If file is missing or parse fails, an error is returned.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
    let p = path.as_ref();
    let s = fs::read_to_string(p)?;
    let cfg: Config = toml::from_str(&s)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let def = Config::default();
        assert!(def.data_dir.is_some());
        assert_eq!(def.network.as_deref(), Some("main"));
        assert!(def.consensus_overrides.is_empty());
        assert_eq!(def.quorum, QuorumConfig::default());
    }

    #[test]
    fn test_load_from_file_roundtrip() {
        use std::io::Write;
        let tmp = tempfile::NamedTempFile::new().expect("temp file");
        let toml = r#"
            data_dir = "./mydata"
            network = "regtest"
            map_size = 1048576

            [consensus_overrides]
            VOTING_CYCLE_LENGTH = 20
            PROPOSAL_MIN_QUORUM = 7000

            [quorum]
            proposal_reduced = "PAYMENT_REQUEST_MIN_QUORUM"
        "#;
        let mut f = tmp.reopen().expect("reopen");
        write!(f, "{}", toml).expect("write");
        let path = tmp.path().to_path_buf();
        let cfg = load_from_file(path).expect("load");
        assert_eq!(cfg.network.as_deref(), Some("regtest"));
        assert_eq!(cfg.map_size, Some(1_048_576));
        assert_eq!(cfg.consensus_overrides.get("VOTING_CYCLE_LENGTH"), Some(&20));
        assert_eq!(cfg.quorum.proposal_reduced.as_deref(), Some("PAYMENT_REQUEST_MIN_QUORUM"));
        assert!(cfg.quorum.payment_request_reduced.is_none());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(load_from_file("/nonexistent/stock.toml").is_err());
    }
}
