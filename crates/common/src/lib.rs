//! # Stock Common Crate
//!
//! Utilitas bersama untuk node governance.
//!
//! ## Modules
//! - `config`: Configuration management (TOML)
//! - `crypto`: SHA3 digest, key hash, Ed25519 sign/verify

pub mod config;
pub mod crypto;

pub use config::{Config, load_from_file};

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
