//! Crypto helpers: SHA3 digests, key-hash derivation, Ed25519 keypair, sign, verify.
//! Compatible with ed25519-dalek v2.2.0 + rand_core feature enabled.
//!
//! Combined key format (64 bytes):
//!   [0..32]  = private key bytes
//!   [32..64] = public key bytes
//!
//! Key hash (20 bytes) = first 20 bytes of SHA3-256(pubkey). Dipakai sebagai
//! identitas owner proposal dan sebagai `hash160` di address index.

use ed25519_dalek::{Signer, Verifier, Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha3::{Digest, Sha3_256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, found {found}")]
    InvalidKeyLength { expected: usize, found: usize },

    #[error("verification failed")]
    VerifyFailed,
}

/// SHA3-256 digest of arbitrary bytes.
pub fn sha3_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    let out = hasher.finalize();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&out);
    arr
}

/// 20-byte key hash of a public key (first 20 bytes of SHA3-256).
pub fn key_hash(pubkey_bytes: &[u8]) -> [u8; 20] {
    let digest = sha3_256(pubkey_bytes);
    let mut arr = [0u8; 20];
    arr.copy_from_slice(&digest[..20]);
    arr
}

/// Generate a new Ed25519 keypair and return concatenated 64-byte (private + public).
pub fn generate_keypair_bytes() -> Result<Vec<u8>, CryptoError> {
    let mut rng = OsRng;
    let sk = SigningKey::generate(&mut rng);
    let vk = sk.verifying_key();

    let mut combined = Vec::with_capacity(64);
    combined.extend_from_slice(&sk.to_bytes());
    combined.extend_from_slice(&vk.to_bytes());
    Ok(combined)
}

fn signing_key_from_bytes(bytes: &[u8]) -> Result<SigningKey, CryptoError> {
    if bytes.len() != 64 {
        return Err(CryptoError::InvalidKeyLength { expected: 64, found: bytes.len() });
    }
    let mut sk_bytes = [0u8; 32];
    sk_bytes.copy_from_slice(&bytes[0..32]);
    Ok(SigningKey::from_bytes(&sk_bytes))
}

/// Extract public key bytes from 64-byte keypair.
pub fn public_key_bytes_from_keypair_bytes(kp_bytes: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if kp_bytes.len() != 64 {
        return Err(CryptoError::InvalidKeyLength { expected: 64, found: kp_bytes.len() });
    }
    Ok(kp_bytes[32..64].to_vec())
}

/// Sign a message and return 64-byte signature.
pub fn sign_message(kp_bytes: &[u8], message: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let sk = signing_key_from_bytes(kp_bytes)?;
    let sig = sk.sign(message);
    Ok(sig.to_bytes().to_vec())
}

/// Verify a message given public key and signature.
pub fn verify_signature(pubkey_bytes: &[u8], message: &[u8], sig_bytes: &[u8]) -> Result<bool, CryptoError> {
    if pubkey_bytes.len() != 32 {
        return Err(CryptoError::InvalidKeyLength { expected: 32, found: pubkey_bytes.len() });
    }
    if sig_bytes.len() != 64 {
        return Err(CryptoError::InvalidKeyLength { expected: 64, found: sig_bytes.len() });
    }

    let mut pk_arr = [0u8; 32];
    pk_arr.copy_from_slice(pubkey_bytes);
    let vk = VerifyingKey::from_bytes(&pk_arr).map_err(|_| CryptoError::VerifyFailed)?;

    let mut sig_arr = [0u8; 64];
    sig_arr.copy_from_slice(sig_bytes);
    let sig = Signature::from_bytes(&sig_arr);

    match vk.verify(message, &sig) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_roundtrip() {
        let kp_bytes = generate_keypair_bytes().expect("generate kp");
        let pub_bytes = public_key_bytes_from_keypair_bytes(&kp_bytes).expect("pub bytes");
        let msg = b"I kindly ask to withdraw";
        let sig = sign_message(&kp_bytes, msg).expect("sign");
        let ok = verify_signature(&pub_bytes, msg, &sig).expect("verify");
        assert!(ok, "signature should verify");

        let ok2 = verify_signature(&pub_bytes, b"I kindly ask to withdraw!", &sig).expect("verify");
        assert!(!ok2, "tampered message should fail verify");
    }

    #[test]
    fn test_key_hash_is_prefix_of_digest() {
        let digest = sha3_256(b"pubkey");
        let kh = key_hash(b"pubkey");
        assert_eq!(&digest[..20], &kh[..]);
        assert_ne!(sha3_256(b"a"), sha3_256(b"b"));
    }

    #[test]
    fn test_bad_signature_length_rejected() {
        let kp_bytes = generate_keypair_bytes().expect("generate kp");
        let pub_bytes = public_key_bytes_from_keypair_bytes(&kp_bytes).expect("pub bytes");
        let err = verify_signature(&pub_bytes, b"msg", &[0u8; 10]);
        assert!(matches!(err, Err(CryptoError::InvalidKeyLength { expected: 64, found: 10 })));
    }
}
