//! Document result encryption at rest.
//!
//! A result is stored as base64(nonce ‖ AES-256-GCM ciphertext). Its integrity
//! hash is the hex SHA-256 of those raw bytes, so it can be recomputed from
//! the stored column without the key.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::DOCUMENT_KEY_LEN;
use crate::AppError;

/// Nonce size for AES-256-GCM (96 bits)
const NONCE_SIZE: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedResult {
    pub encoded: String,
    pub hash: String,
}

pub fn integrity_hash(raw: &[u8]) -> String {
    hex::encode(Sha256::digest(raw))
}

pub fn seal(plaintext: &str, key: &[u8; DOCUMENT_KEY_LEN]) -> Result<SealedResult, AppError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| AppError::Internal(format!("Failed to create cipher: {e}")))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| AppError::Internal(format!("Encryption failed: {e}")))?;

    let mut raw = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    raw.extend_from_slice(&nonce_bytes);
    raw.extend_from_slice(&ciphertext);

    Ok(SealedResult {
        hash: integrity_hash(&raw),
        encoded: BASE64.encode(&raw),
    })
}

pub fn open(encoded: &str, key: &[u8; DOCUMENT_KEY_LEN]) -> Result<String, AppError> {
    let raw = BASE64
        .decode(encoded)
        .map_err(|e| AppError::Internal(format!("Stored result is not base64: {e}")))?;

    if raw.len() <= NONCE_SIZE {
        return Err(AppError::Internal("Stored result is truncated".to_string()));
    }
    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_SIZE);

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| AppError::Internal(format!("Failed to create cipher: {e}")))?;

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| AppError::Internal(format!("Decryption failed: {e}")))?;

    String::from_utf8(plaintext)
        .map_err(|e| AppError::Internal(format!("Invalid UTF-8 in decrypted result: {e}")))
}

/// Recompute the hash of a stored result and compare it with the recorded one.
pub fn verify_integrity(encoded: &str, recorded_hash: &str) -> bool {
    match BASE64.decode(encoded) {
        Ok(raw) => integrity_hash(&raw)
            .as_bytes()
            .ct_eq(recorded_hash.as_bytes())
            .into(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [3u8; 32];

    #[test]
    fn test_seal_then_open() {
        let sealed = seal(r#"{"glucose":"1.05"}"#, &KEY).unwrap();
        assert_eq!(sealed.hash.len(), 64);
        assert_eq!(open(&sealed.encoded, &KEY).unwrap(), r#"{"glucose":"1.05"}"#);
    }

    #[test]
    fn test_nonce_makes_each_seal_unique() {
        let a = seal("same", &KEY).unwrap();
        let b = seal("same", &KEY).unwrap();
        assert_ne!(a.encoded, b.encoded);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_integrity_detects_tampering() {
        let sealed = seal("result", &KEY).unwrap();
        assert!(verify_integrity(&sealed.encoded, &sealed.hash));

        let mut raw = BASE64.decode(&sealed.encoded).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = BASE64.encode(&raw);

        assert!(!verify_integrity(&tampered, &sealed.hash));
        assert!(open(&tampered, &KEY).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = seal("result", &KEY).unwrap();
        assert!(open(&sealed.encoded, &[4u8; 32]).is_err());
    }

    #[test]
    fn test_garbage_is_not_verified() {
        assert!(!verify_integrity("%%%", "00"));
    }
}
