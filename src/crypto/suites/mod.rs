//! Криптографические наборы
//!
//! Каждый suite реализует три capability traits и выбирается при
//! негоциации как единый strategy object:
//!
//! - [`classic`]: X25519 + Ed25519 + ChaCha20-Poly1305 (suite_id = 1)
//! - [`hybrid`]: classic + ML-KEM (Kyber-768) + ML-DSA (Dilithium3)
//!   (suite_id = 2, feature `post-quantum`)
//!
//! Симметричная часть (AEAD + HKDF) у всех наборов общая и живёт в
//! helper-функциях этого модуля.

use crate::error::{CryptoError, Result};
use chacha20poly1305::{
    aead::{Aead, Payload},
    ChaCha20Poly1305, Key as AeadKeyChacha, KeyInit, Nonce,
};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand_core::RngCore;
use sha2::Sha256;

pub mod classic;

#[cfg(feature = "post-quantum")]
pub mod hybrid;

pub use classic::ClassicSuite;

#[cfg(feature = "post-quantum")]
pub use hybrid::HybridSuite;

// ============================================================================
// Shared symmetric primitives (used by every suite)
// ============================================================================

/// Длина ключа ChaCha20-Poly1305
const AEAD_KEY_LEN: usize = 32;

/// Длина nonce ChaCha20-Poly1305
const AEAD_NONCE_LEN: usize = 12;

fn check_aead_inputs(key: &[u8], nonce: &[u8]) -> Result<()> {
    if key.len() != AEAD_KEY_LEN {
        return Err(CryptoError::InputLengthError {
            expected: AEAD_KEY_LEN,
            actual: key.len(),
        });
    }
    if nonce.len() != AEAD_NONCE_LEN {
        return Err(CryptoError::InputLengthError {
            expected: AEAD_NONCE_LEN,
            actual: nonce.len(),
        });
    }
    Ok(())
}

pub(crate) fn aead_seal(
    key: &[u8],
    nonce: &[u8],
    plaintext: &[u8],
    associated_data: Option<&[u8]>,
) -> Result<Vec<u8>> {
    check_aead_inputs(key, nonce)?;
    let cipher = ChaCha20Poly1305::new(AeadKeyChacha::from_slice(key));
    let nonce_ref = Nonce::from_slice(nonce);

    let payload = Payload {
        msg: plaintext,
        aad: associated_data.unwrap_or(b""),
    };

    cipher
        .encrypt(nonce_ref, payload)
        .map_err(|e| CryptoError::KeyDerivationError(format!("AEAD encryption failed: {}", e)))
}

pub(crate) fn aead_open(
    key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
    associated_data: Option<&[u8]>,
) -> Result<Vec<u8>> {
    check_aead_inputs(key, nonce)?;
    let cipher = ChaCha20Poly1305::new(AeadKeyChacha::from_slice(key));
    let nonce_ref = Nonce::from_slice(nonce);

    let payload = Payload {
        msg: ciphertext,
        aad: associated_data.unwrap_or(b""),
    };

    // Tag mismatch surfaces as an opaque aead error; the mapping to
    // AuthenticationError is deliberate — no detail, no partial output.
    cipher
        .decrypt(nonce_ref, payload)
        .map_err(|_| CryptoError::AuthenticationError("AEAD tag verification failed".to_string()))
}

pub(crate) fn hkdf_expand(salt: &[u8], ikm: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; len];
    hkdf.expand(info, &mut okm)
        .map_err(|e| CryptoError::KeyDerivationError(e.to_string()))?;
    Ok(okm)
}

pub(crate) fn kdf_rk_bytes(root_key: &[u8], step_secret: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let hkdf = Hkdf::<Sha256>::new(Some(root_key), step_secret);
    let mut output = vec![0u8; 64];
    hkdf.expand(b"Meridian-Ratchet-Root-Key-Expansion", &mut output)
        .map_err(|e| CryptoError::KeyDerivationError(e.to_string()))?;

    let new_root_key = output[..32].to_vec();
    let chain_key = output[32..].to_vec();

    Ok((new_root_key, chain_key))
}

pub(crate) fn kdf_ck_bytes(chain_key: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let hkdf = Hkdf::<Sha256>::new(Some(chain_key), b"");
    let mut output = vec![0u8; 64];
    hkdf.expand(b"Meridian-Ratchet-Chain-Key-Expansion", &mut output)
        .map_err(|e| CryptoError::KeyDerivationError(e.to_string()))?;

    let message_key = output[..32].to_vec();
    let next_chain = output[32..].to_vec();

    Ok((message_key, next_chain))
}

pub(crate) fn random_nonce(len: usize) -> Result<Vec<u8>> {
    let mut nonce_bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut nonce_bytes);
    Ok(nonce_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aead_roundtrip() {
        let key = vec![7u8; 32];
        let nonce = random_nonce(12).unwrap();
        let sealed = aead_seal(&key, &nonce, b"payload", Some(b"aad")).unwrap();
        let opened = aead_open(&key, &nonce, &sealed, Some(b"aad")).unwrap();
        assert_eq!(opened, b"payload");
    }

    #[test]
    fn test_aead_open_rejects_wrong_aad() {
        let key = vec![7u8; 32];
        let nonce = random_nonce(12).unwrap();
        let sealed = aead_seal(&key, &nonce, b"payload", Some(b"aad")).unwrap();
        let result = aead_open(&key, &nonce, &sealed, Some(b"other"));
        assert!(matches!(
            result,
            Err(crate::error::CryptoError::AuthenticationError(_))
        ));
    }

    #[test]
    fn test_kdf_ck_is_one_way_pair() {
        let chain = vec![1u8; 32];
        let (message_key, next_chain) = kdf_ck_bytes(&chain).unwrap();
        assert_ne!(message_key, next_chain);
        assert_ne!(message_key, chain);
        assert_ne!(next_chain, chain);
    }
}
