//! Гибридный набор: классика + пост-квантовая компонента.
//!
//! Ключи гибридного набора — конкатенация классической и PQ части:
//!
//! ```text
//! agreement public  = X25519 public (32)  || Kyber-768 public (1184)
//! agreement private = X25519 private (32) || Kyber-768 secret (2400)
//! verifying key     = Ed25519 public (32) || Dilithium3 public (1952)
//! signing key       = Ed25519 secret (32) || Dilithium3 secret (4000)
//! signature         = Ed25519 sig (64)    || Dilithium3 sig
//! ```
//!
//! Классический DH идёт по X25519-части; encapsulate/decapsulate — по
//! Kyber-части. Подпись валидна только если сошлись ОБЕ компоненты.
//! Симметричная часть (AEAD + HKDF) общая с classic suite.

use crate::crypto::provider::{
    AeadProvider, CipherSuite, KeyAgreementProvider, SignatureProvider,
};
use crate::crypto::suites::{self, ClassicSuite};
use crate::crypto::{SuiteID, PQ_HYBRID_SUITE_ID};
use crate::error::{CryptoError, Result};
use pqcrypto_dilithium::dilithium3;
use pqcrypto_kyber::kyber768;
use pqcrypto_traits::kem::{
    Ciphertext as KemCiphertext, PublicKey as KemPublicKey, SecretKey as KemSecretKey,
    SharedSecret as KemSharedSecret,
};
use pqcrypto_traits::sign::{
    DetachedSignature as SignDetached, PublicKey as SignPublicKey, SecretKey as SignSecretKey,
};

/// Длина классической части ключей (X25519 / Ed25519)
const CLASSICAL_KEY_LEN: usize = 32;

/// Длина классической подписи (Ed25519)
const CLASSICAL_SIG_LEN: usize = 64;

/// Hybrid suite: X25519+Kyber-768 agreement, Ed25519+Dilithium3 signatures.
pub struct HybridSuite;

impl KeyAgreementProvider for HybridSuite {
    type AgreementPublicKey = Vec<u8>;
    type AgreementPrivateKey = Vec<u8>;

    fn generate_agreement_keys(
    ) -> Result<(Self::AgreementPrivateKey, Self::AgreementPublicKey)> {
        let (classical_private, classical_public) = ClassicSuite::generate_agreement_keys()?;
        let (kyber_public, kyber_secret) = kyber768::keypair();

        let mut private = classical_private;
        private.extend_from_slice(kyber_secret.as_bytes());
        let mut public = classical_public;
        public.extend_from_slice(kyber_public.as_bytes());

        Ok((private, public))
    }

    fn agreement_public_from_private(
        private: &Self::AgreementPrivateKey,
    ) -> Result<Self::AgreementPublicKey> {
        // Kyber не восстанавливает public из secret; гибридные private
        // keys всегда переносятся парой со своим public.
        let _ = classical_part(private)?;
        Err(CryptoError::StateError(
            "hybrid public key cannot be derived from private key alone".to_string(),
        ))
    }

    fn agreement_public_from_bytes(bytes: Vec<u8>) -> Self::AgreementPublicKey {
        bytes
    }

    fn agreement_private_from_bytes(bytes: Vec<u8>) -> Self::AgreementPrivateKey {
        bytes
    }

    fn diffie_hellman(
        private: &Self::AgreementPrivateKey,
        remote_public: &[u8],
    ) -> Result<Vec<u8>> {
        let local_classical = classical_part(private)?;
        let remote_classical = classical_part(remote_public)?;
        ClassicSuite::diffie_hellman(&local_classical.to_vec(), remote_classical)
    }

    fn encapsulate(remote_public: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let kyber_bytes = post_quantum_part(remote_public)?;
        let kyber_public = kyber768::PublicKey::from_bytes(kyber_bytes).map_err(|e| {
            CryptoError::KeyGenerationError(format!("Invalid Kyber public key: {}", e))
        })?;

        let (shared_secret, ciphertext) = kyber768::encapsulate(&kyber_public);
        Ok((
            ciphertext.as_bytes().to_vec(),
            shared_secret.as_bytes().to_vec(),
        ))
    }

    fn decapsulate(private: &Self::AgreementPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let kyber_bytes = post_quantum_part(private)?;
        let kyber_secret = kyber768::SecretKey::from_bytes(kyber_bytes).map_err(|e| {
            CryptoError::KeyGenerationError(format!("Invalid Kyber secret key: {}", e))
        })?;
        let kyber_ciphertext = kyber768::Ciphertext::from_bytes(ciphertext).map_err(|e| {
            CryptoError::AuthenticationError(format!("Invalid Kyber ciphertext: {}", e))
        })?;

        let shared_secret = kyber768::decapsulate(&kyber_ciphertext, &kyber_secret);
        Ok(shared_secret.as_bytes().to_vec())
    }

    fn has_post_quantum() -> bool {
        true
    }
}

impl SignatureProvider for HybridSuite {
    type SigningKey = Vec<u8>;
    type VerifyingKey = Vec<u8>;

    fn generate_signing_keys() -> Result<(Self::SigningKey, Self::VerifyingKey)> {
        let (classical_signing, classical_verifying) = ClassicSuite::generate_signing_keys()?;
        let (dilithium_public, dilithium_secret) = dilithium3::keypair();

        let mut signing = classical_signing;
        signing.extend_from_slice(dilithium_secret.as_bytes());
        let mut verifying = classical_verifying;
        verifying.extend_from_slice(dilithium_public.as_bytes());

        Ok((signing, verifying))
    }

    fn verifying_from_signing(signing: &Self::SigningKey) -> Result<Self::VerifyingKey> {
        // Как и для agreement keys: Dilithium public не восстанавливается
        // из secret в pqcrypto API.
        let _ = classical_part(signing)?;
        Err(CryptoError::StateError(
            "hybrid verifying key cannot be derived from signing key alone".to_string(),
        ))
    }

    fn signing_key_from_bytes(bytes: Vec<u8>) -> Self::SigningKey {
        bytes
    }

    fn verifying_key_from_bytes(bytes: Vec<u8>) -> Self::VerifyingKey {
        bytes
    }

    fn sign(signing: &Self::SigningKey, message: &[u8]) -> Result<Vec<u8>> {
        let classical = classical_part(signing)?;
        let mut signature = ClassicSuite::sign(&classical.to_vec(), message)?;

        let dilithium_bytes = post_quantum_part(signing)?;
        let dilithium_secret = dilithium3::SecretKey::from_bytes(dilithium_bytes)
            .map_err(|e| CryptoError::SigningError(format!("Invalid Dilithium key: {}", e)))?;
        let dilithium_sig = dilithium3::detached_sign(message, &dilithium_secret);

        signature.extend_from_slice(dilithium_sig.as_bytes());
        Ok(signature)
    }

    fn verify(verifying: &Self::VerifyingKey, message: &[u8], signature: &[u8]) -> Result<()> {
        if signature.len() <= CLASSICAL_SIG_LEN {
            return Err(CryptoError::InputLengthError {
                expected: CLASSICAL_SIG_LEN + 1,
                actual: signature.len(),
            });
        }

        // Обе компоненты обязаны сойтись
        let classical_verifying = classical_part(verifying)?;
        ClassicSuite::verify(
            &classical_verifying.to_vec(),
            message,
            &signature[..CLASSICAL_SIG_LEN],
        )?;

        let dilithium_bytes = post_quantum_part(verifying)?;
        let dilithium_public = dilithium3::PublicKey::from_bytes(dilithium_bytes).map_err(|e| {
            CryptoError::AuthenticationError(format!("Invalid Dilithium public key: {}", e))
        })?;
        let dilithium_sig =
            dilithium3::DetachedSignature::from_bytes(&signature[CLASSICAL_SIG_LEN..]).map_err(
                |e| CryptoError::AuthenticationError(format!("Invalid Dilithium signature: {}", e)),
            )?;

        dilithium3::verify_detached_signature(&dilithium_sig, message, &dilithium_public).map_err(
            |_| CryptoError::AuthenticationError("Signature verification failed".to_string()),
        )
    }
}

impl AeadProvider for HybridSuite {
    type AeadKey = Vec<u8>;

    fn aead_key_from_bytes(bytes: Vec<u8>) -> Self::AeadKey {
        bytes
    }

    fn aead_encrypt(
        key: &Self::AeadKey,
        nonce: &[u8],
        plaintext: &[u8],
        associated_data: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        suites::aead_seal(key, nonce, plaintext, associated_data)
    }

    fn aead_decrypt(
        key: &Self::AeadKey,
        nonce: &[u8],
        ciphertext: &[u8],
        associated_data: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        suites::aead_open(key, nonce, ciphertext, associated_data)
    }

    fn hkdf_derive_key(salt: &[u8], ikm: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>> {
        suites::hkdf_expand(salt, ikm, info, len)
    }

    fn kdf_rk(
        root_key: &Self::AeadKey,
        step_secret: &[u8],
    ) -> Result<(Self::AeadKey, Self::AeadKey)> {
        suites::kdf_rk_bytes(root_key, step_secret)
    }

    fn kdf_ck(chain_key: &Self::AeadKey) -> Result<(Self::AeadKey, Self::AeadKey)> {
        suites::kdf_ck_bytes(chain_key)
    }

    fn generate_nonce(len: usize) -> Result<Vec<u8>> {
        suites::random_nonce(len)
    }
}

impl CipherSuite for HybridSuite {
    fn suite_id() -> SuiteID {
        PQ_HYBRID_SUITE_ID
    }
}

// ============================================================================
// Key splitting helpers
// ============================================================================

fn classical_part(bytes: &[u8]) -> Result<&[u8]> {
    if bytes.len() < CLASSICAL_KEY_LEN {
        return Err(CryptoError::InputLengthError {
            expected: CLASSICAL_KEY_LEN,
            actual: bytes.len(),
        });
    }
    Ok(&bytes[..CLASSICAL_KEY_LEN])
}

fn post_quantum_part(bytes: &[u8]) -> Result<&[u8]> {
    if bytes.len() <= CLASSICAL_KEY_LEN {
        return Err(CryptoError::InputLengthError {
            expected: CLASSICAL_KEY_LEN + 1,
            actual: bytes.len(),
        });
    }
    Ok(&bytes[CLASSICAL_KEY_LEN..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hybrid_key_lengths() {
        let (private, public) = HybridSuite::generate_agreement_keys().unwrap();
        assert_eq!(
            public.len(),
            CLASSICAL_KEY_LEN + kyber768::public_key_bytes()
        );
        assert_eq!(
            private.len(),
            CLASSICAL_KEY_LEN + kyber768::secret_key_bytes()
        );
    }

    #[test]
    fn test_hybrid_diffie_hellman_matches_classical_part() {
        let (a_priv, a_pub) = HybridSuite::generate_agreement_keys().unwrap();
        let (b_priv, b_pub) = HybridSuite::generate_agreement_keys().unwrap();

        let ab = HybridSuite::diffie_hellman(&a_priv, &b_pub).unwrap();
        let ba = HybridSuite::diffie_hellman(&b_priv, &a_pub).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.len(), 32);
    }

    #[test]
    fn test_hybrid_encapsulate_decapsulate() {
        let (private, public) = HybridSuite::generate_agreement_keys().unwrap();
        let (ciphertext, secret) = HybridSuite::encapsulate(&public).unwrap();
        assert_eq!(ciphertext.len(), kyber768::ciphertext_bytes());
        let recovered = HybridSuite::decapsulate(&private, &ciphertext).unwrap();
        assert_eq!(secret, recovered);
    }

    #[test]
    fn test_hybrid_signature_requires_both_components() {
        let (signing, verifying) = HybridSuite::generate_signing_keys().unwrap();
        let mut signature = HybridSuite::sign(&signing, b"message").unwrap();
        assert!(HybridSuite::verify(&verifying, b"message", &signature).is_ok());

        // Повреждаем классическую часть
        signature[0] ^= 0x01;
        assert!(HybridSuite::verify(&verifying, b"message", &signature).is_err());
        signature[0] ^= 0x01;

        // Повреждаем пост-квантовую часть
        let last = signature.len() - 1;
        signature[last] ^= 0x01;
        assert!(HybridSuite::verify(&verifying, b"message", &signature).is_err());
    }
}
