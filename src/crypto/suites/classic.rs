use crate::crypto::provider::{
    AeadProvider, CipherSuite, KeyAgreementProvider, SignatureProvider,
};
use crate::crypto::suites;
use crate::crypto::{SuiteID, CLASSIC_SUITE_ID};
use crate::error::{CryptoError, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

/// Concrete classic suite: X25519 + Ed25519 + ChaCha20-Poly1305.
///
/// The "encapsulation" path of the classic suite is an ephemeral X25519
/// exchange: the ciphertext is the ephemeral public key. There is no
/// post-quantum component.
pub struct ClassicSuite;

impl KeyAgreementProvider for ClassicSuite {
    type AgreementPublicKey = Vec<u8>;
    type AgreementPrivateKey = Vec<u8>;

    fn generate_agreement_keys(
    ) -> Result<(Self::AgreementPrivateKey, Self::AgreementPublicKey)> {
        let private_key = StaticSecret::random_from_rng(OsRng);
        let public_key = X25519PublicKey::from(&private_key);
        Ok((
            private_key.to_bytes().to_vec(),
            public_key.to_bytes().to_vec(),
        ))
    }

    fn agreement_public_from_private(
        private: &Self::AgreementPrivateKey,
    ) -> Result<Self::AgreementPublicKey> {
        let secret = x25519_secret_from_bytes(private)?;
        Ok(X25519PublicKey::from(&secret).to_bytes().to_vec())
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
        let secret = x25519_secret_from_bytes(private)?;
        let public = x25519_public_from_bytes(remote_public)?;
        Ok(secret.diffie_hellman(&public).to_bytes().to_vec())
    }

    fn encapsulate(remote_public: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let ephemeral = StaticSecret::random_from_rng(OsRng);
        let ephemeral_public = X25519PublicKey::from(&ephemeral);
        let public = x25519_public_from_bytes(remote_public)?;
        let shared_secret = ephemeral.diffie_hellman(&public);

        Ok((
            ephemeral_public.to_bytes().to_vec(),
            shared_secret.to_bytes().to_vec(),
        ))
    }

    fn decapsulate(private: &Self::AgreementPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
        // Ciphertext is the sender's ephemeral X25519 public key
        Self::diffie_hellman(private, ciphertext)
    }

    fn has_post_quantum() -> bool {
        false
    }
}

impl SignatureProvider for ClassicSuite {
    type SigningKey = Vec<u8>;
    type VerifyingKey = Vec<u8>;

    fn generate_signing_keys() -> Result<(Self::SigningKey, Self::VerifyingKey)> {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        Ok((
            signing_key.to_bytes().to_vec(),
            verifying_key.to_bytes().to_vec(),
        ))
    }

    fn verifying_from_signing(signing: &Self::SigningKey) -> Result<Self::VerifyingKey> {
        let signing_key = ed25519_signing_from_bytes(signing)?;
        Ok(signing_key.verifying_key().to_bytes().to_vec())
    }

    fn signing_key_from_bytes(bytes: Vec<u8>) -> Self::SigningKey {
        bytes
    }

    fn verifying_key_from_bytes(bytes: Vec<u8>) -> Self::VerifyingKey {
        bytes
    }

    fn sign(signing: &Self::SigningKey, message: &[u8]) -> Result<Vec<u8>> {
        let signing_key = ed25519_signing_from_bytes(signing)?;
        Ok(signing_key.sign(message).to_bytes().to_vec())
    }

    fn verify(verifying: &Self::VerifyingKey, message: &[u8], signature: &[u8]) -> Result<()> {
        let vk_bytes: &[u8; 32] = verifying.as_slice().try_into().map_err(|_| {
            CryptoError::InputLengthError {
                expected: 32,
                actual: verifying.len(),
            }
        })?;
        let verifying_key = VerifyingKey::from_bytes(vk_bytes)
            .map_err(|e| CryptoError::AuthenticationError(format!("Invalid verifying key: {}", e)))?;

        let sig_bytes: &[u8; 64] =
            signature
                .try_into()
                .map_err(|_| CryptoError::InputLengthError {
                    expected: 64,
                    actual: signature.len(),
                })?;
        let signature_obj = Signature::from_bytes(sig_bytes);

        verifying_key
            .verify(message, &signature_obj)
            .map_err(|_| {
                CryptoError::AuthenticationError("Signature verification failed".to_string())
            })
    }
}

impl AeadProvider for ClassicSuite {
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

impl CipherSuite for ClassicSuite {
    fn suite_id() -> SuiteID {
        CLASSIC_SUITE_ID
    }
}

// ============================================================================
// Byte conversion helpers
// ============================================================================

fn x25519_secret_from_bytes(bytes: &[u8]) -> Result<StaticSecret> {
    let arr: &[u8; 32] = bytes.try_into().map_err(|_| CryptoError::InputLengthError {
        expected: 32,
        actual: bytes.len(),
    })?;
    Ok(StaticSecret::from(*arr))
}

fn x25519_public_from_bytes(bytes: &[u8]) -> Result<X25519PublicKey> {
    let arr: &[u8; 32] = bytes.try_into().map_err(|_| CryptoError::InputLengthError {
        expected: 32,
        actual: bytes.len(),
    })?;
    Ok(X25519PublicKey::from(*arr))
}

fn ed25519_signing_from_bytes(bytes: &[u8]) -> Result<SigningKey> {
    let arr: &[u8; 32] = bytes.try_into().map_err(|_| CryptoError::InputLengthError {
        expected: 32,
        actual: bytes.len(),
    })?;
    Ok(SigningKey::from_bytes(arr))
}
