//! Defines the capability traits for crypto-agility.
//!
//! A cipher suite is assembled from three narrow capability interfaces
//! instead of one monolithic provider trait. Each capability can be
//! reasoned about (and swapped) independently; a suite implements all
//! three and is selected at negotiation time as a strategy object.

use crate::crypto::SuiteID;
use crate::error::Result;
use core::fmt::Debug;

/// Key agreement capability: classical Diffie-Hellman plus, for suites
/// that carry one, a KEM encapsulation path.
///
/// Keys cross module boundaries as raw bytes; the associated types keep
/// suite implementations free to choose richer representations.
pub trait KeyAgreementProvider: Send + Sync + 'static {
    type AgreementPublicKey: AsRef<[u8]> + Debug + Clone + 'static;
    type AgreementPrivateKey: AsRef<[u8]> + Clone + 'static;

    /// Generates a new key agreement key pair.
    fn generate_agreement_keys(
    ) -> Result<(Self::AgreementPrivateKey, Self::AgreementPublicKey)>;

    /// Derives the public key from a private key.
    fn agreement_public_from_private(
        private: &Self::AgreementPrivateKey,
    ) -> Result<Self::AgreementPublicKey>;

    /// Creates a public key from raw bytes.
    fn agreement_public_from_bytes(bytes: Vec<u8>) -> Self::AgreementPublicKey;

    /// Creates a private key from raw bytes.
    fn agreement_private_from_bytes(bytes: Vec<u8>) -> Self::AgreementPrivateKey;

    /// Performs classical key agreement between a local private key and a
    /// remote public key. Returns the raw shared secret.
    fn diffie_hellman(
        private: &Self::AgreementPrivateKey,
        remote_public: &[u8],
    ) -> Result<Vec<u8>>;

    /// Encapsulates a fresh shared secret to the remote public key.
    /// Returns `(ciphertext, shared_secret)`.
    fn encapsulate(remote_public: &[u8]) -> Result<(Vec<u8>, Vec<u8>)>;

    /// Decapsulates a shared secret from a ciphertext with the local
    /// private key.
    fn decapsulate(private: &Self::AgreementPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>>;

    /// Whether this suite carries a post-quantum encapsulation component
    /// that must accompany every DH ratchet step.
    fn has_post_quantum() -> bool;
}

/// Signature capability.
pub trait SignatureProvider: Send + Sync + 'static {
    type SigningKey: AsRef<[u8]> + Clone + 'static;
    type VerifyingKey: AsRef<[u8]> + Debug + Clone + 'static;

    /// Generates a new signing key pair.
    fn generate_signing_keys() -> Result<(Self::SigningKey, Self::VerifyingKey)>;

    /// Derives the verifying key from a signing key.
    fn verifying_from_signing(signing: &Self::SigningKey) -> Result<Self::VerifyingKey>;

    /// Creates a signing key from raw bytes.
    fn signing_key_from_bytes(bytes: Vec<u8>) -> Self::SigningKey;

    /// Creates a verifying key from raw bytes.
    fn verifying_key_from_bytes(bytes: Vec<u8>) -> Self::VerifyingKey;

    /// Signs a message with the given signing key.
    fn sign(signing: &Self::SigningKey, message: &[u8]) -> Result<Vec<u8>>;

    /// Verifies a signature. Failure maps to `AuthenticationError`.
    fn verify(verifying: &Self::VerifyingKey, message: &[u8], signature: &[u8]) -> Result<()>;
}

/// AEAD and key derivation capability.
pub trait AeadProvider: Send + Sync + 'static {
    type AeadKey: AsRef<[u8]> + Debug + Clone + Default + 'static;

    /// Creates an AEAD key from raw bytes.
    fn aead_key_from_bytes(bytes: Vec<u8>) -> Self::AeadKey;

    /// Performs AEAD encryption.
    /// `key`: the symmetric encryption key.
    /// `nonce`: the unique nonce for this encryption.
    /// `plaintext`: the data to encrypt.
    /// `associated_data`: optional associated data (authenticated but not encrypted).
    ///
    /// Returns ciphertext with the authentication tag appended.
    fn aead_encrypt(
        key: &Self::AeadKey,
        nonce: &[u8],
        plaintext: &[u8],
        associated_data: Option<&[u8]>,
    ) -> Result<Vec<u8>>;

    /// Performs AEAD decryption. Tag verification is constant-time inside
    /// the AEAD implementation; failure is atomic — no partial plaintext.
    fn aead_decrypt(
        key: &Self::AeadKey,
        nonce: &[u8],
        ciphertext: &[u8],
        associated_data: Option<&[u8]>,
    ) -> Result<Vec<u8>>;

    /// Derives a key from input key material using HKDF.
    fn hkdf_derive_key(salt: &[u8], ikm: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>>;

    /// Derives a new root key and a chain key from the current root key
    /// and a ratchet-step secret.
    fn kdf_rk(root_key: &Self::AeadKey, step_secret: &[u8])
        -> Result<(Self::AeadKey, Self::AeadKey)>;

    /// Derives a message key and the next chain key from the current
    /// chain key. One-way: the chain key can never be recovered from the
    /// outputs.
    fn kdf_ck(chain_key: &Self::AeadKey) -> Result<(Self::AeadKey, Self::AeadKey)>;

    /// Generates a cryptographically secure random nonce.
    fn generate_nonce(len: usize) -> Result<Vec<u8>>;
}

/// A full cipher suite: the three capabilities plus identification.
pub trait CipherSuite: KeyAgreementProvider + SignatureProvider + AeadProvider {
    /// Returns the SuiteID advertised in bundles and envelopes.
    fn suite_id() -> SuiteID;
}
