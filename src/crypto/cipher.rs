//! Message Cipher — AEAD шифрование одного сообщения
//!
//! Тонкая обёртка над AEAD capability: уникальный nonce на каждый вызов,
//! атомарный отказ при несхождении тега. Tag verification константна по
//! времени внутри AEAD-реализации; этот слой никогда не возвращает
//! частичный plaintext.

use crate::config::Config;
use crate::crypto::provider::AeadProvider;
use crate::error::{CryptoError, Result};
use std::marker::PhantomData;

/// Результат шифрования: ciphertext с приклеенным authentication tag
/// и nonce, под которым он был создан.
#[derive(Debug, Clone)]
pub struct SealedMessage {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// AEAD-шифратор, параметризованный capability
pub struct MessageCipher<A: AeadProvider> {
    _phantom: PhantomData<A>,
}

impl<A: AeadProvider> MessageCipher<A> {
    /// Зашифровать plaintext под данным ключом.
    ///
    /// Nonce генерируется заново при каждом вызове и никогда не
    /// переиспользуется для одного ключа.
    pub fn encrypt(
        plaintext: &[u8],
        key: &A::AeadKey,
        associated_data: Option<&[u8]>,
    ) -> Result<SealedMessage> {
        use tracing::trace;

        let nonce = A::generate_nonce(Config::global().chacha_nonce_length)?;
        let ciphertext = A::aead_encrypt(key, &nonce, plaintext, associated_data)?;

        trace!(
            target: "crypto::cipher",
            plaintext_len = %plaintext.len(),
            ciphertext_len = %ciphertext.len(),
            "Message sealed"
        );

        Ok(SealedMessage { ciphertext, nonce })
    }

    /// Расшифровать ciphertext (tag приклеен к ciphertext).
    ///
    /// # Errors
    ///
    /// `AuthenticationError` при любом несхождении тега — без деталей и
    /// без частичного вывода. Логируется как security event.
    pub fn decrypt(
        ciphertext: &[u8],
        nonce: &[u8],
        key: &A::AeadKey,
        associated_data: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        use tracing::warn;

        A::aead_decrypt(key, nonce, ciphertext, associated_data).map_err(|e| {
            if matches!(e, CryptoError::AuthenticationError(_)) {
                warn!(
                    target: "crypto::cipher",
                    "AEAD tag verification failed"
                );
            }
            e
        })
    }
}
