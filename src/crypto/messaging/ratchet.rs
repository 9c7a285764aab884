//! Ratchet state machine
//!
//! Состояние одной пары (conversation, local user). Single-writer:
//! encrypt/decrypt мутируют счётчики и chain keys на месте, потерянное
//! обновление необратимо ломает forward secrecy — сериализуйте доступ
//! (mutex или актор на состояние).
//!
//! Жизненный цикл: `Uninitialized → Initialized → Active → Revoked`
//! (терминально). Создаётся при завершении key exchange, уничтожается
//! при удалении беседы или revocation устройства.

use crate::config::Config;
use crate::crypto::agreement::{KeyAgreementEngine, RatchetRole, RatchetSeed};
use crate::crypto::cipher::MessageCipher;
use crate::crypto::provider::CipherSuite;
use crate::error::{CryptoError, Result};
use crate::utils::time::current_timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Domain separation label для начальной деривации цепочек
const RATCHET_INIT_INFO: &[u8] = b"Meridian-Ratchet-Init-v1";

/// Фаза жизненного цикла ratchet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RatchetPhase {
    Uninitialized,
    Initialized,
    Active,
    Revoked,
}

/// Envelope одного зашифрованного сообщения.
///
/// Immutable после создания. Содержит всё необходимое получателю:
/// ephemeral public key (для mirror DH-step), счётчики (для выбора
/// message key), nonce для AEAD и — в гибридном режиме — KEM ciphertext
/// текущей цепочки.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub suite_id: u16,
    #[serde(with = "serde_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub nonce: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub ephemeral_public_key: Vec<u8>,
    pub message_number: u32,
    pub chain_length: u32,
    pub previous_chain_length: u32,
    pub pqc_ciphertext: Option<Vec<u8>>,
    pub signature: Option<Vec<u8>>,
}

/// Пропущенный message key, сохранённый для out-of-order доставки
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SkippedMessageKey {
    key: Vec<u8>,
    stored_at: i64,
}

/// Состояние ratchet для одной пары (conversation, user)
pub struct RatchetState<S: CipherSuite> {
    phase: RatchetPhase,
    role: RatchetRole,
    conversation_id: String,
    user_id: String,

    // Root ratchet хранится по направлениям: sending-половина инициатора
    // совпадает с receiving-половиной получателя. Один общий root при
    // счётчиковых DH-шагах с обеих сторон разошёлся бы.
    sending_root_key: S::AeadKey,
    receiving_root_key: S::AeadKey,

    sending_chain_key: S::AeadKey,
    sending_message_number: u32,
    sending_chain_length: u32,
    previous_sending_length: u32,

    receiving_chain_key: S::AeadKey,
    receiving_message_number: u32,
    receiving_chain_length: u32,

    local_ephemeral_private: S::AgreementPrivateKey,
    local_ephemeral_public: S::AgreementPublicKey,
    /// Предыдущая ephemeral пара: собеседник мог ратчетить против неё,
    /// пока наша ротация была в полёте
    prior_ephemeral_private: Option<S::AgreementPrivateKey>,
    remote_ephemeral_public: Vec<u8>,

    /// KEM ciphertext текущей sending-цепочки (гибридный режим);
    /// прикладывается к каждому envelope цепочки, чтобы любой из них
    /// мог запустить mirror step
    current_pq_ciphertext: Option<Vec<u8>>,

    /// Ключи пропущенных сообщений, (chain_length, message_number) → key.
    /// Bounded: старейшие записи вытесняются
    skipped_keys: BTreeMap<(u32, u32), SkippedMessageKey>,

    /// Счётчик вытеснений из skipped store (для observability)
    evicted_skipped_keys: u64,
}

impl<S: CipherSuite> RatchetState<S> {
    /// Инициализировать состояние из завершённого key exchange.
    ///
    /// Из shared secret деривируются две пары (root, chain) с
    /// ролевыми позициями: у инициатора и получателя они зеркальны,
    /// никогда не идентичны.
    pub fn initialize(
        conversation_id: String,
        user_id: String,
        seed: &RatchetSeed,
    ) -> Result<Self> {
        use tracing::debug;

        let okm = S::hkdf_derive_key(b"", &seed.shared_secret, RATCHET_INIT_INFO, 128)?;

        let root_a = S::aead_key_from_bytes(okm[..32].to_vec());
        let chain_a = S::aead_key_from_bytes(okm[32..64].to_vec());
        let root_b = S::aead_key_from_bytes(okm[64..96].to_vec());
        let chain_b = S::aead_key_from_bytes(okm[96..128].to_vec());

        let (sending_root, sending_chain, receiving_root, receiving_chain) = match seed.role {
            RatchetRole::Initiator => (root_a, chain_a, root_b, chain_b),
            RatchetRole::Responder => (root_b, chain_b, root_a, chain_a),
        };

        debug!(
            target: "crypto::ratchet",
            conversation_id = %conversation_id,
            role = ?seed.role,
            "Ratchet state initialized"
        );

        Ok(Self {
            phase: RatchetPhase::Initialized,
            role: seed.role,
            conversation_id,
            user_id,
            sending_root_key: sending_root,
            receiving_root_key: receiving_root,
            sending_chain_key: sending_chain,
            sending_message_number: 0,
            sending_chain_length: 0,
            previous_sending_length: 0,
            receiving_chain_key: receiving_chain,
            receiving_message_number: 0,
            receiving_chain_length: 0,
            local_ephemeral_private: S::agreement_private_from_bytes(
                seed.local_ephemeral_private.to_vec(),
            ),
            local_ephemeral_public: S::agreement_public_from_bytes(
                seed.local_ephemeral_public.clone(),
            ),
            prior_ephemeral_private: None,
            remote_ephemeral_public: seed.remote_ephemeral_public.clone(),
            current_pq_ciphertext: None,
            skipped_keys: BTreeMap::new(),
            evicted_skipped_keys: 0,
        })
    }

    pub fn phase(&self) -> RatchetPhase {
        self.phase
    }

    pub fn role(&self) -> RatchetRole {
        self.role
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn sending_chain_length(&self) -> u32 {
        self.sending_chain_length
    }

    pub fn receiving_chain_length(&self) -> u32 {
        self.receiving_chain_length
    }

    pub fn skipped_key_count(&self) -> usize {
        self.skipped_keys.len()
    }

    pub fn evicted_skipped_keys(&self) -> u64 {
        self.evicted_skipped_keys
    }

    /// Перевести состояние в терминальную фазу
    pub fn revoke(&mut self) {
        use tracing::warn;

        warn!(
            target: "crypto::ratchet",
            conversation_id = %self.conversation_id,
            "Ratchet state revoked"
        );
        self.phase = RatchetPhase::Revoked;
    }

    fn ensure_usable(&self) -> Result<()> {
        match self.phase {
            RatchetPhase::Revoked => Err(CryptoError::StateError(format!(
                "ratchet for conversation {} is revoked; a fresh key exchange is required",
                self.conversation_id
            ))),
            RatchetPhase::Uninitialized => Err(CryptoError::StateError(
                "ratchet is not initialized".to_string(),
            )),
            _ => Ok(()),
        }
    }

    // ========================================================================
    // Encrypt
    // ========================================================================

    /// Зашифровать сообщение.
    ///
    /// Деривирует message key из sending chain (one-way), продвигает
    /// счётчик и каждые `ratchet_step_interval` сообщений выполняет DH
    /// ratchet step.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<MessageEnvelope> {
        use tracing::trace;

        self.ensure_usable()?;

        if self.sending_message_number >= Config::global().ratchet_step_interval {
            self.dh_ratchet_step_sending()?;
        }

        let (message_key, next_chain_key) = S::kdf_ck(&self.sending_chain_key)?;

        let message_number = self.sending_message_number;
        let aad = build_aad(
            self.local_ephemeral_public.as_ref(),
            self.sending_chain_length,
            message_number,
        );

        let sealed = MessageCipher::<S>::encrypt(plaintext, &message_key, Some(&aad))?;

        // Chain key перезаписывается только после успешного шифрования
        self.sending_chain_key = next_chain_key;
        self.sending_message_number += 1;
        self.phase = RatchetPhase::Active;

        trace!(
            target: "crypto::ratchet",
            conversation_id = %self.conversation_id,
            msg_num = %message_number,
            chain_len = %self.sending_chain_length,
            "Message encrypted"
        );

        Ok(MessageEnvelope {
            suite_id: S::suite_id(),
            ciphertext: sealed.ciphertext,
            nonce: sealed.nonce,
            ephemeral_public_key: self.local_ephemeral_public.as_ref().to_vec(),
            message_number,
            chain_length: self.sending_chain_length,
            previous_chain_length: self.previous_sending_length,
            pqc_ciphertext: self.current_pq_ciphertext.clone(),
            signature: None,
        })
    }

    /// DH ratchet step на отправляющей стороне: свежая ephemeral пара,
    /// DH с последним известным ключом собеседника (+ KEM encapsulation
    /// в гибридном режиме), rederive root/chain, chain_length++,
    /// счётчик = 0.
    fn dh_ratchet_step_sending(&mut self) -> Result<()> {
        use tracing::debug;

        if self.sending_chain_length == u32::MAX {
            return Err(CryptoError::StateError(
                "sending chain length overflow".to_string(),
            ));
        }

        let (new_private, new_public) = S::generate_agreement_keys()?;

        let dh = S::diffie_hellman(&new_private, &self.remote_ephemeral_public)?;

        let (pq_ciphertext, pq_secret) = if S::has_post_quantum() {
            let (ciphertext, secret) = S::encapsulate(&self.remote_ephemeral_public)?;
            (Some(ciphertext), Some(secret))
        } else {
            (None, None)
        };

        let step_secret = KeyAgreementEngine::<S>::combine(&dh, pq_secret.as_deref())?;

        let (new_root, new_chain) = S::kdf_rk(&self.sending_root_key, &step_secret)?;
        self.sending_root_key = new_root;
        self.sending_chain_key = new_chain;

        self.previous_sending_length = self.sending_message_number;
        self.sending_chain_length += 1;
        self.sending_message_number = 0;

        self.prior_ephemeral_private =
            Some(std::mem::replace(&mut self.local_ephemeral_private, new_private));
        self.local_ephemeral_public = new_public;
        self.current_pq_ciphertext = pq_ciphertext;

        debug!(
            target: "crypto::ratchet",
            conversation_id = %self.conversation_id,
            chain_len = %self.sending_chain_length,
            "DH ratchet step (sending)"
        );

        Ok(())
    }

    // ========================================================================
    // Decrypt
    // ========================================================================

    /// Расшифровать envelope.
    ///
    /// Путь выбирается по (chain_length, message_number):
    /// - прошлая цепочка → только skipped store;
    /// - текущая цепочка → обычная деривация или walk-forward со
    ///   складированием пропущенных ключей;
    /// - следующая цепочка → mirror DH-step;
    /// - дальше — `ReplayError` (окно восстановления превышено).
    ///
    /// Любая деривация идёт на временных значениях; состояние мутируется
    /// только после успешной AEAD-аутентификации.
    pub fn decrypt(&mut self, envelope: &MessageEnvelope) -> Result<Vec<u8>> {
        use tracing::debug;

        self.ensure_usable()?;

        if envelope.suite_id != S::suite_id() {
            return Err(CryptoError::StateError(format!(
                "envelope suite {} does not match session suite {}",
                envelope.suite_id,
                S::suite_id()
            )));
        }

        debug!(
            target: "crypto::ratchet",
            conversation_id = %self.conversation_id,
            msg_num = %envelope.message_number,
            envelope_chain = %envelope.chain_length,
            current_chain = %self.receiving_chain_length,
            skipped = %self.skipped_keys.len(),
            "Decrypting message"
        );

        let plaintext = if envelope.chain_length < self.receiving_chain_length {
            self.decrypt_with_skipped(envelope)?
        } else if envelope.chain_length == self.receiving_chain_length {
            // Сообщение позади текущего счётчика: только skipped store
            if envelope.message_number < self.receiving_message_number {
                self.decrypt_with_skipped(envelope)?
            } else {
                self.decrypt_current_chain(envelope)?
            }
        } else if envelope.chain_length == self.receiving_chain_length + 1 {
            self.decrypt_with_mirror_step(envelope)?
        } else {
            return Err(CryptoError::ReplayError(format!(
                "envelope chain {} is beyond the recovery window (current {})",
                envelope.chain_length, self.receiving_chain_length
            )));
        };

        self.phase = RatchetPhase::Active;
        Ok(plaintext)
    }

    /// Ключ из skipped store; удаляется при успешном использовании
    fn decrypt_with_skipped(&mut self, envelope: &MessageEnvelope) -> Result<Vec<u8>> {
        use tracing::trace;

        let slot = (envelope.chain_length, envelope.message_number);
        let Some(stored) = self.skipped_keys.get(&slot) else {
            return Err(CryptoError::ReplayError(format!(
                "no skipped key for chain {} message {} (replayed or expired)",
                envelope.chain_length, envelope.message_number
            )));
        };

        let key = S::aead_key_from_bytes(stored.key.clone());
        let plaintext = decrypt_envelope_with_key::<S>(&key, envelope)?;

        // Ключ одноразовый: удаляем только после успеха
        self.skipped_keys.remove(&slot);

        trace!(
            target: "crypto::ratchet",
            msg_num = %envelope.message_number,
            chain = %envelope.chain_length,
            "Decrypted with skipped message key"
        );

        Ok(plaintext)
    }

    /// Обычный путь: walk-forward по текущей receiving chain
    fn decrypt_current_chain(&mut self, envelope: &MessageEnvelope) -> Result<Vec<u8>> {
        let max_skip = Config::global().max_skipped_messages;
        let skip = envelope.message_number - self.receiving_message_number;
        if skip > max_skip {
            return Err(CryptoError::ReplayError(format!(
                "skip of {} messages exceeds the maximum of {}",
                skip, max_skip
            )));
        }

        // Деривация на временных значениях
        let mut chain_key = self.receiving_chain_key.clone();
        let mut derived: Vec<((u32, u32), Vec<u8>)> = Vec::with_capacity(skip as usize);
        let mut number = self.receiving_message_number;
        while number < envelope.message_number {
            let (message_key, next_chain) = S::kdf_ck(&chain_key)?;
            derived.push((
                (self.receiving_chain_length, number),
                message_key.as_ref().to_vec(),
            ));
            chain_key = next_chain;
            number += 1;
        }

        let (target_key, next_chain) = S::kdf_ck(&chain_key)?;
        let plaintext = decrypt_envelope_with_key::<S>(&target_key, envelope)?;

        // Commit только после успешной аутентификации
        for (slot, key) in derived {
            self.store_skipped_key(slot, key);
        }
        self.receiving_chain_key = next_chain;
        self.receiving_message_number = envelope.message_number + 1;

        Ok(plaintext)
    }

    /// Mirror DH-step: собеседник начал новую цепочку. Кандидатами на
    /// локальную сторону DH служат текущая и предыдущая ephemeral пары;
    /// арбитром — AEAD tag. Состояние мутируется только для кандидата,
    /// чья цепочка аутентифицировала сообщение.
    fn decrypt_with_mirror_step(&mut self, envelope: &MessageEnvelope) -> Result<Vec<u8>> {
        use tracing::debug;

        let max_skip = Config::global().max_skipped_messages;
        if envelope.message_number > max_skip {
            return Err(CryptoError::ReplayError(format!(
                "skip of {} messages into new chain exceeds the maximum of {}",
                envelope.message_number, max_skip
            )));
        }

        // Хвост старой цепочки, который нужно будет отложить
        let old_chain_remainder = envelope
            .previous_chain_length
            .saturating_sub(self.receiving_message_number);
        if old_chain_remainder > max_skip {
            return Err(CryptoError::ReplayError(format!(
                "previous chain remainder of {} exceeds the maximum of {}",
                old_chain_remainder, max_skip
            )));
        }

        let candidates: Vec<&S::AgreementPrivateKey> =
            std::iter::once(&self.local_ephemeral_private)
                .chain(self.prior_ephemeral_private.as_ref())
                .collect();

        let mut outcome: Option<(Vec<u8>, S::AeadKey, S::AeadKey, Vec<((u32, u32), Vec<u8>)>)> =
            None;

        for candidate in candidates {
            let dh = S::diffie_hellman(candidate, &envelope.ephemeral_public_key)?;

            let pq_secret = if S::has_post_quantum() {
                let Some(ciphertext) = &envelope.pqc_ciphertext else {
                    return Err(CryptoError::StateError(
                        "hybrid envelope is missing the PQ ciphertext".to_string(),
                    ));
                };
                Some(S::decapsulate(candidate, ciphertext)?)
            } else {
                None
            };

            let step_secret = KeyAgreementEngine::<S>::combine(&dh, pq_secret.as_deref())?;
            let (new_root, mut chain_key) = S::kdf_rk(&self.receiving_root_key, &step_secret)?;

            let mut derived: Vec<((u32, u32), Vec<u8>)> =
                Vec::with_capacity(envelope.message_number as usize);
            let mut number = 0u32;
            while number < envelope.message_number {
                let (message_key, next_chain) = S::kdf_ck(&chain_key)?;
                derived.push(((envelope.chain_length, number), message_key.as_ref().to_vec()));
                chain_key = next_chain;
                number += 1;
            }

            let (target_key, next_chain) = S::kdf_ck(&chain_key)?;
            match decrypt_envelope_with_key::<S>(&target_key, envelope) {
                Ok(plaintext) => {
                    outcome = Some((plaintext, new_root, next_chain, derived));
                    break;
                }
                Err(CryptoError::AuthenticationError(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        let Some((plaintext, new_root, next_chain, derived)) = outcome else {
            return Err(CryptoError::AuthenticationError(
                "no local ephemeral key authenticates the new chain".to_string(),
            ));
        };

        // Commit: сначала откладываем хвост старой цепочки
        let mut old_chain_key = self.receiving_chain_key.clone();
        let mut number = self.receiving_message_number;
        while number < envelope.previous_chain_length {
            let (message_key, next_old) = S::kdf_ck(&old_chain_key)?;
            self.store_skipped_key(
                (self.receiving_chain_length, number),
                message_key.as_ref().to_vec(),
            );
            old_chain_key = next_old;
            number += 1;
        }

        for (slot, key) in derived {
            self.store_skipped_key(slot, key);
        }

        self.receiving_root_key = new_root;
        self.receiving_chain_key = next_chain;
        self.receiving_chain_length = envelope.chain_length;
        self.receiving_message_number = envelope.message_number + 1;
        self.remote_ephemeral_public = envelope.ephemeral_public_key.clone();

        debug!(
            target: "crypto::ratchet",
            conversation_id = %self.conversation_id,
            chain_len = %self.receiving_chain_length,
            "DH ratchet step mirrored (receiving)"
        );

        Ok(plaintext)
    }

    /// Сохранить пропущенный ключ; при переполнении вытесняется
    /// старейшая запись
    fn store_skipped_key(&mut self, slot: (u32, u32), key: Vec<u8>) {
        use tracing::warn;

        let max = Config::global().max_skipped_messages as usize;
        while self.skipped_keys.len() >= max {
            if let Some((evicted, _)) = self.skipped_keys.pop_first() {
                self.evicted_skipped_keys += 1;
                warn!(
                    target: "crypto::ratchet",
                    conversation_id = %self.conversation_id,
                    chain = %evicted.0,
                    msg_num = %evicted.1,
                    "Skipped-key store full; oldest entry evicted"
                );
            } else {
                break;
            }
        }

        self.skipped_keys.insert(
            slot,
            SkippedMessageKey {
                key,
                stored_at: current_timestamp(),
            },
        );
    }

    /// Удалить skipped keys старше указанного возраста
    pub fn expire_skipped_keys(&mut self, max_age_seconds: i64) -> usize {
        let now = current_timestamp();
        let before = self.skipped_keys.len();
        self.skipped_keys
            .retain(|_, stored| now - stored.stored_at < max_age_seconds);
        before - self.skipped_keys.len()
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Сериализовать состояние для внешнего KV-хранилища
    pub fn to_serializable(&self) -> SerializableRatchetState {
        SerializableRatchetState {
            phase: self.phase,
            role: self.role,
            conversation_id: self.conversation_id.clone(),
            user_id: self.user_id.clone(),
            sending_root_key: self.sending_root_key.as_ref().to_vec(),
            receiving_root_key: self.receiving_root_key.as_ref().to_vec(),
            sending_chain_key: self.sending_chain_key.as_ref().to_vec(),
            sending_message_number: self.sending_message_number,
            sending_chain_length: self.sending_chain_length,
            previous_sending_length: self.previous_sending_length,
            receiving_chain_key: self.receiving_chain_key.as_ref().to_vec(),
            receiving_message_number: self.receiving_message_number,
            receiving_chain_length: self.receiving_chain_length,
            local_ephemeral_private: self.local_ephemeral_private.as_ref().to_vec(),
            local_ephemeral_public: self.local_ephemeral_public.as_ref().to_vec(),
            prior_ephemeral_private: self
                .prior_ephemeral_private
                .as_ref()
                .map(|k| k.as_ref().to_vec()),
            remote_ephemeral_public: self.remote_ephemeral_public.clone(),
            current_pq_ciphertext: self.current_pq_ciphertext.clone(),
            skipped_keys: self
                .skipped_keys
                .iter()
                .map(|(slot, stored)| (*slot, (stored.key.clone(), stored.stored_at)))
                .collect(),
            evicted_skipped_keys: self.evicted_skipped_keys,
        }
    }

    /// Восстановить состояние из сериализованной формы
    pub fn from_serializable(data: SerializableRatchetState) -> Result<Self> {
        Ok(Self {
            phase: data.phase,
            role: data.role,
            conversation_id: data.conversation_id,
            user_id: data.user_id,
            sending_root_key: S::aead_key_from_bytes(data.sending_root_key),
            receiving_root_key: S::aead_key_from_bytes(data.receiving_root_key),
            sending_chain_key: S::aead_key_from_bytes(data.sending_chain_key),
            sending_message_number: data.sending_message_number,
            sending_chain_length: data.sending_chain_length,
            previous_sending_length: data.previous_sending_length,
            receiving_chain_key: S::aead_key_from_bytes(data.receiving_chain_key),
            receiving_message_number: data.receiving_message_number,
            receiving_chain_length: data.receiving_chain_length,
            local_ephemeral_private: S::agreement_private_from_bytes(data.local_ephemeral_private),
            local_ephemeral_public: S::agreement_public_from_bytes(data.local_ephemeral_public),
            prior_ephemeral_private: data
                .prior_ephemeral_private
                .map(S::agreement_private_from_bytes),
            remote_ephemeral_public: data.remote_ephemeral_public,
            current_pq_ciphertext: data.current_pq_ciphertext,
            skipped_keys: data
                .skipped_keys
                .into_iter()
                .map(|(slot, (key, stored_at))| (slot, SkippedMessageKey { key, stored_at }))
                .collect(),
            evicted_skipped_keys: data.evicted_skipped_keys,
        })
    }
}

/// Сериализуемая форма состояния для storage-слоя
#[derive(Serialize, Deserialize)]
pub struct SerializableRatchetState {
    phase: RatchetPhase,
    role: RatchetRole,
    conversation_id: String,
    user_id: String,
    sending_root_key: Vec<u8>,
    receiving_root_key: Vec<u8>,
    sending_chain_key: Vec<u8>,
    sending_message_number: u32,
    sending_chain_length: u32,
    previous_sending_length: u32,
    receiving_chain_key: Vec<u8>,
    receiving_message_number: u32,
    receiving_chain_length: u32,
    local_ephemeral_private: Vec<u8>,
    local_ephemeral_public: Vec<u8>,
    prior_ephemeral_private: Option<Vec<u8>>,
    remote_ephemeral_public: Vec<u8>,
    current_pq_ciphertext: Option<Vec<u8>>,
    skipped_keys: BTreeMap<(u32, u32), (Vec<u8>, i64)>,
    evicted_skipped_keys: u64,
}

// ============================================================================
// Helpers
// ============================================================================

/// Associated data: ephemeral_public || chain_length || message_number
fn build_aad(ephemeral_public: &[u8], chain_length: u32, message_number: u32) -> Vec<u8> {
    let mut aad = Vec::with_capacity(ephemeral_public.len() + 8);
    aad.extend_from_slice(ephemeral_public);
    aad.extend_from_slice(&chain_length.to_be_bytes());
    aad.extend_from_slice(&message_number.to_be_bytes());
    aad
}

fn decrypt_envelope_with_key<S: CipherSuite>(
    key: &S::AeadKey,
    envelope: &MessageEnvelope,
) -> Result<Vec<u8>> {
    let aad = build_aad(
        &envelope.ephemeral_public_key,
        envelope.chain_length,
        envelope.message_number,
    );
    MessageCipher::<S>::decrypt(&envelope.ciphertext, &envelope.nonce, key, Some(&aad))
}
