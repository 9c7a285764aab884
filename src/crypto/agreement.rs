//! Key Agreement Engine
//!
//! Производит общие секреты из классического DH и (в гибридном режиме)
//! пост-квантовой инкапсуляции, и сводит обе компоненты в один секрет
//! фиксированной длины через domain-separated HKDF.
//!
//! ## Dataflow
//! ```text
//! Инициатор                                  Получатель
//! =========                                  ==========
//!
//! 1. attempt = KeyExchangeAttempt::initiate()
//!    → генерирует ephemeral pair (classical + PQ часть)
//! 2. Отправляет attempt.offer() →
//!
//!                                            1. respond(offer):
//!                                               - свой ephemeral pair
//!                                               - dh = DH(resp_priv, offer.pub)
//!                                               - (ct, pq) = encapsulate(offer.pub)
//!                                               - ss = combine(dh, pq)
//!                                            2. ← отправляет answer (pub, ct)
//!
//! 3. attempt.complete(answer):
//!    - проверка таймаута (30s) — протухшие attempts выбрасываются,
//!      ephemeral material НЕ переиспользуется
//!    - dh = DH(attempt.priv, answer.pub)
//!    - pq = decapsulate(attempt.priv, answer.ct)
//!    - ss = combine(dh, pq)   ← тот же секрет, что у получателя
//! ```
//!
//! Результат (`RatchetSeed`) скармливается `RatchetState::initialize`.

use crate::config::Config;
use crate::crypto::provider::CipherSuite;
use crate::error::{CryptoError, Result};
use crate::utils::time::current_timestamp;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use zeroize::Zeroizing;

/// Длина секретов, которые принимает и выдаёт `combine`
const SHARED_SECRET_LEN: usize = 32;

/// Domain separation label для гибридного сведения секретов
const HYBRID_COMBINE_INFO: &[u8] = b"Meridian-Hybrid-Key-Combine-v1";

/// Роль стороны при инициализации ratchet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RatchetRole {
    Initiator,
    Responder,
}

/// Движок key agreement, параметризованный suite
pub struct KeyAgreementEngine<S: CipherSuite> {
    _phantom: PhantomData<S>,
}

impl<S: CipherSuite> KeyAgreementEngine<S> {
    /// Сгенерировать key pair для agreement (classical, и PQ часть в
    /// гибридном suite)
    pub fn generate_key_pair() -> Result<(S::AgreementPrivateKey, S::AgreementPublicKey)> {
        S::generate_agreement_keys()
    }

    /// Классический DH между локальным private и удалённым public
    pub fn derive_shared_secret(
        local_private: &S::AgreementPrivateKey,
        remote_public: &[u8],
    ) -> Result<Vec<u8>> {
        S::diffie_hellman(local_private, remote_public)
    }

    /// Пост-квантовая инкапсуляция (или ephemeral-DH для classic suite).
    /// Возвращает `(ciphertext, shared_secret)`.
    pub fn encapsulate(remote_public: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        S::encapsulate(remote_public)
    }

    /// Декапсуляция с локальным private key
    pub fn decapsulate(
        local_private: &S::AgreementPrivateKey,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        S::decapsulate(local_private, ciphertext)
    }

    /// Свести классический и (опционально) пост-квантовый секрет в один
    /// секрет фиксированной длины.
    ///
    /// В classical-only режиме вырождается в классический секрет как есть.
    /// Оба входа обязаны быть ровно 32 байта — иначе `InputLengthError`.
    pub fn combine(classical_secret: &[u8], pq_secret: Option<&[u8]>) -> Result<Vec<u8>> {
        if classical_secret.len() != SHARED_SECRET_LEN {
            return Err(CryptoError::InputLengthError {
                expected: SHARED_SECRET_LEN,
                actual: classical_secret.len(),
            });
        }

        let Some(pq) = pq_secret else {
            return Ok(classical_secret.to_vec());
        };

        if pq.len() != SHARED_SECRET_LEN {
            return Err(CryptoError::InputLengthError {
                expected: SHARED_SECRET_LEN,
                actual: pq.len(),
            });
        }

        let mut ikm = Zeroizing::new(Vec::with_capacity(SHARED_SECRET_LEN * 2));
        ikm.extend_from_slice(classical_secret);
        ikm.extend_from_slice(pq);

        S::hkdf_derive_key(b"", &ikm, HYBRID_COMBINE_INFO, SHARED_SECRET_LEN)
    }
}

// ============================================================================
// Key exchange handshake
// ============================================================================

/// Публичная часть инициаторского handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyExchangeOffer {
    pub attempt_id: String,
    pub suite_id: u16,
    #[serde(with = "serde_bytes")]
    pub ephemeral_public: Vec<u8>,
    pub created_at: i64,
}

/// Ответ получателя на offer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyExchangeAnswer {
    pub attempt_id: String,
    #[serde(with = "serde_bytes")]
    pub ephemeral_public: Vec<u8>,
    /// KEM ciphertext (только в гибридном режиме)
    pub pq_ciphertext: Option<Vec<u8>>,
}

/// Итог успешного handshake — сырьё для инициализации ratchet
pub struct RatchetSeed {
    pub shared_secret: Zeroizing<Vec<u8>>,
    pub role: RatchetRole,
    pub local_ephemeral_private: Zeroizing<Vec<u8>>,
    pub local_ephemeral_public: Vec<u8>,
    pub remote_ephemeral_public: Vec<u8>,
}

/// Незавершённая попытка key exchange на стороне инициатора.
///
/// Попытка одноразовая: `complete` поглощает её. Протухшая попытка
/// (старше `handshake_timeout_seconds`) отклоняется, и её ephemeral
/// material затирается при Drop — ключи не переживают попытку и не
/// переиспользуются в следующей.
pub struct KeyExchangeAttempt<S: CipherSuite> {
    attempt_id: String,
    ephemeral_private: Zeroizing<Vec<u8>>,
    ephemeral_public: Vec<u8>,
    started_at: i64,
    _phantom: PhantomData<S>,
}

impl<S: CipherSuite> KeyExchangeAttempt<S> {
    /// Начать новую попытку: свежая ephemeral пара + offer для отправки
    pub fn initiate() -> Result<(Self, KeyExchangeOffer)> {
        use tracing::debug;

        let (private, public) = S::generate_agreement_keys()?;
        let attempt_id = uuid::Uuid::new_v4().to_string();
        let started_at = current_timestamp();

        debug!(
            target: "crypto::agreement",
            attempt_id = %attempt_id,
            suite_id = %S::suite_id(),
            "Key exchange attempt started"
        );

        let offer = KeyExchangeOffer {
            attempt_id: attempt_id.clone(),
            suite_id: S::suite_id(),
            ephemeral_public: public.as_ref().to_vec(),
            created_at: started_at,
        };

        Ok((
            Self {
                attempt_id,
                ephemeral_private: Zeroizing::new(private.as_ref().to_vec()),
                ephemeral_public: public.as_ref().to_vec(),
                started_at,
                _phantom: PhantomData,
            },
            offer,
        ))
    }

    pub fn attempt_id(&self) -> &str {
        &self.attempt_id
    }

    /// Ответить на offer (сторона получателя). Возвращает seed для
    /// собственного ratchet и answer для инициатора.
    pub fn respond(offer: &KeyExchangeOffer) -> Result<(RatchetSeed, KeyExchangeAnswer)> {
        use tracing::debug;

        if offer.suite_id != S::suite_id() {
            return Err(CryptoError::StateError(format!(
                "suite mismatch: offer {} vs local {}",
                offer.suite_id,
                S::suite_id()
            )));
        }

        let (private, public) = S::generate_agreement_keys()?;
        let classical = S::diffie_hellman(&private, &offer.ephemeral_public)?;

        let (pq_ciphertext, pq_secret) = if S::has_post_quantum() {
            let (ciphertext, secret) = S::encapsulate(&offer.ephemeral_public)?;
            (Some(ciphertext), Some(secret))
        } else {
            (None, None)
        };

        let shared_secret =
            KeyAgreementEngine::<S>::combine(&classical, pq_secret.as_deref())?;

        debug!(
            target: "crypto::agreement",
            attempt_id = %offer.attempt_id,
            hybrid = %S::has_post_quantum(),
            "Key exchange answered"
        );

        let answer = KeyExchangeAnswer {
            attempt_id: offer.attempt_id.clone(),
            ephemeral_public: public.as_ref().to_vec(),
            pq_ciphertext,
        };

        let seed = RatchetSeed {
            shared_secret: Zeroizing::new(shared_secret),
            role: RatchetRole::Responder,
            local_ephemeral_private: Zeroizing::new(private.as_ref().to_vec()),
            local_ephemeral_public: public.as_ref().to_vec(),
            remote_ephemeral_public: offer.ephemeral_public.clone(),
        };

        Ok((seed, answer))
    }

    /// Завершить попытку ответом получателя.
    ///
    /// # Errors
    ///
    /// `StateError` если attempt_id не совпадает или попытка протухла
    /// (таймаут из Config). Протухшая попытка уничтожается; повторный
    /// handshake обязан начинаться с `initiate()` и свежих ключей.
    pub fn complete(self, answer: &KeyExchangeAnswer) -> Result<RatchetSeed> {
        use tracing::{debug, warn};

        if answer.attempt_id != self.attempt_id {
            return Err(CryptoError::StateError(format!(
                "answer for unknown attempt: {}",
                answer.attempt_id
            )));
        }

        let age = current_timestamp() - self.started_at;
        if age > Config::global().handshake_timeout_seconds {
            warn!(
                target: "crypto::agreement",
                attempt_id = %self.attempt_id,
                age_seconds = %age,
                "Key exchange attempt expired; ephemeral keys discarded"
            );
            return Err(CryptoError::StateError(
                "key exchange attempt expired".to_string(),
            ));
        }

        let local_private = S::agreement_private_from_bytes(self.ephemeral_private.to_vec());
        let classical = S::diffie_hellman(&local_private, &answer.ephemeral_public)?;

        let pq_secret = match (&answer.pq_ciphertext, S::has_post_quantum()) {
            (Some(ciphertext), true) => Some(S::decapsulate(&local_private, ciphertext)?),
            (None, false) => None,
            (Some(_), false) => {
                return Err(CryptoError::StateError(
                    "unexpected PQ ciphertext for classical suite".to_string(),
                ))
            }
            (None, true) => {
                return Err(CryptoError::StateError(
                    "missing PQ ciphertext for hybrid suite".to_string(),
                ))
            }
        };

        let shared_secret =
            KeyAgreementEngine::<S>::combine(&classical, pq_secret.as_deref())?;

        debug!(
            target: "crypto::agreement",
            attempt_id = %self.attempt_id,
            "Key exchange completed"
        );

        Ok(RatchetSeed {
            shared_secret: Zeroizing::new(shared_secret),
            role: RatchetRole::Initiator,
            local_ephemeral_private: Zeroizing::new(self.ephemeral_private.to_vec()),
            local_ephemeral_public: self.ephemeral_public.clone(),
            remote_ephemeral_public: answer.ephemeral_public.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::suites::ClassicSuite;

    #[test]
    fn test_combine_classical_only_is_identity() {
        let secret = vec![42u8; 32];
        let combined = KeyAgreementEngine::<ClassicSuite>::combine(&secret, None).unwrap();
        assert_eq!(combined, secret);
    }

    #[test]
    fn test_combine_rejects_wrong_lengths() {
        let short = vec![1u8; 16];
        let ok = vec![1u8; 32];

        let result = KeyAgreementEngine::<ClassicSuite>::combine(&short, None);
        assert!(matches!(
            result,
            Err(CryptoError::InputLengthError {
                expected: 32,
                actual: 16
            })
        ));

        let result = KeyAgreementEngine::<ClassicSuite>::combine(&ok, Some(&short));
        assert!(matches!(result, Err(CryptoError::InputLengthError { .. })));
    }

    #[test]
    fn test_combine_hybrid_differs_from_inputs() {
        let classical = vec![1u8; 32];
        let pq = vec![2u8; 32];
        let combined =
            KeyAgreementEngine::<ClassicSuite>::combine(&classical, Some(&pq)).unwrap();
        assert_eq!(combined.len(), 32);
        assert_ne!(combined, classical);
        assert_ne!(combined, pq);
    }

    #[test]
    fn test_handshake_produces_matching_secrets() {
        let (attempt, offer) = KeyExchangeAttempt::<ClassicSuite>::initiate().unwrap();
        let (responder_seed, answer) = KeyExchangeAttempt::<ClassicSuite>::respond(&offer).unwrap();
        let initiator_seed = attempt.complete(&answer).unwrap();

        assert_eq!(
            *initiator_seed.shared_secret,
            *responder_seed.shared_secret
        );
        assert_eq!(initiator_seed.role, RatchetRole::Initiator);
        assert_eq!(responder_seed.role, RatchetRole::Responder);
        assert_eq!(
            initiator_seed.remote_ephemeral_public,
            responder_seed.local_ephemeral_public
        );
    }

    #[test]
    fn test_complete_rejects_foreign_answer() {
        let (attempt, _offer) = KeyExchangeAttempt::<ClassicSuite>::initiate().unwrap();
        let answer = KeyExchangeAnswer {
            attempt_id: "other-attempt".to_string(),
            ephemeral_public: vec![0u8; 32],
            pq_ciphertext: None,
        };
        assert!(matches!(
            attempt.complete(&answer),
            Err(CryptoError::StateError(_))
        ));
    }
}
