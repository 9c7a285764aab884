//! RatchetEngine — ratchet-состояния поверх инжектированного хранилища
//!
//! Состояния живут во внешнем KV-хранилище под ключом
//! (conversationId, userId); движок поднимает состояние, выполняет
//! операцию и сохраняет результат. Никаких глобальных карт сессий.
//! Single-writer: вызывающий обязан сериализовать операции по одной
//! паре (conversationId, userId).

use crate::config::Config;
use crate::crypto::agreement::RatchetSeed;
use crate::crypto::messaging::ratchet::{MessageEnvelope, RatchetState, SerializableRatchetState};
use crate::crypto::provider::CipherSuite;
use crate::error::{CryptoError, Result};
use crate::state::events::{CoreEvent, EventBus};
use crate::storage::models::StoredRatchetState;
use crate::storage::RatchetStore;
use crate::utils::serialization;
use crate::utils::time::current_timestamp;
use std::marker::PhantomData;
use std::sync::Arc;

/// Движок ratchet-сессий
pub struct RatchetEngine<S: CipherSuite> {
    store: Box<dyn RatchetStore>,
    events: Arc<EventBus>,
    _phantom: PhantomData<S>,
}

impl<S: CipherSuite> RatchetEngine<S> {
    pub fn new(store: Box<dyn RatchetStore>, events: Arc<EventBus>) -> Self {
        Self {
            store,
            events,
            _phantom: PhantomData,
        }
    }

    /// Создать состояние из завершённого key exchange
    pub fn initialize(
        &mut self,
        conversation_id: &str,
        user_id: &str,
        seed: &RatchetSeed,
    ) -> Result<()> {
        let state =
            RatchetState::<S>::initialize(conversation_id.to_string(), user_id.to_string(), seed)?;
        self.save(&state)
    }

    /// Зашифровать сообщение в беседе
    pub fn encrypt(
        &mut self,
        conversation_id: &str,
        user_id: &str,
        plaintext: &[u8],
    ) -> Result<MessageEnvelope> {
        let mut state = self.load(conversation_id, user_id)?;
        let envelope = state.encrypt(plaintext)?;
        self.save(&state)?;
        Ok(envelope)
    }

    /// Расшифровать envelope.
    ///
    /// Состояние сохраняется только после успеха; проваленная
    /// аутентификация поднимает security event и ничего не мутирует.
    pub fn decrypt(
        &mut self,
        conversation_id: &str,
        user_id: &str,
        envelope: &MessageEnvelope,
    ) -> Result<Vec<u8>> {
        let mut state = self.load(conversation_id, user_id)?;
        let evictions_before = state.evicted_skipped_keys();

        let plaintext = match state.decrypt(envelope) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                if matches!(e, CryptoError::AuthenticationError(_)) {
                    self.events.emit(&CoreEvent::SecurityAlert {
                        context: format!(
                            "message authentication failed in conversation {}",
                            conversation_id
                        ),
                    });
                }
                return Err(e);
            }
        };

        let evicted = state.evicted_skipped_keys() - evictions_before;
        if evicted > 0 {
            self.events.emit(&CoreEvent::CapacityEviction {
                component: "skipped_keys".to_string(),
                dropped: evicted,
            });
        }

        self.save(&state)?;
        Ok(plaintext)
    }

    /// Перевести состояние в терминальную фазу (например, при revocation
    /// устройства)
    pub fn revoke(&mut self, conversation_id: &str, user_id: &str) -> Result<()> {
        let mut state = self.load(conversation_id, user_id)?;
        state.revoke();
        self.save(&state)
    }

    /// Уничтожить состояние (удаление беседы)
    pub fn destroy(&mut self, conversation_id: &str, user_id: &str) -> Result<()> {
        self.store.delete_ratchet(conversation_id, user_id)
    }

    /// Удалить протухшие skipped keys (TTL из Config)
    pub fn purge_expired_keys(&mut self, conversation_id: &str, user_id: &str) -> Result<usize> {
        let mut state = self.load(conversation_id, user_id)?;
        let removed =
            state.expire_skipped_keys(Config::global().max_skipped_message_age_seconds);
        if removed > 0 {
            self.save(&state)?;
        }
        Ok(removed)
    }

    /// Экспортировать состояние для переноса на другое устройство
    /// (payload для CrossDeviceSyncService)
    pub fn export_state(&self, conversation_id: &str, user_id: &str) -> Result<Vec<u8>> {
        let stored = self
            .store
            .get_ratchet(conversation_id, user_id)?
            .ok_or_else(|| {
                CryptoError::StateError(format!(
                    "no ratchet state for conversation {}",
                    conversation_id
                ))
            })?;
        Ok(stored.session_data)
    }

    /// Импортировать состояние, пришедшее sync-пакетом.
    ///
    /// Блоб сначала полностью валидируется разбором; установка в
    /// хранилище — один put (всё или ничего).
    pub fn import_state(
        &mut self,
        conversation_id: &str,
        user_id: &str,
        blob: &[u8],
    ) -> Result<()> {
        let parsed: SerializableRatchetState = serialization::from_bytes(blob)?;
        let _validated = RatchetState::<S>::from_serializable(parsed)?;

        self.store.put_ratchet(StoredRatchetState {
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            session_data: blob.to_vec(),
            updated_at: current_timestamp(),
        })
    }

    fn load(&self, conversation_id: &str, user_id: &str) -> Result<RatchetState<S>> {
        let stored = self
            .store
            .get_ratchet(conversation_id, user_id)?
            .ok_or_else(|| {
                CryptoError::StateError(format!(
                    "ratchet for conversation {} is not initialized",
                    conversation_id
                ))
            })?;
        let parsed: SerializableRatchetState = serialization::from_bytes(&stored.session_data)?;
        RatchetState::from_serializable(parsed)
    }

    fn save(&mut self, state: &RatchetState<S>) -> Result<()> {
        let blob = serialization::to_bytes(&state.to_serializable())?;
        self.store.put_ratchet(StoredRatchetState {
            conversation_id: state.conversation_id().to_string(),
            user_id: state.user_id().to_string(),
            session_data: blob,
            updated_at: current_timestamp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::agreement::KeyExchangeAttempt;
    use crate::crypto::suites::ClassicSuite;
    use crate::storage::MemoryStorage;

    fn engine() -> RatchetEngine<ClassicSuite> {
        RatchetEngine::new(Box::new(MemoryStorage::new()), Arc::new(EventBus::new()))
    }

    fn engine_pair() -> (RatchetEngine<ClassicSuite>, RatchetEngine<ClassicSuite>) {
        let (attempt, offer) = KeyExchangeAttempt::<ClassicSuite>::initiate().unwrap();
        let (responder_seed, answer) =
            KeyExchangeAttempt::<ClassicSuite>::respond(&offer).unwrap();
        let initiator_seed = attempt.complete(&answer).unwrap();

        let mut alice = engine();
        alice.initialize("conv", "alice", &initiator_seed).unwrap();
        let mut bob = engine();
        bob.initialize("conv", "bob", &responder_seed).unwrap();
        (alice, bob)
    }

    #[test]
    fn test_engine_roundtrip_through_store() {
        let (mut alice, mut bob) = engine_pair();

        let envelope = alice.encrypt("conv", "alice", b"hello").unwrap();
        let plaintext = bob.decrypt("conv", "bob", &envelope).unwrap();
        assert_eq!(plaintext, b"hello");
    }

    #[test]
    fn test_operations_on_missing_state_fail() {
        let mut engine = engine();
        assert!(matches!(
            engine.encrypt("nope", "user", b"m"),
            Err(CryptoError::StateError(_))
        ));
    }

    #[test]
    fn test_destroy_removes_state() {
        let (mut alice, _bob) = engine_pair();
        alice.destroy("conv", "alice").unwrap();
        assert!(matches!(
            alice.encrypt("conv", "alice", b"m"),
            Err(CryptoError::StateError(_))
        ));
    }

    #[test]
    fn test_export_import_moves_session_between_devices() {
        let (mut alice, mut bob) = engine_pair();

        // Первое устройство Боба обменялось сообщением
        let envelope = alice.encrypt("conv", "alice", b"one").unwrap();
        bob.decrypt("conv", "bob", &envelope).unwrap();

        // Второе устройство Боба получает состояние sync-пакетом
        let blob = bob.export_state("conv", "bob").unwrap();
        let mut bob_tablet = engine();
        bob_tablet.import_state("conv", "bob", &blob).unwrap();

        let envelope = alice.encrypt("conv", "alice", b"two").unwrap();
        assert_eq!(
            bob_tablet.decrypt("conv", "bob", &envelope).unwrap(),
            b"two"
        );
    }

    #[test]
    fn test_import_rejects_garbage_blob() {
        let mut engine = engine();
        assert!(engine.import_state("conv", "user", b"not a blob").is_err());
    }
}
