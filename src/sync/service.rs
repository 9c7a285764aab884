//! CrossDeviceSyncService — упаковка и обработка KeySyncPackage
//!
//! Создание: ephemeral agreement к ключу шифрования получателя (+ KEM в
//! гибридном режиме), AEAD поверх материала, подпись устройством
//! отправителя, integrity hash, приоритет по типу ключа.
//!
//! Обработка: подпись → hash → расшифровка → атомарный импорт. Любой
//! отказ отклоняет пакет целиком (без частичного импорта) и помечает
//! отправителя на trust decay. Повторные доставки идемпотентны по
//! packageId.

use crate::crypto::agreement::KeyAgreementEngine;
use crate::crypto::cipher::MessageCipher;
use crate::crypto::provider::CipherSuite;
use crate::error::{CryptoError, Result};
use crate::identity::registry::DeviceIdentityRegistry;
use crate::identity::TrustLevel;
use crate::state::events::{CoreEvent, EventBus};
use crate::sync::package::{KeySyncPackage, KeyType, SyncPriority};
use crate::utils::time::current_timestamp;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

/// Domain separation label для ключа шифрования пакета
const SYNC_PACKAGE_INFO: &[u8] = b"Meridian-Sync-Package-Key-v1";

/// Итог обработки пакета
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportOutcome {
    /// Материал импортирован
    Imported,
    /// Пакет уже обрабатывался; импорт не повторялся
    Duplicate,
}

/// Сервис межустройственной синхронизации ключей
pub struct CrossDeviceSyncService<S: CipherSuite> {
    /// packageId всех успешно обработанных пакетов (идемпотентность)
    processed: HashSet<String>,
    events: Arc<EventBus>,
    _phantom: PhantomData<S>,
}

impl<S: CipherSuite> CrossDeviceSyncService<S> {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            processed: HashSet::new(),
            events,
            _phantom: PhantomData,
        }
    }

    /// Создать пакет с ключевым материалом для целевого устройства.
    ///
    /// Приоритет выводится из типа ключа; `priority_override` позволяет
    /// поднять его (например, для экстренной ротации).
    pub fn create_key_sync_package(
        &self,
        registry: &DeviceIdentityRegistry<S>,
        key_material: &[u8],
        key_type: KeyType,
        target_device_id: &str,
        priority_override: Option<SyncPriority>,
    ) -> Result<KeySyncPackage> {
        use tracing::debug;

        let recipient = registry
            .device(target_device_id)
            .ok_or_else(|| CryptoError::NotFound(format!("device {}", target_device_id)))?;
        if recipient.trust_level == TrustLevel::Revoked {
            return Err(CryptoError::StateError(format!(
                "refusing to sync keys to revoked device {}",
                target_device_id
            )));
        }
        let from_device_id = registry
            .local_device_id()
            .ok_or_else(|| CryptoError::StateError("local device not initialized".to_string()))?
            .to_string();

        // Ephemeral agreement к получателю (+ KEM в гибридном режиме)
        let (ephemeral_private, ephemeral_public) = S::generate_agreement_keys()?;
        let classical = S::diffie_hellman(&ephemeral_private, &recipient.encryption_public)?;
        let (pq_ciphertext, pq_secret) = if S::has_post_quantum() {
            let (ciphertext, secret) = S::encapsulate(&recipient.encryption_public)?;
            (Some(ciphertext), Some(secret))
        } else {
            (None, None)
        };
        let combined = KeyAgreementEngine::<S>::combine(&classical, pq_secret.as_deref())?;
        let payload_key =
            S::aead_key_from_bytes(S::hkdf_derive_key(b"", &combined, SYNC_PACKAGE_INFO, 32)?);

        let package_id = uuid::Uuid::new_v4().to_string();
        let aad = package_aad(&package_id, &from_device_id, target_device_id);
        let sealed = MessageCipher::<S>::encrypt(key_material, &payload_key, Some(&aad))?;

        let integrity_hash = Sha256::digest(&sealed.ciphertext).to_vec();
        let priority = priority_override.unwrap_or_else(|| key_type.default_priority());

        let mut package = KeySyncPackage {
            package_id: package_id.clone(),
            from_device_id,
            to_device_id: target_device_id.to_string(),
            key_type,
            ephemeral_public: ephemeral_public.as_ref().to_vec(),
            pq_ciphertext,
            nonce: sealed.nonce,
            encrypted_payload: sealed.ciphertext,
            integrity_hash,
            signature: Vec::new(),
            priority,
            created_at: current_timestamp(),
        };

        let signing = registry.local_signing_key()?;
        package.signature = S::sign(&signing, &package.signed_payload()?)?;

        debug!(
            target: "sync::service",
            package_id = %package.package_id,
            key_type = ?key_type,
            priority = ?package.priority,
            to = %target_device_id,
            "Key sync package created"
        );

        self.events.emit(&CoreEvent::SyncPackageAvailable {
            package_id,
            to_device_id: target_device_id.to_string(),
        });

        Ok(package)
    }

    /// Обработать входящий пакет.
    ///
    /// `import` вызывается ровно один раз с расшифрованным материалом и
    /// обязан применить его атомарно. До первого успешного прохода всех
    /// проверок локальное состояние не трогается.
    pub fn process_key_sync_package(
        &mut self,
        registry: &mut DeviceIdentityRegistry<S>,
        package: &KeySyncPackage,
        import: impl FnOnce(&[u8]) -> Result<()>,
    ) -> Result<ImportOutcome> {
        use tracing::{debug, warn};

        if self.processed.contains(&package.package_id) {
            debug!(
                target: "sync::service",
                package_id = %package.package_id,
                "Duplicate package delivery ignored"
            );
            return Ok(ImportOutcome::Duplicate);
        }

        let sender = registry
            .device(&package.from_device_id)
            .ok_or_else(|| {
                CryptoError::NotFound(format!("sender device {}", package.from_device_id))
            })?;
        if sender.trust_level == TrustLevel::Revoked {
            return Err(CryptoError::StateError(format!(
                "sender device {} is revoked",
                package.from_device_id
            )));
        }
        let sender_verifying = S::verifying_key_from_bytes(sender.signing_public.clone());

        // 1. Подпись отправителя
        if let Err(e) = S::verify(
            &sender_verifying,
            &package.signed_payload()?,
            &package.signature,
        ) {
            warn!(
                target: "sync::service",
                package_id = %package.package_id,
                from = %package.from_device_id,
                "Package signature verification failed"
            );
            self.reject(registry, package);
            return Err(e);
        }

        // 2. Integrity hash поверх зашифрованного payload
        let expected_hash = Sha256::digest(&package.encrypted_payload).to_vec();
        if expected_hash != package.integrity_hash {
            warn!(
                target: "sync::service",
                package_id = %package.package_id,
                "Package integrity hash mismatch"
            );
            self.reject(registry, package);
            return Err(CryptoError::AuthenticationError(
                "sync package integrity hash mismatch".to_string(),
            ));
        }

        // 3. Расшифровка ключом получателя
        let local_private = registry.local_encryption_key()?;
        let classical = S::diffie_hellman(&local_private, &package.ephemeral_public)?;
        let pq_secret = match (&package.pq_ciphertext, S::has_post_quantum()) {
            (Some(ciphertext), true) => Some(S::decapsulate(&local_private, ciphertext)?),
            (None, false) => None,
            _ => {
                self.reject(registry, package);
                return Err(CryptoError::AuthenticationError(
                    "package PQ component does not match the negotiated suite".to_string(),
                ));
            }
        };
        let combined = KeyAgreementEngine::<S>::combine(&classical, pq_secret.as_deref())?;
        let payload_key =
            S::aead_key_from_bytes(S::hkdf_derive_key(b"", &combined, SYNC_PACKAGE_INFO, 32)?);

        let aad = package_aad(
            &package.package_id,
            &package.from_device_id,
            &package.to_device_id,
        );
        let key_material = match MessageCipher::<S>::decrypt(
            &package.encrypted_payload,
            &package.nonce,
            &payload_key,
            Some(&aad),
        ) {
            Ok(material) => material,
            Err(e) => {
                self.reject(registry, package);
                return Err(e);
            }
        };

        // 4. Атомарный импорт; только после успеха пакет считается
        //    обработанным
        import(&key_material)?;
        self.processed.insert(package.package_id.clone());

        debug!(
            target: "sync::service",
            package_id = %package.package_id,
            key_type = ?package.key_type,
            "Key sync package imported"
        );

        Ok(ImportOutcome::Imported)
    }

    /// Количество обработанных пакетов (для диагностики)
    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    fn reject(&self, registry: &mut DeviceIdentityRegistry<S>, package: &KeySyncPackage) {
        registry.flag_for_decay(&package.from_device_id);
        self.events.emit(&CoreEvent::SecurityAlert {
            context: format!("sync package {} rejected", package.package_id),
        });
    }
}

fn package_aad(package_id: &str, from: &str, to: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(package_id.len() + from.len() + to.len());
    aad.extend_from_slice(package_id.as_bytes());
    aad.extend_from_slice(from.as_bytes());
    aad.extend_from_slice(to.as_bytes());
    aad
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::suites::ClassicSuite;
    use crate::identity::DeviceType;

    struct Pair {
        sender: DeviceIdentityRegistry<ClassicSuite>,
        receiver: DeviceIdentityRegistry<ClassicSuite>,
        receiver_device_id: String,
    }

    fn device_pair() -> Pair {
        let mut sender = DeviceIdentityRegistry::<ClassicSuite>::new();
        let sender_identity = sender
            .create_device_identity("user", "laptop", DeviceType::Desktop)
            .unwrap();

        let mut receiver = DeviceIdentityRegistry::<ClassicSuite>::new();
        let receiver_identity = receiver
            .create_device_identity("user", "phone", DeviceType::Mobile)
            .unwrap();

        sender.register_peer_device(receiver_identity.clone()).unwrap();
        receiver.register_peer_device(sender_identity).unwrap();

        Pair {
            sender,
            receiver,
            receiver_device_id: receiver_identity.device_id,
        }
    }

    #[test]
    fn test_package_roundtrip_imports_material() {
        let pair = device_pair();
        let events = Arc::new(EventBus::new());
        let sender_service = CrossDeviceSyncService::<ClassicSuite>::new(events.clone());
        let mut receiver_service = CrossDeviceSyncService::<ClassicSuite>::new(events);

        let package = sender_service
            .create_key_sync_package(
                &pair.sender,
                b"ratchet state blob",
                KeyType::RatchetState,
                &pair.receiver_device_id,
                None,
            )
            .unwrap();
        assert_eq!(package.priority, SyncPriority::Medium);

        let mut receiver = pair.receiver;
        let mut imported = Vec::new();
        let outcome = receiver_service
            .process_key_sync_package(&mut receiver, &package, |material| {
                imported = material.to_vec();
                Ok(())
            })
            .unwrap();

        assert_eq!(outcome, ImportOutcome::Imported);
        assert_eq!(imported, b"ratchet state blob");
    }

    #[test]
    fn test_duplicate_delivery_is_idempotent() {
        let pair = device_pair();
        let events = Arc::new(EventBus::new());
        let sender_service = CrossDeviceSyncService::<ClassicSuite>::new(events.clone());
        let mut receiver_service = CrossDeviceSyncService::<ClassicSuite>::new(events);

        let package = sender_service
            .create_key_sync_package(
                &pair.sender,
                b"material",
                KeyType::DeviceIdentity,
                &pair.receiver_device_id,
                None,
            )
            .unwrap();

        let mut receiver = pair.receiver;
        let mut import_calls = 0;
        receiver_service
            .process_key_sync_package(&mut receiver, &package, |_| {
                import_calls += 1;
                Ok(())
            })
            .unwrap();
        let outcome = receiver_service
            .process_key_sync_package(&mut receiver, &package, |_| {
                import_calls += 1;
                Ok(())
            })
            .unwrap();

        assert_eq!(outcome, ImportOutcome::Duplicate);
        assert_eq!(import_calls, 1, "import must run exactly once");
    }

    #[test]
    fn test_tampered_package_is_rejected_and_decays_trust() {
        let pair = device_pair();
        let events = Arc::new(EventBus::new());
        let sender_service = CrossDeviceSyncService::<ClassicSuite>::new(events.clone());
        let mut receiver_service = CrossDeviceSyncService::<ClassicSuite>::new(events);

        let mut package = sender_service
            .create_key_sync_package(
                &pair.sender,
                b"material",
                KeyType::ConversationKey,
                &pair.receiver_device_id,
                None,
            )
            .unwrap();
        package.encrypted_payload[0] ^= 0x01;

        let mut receiver = pair.receiver;
        let sender_id = package.from_device_id.clone();
        let score_before = receiver.trust_score(&sender_id).unwrap();

        let mut import_calls = 0;
        let result = receiver_service.process_key_sync_package(&mut receiver, &package, |_| {
            import_calls += 1;
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(import_calls, 0, "no partial import on failure");
        let score_after = receiver.trust_score(&sender_id).unwrap();
        assert!(score_after < score_before, "sender trust must decay");
    }

    #[test]
    fn test_forged_signature_is_rejected() {
        let pair = device_pair();
        let events = Arc::new(EventBus::new());
        let sender_service = CrossDeviceSyncService::<ClassicSuite>::new(events.clone());
        let mut receiver_service = CrossDeviceSyncService::<ClassicSuite>::new(events);

        let mut package = sender_service
            .create_key_sync_package(
                &pair.sender,
                b"material",
                KeyType::Revocation,
                &pair.receiver_device_id,
                None,
            )
            .unwrap();
        assert_eq!(package.priority, SyncPriority::Critical);
        package.signature[0] ^= 0x01;

        let mut receiver = pair.receiver;
        let result =
            receiver_service.process_key_sync_package(&mut receiver, &package, |_| Ok(()));
        assert!(matches!(
            result,
            Err(CryptoError::AuthenticationError(_))
        ));
    }
}
