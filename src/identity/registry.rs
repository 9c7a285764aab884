//! Реестр устройств пользователя
//!
//! Чтения (trust score, списки) свободны; записи (верификация,
//! revocation) сериализуются per-device владельцем реестра — реестр
//! сам по себе не потокобезопасен, оберните его mutex'ом на процесс.

use crate::crypto::provider::CipherSuite;
use crate::error::{CryptoError, Result};
use crate::identity::device::{
    derive_device_id, DeviceIdentity, DeviceType, RevocationRecord, TrustFactors, TrustLevel,
    VerificationChallenge, VerificationMethod,
};
use crate::utils::time::current_timestamp;
use std::collections::HashMap;
use std::marker::PhantomData;
use zeroize::Zeroizing;

/// Приватные ключи локального устройства
pub struct LocalDeviceKeys {
    pub signing_private: Zeroizing<Vec<u8>>,
    pub encryption_private: Zeroizing<Vec<u8>>,
}

/// Реестр идентичностей устройств одного пользователя
pub struct DeviceIdentityRegistry<S: CipherSuite> {
    devices: HashMap<String, DeviceIdentity>,
    local_device_id: Option<String>,
    local_keys: Option<LocalDeviceKeys>,
    /// Выданные и ещё не использованные challenges, по target device
    pending_challenges: HashMap<String, VerificationChallenge>,
    _phantom: PhantomData<S>,
}

impl<S: CipherSuite> DeviceIdentityRegistry<S> {
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
            local_device_id: None,
            local_keys: None,
            pending_challenges: HashMap::new(),
            _phantom: PhantomData,
        }
    }

    /// Создать идентичность локального устройства: свежие пары ключей,
    /// deviceId как стабильный хэш публичных ключей.
    pub fn create_device_identity(
        &mut self,
        user_id: &str,
        name: &str,
        device_type: DeviceType,
    ) -> Result<DeviceIdentity> {
        use tracing::info;

        let (signing_private, signing_public) = S::generate_signing_keys()?;
        let (encryption_private, encryption_public) = S::generate_agreement_keys()?;

        let device_id =
            derive_device_id(signing_public.as_ref(), encryption_public.as_ref());
        let now = current_timestamp();

        let identity = DeviceIdentity {
            device_id: device_id.clone(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            device_type,
            signing_public: signing_public.as_ref().to_vec(),
            encryption_public: encryption_public.as_ref().to_vec(),
            trust_level: TrustLevel::Unverified,
            trust_factors: TrustFactors::new(now),
            created_at: now,
            revocation: None,
        };

        info!(
            target: "identity::registry",
            device_id = %device_id,
            user_id = %user_id,
            device_type = ?device_type,
            "Device identity created"
        );

        self.devices.insert(device_id.clone(), identity.clone());
        self.local_device_id = Some(device_id);
        self.local_keys = Some(LocalDeviceKeys {
            signing_private: Zeroizing::new(signing_private.as_ref().to_vec()),
            encryption_private: Zeroizing::new(encryption_private.as_ref().to_vec()),
        });

        Ok(identity)
    }

    /// Зарегистрировать устройство-пира (пришедшее через sync).
    ///
    /// deviceId обязан совпадать с хэшом публичных ключей — чужой id с
    /// чужими ключами отклоняется до записи.
    pub fn register_peer_device(&mut self, identity: DeviceIdentity) -> Result<()> {
        let expected =
            derive_device_id(&identity.signing_public, &identity.encryption_public);
        if expected != identity.device_id {
            return Err(CryptoError::AuthenticationError(format!(
                "device id {} does not match its public keys",
                identity.device_id
            )));
        }

        // Revoked никогда не воскресает
        if let Some(existing) = self.devices.get(&identity.device_id) {
            if existing.trust_level == TrustLevel::Revoked {
                return Err(CryptoError::StateError(format!(
                    "device {} is revoked",
                    identity.device_id
                )));
            }
        }

        self.devices.insert(identity.device_id.clone(), identity);
        Ok(())
    }

    // ========================================================================
    // Verification
    // ========================================================================

    /// Выдать challenge для верификации целевого устройства
    pub fn generate_verification_challenge(
        &mut self,
        target_device_id: &str,
    ) -> Result<VerificationChallenge> {
        let device = self.require_device(target_device_id)?;
        if device.trust_level == TrustLevel::Revoked {
            return Err(CryptoError::StateError(format!(
                "device {} is revoked",
                target_device_id
            )));
        }

        let challenge = VerificationChallenge {
            challenge_id: uuid::Uuid::new_v4().to_string(),
            target_device_id: target_device_id.to_string(),
            nonce: S::generate_nonce(32)?,
            created_at: current_timestamp(),
        };

        self.pending_challenges
            .insert(target_device_id.to_string(), challenge.clone());
        Ok(challenge)
    }

    /// Проверить ответ устройства на challenge.
    ///
    /// Ответ — подпись nonce ключом устройства (для биометрии подпись
    /// ставится после разблокировки платформой; для QR/numeric nonce
    /// попадает на устройство соответствующим каналом). Успех поднимает
    /// trust level на одну ступень и увеличивает verification_count —
    /// вклад в score ограничен весами из Config.
    pub fn verify_device(
        &mut self,
        peer_device_id: &str,
        method: VerificationMethod,
        response: &[u8],
    ) -> Result<TrustLevel> {
        use tracing::{info, warn};

        let Some(challenge) = self.pending_challenges.get(peer_device_id) else {
            return Err(CryptoError::StateError(format!(
                "no pending challenge for device {}",
                peer_device_id
            )));
        };

        if challenge.is_expired(current_timestamp()) {
            self.pending_challenges.remove(peer_device_id);
            return Err(CryptoError::StateError(
                "verification challenge expired".to_string(),
            ));
        }

        let device = self.require_device(peer_device_id)?;
        if device.trust_level == TrustLevel::Revoked {
            return Err(CryptoError::StateError(format!(
                "device {} is revoked",
                peer_device_id
            )));
        }

        let verifying = S::verifying_key_from_bytes(device.signing_public.clone());
        if let Err(e) = S::verify(&verifying, &challenge.nonce, response) {
            warn!(
                target: "identity::registry",
                device_id = %peer_device_id,
                method = ?method,
                "Device verification failed"
            );
            self.flag_for_decay(peer_device_id);
            return Err(e);
        }

        // Challenge одноразовый
        self.pending_challenges.remove(peer_device_id);

        let device = self
            .devices
            .get_mut(peer_device_id)
            .ok_or_else(|| CryptoError::NotFound(peer_device_id.to_string()))?;
        device.trust_level = device.trust_level.promoted();
        device.trust_factors.verification_count += 1;

        info!(
            target: "identity::registry",
            device_id = %peer_device_id,
            method = ?method,
            trust_level = ?device.trust_level,
            "Device verified"
        );

        Ok(device.trust_level)
    }

    // ========================================================================
    // Revocation
    // ========================================================================

    /// Отозвать устройство. Необратимо.
    ///
    /// Подписант — локальное устройство; его подпись делает запись
    /// проверяемой на всех sync-пирах.
    pub fn revoke_device(
        &mut self,
        device_id: &str,
        signer_id: &str,
    ) -> Result<RevocationRecord> {
        use tracing::warn;

        if Some(signer_id) != self.local_device_id.as_deref() {
            return Err(CryptoError::StateError(format!(
                "signer {} is not the local device",
                signer_id
            )));
        }
        let keys = self
            .local_keys
            .as_ref()
            .ok_or_else(|| CryptoError::StateError("local keys not initialized".to_string()))?;

        let device = self.require_device(device_id)?;
        if device.trust_level == TrustLevel::Revoked {
            return Err(CryptoError::StateError(format!(
                "device {} is already revoked",
                device_id
            )));
        }

        let revoked_at = current_timestamp();
        let payload = DeviceIdentity::revocation_payload(device_id, signer_id, revoked_at);
        let signing = S::signing_key_from_bytes(keys.signing_private.to_vec());
        let signature = S::sign(&signing, &payload)?;

        let record = RevocationRecord {
            device_id: device_id.to_string(),
            revoked_by: signer_id.to_string(),
            revoked_at,
            signature,
        };

        let device = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| CryptoError::NotFound(device_id.to_string()))?;
        device.trust_level = TrustLevel::Revoked;
        device.revocation = Some(record.clone());

        warn!(
            target: "identity::registry",
            device_id = %device_id,
            revoked_by = %signer_id,
            "Device revoked"
        );

        Ok(record)
    }

    /// Проверить revocation record, пришедший от пира, и применить его
    pub fn apply_revocation_record(&mut self, record: &RevocationRecord) -> Result<()> {
        let signer = self.require_device(&record.revoked_by)?;
        let payload = DeviceIdentity::revocation_payload(
            &record.device_id,
            &record.revoked_by,
            record.revoked_at,
        );
        let verifying = S::verifying_key_from_bytes(signer.signing_public.clone());
        S::verify(&verifying, &payload, &record.signature)?;

        let device = self
            .devices
            .get_mut(&record.device_id)
            .ok_or_else(|| CryptoError::NotFound(record.device_id.clone()))?;
        device.trust_level = TrustLevel::Revoked;
        device.revocation = Some(record.clone());
        Ok(())
    }

    // ========================================================================
    // Queries and factor updates
    // ========================================================================

    /// Trust score устройства — пересчитывается из факторов на каждый запрос
    pub fn trust_score(&self, device_id: &str) -> Result<u8> {
        let device = self.require_device(device_id)?;
        Ok(device.trust_score(current_timestamp()))
    }

    /// Отметить проваленную проверку (подпись/пакет) — поведенческий штраф
    pub fn flag_for_decay(&mut self, device_id: &str) {
        if let Some(device) = self.devices.get_mut(device_id) {
            device.trust_factors.behavior_failures += 1;
        }
    }

    /// Зафиксировать день активности устройства
    pub fn record_activity(&mut self, device_id: &str) {
        if let Some(device) = self.devices.get_mut(device_id) {
            device.trust_factors.active_days += 1;
        }
    }

    pub fn device(&self, device_id: &str) -> Option<&DeviceIdentity> {
        self.devices.get(device_id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceIdentity> {
        self.devices.values()
    }

    pub fn local_device_id(&self) -> Option<&str> {
        self.local_device_id.as_deref()
    }

    /// Приватный ключ подписи локального устройства
    pub fn local_signing_key(&self) -> Result<S::SigningKey> {
        let keys = self
            .local_keys
            .as_ref()
            .ok_or_else(|| CryptoError::StateError("local keys not initialized".to_string()))?;
        Ok(S::signing_key_from_bytes(keys.signing_private.to_vec()))
    }

    /// Приватный ключ шифрования локального устройства
    pub fn local_encryption_key(&self) -> Result<S::AgreementPrivateKey> {
        let keys = self
            .local_keys
            .as_ref()
            .ok_or_else(|| CryptoError::StateError("local keys not initialized".to_string()))?;
        Ok(S::agreement_private_from_bytes(keys.encryption_private.to_vec()))
    }

    fn require_device(&self, device_id: &str) -> Result<&DeviceIdentity> {
        self.devices
            .get(device_id)
            .ok_or_else(|| CryptoError::NotFound(format!("device {}", device_id)))
    }

    // ========================================================================
    // Persistence (external DeviceStore)
    // ========================================================================

    /// Сохранить все идентичности во внешнее хранилище
    pub fn persist(&self, store: &mut dyn crate::storage::DeviceStore) -> Result<()> {
        for device in self.devices.values() {
            store.put_device(device)?;
        }
        Ok(())
    }

    /// Поднять идентичности из внешнего хранилища.
    ///
    /// deviceId каждой записи сверяется с её публичными ключами;
    /// revoked остаются revoked.
    pub fn load_from(&mut self, store: &dyn crate::storage::DeviceStore) -> Result<usize> {
        let mut loaded = 0;
        for device in store.all_devices()? {
            let expected = derive_device_id(&device.signing_public, &device.encryption_public);
            if expected != device.device_id {
                return Err(CryptoError::AuthenticationError(format!(
                    "stored device {} does not match its public keys",
                    device.device_id
                )));
            }
            self.devices.insert(device.device_id.clone(), device);
            loaded += 1;
        }
        Ok(loaded)
    }
}

impl<S: CipherSuite> Default for DeviceIdentityRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
