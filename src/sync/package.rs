//! KeySyncPackage — единица переноса ключевого материала между
//! устройствами. Immutable; потребляется получателем ровно один раз
//! (повторные доставки гасятся по packageId).

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Тип синхронизируемого ключевого материала
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    RatchetState,
    DeviceIdentity,
    ConversationKey,
    PreKey,
    Revocation,
}

impl KeyType {
    /// Приоритет доставки по типу ключа
    pub fn default_priority(self) -> SyncPriority {
        match self {
            KeyType::Revocation => SyncPriority::Critical,
            KeyType::DeviceIdentity => SyncPriority::High,
            KeyType::RatchetState => SyncPriority::Medium,
            KeyType::ConversationKey => SyncPriority::Medium,
            KeyType::PreKey => SyncPriority::Low,
        }
    }
}

/// Приоритет sync-пакета
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl SyncPriority {
    /// Ранг для упорядочивания: меньше — важнее
    pub fn rank(self) -> u8 {
        match self {
            SyncPriority::Critical => 0,
            SyncPriority::High => 1,
            SyncPriority::Medium => 2,
            SyncPriority::Low => 3,
        }
    }

    pub const ALL: [SyncPriority; 4] = [
        SyncPriority::Critical,
        SyncPriority::High,
        SyncPriority::Medium,
        SyncPriority::Low,
    ];
}

/// Пакет синхронизации ключевого материала
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySyncPackage {
    pub package_id: String,
    pub from_device_id: String,
    pub to_device_id: String,
    pub key_type: KeyType,
    /// Ephemeral public key отправителя (классическая часть agreement)
    #[serde(with = "serde_bytes")]
    pub ephemeral_public: Vec<u8>,
    /// KEM ciphertext (только для гибридного suite)
    pub pq_ciphertext: Option<Vec<u8>>,
    #[serde(with = "serde_bytes")]
    pub nonce: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub encrypted_payload: Vec<u8>,
    /// SHA-256 поверх encrypted_payload
    #[serde(with = "serde_bytes")]
    pub integrity_hash: Vec<u8>,
    /// Подпись ключом устройства-отправителя поверх signed_payload()
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
    pub priority: SyncPriority,
    pub created_at: i64,
}

impl KeySyncPackage {
    /// Байты, которые покрывает подпись отправителя: всё, кроме самой
    /// подписи
    pub fn signed_payload(&self) -> Result<Vec<u8>> {
        let body = (
            &self.package_id,
            &self.from_device_id,
            &self.to_device_id,
            &self.key_type,
            &self.ephemeral_public,
            &self.pq_ciphertext,
            &self.nonce,
            &self.encrypted_payload,
            &self.integrity_hash,
            &self.priority,
            self.created_at,
        );
        Ok(rmp_serde::to_vec(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ranks_are_ordered() {
        assert!(SyncPriority::Critical.rank() < SyncPriority::High.rank());
        assert!(SyncPriority::High.rank() < SyncPriority::Medium.rank());
        assert!(SyncPriority::Medium.rank() < SyncPriority::Low.rank());
    }

    #[test]
    fn test_revocation_is_critical() {
        assert_eq!(KeyType::Revocation.default_priority(), SyncPriority::Critical);
        assert_eq!(KeyType::PreKey.default_priority(), SyncPriority::Low);
    }

    #[test]
    fn test_signed_payload_excludes_signature() {
        let mut package = KeySyncPackage {
            package_id: "p1".to_string(),
            from_device_id: "a".to_string(),
            to_device_id: "b".to_string(),
            key_type: KeyType::RatchetState,
            ephemeral_public: vec![1; 32],
            pq_ciphertext: None,
            nonce: vec![2; 12],
            encrypted_payload: vec![3; 64],
            integrity_hash: vec![4; 32],
            signature: vec![],
            priority: SyncPriority::Medium,
            created_at: 100,
        };
        let before = package.signed_payload().unwrap();
        package.signature = vec![9; 64];
        let after = package.signed_payload().unwrap();
        assert_eq!(before, after);
    }
}
