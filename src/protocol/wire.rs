// Wire format (MessagePack сериализация)
// Транспорт переносит envelope и sync package как opaque байты; версия
// в обёртке позволяет мигрировать алгоритмы, не ломая старых клиентов.

use crate::config::Config;
use crate::crypto::messaging::MessageEnvelope;
use crate::error::{CryptoError, Result};
use crate::sync::package::KeySyncPackage;
use rmp_serde::{Deserializer, Serializer};
use serde::{Deserialize, Serialize};

/// Envelope сообщения на проводе, тегированный версией схемы.
///
/// Новые поля добавляются новым вариантом, а не optional-полями,
/// размазанными по коду.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireMessage {
    V1(MessageEnvelope),
}

/// Sync package на проводе, тегированный версией схемы
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireSyncPackage {
    V1(KeySyncPackage),
}

/// Упаковать envelope для транспорта
pub fn pack_message(envelope: &MessageEnvelope) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    WireMessage::V1(envelope.clone())
        .serialize(&mut Serializer::new(&mut buffer))
        .map_err(|e| CryptoError::SerializationError(format!("MessagePack pack error: {}", e)))?;

    if buffer.len() > Config::global().max_envelope_bytes {
        return Err(CryptoError::CapacityError(format!(
            "envelope of {} bytes exceeds the wire limit",
            buffer.len()
        )));
    }
    Ok(buffer)
}

/// Распаковать envelope, пришедший с транспорта
pub fn unpack_message(data: &[u8]) -> Result<MessageEnvelope> {
    if data.len() > Config::global().max_envelope_bytes {
        return Err(CryptoError::CapacityError(format!(
            "incoming envelope of {} bytes exceeds the wire limit",
            data.len()
        )));
    }

    let mut deserializer = Deserializer::new(data);
    let message = WireMessage::deserialize(&mut deserializer)
        .map_err(|e| CryptoError::SerializationError(format!("MessagePack unpack error: {}", e)))?;
    match message {
        WireMessage::V1(envelope) => Ok(envelope),
    }
}

/// Упаковать sync package для транспорта
pub fn pack_sync_package(package: &KeySyncPackage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    WireSyncPackage::V1(package.clone())
        .serialize(&mut Serializer::new(&mut buffer))
        .map_err(|e| CryptoError::SerializationError(format!("MessagePack pack error: {}", e)))?;

    if buffer.len() > Config::global().max_package_bytes {
        return Err(CryptoError::CapacityError(format!(
            "sync package of {} bytes exceeds the wire limit",
            buffer.len()
        )));
    }
    Ok(buffer)
}

/// Распаковать sync package, пришедший с транспорта
pub fn unpack_sync_package(data: &[u8]) -> Result<KeySyncPackage> {
    if data.len() > Config::global().max_package_bytes {
        return Err(CryptoError::CapacityError(format!(
            "incoming sync package of {} bytes exceeds the wire limit",
            data.len()
        )));
    }

    let mut deserializer = Deserializer::new(data);
    let package = WireSyncPackage::deserialize(&mut deserializer)
        .map_err(|e| CryptoError::SerializationError(format!("MessagePack unpack error: {}", e)))?;
    match package {
        WireSyncPackage::V1(package) => Ok(package),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::package::{KeyType, SyncPriority};

    fn envelope() -> MessageEnvelope {
        MessageEnvelope {
            suite_id: 1,
            ciphertext: vec![1; 48],
            nonce: vec![2; 12],
            ephemeral_public_key: vec![3; 32],
            message_number: 7,
            chain_length: 1,
            previous_chain_length: 100,
            pqc_ciphertext: None,
            signature: None,
        }
    }

    #[test]
    fn test_message_pack_unpack_roundtrip() {
        let original = envelope();
        let packed = pack_message(&original).unwrap();
        let unpacked = unpack_message(&packed).unwrap();

        assert_eq!(unpacked.ciphertext, original.ciphertext);
        assert_eq!(unpacked.message_number, original.message_number);
        assert_eq!(unpacked.chain_length, original.chain_length);
        assert_eq!(unpacked.previous_chain_length, original.previous_chain_length);
    }

    #[test]
    fn test_unpack_rejects_garbage() {
        assert!(unpack_message(&[0xFF, 0x00, 0x13]).is_err());
    }

    #[test]
    fn test_sync_package_roundtrip() {
        let package = KeySyncPackage {
            package_id: "p1".to_string(),
            from_device_id: "a".to_string(),
            to_device_id: "b".to_string(),
            key_type: KeyType::DeviceIdentity,
            ephemeral_public: vec![1; 32],
            pq_ciphertext: Some(vec![9; 64]),
            nonce: vec![2; 12],
            encrypted_payload: vec![3; 64],
            integrity_hash: vec![4; 32],
            signature: vec![5; 64],
            priority: SyncPriority::High,
            created_at: 100,
        };

        let packed = pack_sync_package(&package).unwrap();
        let unpacked = unpack_sync_package(&packed).unwrap();
        assert_eq!(unpacked.package_id, package.package_id);
        assert_eq!(unpacked.integrity_hash, package.integrity_hash);
        assert_eq!(unpacked.priority, package.priority);
    }

    #[test]
    fn test_oversized_envelope_is_rejected() {
        let mut big = envelope();
        big.ciphertext = vec![0; Config::global().max_envelope_bytes + 1];
        assert!(matches!(
            pack_message(&big),
            Err(CryptoError::CapacityError(_))
        ));
    }
}
