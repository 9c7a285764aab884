//! Read-only проекции для UI-слоя
//!
//! UI не трогает криптографическое состояние напрямую — он получает
//! плоские снимки: режим беседы, список устройств с уровнями доверия,
//! нерешённые конфликты. Никакого рендеринга здесь нет.

use crate::crypto::negotiation::NegotiatedAlgorithms;
use crate::crypto::provider::CipherSuite;
use crate::crypto::AlgorithmMode;
use crate::identity::registry::DeviceIdentityRegistry;
use crate::identity::TrustLevel;
use crate::sync::conflict::{ConflictSeverity, ConflictStatus, KeyConflict};
use crate::utils::time::current_timestamp;
use serde::{Deserialize, Serialize};

/// Снимок одного устройства для списка устройств
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceView {
    pub device_id: String,
    pub name: String,
    pub trust_level: TrustLevel,
    pub trust_score: u8,
    pub is_revoked: bool,
}

/// Снимок криптографического режима беседы
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationCryptoView {
    pub conversation_id: String,
    pub mode: AlgorithmMode,
    pub suite_id: u16,
}

/// Снимок нерешённого конфликта
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConflictView {
    pub conflict_id: String,
    pub key_id: String,
    pub severity: ConflictSeverity,
    pub version_count: usize,
    pub detected_at: i64,
}

/// Список устройств с пересчитанными trust score
pub fn device_list<S: CipherSuite>(registry: &DeviceIdentityRegistry<S>) -> Vec<DeviceView> {
    let now = current_timestamp();
    let mut views: Vec<DeviceView> = registry
        .devices()
        .map(|device| DeviceView {
            device_id: device.device_id.clone(),
            name: device.name.clone(),
            trust_level: device.trust_level,
            trust_score: device.trust_score(now),
            is_revoked: device.trust_level == TrustLevel::Revoked,
        })
        .collect();
    views.sort_by(|a, b| a.device_id.cmp(&b.device_id));
    views
}

/// Текущий режим беседы
pub fn conversation_crypto(
    conversation_id: &str,
    negotiated: &NegotiatedAlgorithms,
) -> ConversationCryptoView {
    ConversationCryptoView {
        conversation_id: conversation_id.to_string(),
        mode: negotiated.mode,
        suite_id: negotiated.suite_id,
    }
}

/// Конфликты, ждущие решения (Detected/Resolving)
pub fn pending_conflicts(conflicts: &[KeyConflict]) -> Vec<PendingConflictView> {
    conflicts
        .iter()
        .filter(|c| c.status != ConflictStatus::Resolved)
        .map(|c| PendingConflictView {
            conflict_id: c.conflict_id.clone(),
            key_id: c.key_id.clone(),
            severity: c.severity,
            version_count: c.versions.len(),
            detected_at: c.detected_at,
        })
        .collect()
}
