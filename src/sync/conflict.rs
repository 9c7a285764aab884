//! ConflictResolutionEngine — детерминированное разрешение конкурентных
//! версий ключей
//!
//! Конфликт: две и более версии с одинаковым номером, но разными
//! content hash. Разрешение — чистая функция от данных конфликта и
//! стратегии: одинаковые входы дают одинакового победителя на любом
//! устройстве, поэтому устройства сходятся без дополнительной
//! координации. Проигравшие версии архивируются с их метаданными.

use crate::error::{CryptoError, Result};
use crate::state::events::{CoreEvent, EventBus};
use crate::storage::ConflictArchive;
use crate::utils::time::current_timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Стратегия разрешения конфликта
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictStrategy {
    /// Побеждает максимальный timestamp
    LatestWins,
    /// Побеждает максимальный trust score (при равенстве —
    /// лексикографически наименьший deviceId)
    HighestTrust,
    /// Большинство по content hash (при равенстве — `HighestTrust`
    /// среди спорных групп)
    Consensus,
    /// Решение откладывается внешнему арбитру
    Manual,
    /// Всегда побеждает назначенное устройство
    AuthoritativeDevice,
}

/// Серьёзность конфликта
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Статус конфликта
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictStatus {
    Detected,
    Resolving,
    Resolved,
}

/// Одна версия ключа от одного устройства
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVersion {
    pub device_id: String,
    pub version: u64,
    pub timestamp: i64,
    #[serde(with = "serde_bytes")]
    pub content_hash: Vec<u8>,
    pub trust_score: u8,
}

/// Обнаруженный конфликт версий
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConflict {
    pub conflict_id: String,
    pub key_id: String,
    pub versions: Vec<KeyVersion>,
    pub severity: ConflictSeverity,
    pub status: ConflictStatus,
    pub detected_at: i64,
}

/// Итог разрешения
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub conflict_id: String,
    pub strategy: ConflictStrategy,
    /// None — для `Manual`, пока внешний арбитр не решил
    pub winner: Option<KeyVersion>,
    pub archived: Vec<KeyVersion>,
    pub resolved_at: i64,
}

/// Движок разрешения конфликтов
pub struct ConflictResolutionEngine {
    archive: Box<dyn ConflictArchive>,
    events: Arc<EventBus>,
    /// Устройство для стратегии `AuthoritativeDevice`
    authoritative_device_id: Option<String>,
}

impl ConflictResolutionEngine {
    pub fn new(archive: Box<dyn ConflictArchive>, events: Arc<EventBus>) -> Self {
        Self {
            archive,
            events,
            authoritative_device_id: None,
        }
    }

    /// Назначить устройство-авторитет
    pub fn with_authoritative_device(mut self, device_id: &str) -> Self {
        self.authoritative_device_id = Some(device_id.to_string());
        self
    }

    /// Обнаружить конфликт среди версий одного ключа.
    ///
    /// Срабатывает, когда один номер версии встречается с разными
    /// content hash. Возвращает None, если версии согласованы.
    pub fn detect_conflict(&self, key_id: &str, versions: &[KeyVersion]) -> Option<KeyConflict> {
        use tracing::warn;

        let mut by_version: HashMap<u64, Vec<&KeyVersion>> = HashMap::new();
        for version in versions {
            by_version.entry(version.version).or_default().push(version);
        }

        let mut conflicting: Vec<KeyVersion> = Vec::new();
        for group in by_version.values() {
            let first_hash = &group[0].content_hash;
            if group.iter().any(|v| &v.content_hash != first_hash) {
                conflicting.extend(group.iter().map(|v| (*v).clone()));
            }
        }

        if conflicting.is_empty() {
            return None;
        }

        // Детерминированный порядок версий внутри конфликта
        conflicting.sort_by(|a, b| {
            a.version
                .cmp(&b.version)
                .then_with(|| a.device_id.cmp(&b.device_id))
        });

        let severity = Self::severity(&conflicting);
        let conflict = KeyConflict {
            conflict_id: uuid::Uuid::new_v4().to_string(),
            key_id: key_id.to_string(),
            versions: conflicting,
            severity,
            status: ConflictStatus::Detected,
            detected_at: current_timestamp(),
        };

        warn!(
            target: "sync::conflict",
            conflict_id = %conflict.conflict_id,
            key_id = %key_id,
            severity = ?severity,
            versions = %conflict.versions.len(),
            "Key version conflict detected"
        );

        self.events.emit(&CoreEvent::ConflictDetected {
            conflict_id: conflict.conflict_id.clone(),
        });

        Some(conflict)
    }

    /// Серьёзность: разброс версий, прошедшее время между обновлениями,
    /// расхождение trust score
    fn severity(versions: &[KeyVersion]) -> ConflictSeverity {
        let version_spread = versions.iter().map(|v| v.version).max().unwrap_or(0)
            - versions.iter().map(|v| v.version).min().unwrap_or(0);
        let time_spread = versions.iter().map(|v| v.timestamp).max().unwrap_or(0)
            - versions.iter().map(|v| v.timestamp).min().unwrap_or(0);
        let trust_spread = versions.iter().map(|v| v.trust_score).max().unwrap_or(0)
            - versions.iter().map(|v| v.trust_score).min().unwrap_or(0);

        let mut points = 0;
        if version_spread > 1 {
            points += 1;
        }
        if time_spread > 3600 {
            points += 1;
        }
        if trust_spread > 30 {
            points += 1;
        }

        match points {
            0 => ConflictSeverity::Low,
            1 => ConflictSeverity::Medium,
            2 => ConflictSeverity::High,
            _ => ConflictSeverity::Critical,
        }
    }

    /// Разрешить конфликт выбранной стратегией.
    ///
    /// Чистая детерминированная функция от (версии, стратегия): никаких
    /// обращений к часам или RNG при выборе победителя. Проигравшие
    /// версии уходят в архив.
    pub fn resolve_conflict(
        &mut self,
        conflict: &mut KeyConflict,
        strategy: ConflictStrategy,
    ) -> Result<ConflictResolution> {
        use tracing::info;

        if conflict.versions.is_empty() {
            return Err(CryptoError::SyncConflictError(format!(
                "conflict {} has no versions",
                conflict.conflict_id
            )));
        }

        conflict.status = ConflictStatus::Resolving;

        let winner = match &strategy {
            ConflictStrategy::LatestWins => Some(Self::pick_latest(&conflict.versions)),
            ConflictStrategy::HighestTrust => Some(Self::pick_highest_trust(&conflict.versions)),
            ConflictStrategy::Consensus => Some(Self::pick_consensus(&conflict.versions)),
            ConflictStrategy::AuthoritativeDevice => {
                let device_id = self.authoritative_device_id.as_deref().ok_or_else(|| {
                    CryptoError::SyncConflictError(
                        "no authoritative device configured".to_string(),
                    )
                })?;
                let version = conflict
                    .versions
                    .iter()
                    .find(|v| v.device_id == device_id)
                    .ok_or_else(|| {
                        CryptoError::SyncConflictError(format!(
                            "authoritative device {} has no version in conflict {}",
                            device_id, conflict.conflict_id
                        ))
                    })?;
                Some(version.clone())
            }
            ConflictStrategy::Manual => None,
        };

        let resolution = match winner {
            Some(winner) => {
                let archived: Vec<KeyVersion> = conflict
                    .versions
                    .iter()
                    .filter(|v| **v != winner)
                    .cloned()
                    .collect();
                self.archive
                    .archive_versions(&conflict.conflict_id, &archived)?;
                conflict.status = ConflictStatus::Resolved;

                info!(
                    target: "sync::conflict",
                    conflict_id = %conflict.conflict_id,
                    strategy = ?strategy,
                    winner_device = %winner.device_id,
                    archived = %archived.len(),
                    "Conflict resolved"
                );

                ConflictResolution {
                    conflict_id: conflict.conflict_id.clone(),
                    strategy,
                    winner: Some(winner),
                    archived,
                    resolved_at: current_timestamp(),
                }
            }
            None => {
                // Manual: решение за внешним арбитром, статус остаётся
                // Resolving
                ConflictResolution {
                    conflict_id: conflict.conflict_id.clone(),
                    strategy,
                    winner: None,
                    archived: Vec::new(),
                    resolved_at: current_timestamp(),
                }
            }
        };

        Ok(resolution)
    }

    /// Завершить `Manual`-конфликт выбором внешнего арбитра
    pub fn resolve_manual(
        &mut self,
        conflict: &mut KeyConflict,
        winner_device_id: &str,
    ) -> Result<ConflictResolution> {
        let winner = conflict
            .versions
            .iter()
            .find(|v| v.device_id == winner_device_id)
            .cloned()
            .ok_or_else(|| {
                CryptoError::SyncConflictError(format!(
                    "device {} has no version in conflict {}",
                    winner_device_id, conflict.conflict_id
                ))
            })?;

        let archived: Vec<KeyVersion> = conflict
            .versions
            .iter()
            .filter(|v| **v != winner)
            .cloned()
            .collect();
        self.archive
            .archive_versions(&conflict.conflict_id, &archived)?;
        conflict.status = ConflictStatus::Resolved;

        Ok(ConflictResolution {
            conflict_id: conflict.conflict_id.clone(),
            strategy: ConflictStrategy::Manual,
            winner: Some(winner),
            archived,
            resolved_at: current_timestamp(),
        })
    }

    // ========================================================================
    // Deterministic winner selection
    // ========================================================================

    fn pick_latest(versions: &[KeyVersion]) -> KeyVersion {
        versions
            .iter()
            .max_by(|a, b| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then_with(|| a.trust_score.cmp(&b.trust_score))
                    // При полном равенстве побеждает наименьший deviceId
                    .then_with(|| b.device_id.cmp(&a.device_id))
            })
            .cloned()
            .unwrap_or_else(|| versions[0].clone())
    }

    fn pick_highest_trust(versions: &[KeyVersion]) -> KeyVersion {
        versions
            .iter()
            .max_by(|a, b| {
                a.trust_score
                    .cmp(&b.trust_score)
                    .then_with(|| b.device_id.cmp(&a.device_id))
            })
            .cloned()
            .unwrap_or_else(|| versions[0].clone())
    }

    fn pick_consensus(versions: &[KeyVersion]) -> KeyVersion {
        let mut by_hash: HashMap<&[u8], Vec<&KeyVersion>> = HashMap::new();
        for version in versions {
            by_hash
                .entry(version.content_hash.as_slice())
                .or_default()
                .push(version);
        }

        let max_votes = by_hash.values().map(|g| g.len()).max().unwrap_or(0);
        let tied: Vec<&KeyVersion> = by_hash
            .values()
            .filter(|g| g.len() == max_votes)
            .flat_map(|g| g.iter().copied())
            .collect();

        // Единственное большинство: внутри группы победитель по trust.
        // Ничья между группами: highest_trust среди всех спорных версий.
        tied.iter()
            .copied()
            .max_by(|a, b| {
                a.trust_score
                    .cmp(&b.trust_score)
                    .then_with(|| b.device_id.cmp(&a.device_id))
            })
            .cloned()
            .unwrap_or_else(|| versions[0].clone())
    }
}
