//! Типы идентичности устройства

use crate::config::Config;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Тип устройства
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Mobile,
    Desktop,
    Tablet,
    Web,
}

/// Уровень доверия к устройству.
///
/// Растёт по одной ступени за успешную верификацию. `Revoked` —
/// терминальное состояние.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustLevel {
    Unverified,
    Verified,
    CrossVerified,
    Revoked,
}

impl TrustLevel {
    /// Следующая ступень после успешной верификации
    pub fn promoted(self) -> TrustLevel {
        match self {
            TrustLevel::Unverified => TrustLevel::Verified,
            TrustLevel::Verified => TrustLevel::CrossVerified,
            TrustLevel::CrossVerified => TrustLevel::CrossVerified,
            TrustLevel::Revoked => TrustLevel::Revoked,
        }
    }
}

/// Метод верификации устройства
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationMethod {
    QrCode,
    NumericCode,
    Biometric,
    MutualChallenge,
}

/// Счётчики, из которых вычисляется trust score.
///
/// Score нигде не хранится как самостоятельное изменяемое число —
/// только пересчитывается из этих факторов, чтобы не расползаться.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustFactors {
    /// Когда устройство впервые появилось в реестре
    pub first_seen_at: i64,
    /// Сколько верификаций прошло успешно
    pub verification_count: u32,
    /// Дни с зафиксированной активностью
    pub active_days: u32,
    /// Проваленные проверки подписей/пакетов (поведенческий штраф)
    pub behavior_failures: u32,
}

impl TrustFactors {
    pub fn new(now: i64) -> Self {
        Self {
            first_seen_at: now,
            verification_count: 0,
            active_days: 0,
            behavior_failures: 0,
        }
    }
}

/// Идентичность одного устройства (публичная часть).
///
/// Создаётся при регистрации, мутируется событиями верификации,
/// никогда не удаляется — только revoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Стабильный идентификатор: hex(SHA-256(signing_pub || encryption_pub))
    pub device_id: String,
    pub user_id: String,
    pub name: String,
    pub device_type: DeviceType,
    #[serde(with = "serde_bytes")]
    pub signing_public: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub encryption_public: Vec<u8>,
    pub trust_level: TrustLevel,
    pub trust_factors: TrustFactors,
    pub created_at: i64,
    pub revocation: Option<RevocationRecord>,
}

impl DeviceIdentity {
    /// Trust score 0–100 — чистая функция от текущих факторов.
    ///
    /// Вклады (веса из Config): время знакомства, количество
    /// верификаций, постоянство активности, поведенческое постоянство.
    /// Revoked всегда даёт 0.
    pub fn trust_score(&self, now: i64) -> u8 {
        if self.trust_level == TrustLevel::Revoked {
            return 0;
        }

        let config = Config::global();
        let factors = &self.trust_factors;

        let days_known = ((now - factors.first_seen_at).max(0) / 86_400) as u64;
        let time_points = if config.trust_full_time_days > 0 {
            (days_known * config.trust_time_weight as u64 / config.trust_full_time_days as u64)
                .min(config.trust_time_weight as u64)
        } else {
            config.trust_time_weight as u64
        };

        let verification_points = (factors.verification_count as u64
            * config.trust_points_per_verification as u64)
            .min(config.trust_verification_weight as u64);

        let activity_points =
            (factors.active_days as u64).min(config.trust_activity_weight as u64);

        let penalty = factors.behavior_failures as u64 * config.trust_penalty_per_failure as u64;
        let behavior_points = (config.trust_behavior_weight as u64).saturating_sub(penalty);

        (time_points + verification_points + activity_points + behavior_points).min(100) as u8
    }

    /// Байты, которые покрывает подпись revocation record
    pub(crate) fn revocation_payload(device_id: &str, revoked_by: &str, revoked_at: i64) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"Meridian-Device-Revocation-v1");
        payload.extend_from_slice(device_id.as_bytes());
        payload.extend_from_slice(revoked_by.as_bytes());
        payload.extend_from_slice(&revoked_at.to_be_bytes());
        payload
    }
}

/// Подписанная запись об отзыве устройства.
///
/// Распространяется всем sync-пирам; получатель проверяет подпись
/// ключом отзывающего устройства.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationRecord {
    pub device_id: String,
    pub revoked_by: String,
    pub revoked_at: i64,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

/// Challenge для верификации устройства
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationChallenge {
    pub challenge_id: String,
    pub target_device_id: String,
    #[serde(with = "serde_bytes")]
    pub nonce: Vec<u8>,
    pub created_at: i64,
}

impl VerificationChallenge {
    /// Содержимое QR-кода для метода `QrCode`
    pub fn qr_payload(&self) -> String {
        crate::utils::b64::encode(&self.nonce)
    }

    /// Шестизначный код для метода `NumericCode`, детерминированный от nonce
    pub fn numeric_code(&self) -> String {
        let digest = Sha256::digest(&self.nonce);
        let value = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        format!("{:06}", value % 1_000_000)
    }

    /// Протух ли challenge
    pub fn is_expired(&self, now: i64) -> bool {
        now - self.created_at > Config::global().handshake_timeout_seconds
    }
}

/// Стабильный deviceId из публичных ключей устройства
pub fn derive_device_id(signing_public: &[u8], encryption_public: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signing_public);
    hasher.update(encryption_public);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::current_timestamp;

    fn identity_with_factors(factors: TrustFactors, level: TrustLevel) -> DeviceIdentity {
        DeviceIdentity {
            device_id: "d1".to_string(),
            user_id: "u1".to_string(),
            name: "phone".to_string(),
            device_type: DeviceType::Mobile,
            signing_public: vec![1; 32],
            encryption_public: vec![2; 32],
            trust_level: level,
            trust_factors: factors,
            created_at: 0,
            revocation: None,
        }
    }

    #[test]
    fn test_device_id_is_stable_and_key_dependent() {
        let a = derive_device_id(&[1; 32], &[2; 32]);
        let b = derive_device_id(&[1; 32], &[2; 32]);
        let c = derive_device_id(&[3; 32], &[2; 32]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_trust_level_promotion_is_capped() {
        assert_eq!(TrustLevel::Unverified.promoted(), TrustLevel::Verified);
        assert_eq!(TrustLevel::Verified.promoted(), TrustLevel::CrossVerified);
        assert_eq!(TrustLevel::CrossVerified.promoted(), TrustLevel::CrossVerified);
        assert_eq!(TrustLevel::Revoked.promoted(), TrustLevel::Revoked);
    }

    #[test]
    fn test_trust_score_is_pure_and_bounded() {
        let now = current_timestamp();
        let mut factors = TrustFactors::new(now - 400 * 86_400);
        factors.verification_count = 50;
        factors.active_days = 500;

        let identity = identity_with_factors(factors, TrustLevel::CrossVerified);
        let score = identity.trust_score(now);
        assert_eq!(score, 100, "all factors saturated must cap at 100");
        assert_eq!(identity.trust_score(now), score, "recompute is stable");
    }

    #[test]
    fn test_trust_score_penalizes_failures() {
        let now = current_timestamp();
        let clean = identity_with_factors(TrustFactors::new(now), TrustLevel::Unverified);
        let mut flagged_factors = TrustFactors::new(now);
        flagged_factors.behavior_failures = 2;
        let flagged = identity_with_factors(flagged_factors, TrustLevel::Unverified);

        assert!(flagged.trust_score(now) < clean.trust_score(now));
    }

    #[test]
    fn test_revoked_device_scores_zero() {
        let now = current_timestamp();
        let mut factors = TrustFactors::new(now - 400 * 86_400);
        factors.verification_count = 50;
        let identity = identity_with_factors(factors, TrustLevel::Revoked);
        assert_eq!(identity.trust_score(now), 0);
    }

    #[test]
    fn test_numeric_code_is_deterministic_six_digits() {
        let challenge = VerificationChallenge {
            challenge_id: "c1".to_string(),
            target_device_id: "d1".to_string(),
            nonce: vec![7; 32],
            created_at: 0,
        };
        let code = challenge.numeric_code();
        assert_eq!(code.len(), 6);
        assert_eq!(code, challenge.numeric_code());
    }
}
