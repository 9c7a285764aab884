//! Централизованная конфигурация для Meridian Messenger Core
//!
//! Все константы и настройки криптографического ядра должны быть
//! определены здесь, чтобы избежать хардкода по всему проекту.

use std::sync::OnceLock;

/// Глобальная конфигурация ядра (синглтон)
static GLOBAL_CONFIG: OnceLock<Config> = OnceLock::new();

/// Основная структура конфигурации
#[derive(Debug, Clone)]
pub struct Config {
    // ============================================
    // КРИПТОГРАФИЧЕСКИЕ ПАРАМЕТРЫ
    // ============================================

    /// Длина симметричного ключа (в байтах)
    pub key_length: usize,

    /// Длина nonce для ChaCha20Poly1305 (в байтах)
    pub chacha_nonce_length: usize,

    /// Размер публичного ключа X25519 (в байтах)
    pub public_key_size: usize,

    /// Размер Ed25519 подписи (в байтах)
    pub signature_size: usize,

    /// ID классического криптографического набора (Classic Suite)
    pub classic_suite_id: u16,

    /// ID гибридного набора (Classic + Post-Quantum)
    pub hybrid_suite_id: u16,

    // ============================================
    // RATCHET ПАРАМЕТРЫ
    // ============================================

    /// Через сколько сообщений выполняется DH ratchet step
    pub ratchet_step_interval: u32,

    /// Максимальное количество пропущенных сообщений (DoS защита)
    pub max_skipped_messages: u32,

    /// Максимальный возраст пропущенных ключей сообщений (в секундах)
    /// По умолчанию: 7 дней
    pub max_skipped_message_age_seconds: i64,

    /// Таймаут key-exchange handshake (в секундах)
    pub handshake_timeout_seconds: i64,

    // ============================================
    // TRUST SCORING
    // ============================================

    /// Максимальный вклад фактора "время знакомства" (в баллах)
    pub trust_time_weight: u8,

    /// Максимальный вклад фактора "количество верификаций"
    pub trust_verification_weight: u8,

    /// Максимальный вклад фактора "постоянство активности"
    pub trust_activity_weight: u8,

    /// Максимальный вклад фактора "поведенческое постоянство"
    pub trust_behavior_weight: u8,

    /// Баллы за одну успешную верификацию
    pub trust_points_per_verification: u8,

    /// Штраф за одну проваленную проверку подписи/пакета
    pub trust_penalty_per_failure: u8,

    /// Дней знакомства для максимального балла времени
    pub trust_full_time_days: i64,

    // ============================================
    // SYNC / OFFLINE QUEUE
    // ============================================

    /// Ёмкость offline queue (элементов на устройство)
    pub max_queue_items: usize,

    /// Размер batch при drain для качества соединения Excellent
    pub batch_size_excellent: usize,

    /// Размер batch для Good
    pub batch_size_good: usize,

    /// Размер batch для Fair
    pub batch_size_fair: usize,

    /// Размер batch для Poor
    pub batch_size_poor: usize,

    /// Начальная задержка exponential backoff для sync retry (в миллисекундах)
    pub sync_retry_initial_ms: u64,

    /// Максимальная задержка exponential backoff (в миллисекундах)
    pub sync_retry_max_ms: u64,

    // ============================================
    // WIRE ВАЛИДАЦИЯ
    // ============================================

    /// Максимальный размер envelope на проводе (в байтах)
    pub max_envelope_bytes: usize,

    /// Максимальный размер sync package на проводе (в байтах)
    pub max_package_bytes: usize,
}

impl Config {
    /// Создать конфигурацию с дефолтными значениями
    pub fn default() -> Self {
        Self {
            // Криптография
            key_length: 32,
            chacha_nonce_length: 12,
            public_key_size: 32,
            signature_size: 64,
            classic_suite_id: 1,
            hybrid_suite_id: 2,

            // Ratchet
            ratchet_step_interval: 100,
            max_skipped_messages: 1000,
            max_skipped_message_age_seconds: 7 * 24 * 60 * 60, // 7 days
            handshake_timeout_seconds: 30,

            // Trust scoring
            trust_time_weight: 30,
            trust_verification_weight: 30,
            trust_activity_weight: 20,
            trust_behavior_weight: 20,
            trust_points_per_verification: 10,
            trust_penalty_per_failure: 5,
            trust_full_time_days: 30,

            // Sync / queue
            max_queue_items: 1000,
            batch_size_excellent: 50,
            batch_size_good: 25,
            batch_size_fair: 10,
            batch_size_poor: 1,
            sync_retry_initial_ms: 1000,
            sync_retry_max_ms: 30000,

            // Wire
            max_envelope_bytes: 256 * 1024,
            max_package_bytes: 512 * 1024,
        }
    }

    /// Создать конфигурацию из переменных окружения
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Переопределяем значения из env, если они заданы
        if let Ok(val) = std::env::var("RATCHET_STEP_INTERVAL") {
            if let Ok(parsed) = val.parse() {
                config.ratchet_step_interval = parsed;
            }
        }

        if let Ok(val) = std::env::var("MAX_SKIPPED_MESSAGES") {
            if let Ok(parsed) = val.parse() {
                config.max_skipped_messages = parsed;
            }
        }

        if let Ok(val) = std::env::var("MAX_SKIPPED_MESSAGE_AGE_SECONDS") {
            if let Ok(parsed) = val.parse() {
                config.max_skipped_message_age_seconds = parsed;
            }
        }

        if let Ok(val) = std::env::var("MAX_QUEUE_ITEMS") {
            if let Ok(parsed) = val.parse() {
                config.max_queue_items = parsed;
            }
        }

        if let Ok(val) = std::env::var("SYNC_RETRY_MAX_MS") {
            if let Ok(parsed) = val.parse() {
                config.sync_retry_max_ms = parsed;
            }
        }

        config
    }

    /// Получить глобальный экземпляр конфигурации
    ///
    /// Автоматически инициализирует конфигурацию со значениями по умолчанию
    /// при первом вызове
    pub fn global() -> &'static Config {
        GLOBAL_CONFIG.get_or_init(Config::default)
    }

    /// Инициализировать глобальную конфигурацию со значениями по умолчанию
    ///
    /// # Errors
    ///
    /// Возвращает ошибку, если конфигурация уже была инициализирована
    pub fn init() -> Result<(), &'static str> {
        GLOBAL_CONFIG
            .set(Self::default())
            .map_err(|_| "Config already initialized")
    }

    /// Инициализировать глобальную конфигурацию из переменных окружения
    ///
    /// # Errors
    ///
    /// Возвращает ошибку, если конфигурация уже была инициализирована
    pub fn init_from_env() -> Result<(), &'static str> {
        GLOBAL_CONFIG
            .set(Self::from_env())
            .map_err(|_| "Config already initialized")
    }

    /// Инициализировать глобальную конфигурацию с кастомным экземпляром
    ///
    /// # Errors
    ///
    /// Возвращает ошибку, если конфигурация уже была инициализирована
    pub fn init_with(config: Config) -> Result<(), &'static str> {
        GLOBAL_CONFIG
            .set(config)
            .map_err(|_| "Config already initialized")
    }

    /// Проверить, инициализирована ли глобальная конфигурация
    pub fn is_initialized() -> bool {
        GLOBAL_CONFIG.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ratchet_step_interval, 100);
        assert_eq!(config.max_skipped_messages, 1000);
        assert_eq!(config.max_queue_items, 1000);
    }

    #[test]
    fn test_config_values() {
        let config = Config::default();

        // Crypto params
        assert_eq!(config.key_length, 32);
        assert_eq!(config.chacha_nonce_length, 12);
        assert_eq!(config.classic_suite_id, 1);
        assert_eq!(config.hybrid_suite_id, 2);

        // Trust weights sum to the score ceiling
        let total = config.trust_time_weight
            + config.trust_verification_weight
            + config.trust_activity_weight
            + config.trust_behavior_weight;
        assert_eq!(total, 100);

        // Queue
        assert_eq!(config.batch_size_poor, 1);
        assert_eq!(config.sync_retry_initial_ms, 1000);
        assert_eq!(config.sync_retry_max_ms, 30000);
    }
}
