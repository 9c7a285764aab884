use thiserror::Error;

/// Ошибки криптографического ядра.
///
/// Таксономия следует границам отказов, а не модулям: один и тот же
/// вариант может прийти из ratchet, cipher или sync слоя.
///
/// - `AuthenticationError` — AEAD tag или подпись не сошлись. Никогда не
///   повторяется автоматически, логируется как security event.
/// - `ReplayError` — message number / chain length вне допустимого окна.
/// - `StateError` — операция над неинициализированным или revoked состоянием.
/// - `SyncConflictError` — конфликт версий ключей (не фатально, уходит в
///   ConflictResolutionEngine).
/// - `TransportError` — внешняя ошибка доставки; sync-операции ретраятся,
///   расшифровка сообщений — никогда.
/// - `CapacityError` — переполнение skipped-key store или offline queue.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),
    #[error("Replay or out-of-window message: {0}")]
    ReplayError(String),
    #[error("Invalid state: {0}")]
    StateError(String),
    #[error("Key version conflict: {0}")]
    SyncConflictError(String),
    #[error("Transport failure: {0}")]
    TransportError(String),
    #[error("Capacity exceeded: {0}")]
    CapacityError(String),
    #[error("Unexpected input length: expected {expected} bytes, got {actual}")]
    InputLengthError { expected: usize, actual: usize },
    #[error("Failed to generate keys: {0}")]
    KeyGenerationError(String),
    #[error("Key derivation failed: {0}")]
    KeyDerivationError(String),
    #[error("Signing failed: {0}")]
    SigningError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<bincode::Error> for CryptoError {
    fn from(err: bincode::Error) -> Self {
        CryptoError::SerializationError(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for CryptoError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        CryptoError::SerializationError(format!("MessagePack pack error: {}", err))
    }
}

impl From<rmp_serde::decode::Error> for CryptoError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        CryptoError::SerializationError(format!("MessagePack unpack error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, CryptoError>;
