//! Идентичность устройств
//!
//! Каждое устройство пользователя несёт две пары ключей (подпись +
//! шифрование), стабильный deviceId (хэш публичных ключей), уровень
//! доверия и счётчики, из которых по требованию вычисляется trust score.
//!
//! ## Модули
//! - [`device`]: типы (DeviceIdentity, TrustLevel, verification)
//! - [`registry`]: DeviceIdentityRegistry — регистрация, верификация,
//!   revocation
//!
//! Уровень доверия растёт только через верификацию; `Revoked` —
//! терминальное состояние, устройство никогда не удаляется из реестра.

pub mod device;
pub mod registry;

pub use device::{
    DeviceIdentity, DeviceType, RevocationRecord, TrustLevel, VerificationChallenge,
    VerificationMethod,
};
pub use registry::DeviceIdentityRegistry;
