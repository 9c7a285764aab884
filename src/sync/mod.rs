//! Межустройственная синхронизация ключей
//!
//! ## Dataflow
//! ```text
//! Устройство A                                Устройство B
//! ============                                ============
//!
//! 1. create_key_sync_package(material, type, B)
//!    - ephemeral agreement к ключу шифрования B
//!    - AEAD поверх материала, подпись ключом A,
//!      integrity hash, приоритет по типу ключа
//! 2. package → OfflineSyncQueue (если offline) → transport →
//!
//!                                             1. process_key_sync_package(pkg)
//!                                                - идемпотентность по packageId
//!                                                - подпись → hash → расшифровка →
//!                                                  атомарный импорт
//!                                                - любой отказ: без частичного
//!                                                  импорта + trust decay отправителя
//!
//! Конкурентные версии одного ключа → ConflictResolutionEngine:
//! детерминированная стратегия, проигравшие версии архивируются.
//! ```
//!
//! ## Модули
//! - [`package`]: KeySyncPackage и типы ключей/приоритетов
//! - [`service`]: CrossDeviceSyncService — создание и обработка пакетов
//! - [`conflict`]: ConflictResolutionEngine
//! - [`queue`]: OfflineSyncQueue — bounded очередь с приоритетным drain

pub mod conflict;
pub mod package;
pub mod queue;
pub mod service;

pub use conflict::{
    ConflictResolutionEngine, ConflictSeverity, ConflictStatus, ConflictStrategy, KeyConflict,
    KeyVersion,
};
pub use package::{KeySyncPackage, KeyType, SyncPriority};
pub use queue::{OfflineQueueItem, OfflineSyncQueue};
pub use service::{CrossDeviceSyncService, ImportOutcome};
