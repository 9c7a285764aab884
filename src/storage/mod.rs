//! Хранилище
//!
//! Долговечностью владеет внешний слой (key-value store); ядро
//! работает только через эти инжектируемые трейты — глобальных карт
//! состояния нет. На устройство предполагается единственный пишущий
//! процесс; координация между процессами (lock file, демон) — забота
//! владельца хранилища.
//!
//! [`memory::MemoryStorage`] — референсная in-memory реализация для
//! тестов и non-persistent платформ.

pub mod memory;
pub mod models;

use crate::error::Result;
use crate::identity::DeviceIdentity;
use crate::sync::conflict::KeyVersion;
use crate::sync::queue::OfflineQueueItem;
use models::StoredRatchetState;

pub use memory::MemoryStorage;

/// Хранилище ratchet-состояний, ключ — (conversationId, userId)
pub trait RatchetStore: Send {
    fn get_ratchet(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Option<StoredRatchetState>>;
    fn put_ratchet(&mut self, state: StoredRatchetState) -> Result<()>;
    fn delete_ratchet(&mut self, conversation_id: &str, user_id: &str) -> Result<()>;
}

/// Хранилище идентичностей устройств, ключ — deviceId
pub trait DeviceStore: Send {
    fn get_device(&self, device_id: &str) -> Result<Option<DeviceIdentity>>;
    fn put_device(&mut self, device: &DeviceIdentity) -> Result<()>;
    fn all_devices(&self) -> Result<Vec<DeviceIdentity>>;
}

/// Хранилище offline-очереди, ключ — itemId
pub trait QueueStore: Send {
    fn put_item(&mut self, item: &OfflineQueueItem) -> Result<()>;
    fn delete_item(&mut self, item_id: &str) -> Result<()>;
    fn all_items(&self) -> Result<Vec<OfflineQueueItem>>;
}

/// Архив проигравших версий ключей (audit / rollback)
pub trait ConflictArchive: Send {
    fn archive_versions(&mut self, conflict_id: &str, versions: &[KeyVersion]) -> Result<()>;
    fn archived_versions(&self, conflict_id: &str) -> Result<Vec<KeyVersion>>;
}
