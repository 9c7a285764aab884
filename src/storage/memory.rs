// In-memory хранилище для тестов и non-persistent платформ

use crate::error::Result;
use crate::identity::DeviceIdentity;
use crate::storage::models::StoredRatchetState;
use crate::storage::{ConflictArchive, DeviceStore, QueueStore, RatchetStore};
use crate::sync::conflict::KeyVersion;
use crate::sync::queue::OfflineQueueItem;
use std::collections::HashMap;

/// In-memory хранилище
pub struct MemoryStorage {
    ratchets: HashMap<(String, String), StoredRatchetState>,
    devices: HashMap<String, DeviceIdentity>,
    queue_items: HashMap<String, OfflineQueueItem>,
    archived_conflicts: HashMap<String, Vec<KeyVersion>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            ratchets: HashMap::new(),
            devices: HashMap::new(),
            queue_items: HashMap::new(),
            archived_conflicts: HashMap::new(),
        }
    }

    pub fn clear_all(&mut self) {
        self.ratchets.clear();
        self.devices.clear();
        self.queue_items.clear();
        self.archived_conflicts.clear();
    }
}

impl RatchetStore for MemoryStorage {
    fn get_ratchet(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Option<StoredRatchetState>> {
        Ok(self
            .ratchets
            .get(&(conversation_id.to_string(), user_id.to_string()))
            .cloned())
    }

    fn put_ratchet(&mut self, state: StoredRatchetState) -> Result<()> {
        self.ratchets.insert(
            (state.conversation_id.clone(), state.user_id.clone()),
            state,
        );
        Ok(())
    }

    fn delete_ratchet(&mut self, conversation_id: &str, user_id: &str) -> Result<()> {
        self.ratchets
            .remove(&(conversation_id.to_string(), user_id.to_string()));
        Ok(())
    }
}

impl DeviceStore for MemoryStorage {
    fn get_device(&self, device_id: &str) -> Result<Option<DeviceIdentity>> {
        Ok(self.devices.get(device_id).cloned())
    }

    fn put_device(&mut self, device: &DeviceIdentity) -> Result<()> {
        self.devices.insert(device.device_id.clone(), device.clone());
        Ok(())
    }

    fn all_devices(&self) -> Result<Vec<DeviceIdentity>> {
        Ok(self.devices.values().cloned().collect())
    }
}

impl QueueStore for MemoryStorage {
    fn put_item(&mut self, item: &OfflineQueueItem) -> Result<()> {
        self.queue_items.insert(item.item_id.clone(), item.clone());
        Ok(())
    }

    fn delete_item(&mut self, item_id: &str) -> Result<()> {
        self.queue_items.remove(item_id);
        Ok(())
    }

    fn all_items(&self) -> Result<Vec<OfflineQueueItem>> {
        Ok(self.queue_items.values().cloned().collect())
    }
}

impl ConflictArchive for MemoryStorage {
    fn archive_versions(&mut self, conflict_id: &str, versions: &[KeyVersion]) -> Result<()> {
        self.archived_conflicts
            .entry(conflict_id.to_string())
            .or_default()
            .extend_from_slice(versions);
        Ok(())
    }

    fn archived_versions(&self, conflict_id: &str) -> Result<Vec<KeyVersion>> {
        Ok(self
            .archived_conflicts
            .get(conflict_id)
            .cloned()
            .unwrap_or_default())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}
