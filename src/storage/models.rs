// Модели данных для хранилища

use serde::{Deserialize, Serialize};

/// Сериализованное ratchet-состояние в хранилище
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRatchetState {
    pub conversation_id: String,
    pub user_id: String,
    /// Bincode сериализация SerializableRatchetState
    pub session_data: Vec<u8>,
    pub updated_at: i64,
}
