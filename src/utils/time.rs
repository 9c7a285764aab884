// Время

/// Текущий Unix timestamp (в секундах)
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Текущий Unix timestamp (в миллисекундах)
pub fn current_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
