//! События ядра
//!
//! Ядро не опрашивает внешний мир: изменение связности приходит
//! подпиской (а не таймером), а наружу события уходят через EventBus —
//! доставка уведомлений (push и т.п.) остаётся за внешним слоем.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Качество соединения, измеренное внешним транспортом
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

/// Состояние связности устройства
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectivityState {
    Offline,
    Online(ConnectionQuality),
}

impl ConnectivityState {
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectivityState::Online(_))
    }
}

/// События, которые ядро поднимает для внешних потребителей
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CoreEvent {
    /// Новый sync package готов к доставке
    SyncPackageAvailable { package_id: String, to_device_id: String },
    /// Обнаружен конфликт версий ключей
    ConflictDetected { conflict_id: String },
    /// Переполнение bounded-хранилища, вытеснены старейшие записи
    CapacityEviction { component: String, dropped: u64 },
    /// Security event: проваленная аутентификация / подпись
    SecurityAlert { context: String },
    /// Сменилось состояние связности
    ConnectivityChanged { state: ConnectivityState },
}

type Subscriber = Box<dyn Fn(&CoreEvent) + Send + Sync>;

/// Список подписчиков на события ядра
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&CoreEvent) + Send + Sync + 'static,
    {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(Box::new(subscriber));
        }
    }

    pub fn emit(&self, event: &CoreEvent) {
        use tracing::trace;

        trace!(target: "state::events", event = ?event, "Event emitted");
        if let Ok(subscribers) = self.subscribers.lock() {
            for subscriber in subscribers.iter() {
                subscriber(event);
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let seen = counter.clone();
        bus.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&CoreEvent::SecurityAlert {
            context: "test".to_string(),
        });
        bus.emit(&CoreEvent::ConnectivityChanged {
            state: ConnectivityState::Offline,
        });

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
