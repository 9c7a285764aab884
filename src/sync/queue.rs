//! OfflineSyncQueue — персистентная приоритетная очередь sync-пакетов
//!
//! Пока устройство offline, пакеты копятся здесь (и дублируются во
//! внешнем QueueStore — crash-устойчивость). При переходе в online
//! очередь дренируется: `critical` уходят поштучно и первыми, остальные
//! приоритеты — батчами, размер которых сжимается с ухудшением качества
//! соединения. Drain идемпотентен по identity элемента.
//!
//! Связность приходит подпиской (`on_connectivity_change` подключается
//! к уведомлению транспорта), а не опросом по таймеру.

use crate::config::Config;
use crate::error::{CryptoError, Result};
use crate::state::events::{ConnectionQuality, ConnectivityState, CoreEvent, EventBus};
use crate::storage::QueueStore;
use crate::sync::package::{KeyType, SyncPriority};
use crate::utils::time::current_timestamp;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Элемент offline-очереди
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineQueueItem {
    pub item_id: String,
    pub conversation_id: String,
    pub key_type: KeyType,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
    pub priority: SyncPriority,
    pub enqueued_at: i64,
    pub attempts: u32,
}

impl OfflineQueueItem {
    pub fn new(
        conversation_id: &str,
        key_type: KeyType,
        payload: Vec<u8>,
        priority: SyncPriority,
    ) -> Self {
        Self {
            item_id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            key_type,
            payload,
            priority,
            enqueued_at: current_timestamp(),
            attempts: 0,
        }
    }
}

/// Отчёт об одном drain
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    pub delivered: usize,
    pub batches: usize,
}

/// Bounded приоритетная очередь с отложенной доставкой
pub struct OfflineSyncQueue {
    /// По очереди на приоритет; внутри каждой — FIFO
    lanes: [VecDeque<OfflineQueueItem>; 4],
    store: Box<dyn QueueStore>,
    capacity: usize,
    connectivity: ConnectivityState,
    /// Identity уже доставленных элементов (идемпотентность drain)
    delivered: HashSet<String>,
    events: Arc<EventBus>,
}

impl OfflineSyncQueue {
    /// Создать очередь с ёмкостью из Config, подняв незавершённые
    /// элементы из хранилища (возобновление после падения)
    pub fn new(store: Box<dyn QueueStore>, events: Arc<EventBus>) -> Result<Self> {
        Self::with_capacity(store, events, Config::global().max_queue_items)
    }

    /// Создать очередь с явной ёмкостью
    pub fn with_capacity(
        store: Box<dyn QueueStore>,
        events: Arc<EventBus>,
        capacity: usize,
    ) -> Result<Self> {
        let mut queue = Self {
            lanes: Default::default(),
            store,
            capacity,
            connectivity: ConnectivityState::Offline,
            delivered: HashSet::new(),
            events,
        };

        let mut persisted = queue.store.all_items()?;
        persisted.sort_by_key(|item| item.enqueued_at);
        for item in persisted {
            queue.lanes[item.priority.rank() as usize].push_back(item);
        }

        Ok(queue)
    }

    /// Положить элемент в очередь.
    ///
    /// При переполнении вытесняется старейший элемент наинизшего
    /// занятого приоритета; событие поднимается для observability.
    pub fn enqueue(&mut self, item: OfflineQueueItem) -> Result<()> {
        use tracing::{debug, warn};

        while self.len() >= self.capacity {
            let Some(evicted) = self.evict_oldest_low_priority() else {
                return Err(CryptoError::CapacityError(
                    "offline queue is full and nothing is evictable".to_string(),
                ));
            };
            self.store.delete_item(&evicted.item_id)?;
            warn!(
                target: "sync::queue",
                item_id = %evicted.item_id,
                priority = ?evicted.priority,
                "Offline queue full; oldest low-priority item evicted"
            );
            self.events.emit(&CoreEvent::CapacityEviction {
                component: "offline_queue".to_string(),
                dropped: 1,
            });
        }

        self.store.put_item(&item)?;
        debug!(
            target: "sync::queue",
            item_id = %item.item_id,
            priority = ?item.priority,
            queued = %(self.len() + 1),
            "Item enqueued"
        );
        self.lanes[item.priority.rank() as usize].push_back(item);
        Ok(())
    }

    /// Уведомление о смене связности (подключается к транспорту).
    ///
    /// Возвращает true при переходе offline → online: самое время
    /// вызвать [`drain`](Self::drain).
    pub fn on_connectivity_change(&mut self, state: ConnectivityState) -> bool {
        use tracing::info;

        let was_online = self.connectivity.is_online();
        self.connectivity = state;
        self.events
            .emit(&CoreEvent::ConnectivityChanged { state });

        let should_drain = !was_online && state.is_online() && !self.is_empty();
        if should_drain {
            info!(
                target: "sync::queue",
                queued = %self.len(),
                "Connectivity restored; queue ready to drain"
            );
        }
        should_drain
    }

    /// Дренировать очередь.
    ///
    /// `send` получает батч элементов и возвращает Ok после подтверждения
    /// доставки. `critical` элементы уходят поштучно и строго раньше
    /// остальных; прочие приоритеты батчуются по качеству соединения.
    /// Ошибка доставки останавливает drain (`TransportError` у
    /// вызывающего — ретрай с backoff); уже доставленные элементы при
    /// повторном drain пропускаются.
    pub fn drain(
        &mut self,
        mut send: impl FnMut(&[OfflineQueueItem]) -> Result<()>,
    ) -> Result<DrainReport> {
        use tracing::{debug, info};

        let ConnectivityState::Online(quality) = self.connectivity else {
            return Err(CryptoError::StateError(
                "cannot drain while offline".to_string(),
            ));
        };

        let mut report = DrainReport::default();

        for priority in SyncPriority::ALL {
            let batch_size = match priority {
                SyncPriority::Critical => 1,
                _ => batch_size_for(quality),
            };

            loop {
                let batch = self.take_batch(priority, batch_size)?;
                if batch.is_empty() {
                    break;
                }

                match send(&batch) {
                    Ok(()) => {
                        for item in &batch {
                            self.delivered.insert(item.item_id.clone());
                            self.store.delete_item(&item.item_id)?;
                        }
                        report.delivered += batch.len();
                        report.batches += 1;
                        debug!(
                            target: "sync::queue",
                            priority = ?priority,
                            batch = %batch.len(),
                            "Batch delivered"
                        );
                    }
                    Err(e) => {
                        // Недоставленный батч возвращается в голову своей
                        // очереди с увеличенным счётчиком попыток
                        let lane = &mut self.lanes[priority.rank() as usize];
                        for item in batch.into_iter().rev() {
                            let mut item = item;
                            item.attempts += 1;
                            self.store.put_item(&item)?;
                            lane.push_front(item);
                        }
                        return Err(e);
                    }
                }
            }
        }

        info!(
            target: "sync::queue",
            delivered = %report.delivered,
            batches = %report.batches,
            "Queue drained"
        );

        Ok(report)
    }

    pub fn len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(VecDeque::is_empty)
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.connectivity
    }

    /// Снять батч из очереди приоритета, пропуская уже доставленное
    fn take_batch(
        &mut self,
        priority: SyncPriority,
        batch_size: usize,
    ) -> Result<Vec<OfflineQueueItem>> {
        let lane = &mut self.lanes[priority.rank() as usize];
        let mut batch = Vec::with_capacity(batch_size);
        while batch.len() < batch_size {
            let Some(item) = lane.pop_front() else {
                break;
            };
            if self.delivered.contains(&item.item_id) {
                self.store.delete_item(&item.item_id)?;
                continue;
            }
            batch.push(item);
        }
        Ok(batch)
    }

    /// Старейший элемент наинизшего занятого приоритета
    fn evict_oldest_low_priority(&mut self) -> Option<OfflineQueueItem> {
        for priority in SyncPriority::ALL.iter().rev() {
            let lane = &mut self.lanes[priority.rank() as usize];
            if let Some(item) = lane.pop_front() {
                return Some(item);
            }
        }
        None
    }
}

/// Размер батча для качества соединения
fn batch_size_for(quality: ConnectionQuality) -> usize {
    let config = Config::global();
    match quality {
        ConnectionQuality::Excellent => config.batch_size_excellent,
        ConnectionQuality::Good => config.batch_size_good,
        ConnectionQuality::Fair => config.batch_size_fair,
        ConnectionQuality::Poor => config.batch_size_poor,
    }
}
