// Состояние для внешних потребителей: события и read-only проекции

pub mod events;
pub mod projections;

pub use events::{ConnectionQuality, ConnectivityState, CoreEvent, EventBus};
