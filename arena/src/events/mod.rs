//! Event system: typed events and the pub/sub bus.

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventHandler, SharedEventBus, SubscriptionId, WILDCARD};
pub use types::ArenaEvent;
