// crates/flowcore/src/events/mod.rs

mod base;
mod iggy_bus;

pub use base::{EventEmitter, EventBus, ExecutionEvent, NodeEvent, ExecutionId};
pub use iggy_bus::{IggyEventBus, IggyEventBusConfig, IggyEventBusError, IggyEventSubscription};