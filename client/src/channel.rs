use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use board::RealtimeError;

pub type HandlerId = u64;
pub type EventHandler = Box<dyn Fn(Value) + Send + Sync>;
pub type StatusHandler = Box<dyn Fn(ChannelStatus) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelStatus {
    Subscribed,
    Closed,
    Error(String),
}

/// One realtime connection, scoped to a single collaboration session.
///
/// Implementations must treat `on`/`off`/`on_status` as pure registry
/// operations: they never dispatch events synchronously, and handlers are
/// invoked outside any lock the implementation holds.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Start delivery of named events to registered handlers.
    async fn subscribe(&self) -> Result<(), RealtimeError>;

    /// Register a handler for one named event.
    fn on(&self, event: &str, handler: EventHandler) -> HandlerId;

    /// Remove a previously registered handler.
    fn off(&self, handler_id: HandlerId);

    /// Observe connection state transitions.
    fn on_status(&self, handler: StatusHandler);

    /// Send a payload under one named event to every peer on the channel.
    async fn send(&self, event: &str, payload: Value) -> Result<(), RealtimeError>;

    /// Tear the connection down.
    async fn close(&self);
}

/// The injected realtime capability. Connecting twice to the same channel
/// name yields handles onto the same underlying traffic.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    async fn connect(&self, channel_name: &str) -> Result<Arc<dyn RealtimeChannel>, RealtimeError>;
}
