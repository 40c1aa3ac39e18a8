use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use board::RealtimeError;

use crate::channel::{
    ChannelProvider, ChannelStatus, EventHandler, HandlerId, RealtimeChannel, StatusHandler,
};

/// In-memory channel provider.
///
/// Channels are shared by name: every `connect` against the same name yields a
/// handle onto the same traffic, so two hubs on one provider behave like two
/// clients of one hosted channel. `fail` injects a connection failure, the way
/// a dropped network link would surface.
#[derive(Default)]
pub struct MemoryChannelProvider {
    inner: Mutex<ProviderInner>,
}

#[derive(Default)]
struct ProviderInner {
    channels: HashMap<String, Arc<Mutex<ChannelShared>>>,
    connect_counts: HashMap<String, usize>,
}

struct ChannelShared {
    name: String,
    subscribed: bool,
    closed: bool,
    next_handler_id: HandlerId,
    handlers: Vec<HandlerEntry>,
    status_handlers: Vec<Arc<StatusHandler>>,
}

struct HandlerEntry {
    id: HandlerId,
    event: String,
    handler: Arc<EventHandler>,
}

impl ChannelShared {
    fn new(name: String) -> Self {
        Self {
            name,
            subscribed: false,
            closed: false,
            next_handler_id: 0,
            handlers: Vec::new(),
            status_handlers: Vec::new(),
        }
    }
}

impl MemoryChannelProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `connect` was called for a channel name.
    pub fn connect_count(&self, channel_name: &str) -> usize {
        *self
            .inner
            .lock()
            .expect("provider state poisoned")
            .connect_counts
            .get(channel_name)
            .unwrap_or(&0)
    }

    /// How many event handlers are currently registered on a channel.
    pub fn handler_count(&self, channel_name: &str) -> usize {
        self.inner
            .lock()
            .expect("provider state poisoned")
            .channels
            .get(channel_name)
            .map(|shared| shared.lock().expect("channel state poisoned").handlers.len())
            .unwrap_or(0)
    }

    /// Kill a channel as if the realtime link dropped. Every registered
    /// status handler observes the error; a later `connect` starts fresh.
    pub fn fail(&self, channel_name: &str, reason: &str) {
        let shared = self
            .inner
            .lock()
            .expect("provider state poisoned")
            .channels
            .get(channel_name)
            .cloned();
        if let Some(shared) = shared {
            let status_handlers = {
                let mut shared = shared.lock().expect("channel state poisoned");
                shared.closed = true;
                shared.subscribed = false;
                shared.handlers.clear();
                std::mem::take(&mut shared.status_handlers)
            };
            log::warn!("channel {} failed: {}", channel_name, reason);
            for handler in status_handlers {
                (*handler)(ChannelStatus::Error(reason.to_string()));
            }
        }
    }
}

#[async_trait]
impl ChannelProvider for MemoryChannelProvider {
    async fn connect(&self, channel_name: &str) -> Result<Arc<dyn RealtimeChannel>, RealtimeError> {
        let mut inner = self.inner.lock().expect("provider state poisoned");
        *inner
            .connect_counts
            .entry(channel_name.to_string())
            .or_insert(0) += 1;

        // A closed channel is replaced, a live one is shared.
        let stale = inner
            .channels
            .get(channel_name)
            .map(|shared| shared.lock().expect("channel state poisoned").closed)
            .unwrap_or(true);
        if stale {
            inner.channels.insert(
                channel_name.to_string(),
                Arc::new(Mutex::new(ChannelShared::new(channel_name.to_string()))),
            );
        }
        let shared = inner
            .channels
            .get(channel_name)
            .cloned()
            .expect("channel just inserted");
        Ok(Arc::new(MemoryChannel { shared }))
    }
}

pub struct MemoryChannel {
    shared: Arc<Mutex<ChannelShared>>,
}

#[async_trait]
impl RealtimeChannel for MemoryChannel {
    async fn subscribe(&self) -> Result<(), RealtimeError> {
        let status_handlers = {
            let mut shared = self.shared.lock().expect("channel state poisoned");
            if shared.closed {
                return Err(RealtimeError::transport("channel is closed"));
            }
            shared.subscribed = true;
            shared.status_handlers.clone()
        };
        for handler in status_handlers {
            (*handler)(ChannelStatus::Subscribed);
        }
        Ok(())
    }

    fn on(&self, event: &str, handler: EventHandler) -> HandlerId {
        let mut shared = self.shared.lock().expect("channel state poisoned");
        let id = shared.next_handler_id;
        shared.next_handler_id += 1;
        shared.handlers.push(HandlerEntry {
            id,
            event: event.to_string(),
            handler: Arc::new(handler),
        });
        id
    }

    fn off(&self, handler_id: HandlerId) {
        let mut shared = self.shared.lock().expect("channel state poisoned");
        shared.handlers.retain(|entry| entry.id != handler_id);
    }

    fn on_status(&self, handler: StatusHandler) {
        let mut shared = self.shared.lock().expect("channel state poisoned");
        shared.status_handlers.push(Arc::new(handler));
    }

    async fn send(&self, event: &str, payload: Value) -> Result<(), RealtimeError> {
        let handlers = {
            let shared = self.shared.lock().expect("channel state poisoned");
            if shared.closed {
                return Err(RealtimeError::transport("channel is closed"));
            }
            if !shared.subscribed {
                return Err(RealtimeError::transport("channel is not subscribed"));
            }
            log::debug!("ingress {} on {}", event, shared.name);
            shared
                .handlers
                .iter()
                .filter(|entry| entry.event == event)
                .map(|entry| entry.handler.clone())
                .collect::<Vec<_>>()
        };
        for handler in handlers {
            (*handler)(payload.clone());
        }
        Ok(())
    }

    async fn close(&self) {
        let status_handlers = {
            let mut shared = self.shared.lock().expect("channel state poisoned");
            if shared.closed {
                return;
            }
            shared.closed = true;
            shared.subscribed = false;
            shared.handlers.clear();
            std::mem::take(&mut shared.status_handlers)
        };
        for handler in status_handlers {
            (*handler)(ChannelStatus::Closed);
        }
    }
}

// TODO: track handler ownership per connect handle so closing one handle can
// drop only its own registrations instead of the whole channel's.
