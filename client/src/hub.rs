use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::Stream;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use board::{channel_name, RealtimeError, SessionId};

use crate::channel::{ChannelProvider, ChannelStatus, HandlerId, RealtimeChannel};

/// Fan-out buffer per topic. A subscriber that falls further behind loses the
/// oldest events instead of disconnecting.
const TOPIC_BUFFER: usize = 256;

type DecodeFn<T> = Box<dyn Fn(Value) -> Result<T, RealtimeError> + Send + Sync>;

/// Multiplexes named topics over one realtime channel per session.
///
/// Each topic is a broadcast stream: every attached subscriber receives every
/// event delivered while it is attached, and nothing else. Delivery is
/// at-most-once; there is no buffering or replay across a detach or a
/// disconnect, matching the hosted channel primitive underneath.
pub struct RealtimeTopicHub {
    provider: Arc<dyn ChannelProvider>,
    // Serializes connection attempts so an idempotent open cannot race itself.
    open_lock: tokio::sync::Mutex<()>,
    inner: Arc<Mutex<HubInner>>,
}

#[derive(Default)]
struct HubInner {
    sessions: HashMap<SessionId, SessionEntry>,
    // Distinguishes topic registrations across close/reopen of a session, so
    // a stream surviving from an earlier registration cannot release a newer
    // one with the same name.
    next_epoch: u64,
}

struct SessionEntry {
    channel: Arc<dyn RealtimeChannel>,
    topics: HashMap<String, TopicSlot>,
    failure: Arc<Mutex<Option<RealtimeError>>>,
}

/// Registered state of one topic. Absence from the session's map is the
/// unregistered state; the slot is removed when the last subscriber detaches,
/// so a later attach registers a fresh handler.
struct TopicSlot {
    sender: broadcast::Sender<Value>,
    handler_id: HandlerId,
    subscribers: usize,
    epoch: u64,
}

impl RealtimeTopicHub {
    pub fn new(provider: Arc<dyn ChannelProvider>) -> Self {
        Self {
            provider,
            open_lock: tokio::sync::Mutex::new(()),
            inner: Arc::new(Mutex::new(HubInner::default())),
        }
    }

    /// Establish the channel for a session, reusing it if already open.
    /// At most one underlying connection exists per session id.
    pub async fn open_channel(&self, session_id: SessionId) -> Result<(), RealtimeError> {
        let _open = self.open_lock.lock().await;
        if self.is_open(&session_id) {
            return Ok(());
        }

        let name = channel_name(&session_id);
        let channel = self.provider.connect(&name).await?;
        channel.subscribe().await?;

        let failure = Arc::new(Mutex::new(None));
        let hub = Arc::downgrade(&self.inner);
        channel.on_status(Box::new(move |status| {
            let reason = match status {
                ChannelStatus::Subscribed => return,
                ChannelStatus::Closed => "channel closed by remote".to_string(),
                ChannelStatus::Error(reason) => reason,
            };
            if let Some(inner) = hub.upgrade() {
                let mut inner = match inner.lock() {
                    Ok(inner) => inner,
                    Err(_) => return,
                };
                // A locally initiated close has already removed the entry.
                if let Some(entry) = inner.sessions.remove(&session_id) {
                    log::warn!("channel for session {} failed: {}", session_id, reason);
                    if let Ok(mut failure) = entry.failure.lock() {
                        *failure = Some(RealtimeError::transport(&reason));
                    }
                    // Dropping the entry drops every topic sender, which ends
                    // the open streams after they observe the failure.
                }
            }
        }));

        log::info!("opened channel {}", name);
        self.inner
            .lock()
            .expect("hub state poisoned")
            .sessions
            .insert(
                session_id,
                SessionEntry {
                    channel,
                    topics: HashMap::new(),
                    failure,
                },
            );
        Ok(())
    }

    pub fn is_open(&self, session_id: &SessionId) -> bool {
        self.inner
            .lock()
            .expect("hub state poisoned")
            .sessions
            .contains_key(session_id)
    }

    /// Attach to a named topic, opening the session channel on demand.
    ///
    /// The first subscriber registers a forwarding handler for the event name;
    /// the caller-supplied decoder turns each raw payload into a domain event.
    /// Payloads the decoder rejects are logged and dropped without disturbing
    /// the stream.
    pub async fn topic<T, D>(
        &self,
        session_id: SessionId,
        topic: &str,
        decode: D,
    ) -> Result<TopicStream<T>, RealtimeError>
    where
        T: 'static,
        D: Fn(Value) -> Result<T, RealtimeError> + Send + Sync + 'static,
    {
        self.open_channel(session_id).await?;

        let mut guard = self.inner.lock().expect("hub state poisoned");
        let inner = &mut *guard;
        let entry = inner
            .sessions
            .get_mut(&session_id)
            .ok_or(RealtimeError::ChannelNotOpen { session_id })?;
        let failure = entry.failure.clone();

        let (receiver, epoch) = match entry.topics.get_mut(topic) {
            Some(slot) => {
                slot.subscribers += 1;
                (slot.sender.subscribe(), slot.epoch)
            }
            None => {
                let epoch = inner.next_epoch;
                inner.next_epoch += 1;
                let (sender, receiver) = broadcast::channel(TOPIC_BUFFER);
                let forward = sender.clone();
                let handler_id = entry.channel.on(
                    topic,
                    Box::new(move |payload| {
                        // No receiver attached right now is fine; events go to
                        // whoever is listening at delivery time.
                        let _ = forward.send(payload);
                    }),
                );
                log::debug!("registered topic {} for session {}", topic, session_id);
                entry.topics.insert(
                    topic.to_string(),
                    TopicSlot {
                        sender,
                        handler_id,
                        subscribers: 1,
                        epoch,
                    },
                );
                (receiver, epoch)
            }
        };

        Ok(TopicStream {
            topic: topic.to_string(),
            inner: BroadcastStream::new(receiver),
            decode: Box::new(decode),
            failure,
            done: false,
            _guard: TopicGuard {
                hub: self.inner.clone(),
                session_id,
                topic: topic.to_string(),
                epoch,
            },
        })
    }

    /// `topic` with a serde decoder.
    pub async fn json_topic<T>(
        &self,
        session_id: SessionId,
        topic: &str,
    ) -> Result<TopicStream<T>, RealtimeError>
    where
        T: DeserializeOwned + 'static,
    {
        let name = topic.to_string();
        self.topic(session_id, topic, move |payload| {
            serde_json::from_value(payload).map_err(|err| RealtimeError::decode(name.as_str(), err))
        })
        .await
    }

    /// Serialize and send a payload on a named topic of an open channel.
    /// Publishing without an open channel is an error, never a crash.
    pub async fn publish<T: Serialize>(
        &self,
        session_id: SessionId,
        topic: &str,
        payload: &T,
    ) -> Result<(), RealtimeError> {
        let channel = self
            .inner
            .lock()
            .expect("hub state poisoned")
            .sessions
            .get(&session_id)
            .map(|entry| entry.channel.clone())
            .ok_or(RealtimeError::ChannelNotOpen { session_id })?;

        let value = serde_json::to_value(payload)
            .map_err(|err| RealtimeError::transport(format!("unserializable payload: {}", err)))?;
        log::debug!("egress {} for session {}", topic, session_id);
        channel.send(topic, value).await
    }

    /// Tear down the session's channel. Open topic streams end cleanly.
    pub async fn close_channel(&self, session_id: SessionId) {
        let entry = self
            .inner
            .lock()
            .expect("hub state poisoned")
            .sessions
            .remove(&session_id);
        if let Some(entry) = entry {
            for slot in entry.topics.values() {
                entry.channel.off(slot.handler_id);
            }
            entry.channel.close().await;
            log::info!("closed channel for session {}", session_id);
        }
    }
}

/// Multi-subscriber stream of decoded events on one topic.
///
/// Dropping the last stream of a topic unregisters the underlying handler
/// within the same turn; events published while no subscriber is attached are
/// not replayed. A channel failure surfaces as one terminal `Err` item.
pub struct TopicStream<T> {
    topic: String,
    inner: BroadcastStream<Value>,
    decode: DecodeFn<T>,
    failure: Arc<Mutex<Option<RealtimeError>>>,
    done: bool,
    _guard: TopicGuard,
}

impl<T> Stream for TopicStream<T> {
    type Item = Result<T, RealtimeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        loop {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(payload))) => match (this.decode)(payload) {
                    Ok(event) => return Poll::Ready(Some(Ok(event))),
                    Err(err) => {
                        // Contained to the single event.
                        log::warn!("{}", err);
                    }
                },
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(missed)))) => {
                    log::warn!("topic {} lagged, {} events dropped", this.topic, missed);
                }
                Poll::Ready(None) => {
                    this.done = true;
                    let failure = this
                        .failure
                        .lock()
                        .ok()
                        .and_then(|failure| failure.clone());
                    return Poll::Ready(failure.map(Err));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Drops one subscription; the last one out unregisters the topic.
struct TopicGuard {
    hub: Arc<Mutex<HubInner>>,
    session_id: SessionId,
    topic: String,
    epoch: u64,
}

impl Drop for TopicGuard {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.hub.lock() {
            let entry = match inner.sessions.get_mut(&self.session_id) {
                Some(entry) => entry,
                None => return,
            };
            let last_out = match entry.topics.get_mut(&self.topic) {
                Some(slot) if slot.epoch == self.epoch => {
                    slot.subscribers -= 1;
                    slot.subscribers == 0
                }
                _ => false,
            };
            if last_out {
                if let Some(slot) = entry.topics.remove(&self.topic) {
                    entry.channel.off(slot.handler_id);
                    log::debug!(
                        "unregistered topic {} for session {}",
                        self.topic,
                        self.session_id
                    );
                }
            }
        }
    }
}
