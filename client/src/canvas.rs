use std::sync::Arc;

use board::{
    CursorEvent, OperationEvent, RealtimeError, SessionId, StoreError, CURSOR_TOPIC,
    OPERATION_TOPIC,
};

use crate::channel::ChannelProvider;
use crate::hub::{RealtimeTopicHub, TopicStream};
use crate::repository::{SessionRepository, ShapeRepository};
use crate::row_store::RowStore;

/// The client-side surface of one whiteboard backend: persisted sessions and
/// shapes behind the row store, live cursor/operation traffic behind the hub.
/// Both collaborators are injected, so the whole client runs against the
/// in-memory fakes as readily as against a hosted backend.
pub struct CanvasClient {
    sessions: SessionRepository,
    shapes: ShapeRepository,
    hub: RealtimeTopicHub,
}

impl CanvasClient {
    pub fn new(store: Arc<dyn RowStore>, provider: Arc<dyn ChannelProvider>) -> Self {
        Self {
            sessions: SessionRepository::new(store.clone()),
            shapes: ShapeRepository::new(store),
            hub: RealtimeTopicHub::new(provider),
        }
    }

    pub fn sessions(&self) -> &SessionRepository {
        &self.sessions
    }

    pub fn shapes(&self) -> &ShapeRepository {
        &self.shapes
    }

    pub fn hub(&self) -> &RealtimeTopicHub {
        &self.hub
    }

    /// Open the session's realtime channel (idempotent).
    pub async fn join_session(&self, session_id: SessionId) -> Result<(), RealtimeError> {
        self.hub.open_channel(session_id).await
    }

    pub async fn leave_session(&self, session_id: SessionId) {
        self.hub.close_channel(session_id).await
    }

    pub async fn cursor_events(
        &self,
        session_id: SessionId,
    ) -> Result<TopicStream<CursorEvent>, RealtimeError> {
        self.hub.json_topic(session_id, CURSOR_TOPIC).await
    }

    pub async fn operation_events(
        &self,
        session_id: SessionId,
    ) -> Result<TopicStream<OperationEvent>, RealtimeError> {
        self.hub.json_topic(session_id, OPERATION_TOPIC).await
    }

    pub async fn publish_cursor(
        &self,
        session_id: SessionId,
        cursor: &CursorEvent,
    ) -> Result<(), RealtimeError> {
        self.hub.publish(session_id, CURSOR_TOPIC, cursor).await
    }

    pub async fn publish_operation(
        &self,
        session_id: SessionId,
        operation: &OperationEvent,
    ) -> Result<(), RealtimeError> {
        self.hub.publish(session_id, OPERATION_TOPIC, operation).await
    }

    /// Delete a session and its shapes. The generic row store has no
    /// foreign-key cascade, so the shape rows go first.
    pub async fn delete_session(&self, session_id: &SessionId) -> Result<(), StoreError> {
        for shape in self.shapes.list_for_session(session_id).await? {
            self.shapes.delete(&shape.id).await?;
        }
        self.sessions.delete(session_id).await
    }
}
