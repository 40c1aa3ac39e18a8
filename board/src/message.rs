use serde::{Deserialize, Serialize};

use crate::model::Shape;
use crate::types::{SessionId, ShapeId, UserId};

/// Topic carrying live cursor positions.
pub const CURSOR_TOPIC: &str = "cursor";
/// Topic carrying drawing/editing operations.
pub const OPERATION_TOPIC: &str = "operation";

/// All realtime traffic of one session is scoped to a single channel.
pub fn channel_name(session_id: &SessionId) -> String {
    format!("canvas:{}", session_id)
}

/// Transient cursor position of one collaborator. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorEvent {
    pub user_id: UserId,
    pub x: f32,
    pub y: f32,
}

/// Transient drawing/editing event broadcast to collaborators. Persistence,
/// if any, happens through Shape rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationEvent {
    UpsertShape(Shape),
    DeleteShape { shape_id: ShapeId },
    Clear,
}
