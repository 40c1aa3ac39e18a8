use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Color, Point, SessionId, ShapeId};

/// A collaboration session. One session owns one board worth of shapes and
/// one realtime channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4(),
            name: name.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeKind {
    Rect,
    Oval,
    Path,
}

/// A persisted drawing primitive. `points` is empty except for `Path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub id: ShapeId,
    pub session_id: SessionId,
    pub kind: ShapeKind,
    pub origin: Point,
    pub width: f32,
    pub height: f32,
    pub stroke_color: Color,
    pub stroke_width: f32,
    pub fill_color: Option<Color>,
    pub points: Vec<Point>,
    pub created_at: DateTime<Utc>,
}

impl Shape {
    pub fn new(session_id: SessionId, kind: ShapeKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            session_id,
            kind,
            origin: Point::new(0.0, 0.0),
            width: 0.0,
            height: 0.0,
            stroke_color: Color::default(),
            stroke_width: 1.0,
            fill_color: None,
            points: Vec::new(),
            created_at: Utc::now(),
        }
    }
}
