use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use board::chrono::Utc;
use board::{Session, SessionId, Shape, ShapeId, StoreError};

use crate::row_store::{Filter, Order, Row, RowStore};

pub const SESSIONS_TABLE: &str = "sessions";
pub const SHAPES_TABLE: &str = "shapes";

fn to_row<T: Serialize>(table: &str, entity: &T) -> Result<Row, StoreError> {
    match serde_json::to_value(entity) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(_) => Err(StoreError::persistence(
            table,
            "entity did not serialize to an object",
        )),
        Err(err) => Err(StoreError::persistence(table, err)),
    }
}

fn from_row<T: DeserializeOwned>(table: &str, row: Row) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(row)).map_err(|err| StoreError::persistence(table, err))
}

fn now_value(table: &str) -> Result<Value, StoreError> {
    serde_json::to_value(Utc::now()).map_err(|err| StoreError::persistence(table, err))
}

/// Pass-through persistence for sessions. Listing is most-recently-updated
/// first; every mutation bumps `updated_at`.
#[derive(Clone)]
pub struct SessionRepository {
    store: Arc<dyn RowStore>,
}

impl SessionRepository {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, name: &str) -> Result<Session, StoreError> {
        let session = Session::new(name);
        let row = self
            .store
            .insert(SESSIONS_TABLE, to_row(SESSIONS_TABLE, &session)?)
            .await?;
        log::info!("created session {}", session.id);
        from_row(SESSIONS_TABLE, row)
    }

    pub async fn list(&self) -> Result<Vec<Session>, StoreError> {
        let rows = self
            .store
            .list(SESSIONS_TABLE, None, Some(&Order::desc("updated_at")))
            .await?;
        rows.into_iter()
            .map(|row| from_row(SESSIONS_TABLE, row))
            .collect()
    }

    pub async fn get(&self, id: &SessionId) -> Result<Session, StoreError> {
        let row = self.store.get_by_id(SESSIONS_TABLE, &id.to_string()).await?;
        from_row(SESSIONS_TABLE, row)
    }

    pub async fn rename(&self, id: &SessionId, name: &str) -> Result<Session, StoreError> {
        let mut patch = Row::new();
        patch.insert("name".into(), Value::String(name.to_string()));
        patch.insert("updated_at".into(), now_value(SESSIONS_TABLE)?);
        let row = self
            .store
            .update(SESSIONS_TABLE, &id.to_string(), patch)
            .await?;
        from_row(SESSIONS_TABLE, row)
    }

    /// Bump `updated_at` alone, so any board mutation can surface the session
    /// at the top of the recent list.
    pub async fn touch(&self, id: &SessionId) -> Result<Session, StoreError> {
        let mut patch = Row::new();
        patch.insert("updated_at".into(), now_value(SESSIONS_TABLE)?);
        let row = self
            .store
            .update(SESSIONS_TABLE, &id.to_string(), patch)
            .await?;
        from_row(SESSIONS_TABLE, row)
    }

    pub async fn delete(&self, id: &SessionId) -> Result<(), StoreError> {
        self.store
            .delete_by_id(SESSIONS_TABLE, &id.to_string())
            .await
    }
}

/// Pass-through persistence for shapes. Listing within a session is in
/// creation order; a shape can only be created under an existing session.
#[derive(Clone)]
pub struct ShapeRepository {
    store: Arc<dyn RowStore>,
}

impl ShapeRepository {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, shape: Shape) -> Result<Shape, StoreError> {
        // The owning session must exist; surfaces as NotFound on `sessions`.
        self.store
            .get_by_id(SESSIONS_TABLE, &shape.session_id.to_string())
            .await?;
        let row = self
            .store
            .insert(SHAPES_TABLE, to_row(SHAPES_TABLE, &shape)?)
            .await?;
        from_row(SHAPES_TABLE, row)
    }

    pub async fn list_for_session(&self, session_id: &SessionId) -> Result<Vec<Shape>, StoreError> {
        let filter = Filter::eq("session_id", session_id.to_string());
        let rows = self
            .store
            .list(SHAPES_TABLE, Some(&filter), Some(&Order::asc("created_at")))
            .await?;
        rows.into_iter()
            .map(|row| from_row(SHAPES_TABLE, row))
            .collect()
    }

    pub async fn get(&self, id: &ShapeId) -> Result<Shape, StoreError> {
        let row = self.store.get_by_id(SHAPES_TABLE, &id.to_string()).await?;
        from_row(SHAPES_TABLE, row)
    }

    pub async fn update(&self, shape: &Shape) -> Result<Shape, StoreError> {
        let row = self
            .store
            .update(
                SHAPES_TABLE,
                &shape.id.to_string(),
                to_row(SHAPES_TABLE, shape)?,
            )
            .await?;
        from_row(SHAPES_TABLE, row)
    }

    pub async fn delete(&self, id: &ShapeId) -> Result<(), StoreError> {
        self.store.delete_by_id(SHAPES_TABLE, &id.to_string()).await
    }
}
