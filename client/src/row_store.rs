use async_trait::async_trait;
use serde_json::{Map, Value};

use board::StoreError;

/// One structured record, as the hosted backend hands them over.
pub type Row = Map<String, Value>;

/// Equality match on a single column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

/// The injected persistence capability: typed get/list/insert/update/delete
/// by id. Rows carry their id in the `"id"` column.
///
/// `get_by_id`, `update` and `delete_by_id` against an absent id fail with
/// `StoreError::NotFound`; constraint violations fail with
/// `StoreError::Persistence`.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn list(
        &self,
        table: &str,
        filter: Option<&Filter>,
        order: Option<&Order>,
    ) -> Result<Vec<Row>, StoreError>;

    async fn get_by_id(&self, table: &str, id: &str) -> Result<Row, StoreError>;

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError>;

    /// Patch the named columns of an existing row, returning the full row.
    async fn update(&self, table: &str, id: &str, patch: Row) -> Result<Row, StoreError>;

    async fn delete_by_id(&self, table: &str, id: &str) -> Result<(), StoreError>;
}
