// Remote client abstraction: the only primitive is "submit SQL text with
// positional values and receive a fully materialized row batch".
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::Result;
use crate::models::SqlValue;

/// One result row, column name to value.
pub type Row = Map<String, Value>;

/// A complete result set returned in one response.
pub type RowBatch = Vec<Row>;

/// Client for a remote SQL database that speaks plain SQL text.
///
/// There is no prepared-statement handle, no pragma or exec call and no
/// scalar-function registration: everything goes through [`RemoteClient::sql`].
#[async_trait::async_trait]
pub trait RemoteClient: Send + Sync {
    /// Submit SQL with positional `?` values and return every row.
    async fn sql(&self, sql: &str, values: &[SqlValue]) -> Result<RowBatch>;

    /// Close the remote session.
    async fn close(&self) -> Result<()>;
}

/// Opens remote clients from a connection string.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, connection_string: &str) -> Result<Arc<dyn RemoteClient>>;
}
