use std::sync::Arc;
use tracing::{debug, error};

use crate::error::{Result, ServiceError};
use crate::models::{normalize_all, Binding};
use crate::services::remote::{RemoteClient, Row, RowBatch};
use crate::services::result_stream::RowStream;

/// Outcome of [`PreparedStatement::run`].
///
/// The remote protocol reports neither affected rows nor inserted ids, so
/// `changes` is always 1 and `last_insert_rowid` is always `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunResult {
    pub changes: u64,
    pub last_insert_rowid: Option<i64>,
}

/// Statement-like wrapper around one SQL text.
///
/// The remote client has no statement handles; every call submits the text
/// again together with its values.
pub struct PreparedStatement {
    sql: String,
    client: Arc<dyn RemoteClient>,
}

impl PreparedStatement {
    pub fn new(sql: impl Into<String>, client: Arc<dyn RemoteClient>) -> Self {
        Self {
            sql: sql.into(),
            client,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Execute and discard any rows.
    pub async fn run(&self, bindings: Vec<Binding>) -> Result<RunResult> {
        self.submit(bindings).await?;
        Ok(RunResult {
            changes: 1,
            last_insert_rowid: None,
        })
    }

    /// First row, if any.
    pub async fn get(&self, bindings: Vec<Binding>) -> Result<Option<Row>> {
        Ok(self.submit(bindings).await?.into_iter().next())
    }

    pub async fn all(&self, bindings: Vec<Binding>) -> Result<RowBatch> {
        self.submit(bindings).await
    }

    /// Fetch the batch and hand it out as a stream (see [`RowStream::from_rows`]).
    pub async fn stream(&self, bindings: Vec<Binding>, one: bool, object_mode: bool) -> Result<RowStream> {
        let rows = self.submit(bindings).await?;
        if rows.is_empty() {
            debug!("Streaming empty result");
        }
        Ok(RowStream::from_rows(rows, one, object_mode))
    }

    async fn submit(&self, bindings: Vec<Binding>) -> Result<RowBatch> {
        let values = normalize_all(bindings).await.map_err(|e| self.fail(e))?;
        debug!("Executing SQL with {} values: {}", values.len(), self.sql);
        self.client
            .sql(&self.sql, &values)
            .await
            .map_err(|e| self.fail(e))
    }

    fn fail(&self, err: ServiceError) -> ServiceError {
        error!("SQL execution failed: {}", err);
        err.with_query(self.sql.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SqlValue;
    use crate::services::remote::InMemoryClient;
    use futures::stream::{self, StreamExt};
    use serde_json::json;

    fn statement(client: &Arc<InMemoryClient>, sql: &str) -> PreparedStatement {
        PreparedStatement::new(sql, client.clone() as Arc<dyn RemoteClient>)
    }

    #[tokio::test]
    async fn test_run_reports_one_change() {
        let client = Arc::new(InMemoryClient::new());
        let result = statement(&client, "DELETE FROM Books")
            .run(Vec::new())
            .await
            .unwrap();
        assert_eq!(
            result,
            RunResult {
                changes: 1,
                last_insert_rowid: None
            }
        );
    }

    #[tokio::test]
    async fn test_run_normalizes_bindings() {
        let client = Arc::new(InMemoryClient::new());
        let body = stream::iter(vec![Ok(b"{\"a\":".to_vec()), Ok(b"1}".to_vec())]).boxed();
        let bindings = vec![
            Binding::Scalar(SqlValue::Integer(1)),
            Binding::Blob(vec![0xde, 0xad]),
            Binding::TextStream(body),
        ];

        statement(&client, "INSERT INTO T VALUES (?,?,?)")
            .run(bindings)
            .await
            .unwrap();

        let recorded = client.last_query().unwrap();
        assert_eq!(
            recorded.values,
            vec![
                SqlValue::Integer(1),
                SqlValue::Text("3q0=".to_string()),
                SqlValue::Text("{\"a\":1}".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_get_and_all() {
        let client = Arc::new(
            InMemoryClient::new()
                .with_rows(vec![json!({"ID": 1}), json!({"ID": 2})])
                .with_rows(vec![json!({"ID": 1}), json!({"ID": 2})]),
        );
        let stmt = statement(&client, "SELECT ID FROM Books");

        let first = stmt.get(Vec::new()).await.unwrap().unwrap();
        assert_eq!(first["ID"], 1);

        let rows = stmt.all(Vec::new()).await.unwrap();
        assert_eq!(rows.len(), 2);

        assert!(stmt.get(Vec::new()).await.unwrap().is_none());
        assert_eq!(client.recorded_queries().len(), 3);
    }

    #[tokio::test]
    async fn test_failure_carries_sql() {
        let client = Arc::new(InMemoryClient::new().with_error("no such table: Nope"));
        let err = statement(&client, "SELECT * FROM Nope")
            .all(Vec::new())
            .await
            .unwrap_err();

        assert_eq!(err.query(), Some("SELECT * FROM Nope"));
        assert!(matches!(err.root(), ServiceError::Remote(_)));
        assert_eq!(
            err.to_string(),
            "Remote error: no such table: Nope in:\nSELECT * FROM Nope"
        );
    }

    #[tokio::test]
    async fn test_stream_uses_batch() {
        let client = Arc::new(InMemoryClient::new().with_rows(vec![json!({"_json_": "{\"ID\":1}"})]));
        let stream = statement(&client, "SELECT 1").stream(Vec::new(), false, false).await.unwrap();
        assert_eq!(stream.into_json().await.unwrap(), "[{\"ID\":1}]");
    }
}
