use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{Result, ServiceError};
use crate::models::SqlValue;
use crate::services::remote::adapter::{Connector, RemoteClient, RowBatch};

/// A recorded submission for verification.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// An in-memory remote client.
///
/// Returns scripted row batches in FIFO order and records every submission.
///
/// # Example
/// ```
/// use serde_json::json;
/// use sqlitecloud_service::services::remote::InMemoryClient;
///
/// let client = InMemoryClient::new()
///     .with_rows(vec![json!({"ID": 1, "title": "Wuthering Heights"})]);
/// ```
pub struct InMemoryClient {
    responses: Mutex<VecDeque<Result<RowBatch>>>,
    recorded: Mutex<Vec<RecordedQuery>>,
    closed: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            recorded: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Queue a row batch built from JSON objects; non-objects are skipped.
    pub fn with_rows(self, rows: Vec<serde_json::Value>) -> Self {
        let batch = rows
            .into_iter()
            .filter_map(|row| match row {
                serde_json::Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        self.push_response(Ok(batch));
        self
    }

    /// Queue a failure for the next submission.
    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.push_response(Err(ServiceError::Remote(message.into())));
        self
    }

    pub fn push_response(&self, response: Result<RowBatch>) {
        lock(&self.responses).push_back(response);
    }

    /// Every submission seen so far.
    pub fn recorded_queries(&self) -> Vec<RecordedQuery> {
        lock(&self.recorded).clone()
    }

    pub fn last_query(&self) -> Option<RecordedQuery> {
        lock(&self.recorded).last().cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteClient for InMemoryClient {
    async fn sql(&self, sql: &str, values: &[SqlValue]) -> Result<RowBatch> {
        if self.is_closed() {
            return Err(ServiceError::Connection("Client is closed".to_string()));
        }

        lock(&self.recorded).push(RecordedQuery {
            sql: sql.to_string(),
            values: values.to_vec(),
        });

        // Fall back to an empty batch when nothing is queued
        lock(&self.responses).pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out one shared [`InMemoryClient`].
pub struct InMemoryConnector {
    client: Arc<InMemoryClient>,
    connection_strings: Mutex<Vec<String>>,
}

impl InMemoryConnector {
    pub fn new(client: Arc<InMemoryClient>) -> Self {
        Self {
            client,
            connection_strings: Mutex::new(Vec::new()),
        }
    }

    pub fn client(&self) -> Arc<InMemoryClient> {
        Arc::clone(&self.client)
    }

    /// Connection strings passed to `connect`, in order.
    pub fn connection_strings(&self) -> Vec<String> {
        lock(&self.connection_strings).clone()
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn connect(&self, connection_string: &str) -> Result<Arc<dyn RemoteClient>> {
        lock(&self.connection_strings).push(connection_string.to_string());
        Ok(Arc::clone(&self.client) as Arc<dyn RemoteClient>)
    }
}
