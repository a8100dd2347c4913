use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Result, ServiceError};
use crate::services::remote::RemoteClient;

/// Request-scoped variables attached to a connection, e.g. `$user.id`.
pub type SessionContext = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Closed,
}

/// A remote database session owned by exactly one tenant.
pub struct RemoteConnection {
    pub id: String,
    pub tenant: Option<String>,
    pub status: ConnectionStatus,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    /// Cleared on every release back to the pool.
    pub session: Option<SessionContext>,
    client: Option<Arc<dyn RemoteClient>>,
}

impl fmt::Debug for RemoteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConnection")
            .field("id", &self.id)
            .field("tenant", &self.tenant)
            .field("status", &self.status)
            .field("created_at", &self.created_at)
            .field("session", &self.session)
            .finish()
    }
}

impl RemoteConnection {
    pub fn new(tenant: Option<String>, client: Arc<dyn RemoteClient>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant,
            status: ConnectionStatus::Connected,
            created_at: Utc::now(),
            last_used_at: None,
            session: Some(SessionContext::new()),
            client: Some(client),
        }
    }

    /// The client handle, or a connection error once the connection is closed.
    pub fn client(&self) -> Result<Arc<dyn RemoteClient>> {
        self.client
            .clone()
            .ok_or_else(|| ServiceError::Connection(format!("Connection {} is closed", self.id)))
    }

    pub fn is_open(&self) -> bool {
        self.client.is_some()
    }

    pub fn mark_used(&mut self) {
        self.last_used_at = Some(Utc::now());
    }

    /// Close the remote session and drop the handle.
    pub async fn close(&mut self) -> Result<()> {
        self.status = ConnectionStatus::Closed;
        self.session = None;
        match self.client.take() {
            Some(client) => client.close().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::remote::InMemoryClient;

    #[tokio::test]
    async fn test_close_drops_client() {
        let client = Arc::new(InMemoryClient::new());
        let mut connection = RemoteConnection::new(Some("t1".to_string()), client.clone());
        assert!(connection.is_open());
        assert!(connection.client().is_ok());

        connection.close().await.unwrap();
        assert!(!connection.is_open());
        assert_eq!(connection.status, ConnectionStatus::Closed);
        assert!(client.is_closed());
        assert!(matches!(connection.client(), Err(ServiceError::Connection(_))));

        // Closing twice is harmless
        connection.close().await.unwrap();
    }
}
