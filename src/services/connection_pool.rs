use deadpool::managed::{self, Metrics, Object, RecycleError, RecycleResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::{Credentials, PoolConfig};
use crate::error::{Result, ServiceError};
use crate::models::RemoteConnection;
use crate::services::remote::Connector;

pub type ConnectionPool = managed::Pool<ConnectionFactory>;
pub type PooledConnection = Object<ConnectionFactory>;

/// Last path segment of a connection string, before an optional query.
static TENANT_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/([^/]+)(\?|$)").unwrap());

/// Resolve the connection string for `tenant`.
///
/// A direct connection string wins over a database URL; the tenant replaces
/// the last path segment of whichever is used.
pub fn url_for_tenant(credentials: &Credentials, tenant: Option<&str>) -> Result<String> {
    let base = credentials
        .connection_string
        .as_deref()
        .or(credentials.database.as_deref())
        .or(credentials.url.as_deref())
        .ok_or_else(|| {
            ServiceError::Configuration(
                "SQLite Cloud requires a connection string or database URL in credentials".to_string(),
            )
        })?;

    Ok(match tenant {
        Some(tenant) => TENANT_SEGMENT
            .replace(base, |caps: &regex::Captures| format!("/{}{}", tenant, &caps[2]))
            .into_owned(),
        None => base.to_string(),
    })
}

/// Mask credentials in a connection string for safe logging
pub fn mask_credentials(url: &str) -> String {
    let Ok(parsed) = url::Url::parse(url) else {
        return "[invalid-url]".to_string();
    };

    let mut masked = parsed.clone();
    if parsed.password().is_some() {
        let _ = masked.set_password(Some("***"));
    }
    if parsed.query_pairs().any(|(k, _)| k.eq_ignore_ascii_case("apikey")) {
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| {
                let v = if k.eq_ignore_ascii_case("apikey") { "***".to_string() } else { v.into_owned() };
                (k.into_owned(), v)
            })
            .collect();
        masked.query_pairs_mut().clear().extend_pairs(pairs);
    }
    masked.to_string()
}

/// Opens connections for one tenant. Plugged into a `deadpool` pool.
pub struct ConnectionFactory {
    tenant: Option<String>,
    credentials: Credentials,
    connector: Arc<dyn Connector>,
}

impl std::fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("tenant", &self.tenant)
            .finish_non_exhaustive()
    }
}

impl ConnectionFactory {
    pub fn new(tenant: Option<String>, credentials: Credentials, connector: Arc<dyn Connector>) -> Self {
        Self {
            tenant,
            credentials,
            connector,
        }
    }

    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    pub fn connection_string(&self) -> Result<String> {
        url_for_tenant(&self.credentials, self.tenant.as_deref())
    }

    /// Open a new connection with an empty session context.
    pub async fn open(&self) -> Result<RemoteConnection> {
        let connection_string = self.connection_string()?;
        tracing::debug!("Opening connection to {}", mask_credentials(&connection_string));
        let client = self.connector.connect(&connection_string).await?;
        Ok(RemoteConnection::new(self.tenant.clone(), client))
    }

    /// Close the remote session.
    pub async fn destroy(&self, mut connection: RemoteConnection) -> Result<()> {
        tracing::debug!("Destroying connection {}", connection.id);
        connection.close().await
    }

    /// Only checks that the handle is still there; no round trip is made.
    pub fn validate(&self, connection: &RemoteConnection) -> bool {
        connection.is_open()
    }
}

impl managed::Manager for ConnectionFactory {
    type Type = RemoteConnection;
    type Error = ServiceError;

    async fn create(&self) -> Result<RemoteConnection> {
        self.open().await
    }

    async fn recycle(&self, connection: &mut RemoteConnection, _: &Metrics) -> RecycleResult<ServiceError> {
        if self.validate(connection) {
            Ok(())
        } else {
            tracing::warn!("Discarding closed connection {}", connection.id);
            Err(RecycleError::Message("connection is closed".into()))
        }
    }
}

/// Connection pool manager that keeps one pool per tenant
pub struct TenantPoolManager {
    pools: Arc<RwLock<HashMap<String, ConnectionPool>>>,
    credentials: Credentials,
    config: PoolConfig,
    connector: Arc<dyn Connector>,
}

impl TenantPoolManager {
    pub fn new(credentials: Credentials, config: PoolConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            pools: Arc::new(RwLock::new(HashMap::new())),
            credentials,
            config,
            connector,
        }
    }

    fn key(tenant: Option<&str>) -> String {
        tenant.unwrap_or_default().to_string()
    }

    /// Get or create the pool for `tenant`.
    /// This method is safe to call concurrently from multiple tasks
    pub async fn get_or_create_pool(&self, tenant: Option<&str>) -> Result<ConnectionPool> {
        let key = Self::key(tenant);

        // Fast path: check if pool already exists (read lock)
        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(&key) {
                return Ok(pool.clone());
            }
        }

        // Slow path: create new pool (write lock)
        let mut pools = self.pools.write().await;

        // Double-check in case another task created the pool while we were waiting
        if let Some(pool) = pools.get(&key) {
            tracing::debug!("Pool created by another task for tenant {:?}", tenant);
            return Ok(pool.clone());
        }

        let factory = ConnectionFactory::new(
            tenant.map(str::to_string),
            self.credentials.clone(),
            Arc::clone(&self.connector),
        );
        let connection_string = factory.connection_string()?;

        tracing::info!(
            "Creating new connection pool for: {} (max_size: {})",
            mask_credentials(&connection_string),
            self.config.max_size
        );

        let pool = ConnectionPool::builder(factory)
            .max_size(self.config.max_size)
            .wait_timeout(self.config.wait_timeout())
            .create_timeout(self.config.create_timeout())
            .recycle_timeout(self.config.recycle_timeout())
            .runtime(deadpool::Runtime::Tokio1)
            .build()
            .map_err(|e| {
                tracing::error!("Failed to create connection pool: {}", e);
                ServiceError::Pool(format!("Failed to create connection pool: {}", e))
            })?;

        pools.insert(key, pool.clone());
        Ok(pool)
    }

    /// Acquire a connection for `tenant`.
    pub async fn acquire(&self, tenant: Option<&str>) -> Result<PooledConnection> {
        let pool = self.get_or_create_pool(tenant).await?;
        let mut connection = pool.get().await?;
        connection.mark_used();
        Ok(connection)
    }

    /// Remove and close the pool of `tenant`
    pub async fn remove_pool(&self, tenant: Option<&str>) -> bool {
        let mut pools = self.pools.write().await;
        match pools.remove(&Self::key(tenant)) {
            Some(pool) => {
                pool.close();
                tracing::info!("Removed connection pool for tenant {:?}", tenant);
                true
            }
            None => false,
        }
    }

    /// Get the number of active pools
    pub async fn pool_count(&self) -> usize {
        self.pools.read().await.len()
    }

    pub async fn pool_status(&self, tenant: Option<&str>) -> Option<PoolStatus> {
        let pools = self.pools.read().await;
        pools.get(&Self::key(tenant)).map(|pool| {
            let status = pool.status();
            PoolStatus {
                size: status.size,
                available: status.available,
                max_size: status.max_size,
            }
        })
    }

    /// Close every pool. Idle connections are dropped with their pool.
    pub async fn close_all(&self) {
        let mut pools = self.pools.write().await;
        for (_, pool) in pools.drain() {
            pool.close();
        }
        tracing::info!("Closed all connection pools");
    }
}

/// Connection pool status information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStatus {
    pub size: usize,
    pub available: usize,
    pub max_size: usize,
}
