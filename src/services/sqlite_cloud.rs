// SQLite Cloud database service
//
// Ties the pieces together: a pool per tenant, the dialect generator and
// session variables. A `DbSession` owns one pooled connection between
// `begin` and `release`.

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Result, ServiceError};
use crate::models::{Binding, Query, RemoteConnection, SessionContext};
use crate::services::connection_pool::{PooledConnection, TenantPoolManager};
use crate::services::dialect::{GeneratedSql, ReservedWords, SqlGenerator};
use crate::services::plain_sql;
use crate::services::remote::{Connector, RowBatch};
use crate::services::result_stream::{decode_row, RowStream};
use crate::services::session_context::{SessionAliases, SessionContextManager};
use crate::services::statement::PreparedStatement;

pub struct SqliteCloudService {
    pools: TenantPoolManager,
    generator: SqlGenerator,
    sessions: SessionContextManager,
}

impl SqliteCloudService {
    pub fn new(config: &Config, connector: Arc<dyn Connector>) -> Result<Self> {
        let aliases = match &config.session.aliases_path {
            Some(path) => SessionAliases::from_file(path)?,
            None => SessionAliases::default(),
        };

        info!(
            "Initializing SQLite Cloud service (pool max_size: {}, session aliases: {})",
            config.pool.max_size,
            aliases.len()
        );

        Ok(Self {
            pools: TenantPoolManager::new(config.credentials.clone(), config.pool.clone(), connector),
            generator: SqlGenerator::new(Arc::new(ReservedWords::sqlite()), config.features),
            sessions: SessionContextManager::new(aliases),
        })
    }

    pub fn generator(&self) -> &SqlGenerator {
        &self.generator
    }

    pub fn pools(&self) -> &TenantPoolManager {
        &self.pools
    }

    /// Acquire a connection for `tenant` and start a session on it.
    pub async fn begin(&self, tenant: Option<&str>) -> Result<DbSession<'_>> {
        let connection = self.pools.acquire(tenant).await?;
        debug!("Began session on connection {} for tenant {:?}", connection.id, tenant);
        Ok(DbSession {
            service: self,
            connection: Some(connection),
        })
    }

    /// Run a pragma on a connection of its own, released afterwards.
    pub async fn pragma(&self, tenant: Option<&str>, name: &str, value: Option<&str>) -> Result<RowBatch> {
        let mut session = self.begin(tenant).await?;
        let result = session.pragma(name, value).await;
        session.release();
        result
    }

    pub async fn shutdown(&self) {
        self.pools.close_all().await;
    }
}

/// One pooled connection plus its session context.
///
/// Dropping the session releases the connection like [`DbSession::release`].
pub struct DbSession<'a> {
    service: &'a SqliteCloudService,
    connection: Option<PooledConnection>,
}

impl std::fmt::Debug for DbSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbSession")
            .field("active", &self.connection.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> DbSession<'a> {
    fn connection(&self) -> Result<&RemoteConnection> {
        self.connection
            .as_deref()
            .ok_or_else(|| ServiceError::Session("No database connection".to_string()))
    }

    pub fn is_active(&self) -> bool {
        self.connection.is_some()
    }

    /// Variables currently set on the connection.
    pub fn session_context(&self) -> Option<&SessionContext> {
        self.connection.as_deref().and_then(|c| c.session.as_ref())
    }

    /// Merge request variables into the connection's session context.
    pub fn set(&mut self, variables: Map<String, Value>) -> Result<()> {
        self.service.sessions.set(self.connection.as_deref_mut(), variables)
    }

    /// Clear the session context and give the connection back to the pool.
    pub fn release(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            self.service.sessions.clear(&mut connection);
            debug!("Released connection {}", connection.id);
        }
    }

    /// Close the connection instead of returning it to the pool.
    pub async fn destroy(&mut self) -> Result<()> {
        match self.connection.take() {
            Some(connection) => {
                // Detach from the pool so the slot is freed for a new connection
                let mut connection = PooledConnection::take(connection);
                debug!("Destroying connection {}", connection.id);
                connection.close().await
            }
            None => Ok(()),
        }
    }

    pub fn prepare(&self, sql: impl Into<String>) -> Result<PreparedStatement> {
        let client = self.connection()?.client()?;
        Ok(PreparedStatement::new(sql, client))
    }

    /// Generate SQL for `query` with this session's variables.
    pub fn generate(&self, query: &Query) -> Result<GeneratedSql> {
        self.service.generator.generate(query, self.session_context())
    }

    /// `PRAGMA name` or `PRAGMA name = value`, sent as plain SQL.
    pub async fn pragma(&self, name: &str, value: Option<&str>) -> Result<RowBatch> {
        let sql = match value {
            Some(value) => format!("PRAGMA {} = {}", name, value),
            None => format!("PRAGMA {}", name),
        };
        self.prepare(sql)?.all(Vec::new()).await
    }

    pub async fn exec(&self, sql: &str) -> Result<RowBatch> {
        self.prepare(sql)?.all(Vec::new()).await
    }

    /// Run a write or DDL query; returns the reported change count.
    pub async fn on_simple(&self, query: &Query) -> Result<u64> {
        let GeneratedSql { sql, values } = self.generate(query)?;
        let result = self.prepare(sql)?.run(Binding::scalars(values)).await?;
        Ok(result.changes)
    }

    /// Run a query and decode the rows. A single-row SELECT gives the row
    /// (or `null`), anything else an array.
    pub async fn read(&self, query: &Query) -> Result<Value> {
        let GeneratedSql { sql, values } = self.generate(query)?;
        let rows = self.prepare(sql)?.all(Binding::scalars(values)).await?;

        if matches!(query, Query::Select(select) if select.one) {
            return match rows.into_iter().next() {
                Some(row) => decode_row(row),
                None => Ok(Value::Null),
            };
        }

        rows.into_iter()
            .map(decode_row)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array)
    }

    /// Run a query and stream the result.
    pub async fn stream(&self, query: &Query, object_mode: bool) -> Result<RowStream> {
        let one = matches!(query, Query::Select(select) if select.one);
        let GeneratedSql { sql, values } = self.generate(query)?;
        self.prepare(sql)?
            .stream(Binding::scalars(values), one, object_mode)
            .await
    }

    /// Run caller-supplied SQL after dialect rewrites.
    pub async fn on_plain_sql(&self, sql: &str, bindings: Vec<Binding>) -> Result<RowBatch> {
        let sql = plain_sql::preprocess(sql);
        self.prepare(sql.into_owned())?.all(bindings).await
    }
}

impl Drop for DbSession<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Credentials, FeatureFlags, LoggingConfig, PoolConfig, RemoteConfig, SessionConfig};
    use crate::services::remote::{InMemoryClient, InMemoryConnector};
    use serde_json::json;

    fn config() -> Config {
        Config {
            credentials: Credentials {
                connection_string: Some("sqlitecloud://host.sqlite.cloud:8860/main.sqlite".to_string()),
                ..Credentials::default()
            },
            pool: PoolConfig {
                max_size: 1,
                ..PoolConfig::default()
            },
            features: FeatureFlags::default(),
            session: SessionConfig::default(),
            remote: RemoteConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                style: "auto".to_string(),
            },
        }
    }

    fn service(client: &Arc<InMemoryClient>) -> SqliteCloudService {
        let connector = Arc::new(InMemoryConnector::new(client.clone()));
        SqliteCloudService::new(&config(), connector).unwrap()
    }

    #[tokio::test]
    async fn test_pragma_opens_its_own_session() {
        let client = Arc::new(InMemoryClient::new().with_rows(vec![json!({"foreign_keys": 1})]));
        let service = service(&client);

        let rows = service.pragma(Some("t1"), "foreign_keys", None).await.unwrap();
        assert_eq!(rows[0]["foreign_keys"], 1);

        service.pragma(Some("t1"), "foreign_keys", Some("ON")).await.unwrap();
        let queries = client.recorded_queries();
        assert_eq!(queries[0].sql, "PRAGMA foreign_keys");
        assert_eq!(queries[1].sql, "PRAGMA foreign_keys = ON");

        let status = service.pools().pool_status(Some("t1")).await.unwrap();
        assert_eq!(status.available, 1);
    }

    #[tokio::test]
    async fn test_release_clears_session_for_next_request() {
        let client = Arc::new(InMemoryClient::new());
        let service = service(&client);

        let mut session = service.begin(None).await.unwrap();
        session.set(json!({"$user.id": "alice"}).as_object().unwrap().clone()).unwrap();
        assert_eq!(session.session_context().unwrap()["APPLICATIONUSER"], "alice");
        session.release();
        assert!(!session.is_active());

        let mut next = service.begin(None).await.unwrap();
        assert!(next.session_context().is_none());
        next.set(Map::new()).unwrap();
        assert!(next.session_context().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_released_session_rejects_work() {
        let client = Arc::new(InMemoryClient::new());
        let service = service(&client);

        let mut session = service.begin(None).await.unwrap();
        session.release();

        assert!(matches!(session.set(Map::new()), Err(ServiceError::Session(_))));
        assert!(matches!(session.exec("SELECT 1").await, Err(ServiceError::Session(_))));
    }

    #[tokio::test]
    async fn test_destroy_closes_connection() {
        let client = Arc::new(InMemoryClient::new());
        let service = service(&client);

        let mut session = service.begin(Some("t1")).await.unwrap();
        session.destroy().await.unwrap();
        assert!(client.is_closed());
        assert_eq!(service.pools().pool_status(Some("t1")).await.unwrap().size, 0);
    }

    #[tokio::test]
    async fn test_plain_sql_is_preprocessed() {
        let client = Arc::new(InMemoryClient::new());
        let service = service(&client);
        let session = service.begin(None).await.unwrap();

        session
            .on_plain_sql("CREATE VIEW V AS SELECT CURRENT_TIMESTAMP AS now", Vec::new())
            .await
            .unwrap();
        assert_eq!(
            client.last_query().unwrap().sql,
            format!("CREATE VIEW V AS SELECT {} AS now", plain_sql::ISO_NOW)
        );
    }
}
