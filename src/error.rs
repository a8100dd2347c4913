use thiserror::Error;

/// Service error types
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Value does not contain a valid {expected} \"{value}\"")]
    ValueParse { value: String, expected: &'static str },

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Pool error: {0}")]
    Pool(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Stream error: {0}")]
    Stream(String),

    /// A submission failure with the offending SQL attached.
    #[error("{source} in:\n{sql}")]
    Query {
        sql: String,
        source: Box<ServiceError>,
    },
}

impl ServiceError {
    /// Attach the SQL text that was being executed when `self` occurred.
    pub fn with_query(self, sql: impl Into<String>) -> Self {
        ServiceError::Query {
            sql: sql.into(),
            source: Box::new(self),
        }
    }

    /// The SQL text attached to this error, if any.
    pub fn query(&self) -> Option<&str> {
        match self {
            ServiceError::Query { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// The error with any attached SQL stripped off.
    pub fn root(&self) -> &ServiceError {
        match self {
            ServiceError::Query { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Stream(err.to_string())
    }
}

impl From<config::ConfigError> for ServiceError {
    fn from(err: config::ConfigError) -> Self {
        ServiceError::Configuration(err.to_string())
    }
}

impl From<deadpool::managed::PoolError<ServiceError>> for ServiceError {
    fn from(err: deadpool::managed::PoolError<ServiceError>) -> Self {
        match err {
            deadpool::managed::PoolError::Backend(inner) => inner,
            other => ServiceError::Pool(other.to_string()),
        }
    }
}

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, ServiceError>;
