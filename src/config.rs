use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub features: FeatureFlags,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

/// Where the remote database lives. `connection_string` wins over
/// `database`, which wins over `url`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    pub connection_string: Option<String>,
    pub url: Option<String>,
    pub database: Option<String>,
}

/// Options forwarded to the connection pool builder.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub max_size: usize,
    pub wait_timeout_secs: Option<u64>,
    pub create_timeout_secs: Option<u64>,
    pub recycle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct FeatureFlags {
    /// Render 64-bit integers and decimals as text on read.
    pub ieee754compatible: bool,
    /// Mode 2 keeps booleans as plain integers on read.
    pub sql_simple_queries: u8,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    pub aliases_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub style: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: num_cpus::get() * 2,
            wait_timeout_secs: None,
            create_timeout_secs: None,
            recycle_timeout_secs: None,
        }
    }
}

impl PoolConfig {
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_secs.map(Duration::from_secs)
    }

    pub fn create_timeout(&self) -> Option<Duration> {
        self.create_timeout_secs.map(Duration::from_secs)
    }

    pub fn recycle_timeout(&self) -> Option<Duration> {
        self.recycle_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
        }
    }
}

impl FeatureFlags {
    /// Whether booleans are read back as `'true'`/`'false'`.
    pub fn boolean_strings(&self) -> bool {
        self.sql_simple_queries != 2
    }
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Try to load from .env file
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("pool.max_size", (num_cpus::get() * 2) as u64)?
            .set_default("features.ieee754compatible", false)?
            .set_default("features.sql_simple_queries", 0)?
            .set_default("remote.request_timeout_secs", 30)?
            .set_default("logging.level", "info")?
            .set_default("logging.style", "auto")?;

        if let Ok(connection_string) = env::var("SQLITECLOUD_CONNECTION_STRING") {
            builder = builder.set_override("credentials.connection_string", connection_string)?;
        }

        if let Ok(url) = env::var("SQLITECLOUD_URL") {
            builder = builder.set_override("credentials.url", url)?;
        }

        if let Ok(database) = env::var("SQLITECLOUD_DATABASE") {
            builder = builder.set_override("credentials.database", database)?;
        }

        if let Ok(max_size) = env::var("SQLITECLOUD_POOL_MAX_SIZE") {
            let max_size: u64 = parse_var("SQLITECLOUD_POOL_MAX_SIZE", &max_size)?;
            builder = builder.set_override("pool.max_size", max_size)?;
        }

        if let Ok(flag) = env::var("SQLITECLOUD_IEEE754_COMPATIBLE") {
            builder = builder.set_override("features.ieee754compatible", is_truthy(&flag))?;
        }

        if let Ok(mode) = env::var("SQLITECLOUD_SIMPLE_QUERIES") {
            let mode: u8 = parse_var("SQLITECLOUD_SIMPLE_QUERIES", &mode)?;
            builder = builder.set_override("features.sql_simple_queries", mode)?;
        }

        if let Ok(path) = env::var("SQLITECLOUD_SESSION_ALIASES") {
            builder = builder.set_override("session.aliases_path", path)?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        if let Ok(log_style) = env::var("RUST_LOG_STYLE") {
            builder = builder.set_override("logging.style", log_style)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Load from a TOML/JSON/YAML file, with environment variables prefixed
    /// `SQLITECLOUD__` layered on top (`SQLITECLOUD__POOL__MAX_SIZE=4`).
    pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .set_default("pool.max_size", (num_cpus::get() * 2) as u64)?
            .set_default("features.ieee754compatible", false)?
            .set_default("features.sql_simple_queries", 0)?
            .set_default("remote.request_timeout_secs", 30)?
            .set_default("logging.level", "info")?
            .set_default("logging.style", "auto")?
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("SQLITECLOUD").separator("__"))
            .build()?
            .try_deserialize()
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T, config::ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| config::ConfigError::Message(format!("Invalid {}: {}", name, e)))
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
