use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::RecordError;

use super::ConnectionPool;

/// Seconds a connection may sit unused before it is replaced on the next checkout (7 hours).
pub const DEFAULT_MAX_IDLE_TIME: Duration = Duration::from_secs(7 * 3600);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_CACHED: u32 = 100;
/// Pool size used when `max_cached` is 0.
pub const UNCAPPED_MAX_SIZE: u32 = 1024;

/// Pool settings.
///
/// `database` is the SQLite file path. `host`, `user`, `password`, `time_zone` and `sql_mode` are
/// kept for configuration compatibility with server backends and have no effect on an embedded
/// store. `charset` sets `PRAGMA encoding` for new database files.
#[derive(Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub host: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub min_cached: u32,
    /// 0 means no explicit cap.
    pub max_cached: u32,
    #[serde(deserialize_with = "seconds")]
    pub max_idle_time: Duration,
    #[serde(deserialize_with = "seconds")]
    pub connect_timeout: Duration,
    pub time_zone: String,
    pub charset: String,
    pub sql_mode: String,
    /// Statements run, in order, on every new physical connection. Failures are logged and
    /// ignored.
    pub pre_execute: Vec<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            min_cached: 0,
            max_cached: DEFAULT_MAX_CACHED,
            max_idle_time: DEFAULT_MAX_IDLE_TIME,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            time_zone: "SYSTEM".to_string(),
            charset: "utf8".to_string(),
            sql_mode: "TRADITIONAL".to_string(),
            pre_execute: Vec::new(),
        }
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("min_cached", &self.min_cached)
            .field("max_cached", &self.max_cached)
            .field("max_idle_time", &self.max_idle_time)
            .field("connect_timeout", &self.connect_timeout)
            .field("time_zone", &self.time_zone)
            .field("charset", &self.charset)
            .field("sql_mode", &self.sql_mode)
            .field("pre_execute", &self.pre_execute)
            .finish()
    }
}

fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

impl PoolConfig {
    #[must_use]
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON object; missing fields take their defaults.
    ///
    /// # Errors
    /// `ConfigError` when the JSON is malformed or the result fails [`PoolConfig::validate`].
    pub fn from_json(json: &str) -> Result<Self, RecordError> {
        let config: PoolConfig = serde_json::from_str(json)
            .map_err(|e| RecordError::ConfigError(format!("invalid pool config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// `ConfigError` for an empty database path, zero timeouts, `min_cached > max_cached`, or an
    /// unsupported charset.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.database.trim().is_empty() {
            return Err(RecordError::ConfigError("database path is empty".into()));
        }
        if self.max_idle_time.is_zero() {
            return Err(RecordError::ConfigError(
                "max_idle_time must be positive".into(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(RecordError::ConfigError(
                "connect_timeout must be positive".into(),
            ));
        }
        if self.min_cached > self.max_size() {
            return Err(RecordError::ConfigError(format!(
                "min_cached ({}) exceeds max_cached ({})",
                self.min_cached, self.max_cached
            )));
        }
        self.encoding()?;
        Ok(())
    }

    /// Effective upper bound on open connections.
    #[must_use]
    pub fn max_size(&self) -> u32 {
        if self.max_cached == 0 {
            UNCAPPED_MAX_SIZE
        } else {
            self.max_cached
        }
    }

    /// SQLite encoding name for `charset`.
    pub(crate) fn encoding(&self) -> Result<&'static str, RecordError> {
        match self.charset.to_ascii_lowercase().replace('-', "").as_str() {
            "utf8" | "utf8mb4" => Ok("UTF-8"),
            "utf16" => Ok("UTF-16"),
            "utf16le" => Ok("UTF-16le"),
            "utf16be" => Ok("UTF-16be"),
            other => Err(RecordError::ConfigError(format!(
                "unsupported charset `{other}`"
            ))),
        }
    }
}

/// Fluent builder for [`PoolConfig`].
#[derive(Debug, Clone)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    #[must_use]
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            config: PoolConfig::new(database),
        }
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.config.user = user.into();
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    #[must_use]
    pub fn min_cached(mut self, min_cached: u32) -> Self {
        self.config.min_cached = min_cached;
        self
    }

    #[must_use]
    pub fn max_cached(mut self, max_cached: u32) -> Self {
        self.config.max_cached = max_cached;
        self
    }

    #[must_use]
    pub fn max_idle_time(mut self, max_idle_time: Duration) -> Self {
        self.config.max_idle_time = max_idle_time;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.config.connect_timeout = connect_timeout;
        self
    }

    #[must_use]
    pub fn time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.config.time_zone = time_zone.into();
        self
    }

    #[must_use]
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.config.charset = charset.into();
        self
    }

    #[must_use]
    pub fn sql_mode(mut self, sql_mode: impl Into<String>) -> Self {
        self.config.sql_mode = sql_mode.into();
        self
    }

    /// Append a statement to run on every new connection.
    #[must_use]
    pub fn pre_execute(mut self, statement: impl Into<String>) -> Self {
        self.config.pre_execute.push(statement.into());
        self
    }

    #[must_use]
    pub fn finish(self) -> PoolConfig {
        self.config
    }

    /// Build a pool. No connection is opened until the first acquisition.
    ///
    /// # Errors
    /// `ConfigError` when the settings do not validate.
    pub fn build(self) -> Result<ConnectionPool, RecordError> {
        ConnectionPool::new(self.finish())
    }
}
