//! Store endpoint settings
//!
//! Raw values coming from TOML or the environment are resolved into an
//! [`Endpoint`] with forgiving defaults: anything blank or unparsable falls
//! back to the documented default and is reported with a warning.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::time::Duration;

use crate::duration_millis;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_DATABASE: u32 = 0;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;

/// Resolved address and credentials of the store
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub database: u32,
    pub connect_timeout_ms: u64,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .finish()
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOST.to_string(), DEFAULT_PORT)
    }
}

impl Endpoint {
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            password: None,
            database: DEFAULT_DATABASE,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: u32) -> Self {
        self.database = database;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = duration_millis(timeout);
        self
    }

    /// Resolve an endpoint from raw, possibly missing or malformed values.
    ///
    /// Blank host means `127.0.0.1`. Blank, unparsable, zero or out-of-range
    /// ports mean `6379`. Blank or unparsable database indexes mean `0`. A
    /// blank password disables authentication.
    pub fn from_raw(
        host: Option<&str>,
        port: Option<&str>,
        password: Option<&str>,
        database: Option<&str>,
    ) -> Self {
        let host = match non_blank(host) {
            Some(host) => host.to_string(),
            None => DEFAULT_HOST.to_string(),
        };

        let port = match non_blank(port) {
            None => DEFAULT_PORT,
            Some(raw) => match raw.parse::<u16>() {
                Ok(port) if port > 0 => port,
                _ => {
                    tracing::warn!(
                        value = raw,
                        default = DEFAULT_PORT,
                        "invalid redis port, falling back to default"
                    );
                    DEFAULT_PORT
                }
            },
        };

        let database = match non_blank(database) {
            None => DEFAULT_DATABASE,
            Some(raw) => raw.parse::<u32>().unwrap_or_else(|_| {
                tracing::warn!(
                    value = raw,
                    default = DEFAULT_DATABASE,
                    "invalid redis database index, falling back to default"
                );
                DEFAULT_DATABASE
            }),
        };

        Self {
            host,
            port,
            password: non_blank(password).map(str::to_string),
            database,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// `host:port/db`, without credentials
    pub fn address(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A scalar that TOML may spell either as a number or as a string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawScalar {
    Int(i64),
    Text(String),
}

impl RawScalar {
    pub fn as_text(&self) -> String {
        match self {
            RawScalar::Int(i) => i.to_string(),
            RawScalar::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for RawScalar {
    fn from(value: &str) -> Self {
        RawScalar::Text(value.to_string())
    }
}

/// Redis settings as written in configuration, before defaults are applied
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub host: Option<String>,
    pub port: Option<RawScalar>,
    pub password: Option<String>,
    pub database: Option<RawScalar>,
    pub connect_timeout_ms: Option<u64>,
}

impl RedisSettings {
    /// Override settings with `REDIS_HOST`, `REDIS_PORT`, `REDIS_PASSWORD`
    /// and `REDIS_DATABASE` when they are set.
    pub fn apply_env(&mut self) {
        if let Ok(host) = env::var("REDIS_HOST") {
            self.host = Some(host);
        }
        if let Ok(port) = env::var("REDIS_PORT") {
            self.port = Some(RawScalar::Text(port));
        }
        if let Ok(password) = env::var("REDIS_PASSWORD") {
            self.password = Some(password);
        }
        if let Ok(database) = env::var("REDIS_DATABASE") {
            self.database = Some(RawScalar::Text(database));
        }
    }

    /// Resolve into an [`Endpoint`], applying defaults
    pub fn endpoint(&self) -> Endpoint {
        let port = self.port.as_ref().map(RawScalar::as_text);
        let database = self.database.as_ref().map(RawScalar::as_text);

        let mut endpoint = Endpoint::from_raw(
            self.host.as_deref(),
            port.as_deref(),
            self.password.as_deref(),
            database.as_deref(),
        );
        if let Some(timeout_ms) = self.connect_timeout_ms {
            endpoint.connect_timeout_ms = timeout_ms;
        }
        endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_huge_connect_timeout_saturates() {
        let endpoint = Endpoint::default().with_connect_timeout(Duration::MAX);
        assert_eq!(endpoint.connect_timeout_ms, u64::MAX);
    }

    #[test]
    fn test_defaults_when_unset() {
        let endpoint = Endpoint::from_raw(None, None, None, None);
        assert_eq!(endpoint.host, "127.0.0.1");
        assert_eq!(endpoint.port, 6379);
        assert_eq!(endpoint.password, None);
        assert_eq!(endpoint.database, 0);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let endpoint = Endpoint::from_raw(Some("cache.local"), Some(""), None, Some("abc"));
        assert_eq!(endpoint.host, "cache.local");
        assert_eq!(endpoint.port, 6379);
        assert_eq!(endpoint.database, 0);

        assert_eq!(Endpoint::from_raw(None, Some("70000"), None, None).port, 6379);
        assert_eq!(Endpoint::from_raw(None, Some("0"), None, None).port, 6379);
        assert_eq!(Endpoint::from_raw(None, Some("port"), None, None).port, 6379);
        assert_eq!(Endpoint::from_raw(None, None, None, Some("-1")).database, 0);
        assert_eq!(Endpoint::from_raw(None, None, None, Some("  ")).database, 0);
    }

    #[test]
    fn test_valid_values_are_kept() {
        let endpoint = Endpoint::from_raw(Some("10.0.0.7"), Some("6380"), Some("s3cret"), Some("4"));
        assert_eq!(endpoint.host, "10.0.0.7");
        assert_eq!(endpoint.port, 6380);
        assert_eq!(endpoint.password.as_deref(), Some("s3cret"));
        assert_eq!(endpoint.database, 4);
        assert_eq!(endpoint.address(), "10.0.0.7:6380/4");
    }

    #[test]
    fn test_blank_password_disables_auth() {
        let endpoint = Endpoint::from_raw(None, None, Some(""), None);
        assert_eq!(endpoint.password, None);
    }

    #[test]
    fn test_debug_redacts_password() {
        let endpoint = Endpoint::default().with_password("hunter2");
        let printed = format!("{:?}", endpoint);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("***"));
    }

    #[test]
    fn test_settings_accept_numbers_and_strings() {
        let settings = RedisSettings {
            port: Some(RawScalar::Int(6390)),
            database: Some(RawScalar::from("2")),
            connect_timeout_ms: Some(500),
            ..Default::default()
        };
        let endpoint = settings.endpoint();
        assert_eq!(endpoint.port, 6390);
        assert_eq!(endpoint.database, 2);
        assert_eq!(endpoint.connect_timeout(), Duration::from_millis(500));
    }
}
