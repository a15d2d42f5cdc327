//! Connection configuration
//!
//! # Example
//! ```rust,ignore
//! use docmap_mongodb::ConnectConfig;
//!
//! // From environment
//! let config = ConnectConfig::from_env();
//!
//! // Or explicit configuration
//! let config = ConnectConfig {
//!     package_name: "billing".to_string(),
//!     environment: "test".to_string(),
//!     ..Default::default()
//! };
//! assert_eq!(config.resolve_uri(None), "mongodb://localhost/billing-test");
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::uri::env_uri;

/// Package name used when neither `APP_NAME` nor `CARGO_PKG_NAME` is set
pub const DEFAULT_PACKAGE_NAME: &str = "docmap";

/// Environment name used when neither `APP_ENV` nor `RUST_ENV` is set
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Host of the derived default connection string
pub const DEFAULT_URI_HOST: &str = "localhost";

/// Connection pool configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Minimum number of connections in the pool (default: 0)
    pub min_pool_size: Option<u32>,
    /// Maximum number of connections in the pool (default: 10)
    pub max_pool_size: Option<u32>,
    /// Maximum time a connection can remain idle before being closed (default: none)
    pub max_idle_time: Option<Duration>,
    /// Connection timeout (default: 10s)
    pub connect_timeout: Option<Duration>,
    /// Server selection timeout (default: 30s)
    pub server_selection_timeout: Option<Duration>,
    /// Application name for server logs
    pub app_name: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: None,
            max_pool_size: Some(10),
            max_idle_time: None,
            connect_timeout: Some(Duration::from_secs(10)),
            server_selection_timeout: Some(Duration::from_secs(30)),
            app_name: Some(DEFAULT_PACKAGE_NAME.to_string()),
        }
    }
}

/// Where connections go when no connection string is passed explicitly
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectConfig {
    /// Connection string from `MONGODB_URI` / `MONGODB_URL`
    pub uri: Option<String>,
    /// First half of the derived database name
    pub package_name: String,
    /// Second half of the derived database name
    pub environment: String,
    pub pool: PoolConfig,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            uri: None,
            package_name: DEFAULT_PACKAGE_NAME.to_string(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            pool: PoolConfig::default(),
        }
    }
}

impl ConnectConfig {
    /// Create configuration from process environment variables.
    ///
    /// - `MONGODB_URI`, then `MONGODB_URL` -> `uri`
    /// - `APP_NAME`, then `CARGO_PKG_NAME` -> `package_name`
    /// - `APP_ENV`, then `RUST_ENV` -> `environment`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ConnectConfig::from_env`] with the lookup injected
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let package_name = first_set(&lookup, &["APP_NAME", "CARGO_PKG_NAME"])
            .unwrap_or_else(|| DEFAULT_PACKAGE_NAME.to_string());
        let pool = PoolConfig {
            app_name: Some(package_name.clone()),
            ..PoolConfig::default()
        };

        Self {
            uri: env_uri(&lookup),
            environment: first_set(&lookup, &["APP_ENV", "RUST_ENV"])
                .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
            package_name,
            pool,
        }
    }

    /// `mongodb://localhost/{package_name}-{environment}`
    pub fn default_uri(&self) -> String {
        format!(
            "mongodb://{}/{}-{}",
            DEFAULT_URI_HOST, self.package_name, self.environment
        )
    }

    /// Explicit argument > configured environment URI > derived default
    pub fn resolve_uri(&self, explicit: Option<&str>) -> String {
        explicit
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
            .map(str::to_string)
            .or_else(|| self.uri.clone())
            .unwrap_or_else(|| self.default_uri())
    }
}

fn first_set<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_config() {
        let config = PoolConfig::default();
        assert_eq!(config.max_pool_size, Some(10));
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.app_name, Some("docmap".to_string()));
    }

    #[test]
    fn test_custom_pool_config() {
        let config = PoolConfig {
            min_pool_size: Some(5),
            max_pool_size: Some(50),
            max_idle_time: Some(Duration::from_secs(300)),
            ..Default::default()
        };
        assert_eq!(config.min_pool_size, Some(5));
        assert_eq!(config.max_pool_size, Some(50));
    }

    #[test]
    fn test_from_lookup_reads_variables() {
        let config = ConnectConfig::from_lookup(|key| match key {
            "MONGODB_URL" => Some("mongodb://db/app".to_string()),
            "APP_NAME" => Some("billing".to_string()),
            "CARGO_PKG_NAME" => Some("ignored".to_string()),
            "RUST_ENV" => Some("staging".to_string()),
            _ => None,
        });
        assert_eq!(config.uri.as_deref(), Some("mongodb://db/app"));
        assert_eq!(config.package_name, "billing");
        assert_eq!(config.environment, "staging");
        assert_eq!(config.pool.app_name.as_deref(), Some("billing"));
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = ConnectConfig::from_lookup(|_| None);
        assert_eq!(config, ConnectConfig::default());
        assert_eq!(config.default_uri(), "mongodb://localhost/docmap-development");
    }

    #[test]
    fn test_resolve_uri_precedence() {
        let mut config = ConnectConfig {
            package_name: "billing-api".to_string(),
            environment: "test".to_string(),
            ..Default::default()
        };
        assert_eq!(config.resolve_uri(None), "mongodb://localhost/billing-api-test");

        config.uri = Some("mongodb://localhost/from-env".to_string());
        assert_eq!(config.resolve_uri(None), "mongodb://localhost/from-env");
        assert_eq!(config.resolve_uri(Some("")), "mongodb://localhost/from-env");
        assert_eq!(
            config.resolve_uri(Some("mongodb://localhost/explicit")),
            "mongodb://localhost/explicit"
        );
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: ConnectConfig =
            serde_json::from_str(r#"{"package_name": "api", "pool": {"max_pool_size": 4}}"#).unwrap();
        assert_eq!(config.package_name, "api");
        assert_eq!(config.environment, DEFAULT_ENVIRONMENT);
        assert_eq!(config.pool.max_pool_size, Some(4));
        assert_eq!(config.pool.connect_timeout, Some(Duration::from_secs(10)));
    }
}
