//! Configuration management for Ratewarden.
//!
//! Settings are layered: built-in defaults, an optional YAML file,
//! `RATEWARDEN_*` environment variables (`__` separates sections) and
//! finally the `REDIS_ADDR` variable understood by earlier deployments.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, WardenError};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "RATEWARDEN";

/// Main configuration for the Ratewarden service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardenConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Counter store (Redis) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// `host:port` or a full `redis://` URL
    #[serde(default = "default_store_address")]
    pub address: String,

    /// Number of pooled connections
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Connections opened eagerly at startup
    #[serde(default = "default_min_idle")]
    pub min_idle: usize,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_io_timeout")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_io_timeout")]
    pub write_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            address: default_store_address(),
            pool_size: default_pool_size(),
            min_idle: default_min_idle(),
            connect_timeout_ms: default_connect_timeout(),
            read_timeout_ms: default_io_timeout(),
            write_timeout_ms: default_io_timeout(),
        }
    }
}

impl StoreConfig {
    /// Connection URL understood by the redis client.
    pub fn url(&self) -> String {
        if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("redis://{}", self.address)
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Upper bound for one request/response exchange.
    ///
    /// The redis client times a command as a whole, so the write and read
    /// budgets are added together.
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms + self.write_timeout_ms)
    }
}

fn default_store_address() -> String {
    "localhost:6379".to_string()
}

fn default_pool_size() -> usize {
    100
}

fn default_min_idle() -> usize {
    10
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_io_timeout() -> u64 {
    200
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Window size in whole seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Prefix for counter keys in the store
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Limit applied to routes without an explicit entry
    #[serde(default = "default_limit")]
    pub default_limit: u64,

    /// Upper bound for a single admission decision, store round trip included
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_ms: u64,

    /// Admit requests when the decision cannot be obtained
    #[serde(default = "default_fail_open")]
    pub fail_open: bool,

    /// Per-route limits keyed by request path
    #[serde(default = "default_routes")]
    pub routes: HashMap<String, u64>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            key_prefix: default_key_prefix(),
            default_limit: default_limit(),
            operation_timeout_ms: default_operation_timeout(),
            fail_open: default_fail_open(),
            routes: default_routes(),
        }
    }
}

impl RateLimitingConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

fn default_window_secs() -> u64 {
    60
}

fn default_key_prefix() -> String {
    "rate".to_string()
}

fn default_limit() -> u64 {
    10
}

fn default_operation_timeout() -> u64 {
    500
}

fn default_fail_open() -> bool {
    true
}

fn default_routes() -> HashMap<String, u64> {
    HashMap::from([("/api/resource".to_string(), 10)])
}

impl WardenConfig {
    /// Load configuration from a YAML file only.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WardenConfig =
            serde_yaml::from_str(yaml).map_err(|e| WardenError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the layered configuration: defaults, optional file, environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let config: WardenConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("store.address", std::env::var("REDIS_ADDR").ok())?
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the limiter cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.window_secs == 0 {
            return Err(WardenError::Config(
                "rate_limiting.window_secs must be at least 1".to_string(),
            ));
        }
        if self.rate_limiting.default_limit == 0 {
            return Err(WardenError::Config(
                "rate_limiting.default_limit must be positive".to_string(),
            ));
        }
        if let Some((path, _)) = self.rate_limiting.routes.iter().find(|(_, limit)| **limit == 0) {
            return Err(WardenError::Config(format!(
                "rate_limiting.routes.{} must be positive",
                path
            )));
        }
        if self.store.pool_size == 0 {
            return Err(WardenError::Config(
                "store.pool_size must be at least 1".to_string(),
            ));
        }
        if self.store.min_idle > self.store.pool_size {
            return Err(WardenError::Config(format!(
                "store.min_idle ({}) exceeds store.pool_size ({})",
                self.store.min_idle, self.store.pool_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_deployment() {
        let config = WardenConfig::default();

        assert_eq!(config.server.listen_addr, SocketAddr::from(([0, 0, 0, 0], 8080)));
        assert_eq!(config.store.url(), "redis://localhost:6379");
        assert_eq!(config.store.pool_size, 100);
        assert_eq!(config.store.min_idle, 10);
        assert_eq!(config.store.response_timeout(), Duration::from_millis(400));
        assert_eq!(config.rate_limiting.window(), Duration::from_secs(60));
        assert_eq!(config.rate_limiting.routes.get("/api/resource"), Some(&10));
        assert!(config.rate_limiting.fail_open);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_url_passthrough() {
        let store = StoreConfig {
            address: "rediss://cache.internal:6380/2".to_string(),
            ..StoreConfig::default()
        };
        assert_eq!(store.url(), "rediss://cache.internal:6380/2");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
store:
  address: "10.0.0.5:6379"
  pool_size: 20
rate_limiting:
  window_secs: 1
  fail_open: false
  routes:
    /api/resource: 5
    /api/search: 50
"#;
        let config = WardenConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.store.address, "10.0.0.5:6379");
        assert_eq!(config.store.pool_size, 20);
        assert_eq!(config.store.min_idle, 10);
        assert_eq!(config.rate_limiting.window_secs, 1);
        assert!(!config.rate_limiting.fail_open);
        assert_eq!(config.rate_limiting.routes.len(), 2);
        assert_eq!(config.rate_limiting.routes.get("/api/search"), Some(&50));
        assert_eq!(config.server.listen_addr.port(), 8080);
    }

    #[test]
    fn test_zero_window_rejected() {
        let yaml = "rate_limiting:\n  window_secs: 0\n";
        let result = WardenConfig::from_yaml(yaml);
        assert!(matches!(result, Err(WardenError::Config(_))));
    }

    #[test]
    fn test_min_idle_above_pool_rejected() {
        let yaml = "store:\n  pool_size: 4\n  min_idle: 8\n";
        assert!(WardenConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_zero_route_limit_rejected() {
        let yaml = "rate_limiting:\n  routes:\n    /api/resource: 0\n";
        assert!(WardenConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_load_env_overrides_file() {
        let path = std::env::temp_dir().join(format!("ratewarden-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "store:\n  pool_size: 20\n  min_idle: 2\nrate_limiting:\n  window_secs: 1\n",
        )
        .unwrap();

        std::env::set_var("RATEWARDEN_STORE__POOL_SIZE", "7");
        std::env::set_var("RATEWARDEN_RATE_LIMITING__FAIL_OPEN", "false");

        let result = WardenConfig::load(Some(&path));

        std::env::remove_var("RATEWARDEN_STORE__POOL_SIZE");
        std::env::remove_var("RATEWARDEN_RATE_LIMITING__FAIL_OPEN");
        let _ = std::fs::remove_file(&path);

        let config = result.unwrap();
        assert_eq!(config.store.pool_size, 7);
        assert_eq!(config.store.min_idle, 2);
        assert_eq!(config.rate_limiting.window_secs, 1);
        assert!(!config.rate_limiting.fail_open);
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        let result = WardenConfig::from_yaml("store: [not, a, map");
        assert!(matches!(result, Err(WardenError::Config(_))));
    }
}
