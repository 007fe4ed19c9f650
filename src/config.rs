//! Application-level configuration: built-in defaults, an optional JSON file,
//! then environment overrides.

use std::{env, fs, io::ErrorKind, path::PathBuf, str::FromStr, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SEED_SYNC_CONFIG_PATH";

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(5_000);
const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_millis(1_000);

/// Backend used for durable seed storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Redis lists reached over RESP.
    Redis,
    /// Process-local lists; nothing survives a restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    port: u16,
    redis_url: String,
    store_backend: StoreBackend,
    flush_interval: Duration,
    broadcast_interval: Duration,
}

impl AppConfig {
    /// Load the configuration from disk and the process environment.
    pub fn load() -> Self {
        let mut config = Self::from_file();
        config.apply_env(|name| env::var(name).ok());
        info!(
            port = config.port,
            store = ?config.store_backend,
            flush_ms = config.flush_interval.as_millis() as u64,
            broadcast_ms = config.broadcast_interval.as_millis() as u64,
            "configuration loaded"
        );
        config
    }

    fn from_file() -> Self {
        let path = resolve_config_path();
        let mut config = Self::default();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    info!(path = %path.display(), "loaded configuration file");
                    raw.apply(&mut config);
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
            }
        }
        config
    }

    /// Apply environment overrides resolved through `lookup`.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("PORT").or_else(|| lookup("SERVER_PORT")) {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(_) => warn!(value = %port, "ignoring invalid PORT"),
            }
        }
        if let Some(url) = lookup("REDIS_URL").filter(|url| !url.is_empty()) {
            self.redis_url = url;
        }
        if let Some(backend) = lookup("SEED_STORE") {
            match backend.parse() {
                Ok(backend) => self.store_backend = backend,
                Err(err) => warn!(error = %err, "ignoring invalid SEED_STORE"),
            }
        }
        if let Some(interval) = parse_interval(lookup("FLUSH_INTERVAL_MS"), "FLUSH_INTERVAL_MS") {
            self.flush_interval = interval;
        }
        if let Some(interval) =
            parse_interval(lookup("BROADCAST_INTERVAL_MS"), "BROADCAST_INTERVAL_MS")
        {
            self.broadcast_interval = interval;
        }
    }

    /// Override both periodic intervals.
    pub fn with_intervals(mut self, flush: Duration, broadcast: Duration) -> Self {
        self.flush_interval = flush;
        self.broadcast_interval = broadcast;
        self
    }

    /// Override the storage backend.
    pub fn with_store_backend(mut self, backend: StoreBackend) -> Self {
        self.store_backend = backend;
        self
    }

    /// TCP port the HTTP listener binds to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Connection URL of the Redis backend.
    pub fn redis_url(&self) -> &str {
        &self.redis_url
    }

    /// Selected storage backend.
    pub fn store_backend(&self) -> StoreBackend {
        self.store_backend
    }

    /// Period of the persistence flush cycle.
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Period of the broadcast cycle.
    pub fn broadcast_interval(&self) -> Duration {
        self.broadcast_interval
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            store_backend: StoreBackend::Redis,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            broadcast_interval: DEFAULT_BROADCAST_INTERVAL,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    port: Option<u16>,
    redis_url: Option<String>,
    store: Option<StoreBackend>,
    flush_interval_ms: Option<u64>,
    broadcast_interval_ms: Option<u64>,
}

impl RawConfig {
    fn apply(self, config: &mut AppConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(url) = self.redis_url {
            config.redis_url = url;
        }
        if let Some(store) = self.store {
            config.store_backend = store;
        }
        // A zero period would make the tokio interval panic.
        if let Some(ms) = self.flush_interval_ms.filter(|ms| *ms > 0) {
            config.flush_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.broadcast_interval_ms.filter(|ms| *ms > 0) {
            config.broadcast_interval = Duration::from_millis(ms);
        }
    }
}

fn parse_interval(value: Option<String>, name: &str) -> Option<Duration> {
    let value = value?;
    match value.parse::<u64>() {
        Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
        _ => {
            warn!(variable = name, value = %value, "ignoring invalid interval");
            None
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn with_env(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut config = AppConfig::default();
        config.apply_env(|name| vars.get(name).cloned());
        config
    }

    #[test]
    fn defaults_match_reference_periods() {
        let config = AppConfig::default();
        assert_eq!(config.port(), 3001);
        assert_eq!(config.redis_url(), "redis://localhost:6379");
        assert_eq!(config.store_backend(), StoreBackend::Redis);
        assert_eq!(config.flush_interval(), Duration::from_secs(5));
        assert_eq!(config.broadcast_interval(), Duration::from_secs(1));
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = with_env(&[
            ("SERVER_PORT", "9000"),
            ("REDIS_URL", "redis://cache:6380"),
            ("SEED_STORE", "Memory"),
            ("FLUSH_INTERVAL_MS", "250"),
        ]);
        assert_eq!(config.port(), 9000);
        assert_eq!(config.redis_url(), "redis://cache:6380");
        assert_eq!(config.store_backend(), StoreBackend::Memory);
        assert_eq!(config.flush_interval(), Duration::from_millis(250));
        assert_eq!(config.broadcast_interval(), Duration::from_secs(1));
    }

    #[test]
    fn port_takes_precedence_over_server_port() {
        let config = with_env(&[("PORT", "4000"), ("SERVER_PORT", "9000")]);
        assert_eq!(config.port(), 4000);
    }

    #[test]
    fn invalid_values_are_ignored() {
        let config = with_env(&[
            ("PORT", "http"),
            ("SEED_STORE", "postgres"),
            ("BROADCAST_INTERVAL_MS", "0"),
        ]);
        assert_eq!(config.port(), 3001);
        assert_eq!(config.store_backend(), StoreBackend::Redis);
        assert_eq!(config.broadcast_interval(), Duration::from_secs(1));
    }

    #[test]
    fn file_values_apply_before_environment() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "port": 8081,
                "store": "memory",
                "flush_interval_ms": 0,
                "broadcast_interval_ms": 200
            }"#,
        )
        .unwrap();
        let mut config = AppConfig::default();
        raw.apply(&mut config);
        config.apply_env(|name| (name == "PORT").then(|| "8082".to_string()));

        assert_eq!(config.port(), 8082);
        assert_eq!(config.store_backend(), StoreBackend::Memory);
        assert_eq!(config.flush_interval(), Duration::from_secs(5));
        assert_eq!(config.broadcast_interval(), Duration::from_millis(200));
    }
}
