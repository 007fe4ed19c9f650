use super::error::{RedisDaoError, RedisResult};

const DEFAULT_PORT: u16 = 6379;
const SCHEME: &str = "redis://";

/// Runtime configuration describing how to reach Redis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<u32>,
}

impl RedisConfig {
    /// Construct a configuration for an unauthenticated server.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            database: None,
        }
    }

    /// Parse a `redis://[[user]:password@]host[:port][/db]` URL.
    pub fn from_url(url: &str) -> RedisResult<Self> {
        let invalid = |reason| RedisDaoError::InvalidUrl {
            url: url.to_string(),
            reason,
        };

        let rest = url
            .strip_prefix(SCHEME)
            .ok_or_else(|| invalid("expected the redis:// scheme"))?;
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        let (userinfo, host_port) = match authority.rsplit_once('@') {
            Some((userinfo, host_port)) => (Some(userinfo), host_port),
            None => (None, authority),
        };

        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>().map_err(|_| invalid("port is not a number"))?,
            ),
            None => (host_port, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        let mut config = Self::new(host, port);

        if let Some(userinfo) = userinfo {
            let (username, password) = userinfo.split_once(':').unwrap_or(("", userinfo));
            config.username = Some(username.to_string()).filter(|name| !name.is_empty());
            config.password = Some(password.to_string()).filter(|pass| !pass.is_empty());
        }

        let database = path.trim_matches('/');
        if !database.is_empty() {
            config.database = Some(
                database
                    .parse()
                    .map_err(|_| invalid("database index is not a number"))?,
            );
        }

        Ok(config)
    }

    /// `host:port` pair handed to the TCP connector.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
