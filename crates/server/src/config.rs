// Server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development.

use std::net::SocketAddr;

/// Core server configuration.
///
/// Constructed via [`ServerConfig::from_env`] which reads environment
/// variables and falls back to development defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `coscribe_server=debug`).
    pub log_filter: String,
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `COSCRIBE_HOST` | `0.0.0.0` |
    /// | `COSCRIBE_PORT` | `8080` |
    /// | `COSCRIBE_CORS_ORIGINS` | *(none — permissive dev default)* |
    /// | `COSCRIBE_LOG_FILTER` | `info` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("COSCRIBE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("COSCRIBE_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let cors_origins = env("COSCRIBE_CORS_ORIGINS").ok();
        let log_filter = env("COSCRIBE_LOG_FILTER").unwrap_or_else(|_| "info".into());

        Self { listen_addr, cors_origins, log_filter }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::env::VarError;

    fn env_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Result<String, VarError> + 'a {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |key| map.get(key).map(|value| (*value).to_owned()).ok_or(VarError::NotPresent)
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let config = ServerConfig::from_env_fn(env_from(&[]));
        assert_eq!(config.listen_addr, "0.0.0.0:8080".parse().unwrap());
        assert!(config.cors_origins.is_none());
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn env_overrides_are_honored() {
        let config = ServerConfig::from_env_fn(env_from(&[
            ("COSCRIBE_HOST", "127.0.0.1"),
            ("COSCRIBE_PORT", "9100"),
            ("COSCRIBE_CORS_ORIGINS", "https://app.example.com"),
            ("COSCRIBE_LOG_FILTER", "coscribe_server=debug"),
        ]));
        assert_eq!(config.listen_addr, "127.0.0.1:9100".parse().unwrap());
        assert_eq!(config.cors_origins.as_deref(), Some("https://app.example.com"));
        assert_eq!(config.log_filter, "coscribe_server=debug");
    }

    #[test]
    fn malformed_port_falls_back_to_default() {
        let config = ServerConfig::from_env_fn(env_from(&[("COSCRIBE_PORT", "not-a-port")]));
        assert_eq!(config.listen_addr.port(), 8080);
    }
}
