// Server configuration

use crate::Error;
use std::net::SocketAddr;
use std::time::Duration;

/// Default maximum request body size (1 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Server configuration.
///
/// # Examples
///
/// ```
/// use spindle_core::ServerConfig;
///
/// let config = ServerConfig::new()
///     .host("127.0.0.1")
///     .port(8080)
///     .expose_stack(false);
///
/// assert_eq!(config.addr().unwrap().port(), 8080);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Attach `details.stack` to generic 500 errors
    pub expose_stack: bool,
    /// Maximum request body size in bytes; larger bodies get a 413
    pub body_limit: usize,
    /// How long `close` waits for in-flight connections
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            expose_stack: true,
            body_limit: DEFAULT_BODY_LIMIT,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn expose_stack(mut self, enable: bool) -> Self {
        self.expose_stack = enable;
        self
    }

    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Listening address built from `host` and `port`.
    pub fn addr(&self) -> Result<SocketAddr, Error> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Configuration(format!("Invalid address {}:{}: {}", self.host, self.port, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:3000");
        assert!(config.expose_stack);
        assert_eq!(config.body_limit, 1024 * 1024);
    }

    #[test]
    fn test_invalid_host() {
        let err = ServerConfig::new().host("not a host").addr().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
