//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the center.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent field-unit connections.
    pub max_connections: usize,
    /// Longest wait for the next frame on a connection.
    pub frame_timeout: Duration,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            max_connections: 16,
            frame_timeout: Duration::from_secs(60),
        }
    }

    /// Sets the maximum concurrent connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the per-frame read timeout.
    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 7400)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = ServerConfig::default()
            .with_max_connections(4)
            .with_frame_timeout(Duration::from_secs(5));
        assert_eq!(config.bind_addr.port(), 7400);
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.frame_timeout, Duration::from_secs(5));
    }
}
